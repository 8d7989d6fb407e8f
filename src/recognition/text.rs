//! Heuristics that turn raw OCR strings into scored name candidates and
//! normalized collector-number tokens.

use regex::Regex;
use std::sync::LazyLock;

/// Lines with more words than this are penalized as body text
pub const MAX_TITLE_WORDS: usize = 3;
/// Lines longer than this are penalized as body text
pub const MAX_TITLE_LEN: usize = 22;
/// Bonus for a line sitting at the very top of the name window
pub const VERTICAL_BONUS: f32 = 5.0;

/// Scores a string's likelihood of being a card name: letters count double,
/// digits are tolerated, anything that is not alphanumeric, whitespace,
/// `-`, `'` or `/` costs two points.
pub fn score_text(text: &str) -> i32 {
    let cleaned = text.trim();
    if cleaned.is_empty() {
        return 0;
    }
    let mut letters = 0;
    let mut digits = 0;
    let mut junk = 0;
    for ch in cleaned.chars() {
        if ch.is_alphabetic() {
            letters += 1;
        } else if ch.is_numeric() {
            digits += 1;
        }
        if !(ch.is_alphanumeric() || ch.is_whitespace() || matches!(ch, '-' | '\'' | '/')) {
            junk += 1;
        }
    }
    letters * 2 + digits - junk * 2
}

/// Base score minus word-count and length penalties
pub fn line_score(text: &str) -> f32 {
    let base = score_text(text);
    let words = text.split_whitespace().count();
    let word_penalty = words.saturating_sub(MAX_TITLE_WORDS) * 3;
    let length_penalty = text.chars().count().saturating_sub(MAX_TITLE_LEN) * 2;
    base as f32 - word_penalty as f32 - length_penalty as f32
}

/// Bonus in `[0, VERTICAL_BONUS]` that favours lines near the top of a window
pub fn vertical_bonus(top: u32, height: u32, window_height: u32) -> f32 {
    let y_mid = top as f32 + height as f32 / 2.0;
    (1.0 - y_mid / window_height.max(1) as f32).max(0.0) * VERTICAL_BONUS
}

/// Collector-number token shapes in priority order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TokenPattern {
    /// `133/198`
    Ratio,
    /// `12a/151`
    RatioSuffix,
    /// `GG01/GG70`, `TG05/TG30`
    PrefixedRatio,
    /// `SWSH123`, `SVP-045`
    Promo,
}

struct PatternSet {
    ratio: Regex,
    ratio_suffix: Regex,
    prefixed_ratio: Regex,
    promo: Regex,
    whitespace: Regex,
}

static PATTERNS: LazyLock<PatternSet> = LazyLock::new(|| PatternSet {
    ratio: Regex::new(r"\b(\d{1,3})\s*/\s*(\d{1,3})\b").expect("valid regex"),
    ratio_suffix: Regex::new(r"\b(\d{1,3}[A-Za-z]?)\s*/\s*(\d{1,3}[A-Za-z]?)\b").expect("valid regex"),
    prefixed_ratio: Regex::new(r"\b[A-Z]{1,4}\s*\d{1,3}\s*/\s*[A-Z]{1,4}\s*\d{1,3}\b").expect("valid regex"),
    promo: Regex::new(r"\b[A-Z]{1,5}\s*-?\s*\d{1,4}\b").expect("valid regex"),
    whitespace: Regex::new(r"\s+").expect("valid regex"),
});

impl TokenPattern {
    const PRIORITY: [TokenPattern; 4] = [
        TokenPattern::Ratio,
        TokenPattern::RatioSuffix,
        TokenPattern::PrefixedRatio,
        TokenPattern::Promo,
    ];

    fn regex(self) -> &'static Regex {
        match self {
            TokenPattern::Ratio => &PATTERNS.ratio,
            TokenPattern::RatioSuffix => &PATTERNS.ratio_suffix,
            TokenPattern::PrefixedRatio => &PATTERNS.prefixed_ratio,
            TokenPattern::Promo => &PATTERNS.promo,
        }
    }
}

/// Maps characters OCR commonly confuses with digits
pub fn digit_friendly(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            'O' => '0',
            'I' | 'L' | '|' => '1',
            other => other,
        })
        .collect()
}

fn count_digits(s: &str) -> usize {
    s.chars().filter(|c| c.is_ascii_digit()).count()
}

fn count_letters(s: &str) -> usize {
    s.chars().filter(|c| c.is_alphabetic()).count()
}

/// Extracts the best collector-number token from OCR text.
///
/// The text is tried as-is (upper-cased), with whitespace removed, and with
/// confusable characters mapped to digits. Matches are ranked by pattern
/// priority, then more digits, then more letters, then shorter token.
pub fn normalize_collector_number(text: &str) -> Option<String> {
    if text.trim().is_empty() {
        return None;
    }

    let cleaned = text.to_uppercase().replace(['\n', '\r'], " ");
    let collapsed = PATTERNS.whitespace.replace_all(&cleaned, "").into_owned();
    let friendly = digit_friendly(&collapsed);

    let mut best: Option<((TokenPattern, isize, isize, usize), String)> = None;
    for sample in [&cleaned, &collapsed, &friendly] {
        for pattern in TokenPattern::PRIORITY {
            for m in pattern.regex().find_iter(sample) {
                let token = PATTERNS.whitespace.replace_all(m.as_str(), "").into_owned();
                let digits = count_digits(&token);
                let letters = count_letters(&token);
                if digits == 0 {
                    continue;
                }
                if pattern == TokenPattern::Promo && (digits < 2 || letters < 2) {
                    continue;
                }
                let key = (pattern, -(digits as isize), -(letters as isize), token.chars().count());
                if best.as_ref().is_none_or(|(k, _)| key < *k) {
                    best = Some((key, token));
                }
            }
        }
    }

    best.map(|(_, token)| token)
}

/// Collector number in folder-name form (`133/198` → `133_198`)
pub fn number_for_path(number: &str) -> String {
    number.replace('/', "_")
}

const STOPWORDS: [&str; 6] = ["and", "the", "with", "from", "this", "that"];

/// Longest alphabetic run of at least five letters, for name searches
pub fn name_fragment(text: &str) -> Option<String> {
    static WORDS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[A-Za-z]{5,}").expect("valid regex"));
    let mut best: Option<&str> = None;
    for m in WORDS.find_iter(text) {
        if best.is_none_or(|b| m.as_str().len() > b.len()) {
            best = Some(m.as_str());
        }
    }
    best.map(str::to_string)
}

/// First alphabetic run of at least four letters that is not a stopword,
/// for ability-text searches
pub fn ability_fragment(text: &str) -> Option<String> {
    static WORDS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[A-Za-z]{4,}").expect("valid regex"));
    WORDS
        .find_iter(text)
        .map(|m| m.as_str())
        .find(|w| !STOPWORDS.contains(&w.to_lowercase().as_str()))
        .map(str::to_string)
}
