//! Run orchestration: fronts are identified and bundled card by card, then
//! backs are matched onto the bundles and the source scans archived.

use anyhow::{Context, Result};
use image::RgbImage;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use time::{Date, OffsetDateTime};
use tracing::{info, warn};

use crate::bundle::{folder_name, listing_crop, CardBundle, FrontImages, Manifest, LISTING_PADDING};
use crate::config::Config;
use crate::correspondence::match_backs;
use crate::detection::CardSegmenter;
use crate::error::CardSortError;
use crate::matching::{accepted_hint, find_candidates, ReferenceSlot, TOP_K};
use crate::models::{CollectorNumberResult, NameReading, ResolvedCard, VisualCandidate};
use crate::recognition::name::UNKNOWN_NAME;
use crate::recognition::{recognize_name, CollectorRecognizer, RecognizerSlot};
use crate::resolve::{CatalogLookup, Evidence, OfflineCatalog, Resolver, TcgApiClient};

pub const SUPPORTED_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];
pub const FRONTS_BASENAME: &str = "fronts";
pub const BACKS_BASENAME: &str = "backs";
pub const ARCHIVE_DIR: &str = "_Processed_Scans";

/// Shared heavy resources, each initialized at most once per run
pub struct Services {
    pub recognizer: RecognizerSlot,
    pub reference: ReferenceSlot,
    pub catalog: Box<dyn CatalogLookup>,
}

impl Services {
    pub fn from_config(config: &Config) -> Self {
        let catalog: Box<dyn CatalogLookup> = if config.offline {
            Box::new(OfflineCatalog)
        } else {
            Box::new(TcgApiClient::from_config(config))
        };
        Self {
            recognizer: RecognizerSlot::new(config.resolved_model_dir()),
            reference: ReferenceSlot::new(config.reference_dir.clone()),
            catalog,
        }
    }
}

/// Everything learned about one rectified front
#[derive(Debug, Clone)]
pub struct CardIdentity {
    pub reading: NameReading,
    pub collector: CollectorNumberResult,
    pub visual: Vec<VisualCandidate>,
    pub resolved: ResolvedCard,
}

/// A bundled front with the normalized centroid used for back matching
#[derive(Debug, Clone)]
pub struct ProcessedFront {
    pub bundle: CardBundle,
    pub center: (f64, f64),
}

#[derive(Debug, Default)]
pub struct RunSummary {
    pub fronts: Vec<ProcessedFront>,
    pub backs_detected: usize,
    pub backs_attached: usize,
    pub archive_dir: Option<PathBuf>,
}

/// First `<basename>.<ext>` in `dir`, trying extensions in order
pub fn find_scan(dir: &Path, basename: &str) -> Result<PathBuf, CardSortError> {
    SUPPORTED_EXTENSIONS
        .iter()
        .map(|ext| dir.join(format!("{basename}.{ext}")))
        .find(|p| p.is_file())
        .ok_or_else(|| CardSortError::MissingScan {
            basename: basename.to_string(),
            dir: dir.to_path_buf(),
            extensions: SUPPORTED_EXTENSIONS.join(", "),
        })
}

pub fn load_image(path: &Path) -> Result<RgbImage, CardSortError> {
    let image = image::open(path).map_err(|source| CardSortError::UnreadableImage {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(image.to_rgb8())
}

/// `YYYY-MM-DD`
pub fn date_folder(date: Date) -> String {
    format!("{:04}-{:02}-{:02}", date.year(), u8::from(date.month()), date.day())
}

/// `dir/<name>`, or `dir/<stem>_<n>.<ext>` for the first free `n`
fn free_destination(dir: &Path, file: &Path) -> Option<PathBuf> {
    let name = file.file_name()?;
    let candidate = dir.join(name);
    if !candidate.exists() {
        return Some(candidate);
    }
    let stem = file.file_stem()?.to_string_lossy().into_owned();
    let ext = file.extension().map(|e| format!(".{}", e.to_string_lossy())).unwrap_or_default();
    (1..)
        .map(|n| dir.join(format!("{stem}_{n}{ext}")))
        .find(|p| !p.exists())
}

/// Move `scans` into `<input_dir>/_Processed_Scans/<date>/`
pub fn archive_scans(input_dir: &Path, scans: &[PathBuf], date: Date) -> Result<PathBuf> {
    let archive = input_dir.join(ARCHIVE_DIR).join(date_folder(date));
    fs::create_dir_all(&archive).with_context(|| format!("Failed to create {}", archive.display()))?;
    for scan in scans {
        let Some(dest) = free_destination(&archive, scan) else {
            continue;
        };
        fs::rename(scan, &dest).with_context(|| format!("Failed to move {}", scan.display()))?;
    }
    info!(dir = %archive.display(), "archived original scans");
    Ok(archive)
}

pub struct CardSorter {
    config: Config,
    services: Services,
    collector: CollectorRecognizer,
    debug_out: Option<PathBuf>,
}

impl CardSorter {
    pub fn new(config: Config, services: Services) -> Self {
        let collector = CollectorRecognizer::new(config.use_detector);
        Self {
            config,
            services,
            collector,
            debug_out: None,
        }
    }

    /// Dump segmentation steps under `dir/fronts` and `dir/backs`
    pub fn with_debug_out(mut self, dir: PathBuf) -> Self {
        self.debug_out = Some(dir);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn segmenter(&self, label: &str) -> CardSegmenter {
        let segmenter = CardSegmenter::new().with_verbose(self.config.debug);
        match &self.debug_out {
            Some(dir) => segmenter.with_debug_dir(dir.join(label)),
            None => segmenter,
        }
    }

    /// Name, number, visual shortlist and fused identity for one rectified card
    pub fn identify(&self, card: &RgbImage) -> CardIdentity {
        let recognizer = self.services.recognizer.get();
        let reading = recognize_name(recognizer.as_deref(), card);
        if reading.rotation.degrees() != 0 {
            info!(degrees = reading.rotation.degrees(), "rotated to align text");
        }

        let index = self.services.reference.get();
        let visual = find_candidates(index.as_deref(), &reading.image, TOP_K);
        let collector = self.collector.recognize(recognizer.as_deref(), &reading.image);

        let evidence = Evidence {
            ocr_name: (reading.name != UNKNOWN_NAME).then(|| reading.name.clone()),
            ocr_text: reading.raw_text.clone(),
            collector: collector.clone(),
            visual: visual.clone(),
        };
        let resolved = Resolver::new(self.services.catalog.as_ref()).resolve(&evidence);

        CardIdentity {
            reading,
            collector,
            visual,
            resolved,
        }
    }

    /// Segment, identify and bundle every front card in `image`
    pub fn process_fronts(&self, image: &RgbImage) -> Result<Vec<ProcessedFront>> {
        let segmenter = self.segmenter("fronts");
        let contours = segmenter.segment(image)?;
        info!(count = contours.len(), "processing card fronts");

        let mut fronts = Vec::new();
        for (i, contour) in contours.iter().enumerate() {
            let Ok(rectified) = segmenter.rectify(image, contour, i) else {
                continue;
            };
            let identity = self.identify(&rectified.image);
            let resolved = &identity.resolved;

            let manifest = Manifest {
                chosen_name: resolved.name.clone(),
                collector_number: resolved.collector_number.clone(),
                set_hint: resolved.set_hint.clone(),
                visual_top: accepted_hint(&identity.visual).cloned(),
                confidence: resolved.confidence,
                auto_accept: resolved.accepted,
                cn_info: identity.collector.clone(),
                ocr_name_raw: identity.reading.name.clone(),
                rotation: identity.reading.rotation,
                provenance: resolved.provenance.clone(),
                files: Vec::new(),
                back: None,
            };
            let listing = listing_crop(image, &contour.bounding_box(), &identity.reading.image);
            let bundle = CardBundle::write_front(
                &self.config.output_dir,
                folder_name(resolved, i),
                manifest,
                FrontImages {
                    listing: &listing,
                    upright: &identity.reading.image,
                    save_warped: self.config.persist_warped(),
                },
            )?;

            fronts.push(ProcessedFront {
                bundle,
                center: contour.normalized_centroid(image.width(), image.height()),
            });
        }
        info!(usable = fronts.len(), "fronts processed");
        Ok(fronts)
    }

    /// Segment backs in `image` and attach each to its matched front.
    /// Returns (backs detected, fronts holding a back); a later back
    /// matched to the same front replaces the earlier one.
    pub fn process_backs(&self, image: &RgbImage, fronts: &mut [ProcessedFront]) -> Result<(usize, usize)> {
        let contours = self.segmenter("backs").segment(image)?;
        info!(count = contours.len(), "processing card backs");
        if fronts.is_empty() {
            warn!("no card fronts were processed; skipping back matching");
            return Ok((contours.len(), 0));
        }

        let front_centers: Vec<(f64, f64)> = fronts.iter().map(|f| f.center).collect();
        let back_centers: Vec<(f64, f64)> = contours
            .iter()
            .map(|c| c.normalized_centroid(image.width(), image.height()))
            .collect();
        let correspondence = match_backs(&front_centers, &back_centers);

        let mut attached = BTreeSet::new();
        for (back_idx, front_idx) in correspondence.pairs() {
            let bbox = contours[back_idx].bounding_box();
            let Some(padded) = bbox.padded(LISTING_PADDING, image.width(), image.height()) else {
                continue;
            };
            let crop = image::imageops::crop_imm(image, padded.x, padded.y, padded.width, padded.height).to_image();
            fronts[front_idx]
                .bundle
                .attach_back(&crop, back_idx, correspondence.strategy)?;
            attached.insert(front_idx);
        }
        Ok((contours.len(), attached.len()))
    }

    /// Full run over the scans in the configured input directory
    pub fn run(&self) -> Result<RunSummary> {
        let input_dir = &self.config.input_dir;
        let front_path = find_scan(input_dir, FRONTS_BASENAME)?;
        let back_path = find_scan(input_dir, BACKS_BASENAME)?;
        info!(fronts = %front_path.display(), backs = %back_path.display(), "found scans");

        let front_image = load_image(&front_path)?;
        let back_image = load_image(&back_path)?;
        fs::create_dir_all(&self.config.output_dir)
            .with_context(|| format!("Failed to create {}", self.config.output_dir.display()))?;

        let mut fronts = self.process_fronts(&front_image)?;
        let (backs_detected, backs_attached) = self.process_backs(&back_image, &mut fronts)?;

        let archive_dir = if self.config.archive_scans {
            let today = OffsetDateTime::now_local()
                .unwrap_or_else(|_| OffsetDateTime::now_utc())
                .date();
            Some(archive_scans(input_dir, &[front_path, back_path], today)?)
        } else {
            None
        };

        Ok(RunSummary {
            fronts,
            backs_detected,
            backs_attached,
            archive_dir,
        })
    }
}
