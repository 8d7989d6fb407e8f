mod common;

use cardsort::bundle::{
    folder_name, listing_crop, quadrant_crops, sanitize_filename, CardBundle, FrontImages, Manifest, MANIFEST_FILE,
};
use cardsort::correspondence::MatchStrategy;
use cardsort::geometry::BoundingBox;
use cardsort::models::{NameSource, Provenance};
use common::*;
use image::RgbImage;
use std::fs;
use std::path::Path;

fn resolved(name: &str, number: Option<&str>, accepted: bool) -> ResolvedCard {
    ResolvedCard {
        name: name.to_string(),
        collector_number: number.map(str::to_string),
        set_hint: None,
        confidence: if accepted { 0.9 } else { 0.3 },
        accepted,
        lookup_hit: false,
        provenance: Provenance {
            name: NameSource::Ocr,
            collector_number: None,
            set_hint: None,
            text_search: false,
        },
    }
}

fn manifest_for(card: &ResolvedCard) -> Manifest {
    Manifest {
        chosen_name: card.name.clone(),
        collector_number: card.collector_number.clone(),
        set_hint: card.set_hint.clone(),
        visual_top: None,
        confidence: card.confidence,
        auto_accept: card.accepted,
        cn_info: CollectorNumberResult::absent(),
        ocr_name_raw: card.name.clone(),
        rotation: Rotation::Deg0,
        provenance: card.provenance.clone(),
        files: Vec::new(),
        back: None,
    }
}

fn images_in(dir: &Path) -> anyhow::Result<Vec<String>> {
    let mut names: Vec<String> = fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|n| n.ends_with(".jpg"))
        .collect();
    names.sort();
    Ok(names)
}

#[test]
fn test_sanitize_filename() -> anyhow::Result<()> {
    assert_eq!(sanitize_filename("Mr. Mime: \"Promo\""), "Mr._Mime_Promo");
    assert_eq!(sanitize_filename("  Pikachu V  "), "Pikachu_V");
    assert_eq!(sanitize_filename("a/b\\c*d?e<f>g|h"), "abcdefgh");
    Ok(())
}

#[test]
fn test_folder_names() -> anyhow::Result<()> {
    assert_eq!(folder_name(&resolved("Pikachu", Some("133/198"), true), 0), "Pikachu_133_198_1");
    assert_eq!(folder_name(&resolved("Pikachu V", None, true), 4), "Pikachu_V_5");
    assert_eq!(folder_name(&resolved("Pikachu", Some("133/198"), false), 1), "Uncertain_Pikachu_2");
    Ok(())
}

#[test]
fn test_quadrants_are_corner_anchored() -> anyhow::Result<()> {
    let image = RgbImage::from_fn(100, 200, |x, y| image::Rgb([x as u8, (y / 2) as u8, 0]));
    let crops = quadrant_crops(&image);
    let names: Vec<&str> = crops.iter().map(|(n, _)| *n).collect();
    assert_eq!(names, ["TOP_LEFT", "TOP_RIGHT", "BOTTOM_LEFT", "BOTTOM_RIGHT"]);
    for (_, crop) in &crops {
        assert_eq!(crop.dimensions(), (60, 120));
    }
    assert_eq!(crops[3].1.get_pixel(59, 119), image.get_pixel(99, 199));
    assert_eq!(crops[1].1.get_pixel(0, 0), image.get_pixel(40, 0));
    Ok(())
}

#[test]
fn test_listing_crop_padding() -> anyhow::Result<()> {
    let photo = RgbImage::new(1000, 1000);
    let fallback = RgbImage::new(5, 5);
    let crop = listing_crop(&photo, &BoundingBox::new(400, 100, 200, 300), &fallback);
    assert_eq!(crop.dimensions(), (500, 550));
    Ok(())
}

#[test]
fn test_write_front_and_attach_back() -> anyhow::Result<()> {
    let out = tempfile::TempDir::new()?;
    let card = resolved("Pikachu", Some("133/198"), true);
    let folder = folder_name(&card, 0);
    let upright = titled_card();
    let listing = RgbImage::from_pixel(400, 500, CARD_WHITE);

    let mut bundle = CardBundle::write_front(
        out.path(),
        folder.clone(),
        manifest_for(&card),
        FrontImages {
            listing: &listing,
            upright: &upright,
            save_warped: true,
        },
    )?;
    let dir = out.path().join(&folder);
    assert_eq!(
        images_in(&dir)?,
        vec![
            "FRONT_BOTTOM_LEFT.jpg",
            "FRONT_BOTTOM_RIGHT.jpg",
            "FRONT_LISTING.jpg",
            "FRONT_TOP_LEFT.jpg",
            "FRONT_TOP_RIGHT.jpg",
            "FRONT_WARPED.jpg",
        ]
    );

    let manifest: serde_json::Value = serde_json::from_str(&fs::read_to_string(dir.join(MANIFEST_FILE))?)?;
    assert_eq!(manifest["chosen_name"], "Pikachu");
    assert_eq!(manifest["collector_number"], "133/198");
    assert_eq!(manifest["rotation"], 0);
    assert!(manifest["back"].is_null());

    let back = RgbImage::from_pixel(300, 420, BACKGROUND);
    bundle.attach_back(&back, 3, MatchStrategy::Reversed)?;
    let images = images_in(&dir)?;
    assert_eq!(images.len(), 11);
    assert!(images.contains(&"BACK_LISTING.jpg".to_string()));

    let manifest: serde_json::Value = serde_json::from_str(&fs::read_to_string(dir.join(MANIFEST_FILE))?)?;
    assert_eq!(manifest["back"]["contour_index"], 3);
    assert_eq!(manifest["back"]["strategy"], "reversed");
    let files: Vec<String> = serde_json::from_value(manifest["files"].clone())?;
    assert_eq!(files, images);
    Ok(())
}

#[test]
fn test_attach_back_twice_replaces() -> anyhow::Result<()> {
    let out = tempfile::TempDir::new()?;
    let card = resolved("Eevee", None, false);
    let upright = titled_card();
    let mut bundle = CardBundle::write_front(
        out.path(),
        folder_name(&card, 0),
        manifest_for(&card),
        FrontImages {
            listing: &upright,
            upright: &upright,
            save_warped: false,
        },
    )?;
    let back = RgbImage::from_pixel(200, 280, BACKGROUND);
    bundle.attach_back(&back, 0, MatchStrategy::NearestNeighbour)?;
    bundle.attach_back(&back, 1, MatchStrategy::NearestNeighbour)?;

    assert_eq!(images_in(&bundle.dir)?.len(), 10);
    assert_eq!(bundle.manifest.files.len(), 10);
    assert_eq!(bundle.manifest.back.as_ref().map(|b| b.contour_index), Some(1));
    Ok(())
}
