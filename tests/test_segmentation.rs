mod common;

use cardsort::detection::rectify::{approximate_closed_polygon, quadrilateral, WARPED_HEIGHT, WARPED_WIDTH};
use cardsort::detection::CardSegmenter;
use cardsort::error::GeometryError;
use cardsort::geometry::merge_overlapping_contours;
use cardsort::models::CardContour;
use common::*;
use imageproc::point::Point;

#[test]
fn test_single_card_is_found_and_rectified() -> anyhow::Result<()> {
    let photo = single_card_photo();
    let segmenter = CardSegmenter::new();
    let contours = segmenter.segment(&photo)?;
    assert_eq!(contours.len(), 1);

    let bbox = contours[0].bounding_box();
    assert!(bbox.x.abs_diff(350) <= 6 && bbox.y.abs_diff(210) <= 6);
    assert!(bbox.width.abs_diff(700) <= 12 && bbox.height.abs_diff(980) <= 12);

    let (cx, cy) = contours[0].normalized_centroid(photo.width(), photo.height());
    assert!((cx - 0.5).abs() < 0.02 && (cy - 0.5).abs() < 0.02);

    let card = segmenter.rectify(&photo, &contours[0], 0)?;
    assert_eq!(card.image.dimensions(), (WARPED_WIDTH, WARPED_HEIGHT));
    // the centre of the warped card is card stock, not background
    let centre = card.image.get_pixel(WARPED_WIDTH / 2, WARPED_HEIGHT / 2);
    assert!(centre[0] > 200);
    Ok(())
}

#[test]
fn test_cards_ordered_top_to_bottom() -> anyhow::Result<()> {
    let photo = card_photo(
        2000,
        2200,
        &[(1100, 1150, 600, 840), (200, 100, 600, 840), (1100, 100, 600, 840)],
    );
    let contours = CardSegmenter::new().segment(&photo)?;
    assert_eq!(contours.len(), 3);

    let origins: Vec<(u32, u32)> = contours
        .iter()
        .map(|c| {
            let b = c.bounding_box();
            (b.x, b.y)
        })
        .collect();
    assert!(origins[0].1 <= origins[2].1);
    assert!(origins[2].1 > 1000);
    Ok(())
}

#[test]
fn test_small_blobs_are_ignored() -> anyhow::Result<()> {
    let photo = card_photo(1400, 1400, &[(100, 100, 120, 160), (600, 600, 80, 80)]);
    let contours = CardSegmenter::new().segment(&photo)?;
    assert!(contours.is_empty());
    Ok(())
}

#[test]
fn test_triangle_is_rejected() -> anyhow::Result<()> {
    let triangle = CardContour::new(vec![Point::new(0, 0), Point::new(500, 0), Point::new(250, 400)]);
    match quadrilateral(&triangle) {
        Err(GeometryError::TooFewVertices(n)) => assert!(n < 4),
        other => anyhow::bail!("expected rejection, got {other:?}"),
    }
    Ok(())
}

#[test]
fn test_exact_quad_is_used_directly() -> anyhow::Result<()> {
    let quad = CardContour::new(vec![
        Point::new(10, 10),
        Point::new(410, 20),
        Point::new(400, 600),
        Point::new(0, 590),
    ]);
    let (corners, fallback) = quadrilateral(&quad)?;
    assert!(!fallback);
    assert_eq!(corners[0], (10.0, 10.0));
    assert_eq!(corners[2], (400.0, 600.0));
    Ok(())
}

/// Pixel-by-pixel outline of an axis-aligned rectangle, clockwise from the top-left
fn traced_outline(x: i32, y: i32, w: i32, h: i32) -> Vec<Point<i32>> {
    let mut points = Vec::new();
    points.extend((x..x + w).map(|px| Point::new(px, y)));
    points.extend((y..y + h).map(|py| Point::new(x + w, py)));
    points.extend((x + 1..=x + w).rev().map(|px| Point::new(px, y + h)));
    points.extend((y + 1..=y + h).rev().map(|py| Point::new(x, py)));
    points
}

#[test]
fn test_traced_outline_simplifies_to_four_corners() {
    let outline = traced_outline(100, 100, 400, 560);
    let approx = approximate_closed_polygon(&outline, 0.02 * 1920.0);
    assert_eq!(approx.len(), 4);
    for corner in [Point::new(100, 100), Point::new(500, 100), Point::new(500, 660), Point::new(100, 660)] {
        assert!(approx.contains(&corner), "missing {corner:?} in {approx:?}");
    }
}

#[test]
fn test_merged_fragments_are_rectified() -> anyhow::Result<()> {
    let photo = single_card_photo();
    let merged = merge_overlapping_contours(
        vec![traced_outline(350, 210, 700, 980), traced_outline(360, 210, 690, 980)],
        0.35,
    );
    assert_eq!(merged.len(), 1);

    let contour = CardContour::new(merged.into_iter().next().unwrap_or_default());
    let (corners, fallback) = quadrilateral(&contour)?;
    assert!(!fallback);
    assert_eq!(corners[0], (350.0, 210.0));
    assert_eq!(corners[2], (1050.0, 1190.0));

    let card = CardSegmenter::new().rectify(&photo, &contour, 0)?;
    assert_eq!(card.image.dimensions(), (WARPED_WIDTH, WARPED_HEIGHT));
    assert!(!card.used_min_area_rect);
    assert!(card.image.get_pixel(WARPED_WIDTH / 2, WARPED_HEIGHT / 2)[0] > 200);
    Ok(())
}

#[test]
fn test_hull_corners_alone_form_a_quad() -> anyhow::Result<()> {
    let hull = CardContour::new(vec![
        Point::new(100, 100),
        Point::new(800, 100),
        Point::new(800, 1080),
        Point::new(100, 1080),
    ]);
    let (corners, fallback) = quadrilateral(&hull)?;
    assert!(!fallback);
    assert_eq!(corners, [(100.0, 100.0), (800.0, 100.0), (800.0, 1080.0), (100.0, 1080.0)]);
    Ok(())
}

#[test]
fn test_noisy_outline_uses_min_area_rectangle() -> anyhow::Result<()> {
    // deeply chamfered corners survive simplification as eight vertices
    let octagon = CardContour::new(vec![
        Point::new(60, 0),
        Point::new(340, 0),
        Point::new(400, 60),
        Point::new(400, 540),
        Point::new(340, 600),
        Point::new(60, 600),
        Point::new(0, 540),
        Point::new(0, 60),
    ]);
    let (corners, fallback) = quadrilateral(&octagon)?;
    assert!(fallback);

    let expected = [(0.0, 0.0), (400.0, 0.0), (400.0, 600.0), (0.0, 600.0)];
    for (got, want) in corners.iter().zip(expected) {
        assert!((got.0 - want.0).abs() <= 2.0 && (got.1 - want.1).abs() <= 2.0, "{corners:?}");
    }

    let photo = card_photo(600, 800, &[(50, 50, 400, 600)]);
    let card = cardsort::detection::rectify::rectify(&photo, &octagon)?;
    assert!(card.used_min_area_rect);
    assert_eq!(card.image.dimensions(), (WARPED_WIDTH, WARPED_HEIGHT));
    Ok(())
}

#[test]
fn test_debug_dump_requires_empty_dir() -> anyhow::Result<()> {
    let dir = tempfile::TempDir::new()?;
    std::fs::write(dir.path().join("stale.txt"), "x")?;
    let segmenter = CardSegmenter::new().with_debug_dir(dir.path().to_path_buf());
    assert!(segmenter.segment(&single_card_photo()).is_err());

    let fresh = tempfile::TempDir::new()?;
    let segmenter = CardSegmenter::new().with_debug_dir(fresh.path().join("fronts"));
    segmenter.segment(&single_card_photo())?;
    assert!(fresh.path().join("fronts/00_input").exists());
    Ok(())
}
