use image::GrayImage;
use imageproc::contours::{find_contours, BorderType};
use imageproc::point::Point;

use crate::geometry::polygon_area;

/// Absolute floor for a card outline's area, in square pixels
pub const MIN_CARD_AREA: f64 = 250_000.0;
/// Relative floor: fraction of the whole photograph
pub const MIN_CARD_AREA_FRACTION: f64 = 0.015;
/// Bounding-box IoU above which two outlines are fused
pub const MERGE_IOU_THRESHOLD: f64 = 0.35;

/// Outermost borders of the foreground regions in a binary edge map
pub fn find_external_contours(edges: &GrayImage) -> Vec<Vec<Point<i32>>> {
    find_contours::<i32>(edges)
        .into_iter()
        .filter(|c| c.border_type == BorderType::Outer && c.parent.is_none())
        .map(|c| c.points)
        .collect()
}

/// Minimum area a contour needs to count as a card in a `width`×`height` photograph
pub fn min_card_area(width: u32, height: u32, floor: f64, fraction: f64) -> f64 {
    floor.max(fraction * width as f64 * height as f64)
}

/// Drop outlines too small to be a card (noise, shadows, print detail)
pub fn filter_by_area(contours: Vec<Vec<Point<i32>>>, min_area: f64) -> Vec<Vec<Point<i32>>> {
    contours
        .into_iter()
        .filter(|c| polygon_area(c) > min_area)
        .collect()
}
