use image::{Rgb, RgbImage};
use imageproc::geometric_transformations::{warp_into, Interpolation, Projection};
use imageproc::geometry::{approximate_polygon_dp, arc_length, min_area_rect};
use imageproc::point::Point;
use tracing::debug;

use crate::error::GeometryError;
use crate::geometry::order_points;
use crate::models::{CardContour, RectifiedCard};

/// Canonical card width in pixels; height follows the 1:1.4 card ratio
pub const WARPED_WIDTH: u32 = 900;
pub const WARPED_HEIGHT: u32 = 1260;
/// Polygon approximation tolerance as a fraction of the perimeter
pub const APPROX_EPSILON_RATIO: f64 = 0.02;

/// Douglas-Peucker over a closed outline. The outline is split at the
/// vertex farthest from its first point and each half is simplified as an
/// open curve, so no simplification segment ever starts and ends on the
/// same point.
pub fn approximate_closed_polygon(points: &[Point<i32>], epsilon: f64) -> Vec<Point<i32>> {
    if points.len() < 3 {
        return points.to_vec();
    }
    let start = points[0];
    // zero perimeter: every point coincides
    if epsilon <= 0.0 {
        return vec![start];
    }
    let dist = |p: &Point<i32>| {
        let (dx, dy) = ((p.x - start.x) as f64, (p.y - start.y) as f64);
        dx * dx + dy * dy
    };
    let far = points
        .iter()
        .enumerate()
        .skip(1)
        .fold((0, 0.0), |best, (i, p)| if dist(p) > best.1 { (i, dist(p)) } else { best })
        .0;
    if far == 0 {
        return vec![start];
    }

    let mut closing: Vec<Point<i32>> = points[far..].to_vec();
    closing.push(start);
    let mut approx = approximate_polygon_dp(&points[..=far], epsilon, false);
    approx.pop();
    approx.extend(approximate_polygon_dp(&closing, epsilon, false));
    approx.pop();
    approx
}

/// Four corners for a contour: the polygon approximation when it has exactly
/// four vertices, the minimum-area rectangle when it has more.
pub fn quadrilateral(contour: &CardContour) -> Result<([(f32, f32); 4], bool), GeometryError> {
    let points = &contour.points;
    let perimeter = arc_length(points, true);
    let approx = approximate_closed_polygon(points, APPROX_EPSILON_RATIO * perimeter);

    match approx.len() {
        n if n < 4 => Err(GeometryError::TooFewVertices(n)),
        4 => Ok((to_corners(&approx), false)),
        n => {
            debug!(vertices = n, "using min-area rectangle fallback");
            let rect = min_area_rect(points);
            Ok((to_corners(&rect), true))
        }
    }
}

fn to_corners(points: &[Point<i32>]) -> [(f32, f32); 4] {
    let raw = [
        (points[0].x as f32, points[0].y as f32),
        (points[1].x as f32, points[1].y as f32),
        (points[2].x as f32, points[2].y as f32),
        (points[3].x as f32, points[3].y as f32),
    ];
    order_points(&raw)
}

/// Warp the region bounded by ordered TL/TR/BR/BL corners onto a
/// `width`×`height` canvas
pub fn warp_quad(image: &RgbImage, corners: &[(f32, f32); 4], width: u32, height: u32) -> Result<RgbImage, GeometryError> {
    let dst = [
        (0.0, 0.0),
        ((width - 1) as f32, 0.0),
        ((width - 1) as f32, (height - 1) as f32),
        (0.0, (height - 1) as f32),
    ];
    let projection = Projection::from_control_points(*corners, dst).ok_or(GeometryError::DegenerateQuad)?;
    let mut out = RgbImage::new(width, height);
    warp_into(image, &projection, Interpolation::Bilinear, Rgb([0, 0, 0]), &mut out);
    Ok(out)
}

/// Perspective-correct one card out of the photograph at canonical size
pub fn rectify(image: &RgbImage, contour: &CardContour) -> Result<RectifiedCard, GeometryError> {
    let (corners, used_min_area_rect) = quadrilateral(contour)?;
    let warped = warp_quad(image, &corners, WARPED_WIDTH, WARPED_HEIGHT)?;
    Ok(RectifiedCard {
        image: warped,
        corners,
        used_min_area_rect,
    })
}
