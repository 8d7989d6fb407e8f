//! Small geometric helpers shared by segmentation, recognition and correspondence.

use image::{imageops, RgbImage};
use imageproc::geometry::convex_hull;
use imageproc::point::Point;
use serde::Serialize;

/// Axis-aligned rectangle in image pixel space
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    /// Tight box around a point set, inclusive of the extreme pixels
    pub fn from_points(points: &[Point<i32>]) -> Option<Self> {
        let first = points.first()?;
        let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
        for p in points {
            min_x = min_x.min(p.x);
            min_y = min_y.min(p.y);
            max_x = max_x.max(p.x);
            max_y = max_y.max(p.y);
        }
        let min_x = min_x.max(0);
        let min_y = min_y.max(0);
        Some(Self {
            x: min_x as u32,
            y: min_y as u32,
            width: (max_x - min_x + 1).max(0) as u32,
            height: (max_y - min_y + 1).max(0) as u32,
        })
    }

    pub fn right(&self) -> u32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    pub fn center(&self) -> (f64, f64) {
        (
            self.x as f64 + self.width as f64 / 2.0,
            self.y as f64 + self.height as f64 / 2.0,
        )
    }

    /// Intersection over union; 0.0 for disjoint or empty boxes
    pub fn iou(&self, other: &BoundingBox) -> f64 {
        let inter_x1 = self.x.max(other.x);
        let inter_y1 = self.y.max(other.y);
        let inter_x2 = self.right().min(other.right());
        let inter_y2 = self.bottom().min(other.bottom());
        let inter_w = inter_x2.saturating_sub(inter_x1) as u64;
        let inter_h = inter_y2.saturating_sub(inter_y1) as u64;
        let inter = inter_w * inter_h;
        if inter == 0 {
            return 0.0;
        }
        let union = self.area() + other.area() - inter;
        if union == 0 {
            0.0
        } else {
            inter as f64 / union as f64
        }
    }

    /// Grow by `padding` on every side, clamped to a `width`×`height` image.
    /// Returns `None` when the clamped box is empty.
    pub fn padded(&self, padding: u32, width: u32, height: u32) -> Option<BoundingBox> {
        let x0 = self.x.saturating_sub(padding);
        let y0 = self.y.saturating_sub(padding);
        let x1 = (self.right() + padding).min(width);
        let y1 = (self.bottom() + padding).min(height);
        if x1 <= x0 || y1 <= y0 {
            return None;
        }
        Some(BoundingBox::new(x0, y0, x1 - x0, y1 - y0))
    }
}

pub fn euclidean_distance(a: (f64, f64), b: (f64, f64)) -> f64 {
    ((a.0 - b.0).powi(2) + (a.1 - b.1).powi(2)).sqrt()
}

/// Signed area of a closed polygon (shoelace)
fn signed_area(points: &[Point<i32>]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }
    let mut sum = 0.0;
    for (i, p) in points.iter().enumerate() {
        let q = &points[(i + 1) % points.len()];
        sum += p.x as f64 * q.y as f64 - q.x as f64 * p.y as f64;
    }
    sum / 2.0
}

pub fn polygon_area(points: &[Point<i32>]) -> f64 {
    signed_area(points).abs()
}

/// Area centroid of a closed polygon, `None` for degenerate polygons
pub fn polygon_centroid(points: &[Point<i32>]) -> Option<(f64, f64)> {
    let area = signed_area(points);
    if area == 0.0 {
        return None;
    }
    let (mut cx, mut cy) = (0.0, 0.0);
    for (i, p) in points.iter().enumerate() {
        let q = &points[(i + 1) % points.len()];
        let cross = p.x as f64 * q.y as f64 - q.x as f64 * p.y as f64;
        cx += (p.x as f64 + q.x as f64) * cross;
        cy += (p.y as f64 + q.y as f64) * cross;
    }
    Some((cx / (6.0 * area), cy / (6.0 * area)))
}

/// Orders four corners as top-left, top-right, bottom-right, bottom-left.
///
/// The smallest coordinate sum is top-left and the largest bottom-right;
/// the smallest `y - x` is top-right and the largest bottom-left.
pub fn order_points(points: &[(f32, f32); 4]) -> [(f32, f32); 4] {
    let sum = |p: &(f32, f32)| p.0 + p.1;
    let diff = |p: &(f32, f32)| p.1 - p.0;

    let pick = |key: &dyn Fn(&(f32, f32)) -> f32, want_max: bool| {
        let mut best = 0;
        for i in 1..4 {
            let better = if want_max {
                key(&points[i]) > key(&points[best])
            } else {
                key(&points[i]) < key(&points[best])
            };
            if better {
                best = i;
            }
        }
        points[best]
    };

    [
        pick(&sum, false),
        pick(&diff, false),
        pick(&sum, true),
        pick(&diff, true),
    ]
}

/// Quarter-turn rotations, clockwise
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(into = "u32")]
pub enum Rotation {
    #[default]
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl Rotation {
    pub const ALL: [Rotation; 4] = [Rotation::Deg0, Rotation::Deg90, Rotation::Deg180, Rotation::Deg270];

    pub fn degrees(self) -> u32 {
        match self {
            Rotation::Deg0 => 0,
            Rotation::Deg90 => 90,
            Rotation::Deg180 => 180,
            Rotation::Deg270 => 270,
        }
    }

    pub fn from_degrees(degrees: u32) -> Option<Self> {
        match degrees % 360 {
            0 => Some(Rotation::Deg0),
            90 => Some(Rotation::Deg90),
            180 => Some(Rotation::Deg180),
            270 => Some(Rotation::Deg270),
            _ => None,
        }
    }

    /// Rotation equivalent to applying `self` then `other`
    pub fn then(self, other: Rotation) -> Rotation {
        match (self.degrees() + other.degrees()) % 360 {
            90 => Rotation::Deg90,
            180 => Rotation::Deg180,
            270 => Rotation::Deg270,
            _ => Rotation::Deg0,
        }
    }

    pub fn apply(self, image: &RgbImage) -> RgbImage {
        match self {
            Rotation::Deg0 => image.clone(),
            Rotation::Deg90 => imageops::rotate90(image),
            Rotation::Deg180 => imageops::rotate180(image),
            Rotation::Deg270 => imageops::rotate270(image),
        }
    }
}

impl From<Rotation> for u32 {
    fn from(rotation: Rotation) -> u32 {
        rotation.degrees()
    }
}

/// Repeatedly replaces any two contours whose bounding boxes overlap by more
/// than `threshold` IoU with the convex hull of both, until no pair qualifies.
pub fn merge_overlapping_contours(mut contours: Vec<Vec<Point<i32>>>, threshold: f64) -> Vec<Vec<Point<i32>>> {
    loop {
        if contours.len() < 2 {
            return contours;
        }
        let boxes: Vec<Option<BoundingBox>> = contours.iter().map(|c| BoundingBox::from_points(c)).collect();
        let mut pair = None;
        'search: for i in 0..contours.len() {
            for j in (i + 1)..contours.len() {
                if let (Some(a), Some(b)) = (&boxes[i], &boxes[j]) {
                    if a.iou(b) > threshold {
                        pair = Some((i, j));
                        break 'search;
                    }
                }
            }
        }

        let Some((i, j)) = pair else {
            return contours;
        };
        let second = contours.remove(j);
        let mut first = contours.remove(i);
        first.extend(second);
        contours.push(convex_hull(first.as_slice()));
    }
}

/// Sorts items top-to-bottom, then left-to-right, by bounding-box origin
pub fn sort_top_to_bottom<T, F>(items: &mut [T], bbox: F)
where
    F: Fn(&T) -> BoundingBox,
{
    items.sort_by_key(|item| {
        let b = bbox(item);
        (b.y, b.x)
    });
}
