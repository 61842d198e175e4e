//! Geometry kernel over normalized bounding boxes.
//!
//! Pure functions, no coordinate transforms. A missing intersection and a
//! zero-area intersection mean the same thing to every caller.

use serde::{Deserialize, Serialize};
use stash_models::{BoundingBox, Point};

/// Pairwise overlap measurements.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverlapMetrics {
    pub intersection_area: f64,
    pub union_area: f64,
    /// Shared area as a fraction (0.0-1.0) of the combined area.
    pub overlap_percentage: f64,
    pub iou: f64,
}

/// Box area; degenerate boxes have zero area.
#[inline]
pub fn area(bbox: &BoundingBox) -> f64 {
    bbox.width.max(0.0) * bbox.height.max(0.0)
}

/// Box center.
#[inline]
pub fn center(bbox: &BoundingBox) -> Point {
    Point::new(bbox.x + bbox.width / 2.0, bbox.y + bbox.height / 2.0)
}

/// Euclidean distance between two points.
#[inline]
pub fn distance(p: &Point, q: &Point) -> f64 {
    (p.x - q.x).hypot(p.y - q.y)
}

/// Intersection rectangle, or `None` when the boxes do not overlap.
///
/// Boxes that only touch along an edge do not overlap.
pub fn intersection(a: &BoundingBox, b: &BoundingBox) -> Option<BoundingBox> {
    let x1 = a.x.max(b.x);
    let y1 = a.y.max(b.y);
    let x2 = a.x2().min(b.x2());
    let y2 = a.y2().min(b.y2());

    if x2 <= x1 || y2 <= y1 {
        return None;
    }

    Some(BoundingBox::new(x1, y1, x2 - x1, y2 - y1))
}

/// Area of the intersection, zero when there is none.
#[inline]
pub fn intersection_area(a: &BoundingBox, b: &BoundingBox) -> f64 {
    intersection(a, b).map_or(0.0, |r| area(&r))
}

/// Area covered by either box.
pub fn union_area(a: &BoundingBox, b: &BoundingBox) -> f64 {
    area(a) + area(b) - intersection_area(a, b)
}

/// Intersection over Union; zero when the union is empty.
pub fn iou(a: &BoundingBox, b: &BoundingBox) -> f64 {
    overlap_metrics(a, b).iou
}

/// Full overlap measurements for a pair of boxes. Symmetric in its arguments.
pub fn overlap_metrics(a: &BoundingBox, b: &BoundingBox) -> OverlapMetrics {
    let intersection_area = intersection_area(a, b);
    let union_area = area(a) + area(b) - intersection_area;

    if union_area <= 0.0 || intersection_area <= 0.0 {
        return OverlapMetrics {
            intersection_area,
            union_area: union_area.max(0.0),
            overlap_percentage: 0.0,
            iou: 0.0,
        };
    }

    let iou = intersection_area / union_area;
    OverlapMetrics {
        intersection_area,
        union_area,
        overlap_percentage: iou,
        iou,
    }
}

/// Fraction of `child`'s area that lies inside `parent`.
///
/// This is the single containment definition used across the pipeline
/// (intersection over child area). A zero-area child has ratio 0.
pub fn containment_ratio(parent: &BoundingBox, child: &BoundingBox) -> f64 {
    let child_area = area(child);
    if child_area <= 0.0 {
        return 0.0;
    }
    (intersection_area(parent, child) / child_area).min(1.0)
}

/// True when at least `ratio` of `inner` lies inside `outer`.
pub fn contains(outer: &BoundingBox, inner: &BoundingBox, ratio: f64) -> bool {
    area(inner) > 0.0 && containment_ratio(outer, inner) >= ratio
}

/// Percentile rank (0.0-1.0) of each area among `areas`: the fraction of the
/// other entries that are strictly smaller. A single entry ranks 0.
pub fn area_percentile_ranks(areas: &[f64]) -> Vec<f64> {
    let n = areas.len();
    if n <= 1 {
        return vec![0.0; n];
    }
    areas
        .iter()
        .map(|a| {
            let smaller = areas.iter().filter(|other| *other < a).count();
            smaller as f64 / (n - 1) as f64
        })
        .collect()
}
