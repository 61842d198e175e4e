use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A normalized rectangle (0.0 to 1.0) relative to the source image.
///
/// Zero width or height is allowed: providers occasionally emit degenerate
/// boxes and every geometry routine treats them as zero-area regions.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct BoundingBox {
    /// X coordinate of the top-left corner (0.0 = left, 1.0 = right)
    pub x: f64,
    /// Y coordinate of the top-left corner (0.0 = top, 1.0 = bottom)
    pub y: f64,
    /// Width of the rectangle (0.0 to 1.0)
    pub width: f64,
    /// Height of the rectangle (0.0 to 1.0)
    pub height: f64,
}

impl BoundingBox {
    /// Create a new normalized rectangle.
    ///
    /// Negative extents are clamped to zero.
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width: width.max(0.0),
            height: height.max(0.0),
        }
    }

    /// Rectangle covering the whole image.
    pub fn full_frame() -> Self {
        Self::new(0.0, 0.0, 1.0, 1.0)
    }

    /// Right edge x-coordinate.
    #[inline]
    pub fn x2(&self) -> f64 {
        self.x + self.width
    }

    /// Bottom edge y-coordinate.
    #[inline]
    pub fn y2(&self) -> f64 {
        self.y + self.height
    }

    /// True when the box has no area.
    pub fn is_degenerate(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }

    /// True when every coordinate is a finite number.
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.width.is_finite() && self.height.is_finite()
    }

    /// Check if the rectangle lies within the unit square.
    pub fn is_normalized(&self) -> bool {
        self.x >= 0.0
            && self.y >= 0.0
            && self.width >= 0.0
            && self.height >= 0.0
            && self.x2() <= 1.001 // Allow small epsilon for float precision
            && self.y2() <= 1.001
    }
}

/// A point in normalized image coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_negative_extent_clamped() {
        let b = BoundingBox::new(0.2, 0.2, -0.1, 0.3);
        assert_eq!(b.width, 0.0);
        assert!(b.is_degenerate());
    }

    #[test]
    fn test_is_normalized() {
        assert!(BoundingBox::new(0.1, 0.1, 0.5, 0.5).is_normalized());
        assert!(BoundingBox::full_frame().is_normalized());
        assert!(!BoundingBox::new(0.8, 0.1, 0.5, 0.5).is_normalized());
    }

    #[test]
    fn test_is_finite() {
        assert!(BoundingBox::new(0.1, 0.1, 0.5, 0.5).is_finite());
        assert!(!BoundingBox::new(f64::NAN, 0.1, 0.5, 0.5).is_finite());
    }
}
