/// Label given to any detection the detector is not confident about.
pub const UNKNOWN_LABEL: &str = "Unknown";

/// Axis-aligned box in frame pixel coordinates, `(x1, y1)` top-left and
/// `(x2, y2)` bottom-right.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

impl BoundingBox {
    pub fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Finite coordinates with `x1 < x2` and `y1 < y2`.
    pub fn is_well_formed(&self) -> bool {
        [self.x1, self.y1, self.x2, self.y2]
            .iter()
            .all(|v| v.is_finite())
            && self.x1 < self.x2
            && self.y1 < self.y2
    }

    pub fn width(&self) -> f64 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f64 {
        self.y2 - self.y1
    }

    pub fn area(&self) -> f64 {
        self.width().max(0.0) * self.height().max(0.0)
    }

    pub fn iou(&self, other: &BoundingBox) -> f64 {
        let ix1 = self.x1.max(other.x1);
        let iy1 = self.y1.max(other.y1);
        let ix2 = self.x2.min(other.x2);
        let iy2 = self.y2.min(other.y2);

        let inter = (ix2 - ix1).max(0.0) * (iy2 - iy1).max(0.0);
        if inter == 0.0 {
            return 0.0;
        }
        inter / (self.area() + other.area() - inter)
    }

    /// Integer pixel corners, truncated the way the box is drawn.
    pub fn to_pixels(&self) -> (i64, i64, i64, i64) {
        (
            self.x1 as i64,
            self.y1 as i64,
            self.x2 as i64,
            self.y2 as i64,
        )
    }
}

/// One detector output for one frame. Never persisted as-is.
#[derive(Clone, Debug, PartialEq)]
pub struct Detection {
    pub bbox: BoundingBox,
    pub confidence: f64,
    pub label: String,
}

impl Detection {
    pub fn new(bbox: BoundingBox, confidence: f64, label: impl Into<String>) -> Self {
        Self {
            bbox,
            confidence,
            label: label.into(),
        }
    }

    pub fn is_unknown(&self) -> bool {
        self.label == UNKNOWN_LABEL
    }

    /// Geometry and confidence a renderer or log can rely on.
    pub fn is_valid(&self) -> bool {
        self.bbox.is_well_formed() && self.confidence.is_finite()
    }

    /// Caption drawn next to the box.
    pub fn caption(&self) -> String {
        if self.is_unknown() {
            UNKNOWN_LABEL.to_string()
        } else {
            format!("{} {:.2}", self.label, self.confidence)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rstest::rstest;

    fn bbox(x1: f64, y1: f64, x2: f64, y2: f64) -> BoundingBox {
        BoundingBox::new(x1, y1, x2, y2)
    }

    #[test]
    fn test_iou_identical_boxes() {
        let a = bbox(10.0, 10.0, 110.0, 110.0);
        assert_relative_eq!(a.iou(&a), 1.0);
    }

    #[test]
    fn test_iou_partial_overlap() {
        // intersection 50x100 = 5000, union 15000
        let a = bbox(0.0, 0.0, 100.0, 100.0);
        let b = bbox(50.0, 0.0, 150.0, 100.0);
        assert_relative_eq!(a.iou(&b), 5000.0 / 15000.0);
    }

    #[test]
    fn test_iou_touching_edges() {
        let a = bbox(0.0, 0.0, 50.0, 50.0);
        let b = bbox(50.0, 0.0, 100.0, 50.0);
        assert_relative_eq!(a.iou(&b), 0.0);
    }

    #[rstest]
    #[case::ordinary(bbox(0.0, 0.0, 10.0, 10.0), true)]
    #[case::zero_width(bbox(5.0, 0.0, 5.0, 10.0), false)]
    #[case::inverted(bbox(10.0, 10.0, 0.0, 0.0), false)]
    #[case::nan(bbox(f64::NAN, 0.0, 10.0, 10.0), false)]
    #[case::infinite(bbox(0.0, 0.0, f64::INFINITY, 10.0), false)]
    fn test_is_well_formed(#[case] b: BoundingBox, #[case] expected: bool) {
        assert_eq!(b.is_well_formed(), expected);
    }

    #[test]
    fn test_detection_rejects_non_finite_confidence() {
        let d = Detection::new(bbox(0.0, 0.0, 1.0, 1.0), f64::NAN, "alice");
        assert!(!d.is_valid());
    }

    #[test]
    fn test_caption_for_known_label_includes_confidence() {
        let d = Detection::new(bbox(0.0, 0.0, 1.0, 1.0), 0.876, "alice");
        assert_eq!(d.caption(), "alice 0.88");
    }

    #[test]
    fn test_caption_for_unknown_omits_confidence() {
        let d = Detection::new(bbox(0.0, 0.0, 1.0, 1.0), 0.3, UNKNOWN_LABEL);
        assert!(d.is_unknown());
        assert_eq!(d.caption(), "Unknown");
    }

    #[test]
    fn test_to_pixels_truncates() {
        assert_eq!(bbox(1.9, 2.2, 30.7, 40.0).to_pixels(), (1, 2, 30, 40));
    }
}
