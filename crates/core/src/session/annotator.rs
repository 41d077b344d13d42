use crate::shared::detection::Detection;
use crate::shared::frame::Frame;

use super::sinks::{AnnotatedFrame, Overlay};

pub const KNOWN_COLOR: [u8; 3] = [0, 255, 0];
pub const UNKNOWN_COLOR: [u8; 3] = [255, 0, 0];
pub const OUTLINE_THICKNESS: i64 = 2;

pub fn color_for(detection: &Detection) -> [u8; 3] {
    if detection.is_unknown() {
        UNKNOWN_COLOR
    } else {
        KNOWN_COLOR
    }
}

/// Draws every detection's outline into the frame and attaches its caption.
///
/// Boxes partly outside the frame are clipped while drawing.
pub fn annotate(mut frame: Frame, detections: &[Detection]) -> AnnotatedFrame {
    let overlays = detections
        .iter()
        .map(|d| {
            let color = color_for(d);
            draw_outline(&mut frame, d, color);
            Overlay {
                bbox: d.bbox,
                caption: d.caption(),
                color,
            }
        })
        .collect();
    AnnotatedFrame { frame, overlays }
}

fn draw_outline(frame: &mut Frame, detection: &Detection, color: [u8; 3]) {
    let (w, h) = (frame.width() as i64, frame.height() as i64);
    // Edges beyond the frame only need to stay beyond it once offset by
    // the outline thickness.
    let (x1, y1, x2, y2) = detection.bbox.to_pixels();
    let clamp_x = |v: i64| v.clamp(-OUTLINE_THICKNESS, w + OUTLINE_THICKNESS);
    let clamp_y = |v: i64| v.clamp(-OUTLINE_THICKNESS, h + OUTLINE_THICKNESS);
    let (x1, x2) = (clamp_x(x1), clamp_x(x2));
    let (y1, y2) = (clamp_y(y1), clamp_y(y2));
    for t in 0..OUTLINE_THICKNESS {
        for x in x1.max(0)..=x2.min(w - 1) {
            frame.put_pixel(x, y1 + t, color);
            frame.put_pixel(x, y2 - t, color);
        }
        for y in y1.max(0)..=y2.min(h - 1) {
            frame.put_pixel(x1 + t, y, color);
            frame.put_pixel(x2 - t, y, color);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::detection::{BoundingBox, UNKNOWN_LABEL};

    fn blank(w: u32, h: u32) -> Frame {
        Frame::new(vec![0; (w * h * 3) as usize], w, h, 0)
    }

    fn pixel(frame: &Frame, x: usize, y: usize) -> [u8; 3] {
        let i = (y * frame.width() as usize + x) * 3;
        [frame.data()[i], frame.data()[i + 1], frame.data()[i + 2]]
    }

    #[test]
    fn test_known_box_is_green_with_caption() {
        let d = Detection::new(BoundingBox::new(2.0, 2.0, 10.0, 10.0), 0.9, "alice");
        let out = annotate(blank(20, 20), &[d]);
        assert_eq!(pixel(&out.frame, 2, 2), KNOWN_COLOR);
        assert_eq!(pixel(&out.frame, 3, 6), KNOWN_COLOR);
        assert_eq!(pixel(&out.frame, 10, 10), KNOWN_COLOR);
        assert_eq!(out.overlays[0].caption, "alice 0.90");
        assert_eq!(out.overlays[0].color, KNOWN_COLOR);
    }

    #[test]
    fn test_unknown_box_is_red() {
        let d = Detection::new(BoundingBox::new(2.0, 2.0, 10.0, 10.0), 0.2, UNKNOWN_LABEL);
        let out = annotate(blank(20, 20), &[d]);
        assert_eq!(pixel(&out.frame, 2, 2), UNKNOWN_COLOR);
        assert_eq!(out.overlays[0].caption, "Unknown");
    }

    #[test]
    fn test_outline_leaves_interior_untouched() {
        let d = Detection::new(BoundingBox::new(2.0, 2.0, 10.0, 10.0), 0.9, "alice");
        let out = annotate(blank(20, 20), &[d]);
        assert_eq!(pixel(&out.frame, 6, 6), [0, 0, 0]);
        assert_eq!(pixel(&out.frame, 4, 4), [0, 0, 0]);
    }

    #[test]
    fn test_box_past_frame_edge_is_clipped() {
        let d = Detection::new(BoundingBox::new(-5.0, -5.0, 50.0, 50.0), 0.9, "alice");
        let out = annotate(blank(8, 8), &[d]);
        assert_eq!(out.frame.data().len(), 8 * 8 * 3);
        assert_eq!(out.overlays.len(), 1);
    }

    #[test]
    fn test_extreme_finite_box_does_not_overflow() {
        let far = Detection::new(
            BoundingBox::new(-1e300, -1e300, -1e299, -1e299),
            0.9,
            "alice",
        );
        let huge = Detection::new(BoundingBox::new(1e299, 1e299, 1e300, 1e300), 0.9, "bob");
        assert!(far.is_valid() && huge.is_valid());

        let out = annotate(blank(8, 8), &[far, huge]);
        assert_eq!(out.overlays.len(), 2);
        assert!(out.frame.data().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_clipped_edge_still_draws_inside_frame() {
        let d = Detection::new(BoundingBox::new(-1e12, 1.0, 4.0, 5.0), 0.9, "alice");
        let out = annotate(blank(8, 8), &[d]);
        assert_eq!(pixel(&out.frame, 0, 1), KNOWN_COLOR);
        assert_eq!(pixel(&out.frame, 4, 3), KNOWN_COLOR);
        assert_eq!(pixel(&out.frame, 0, 3), [0, 0, 0]);
    }

    #[test]
    fn test_no_detections_leaves_frame_unchanged() {
        let out = annotate(blank(4, 4), &[]);
        assert!(out.overlays.is_empty());
        assert!(out.frame.data().iter().all(|&b| b == 0));
    }
}
