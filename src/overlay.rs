//! Boxes and markers drawn onto preview frames.

use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_hollow_rect_mut};
use imageproc::rect::Rect;

use crate::detect::{BoundingBox, Detection};

pub const BOX_COLOR: [u8; 3] = [0, 255, 0];
pub const CENTER_COLOR: [u8; 3] = [255, 0, 0];

/// One annotation for the current frame.
#[derive(Clone, Debug, PartialEq)]
pub struct Overlay {
    pub bbox: BoundingBox,
    pub color: [u8; 3],
    pub label: String,
    pub confidence: f32,
    /// Draw a filled dot at the box centre.
    pub mark_center: bool,
}

impl Overlay {
    pub fn for_detection(det: &Detection, color: [u8; 3]) -> Self {
        Self {
            bbox: det.bbox,
            color,
            label: det.label.clone(),
            confidence: det.confidence,
            mark_center: false,
        }
    }

    pub fn with_center(mut self) -> Self {
        self.mark_center = true;
        self
    }

    /// Caption with the confidence only.
    pub fn without_label(mut self) -> Self {
        self.label.clear();
        self
    }

    /// Caption shown next to the box, e.g. `apple 0.83`.
    pub fn caption(&self) -> String {
        if self.label.is_empty() {
            format!("{:.2}", self.confidence)
        } else {
            format!("{} {:.2}", self.label, self.confidence)
        }
    }
}

/// Draw overlays in place. Boxes are clamped to the image.
pub fn draw_overlays(image: &mut RgbImage, overlays: &[Overlay]) {
    let (w, h) = image.dimensions();
    if w == 0 || h == 0 {
        return;
    }
    for overlay in overlays {
        let color = Rgb(overlay.color);
        // Two strokes for a 2px outline.
        for inset in 0..2 {
            if let Some(rect) = rect_from_bbox(&overlay.bbox, w, h, inset) {
                draw_hollow_rect_mut(image, rect, color);
            }
        }
        if overlay.mark_center {
            let (cx, cy) = overlay.bbox.center();
            let cx = cx.clamp(0, w as i32 - 1);
            let cy = cy.clamp(0, h as i32 - 1);
            draw_filled_circle_mut(image, (cx, cy), 4, Rgb(CENTER_COLOR));
        }
    }
}

fn rect_from_bbox(bbox: &BoundingBox, w: u32, h: u32, inset: i32) -> Option<Rect> {
    let max_x = (w - 1) as f32;
    let max_y = (h - 1) as f32;
    let x1 = bbox.x1.clamp(0.0, max_x).round() as i32 + inset;
    let y1 = bbox.y1.clamp(0.0, max_y).round() as i32 + inset;
    let x2 = bbox.x2.clamp(0.0, max_x).round() as i32 - inset;
    let y2 = bbox.y2.clamp(0.0, max_y).round() as i32 - inset;
    if x2 <= x1 || y2 <= y1 {
        return None;
    }
    Some(Rect::at(x1, y1).of_size((x2 - x1) as u32, (y2 - y1) as u32))
}
