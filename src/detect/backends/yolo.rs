//! YOLOv8 output decoding shared by inference backends.

use anyhow::{anyhow, Result};

use crate::detect::labels::ClassNames;
use crate::detect::result::{BoundingBox, Detection};

/// Post-processing parameters.
#[derive(Clone, Debug)]
pub struct YoloParams {
    /// Square model input size (640 for stock exports).
    pub input_size: u32,
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
    pub max_detections: usize,
}

impl Default for YoloParams {
    fn default() -> Self {
        Self {
            input_size: 640,
            confidence_threshold: 0.25,
            iou_threshold: 0.45,
            max_detections: 300,
        }
    }
}

/// Aspect-preserving resize into a square input with centred padding.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Letterbox {
    pub scale: f32,
    pub scaled_width: u32,
    pub scaled_height: u32,
    pub pad_x: u32,
    pub pad_y: u32,
}

impl Letterbox {
    pub fn fit(width: u32, height: u32, size: u32) -> Self {
        let scale = (size as f32 / width.max(1) as f32).min(size as f32 / height.max(1) as f32);
        let scaled_width = ((width as f32 * scale).round() as u32).clamp(1, size);
        let scaled_height = ((height as f32 * scale).round() as u32).clamp(1, size);
        Self {
            scale,
            scaled_width,
            scaled_height,
            pad_x: (size - scaled_width) / 2,
            pad_y: (size - scaled_height) / 2,
        }
    }

    /// Map a model-space coordinate back to frame pixels.
    fn unmap(&self, x: f32, y: f32) -> (f32, f32) {
        (
            (x - self.pad_x as f32) / self.scale,
            (y - self.pad_y as f32) / self.scale,
        )
    }
}

/// Decode a raw YOLOv8 head into frame-space detections.
///
/// `values` holds a `rows x cols` matrix. Stock exports emit
/// `(4 + classes) x anchors`; a transposed `anchors x (4 + classes)` layout is
/// recognised by matching the vocabulary size against the shape.
pub fn decode_yolov8(
    values: &[f32],
    rows: usize,
    cols: usize,
    letterbox: &Letterbox,
    params: &YoloParams,
    names: &ClassNames,
    frame_size: (u32, u32),
) -> Result<Vec<Detection>> {
    if values.len() != rows * cols {
        return Err(anyhow!(
            "YOLO output holds {} values, expected {}x{}",
            values.len(),
            rows,
            cols
        ));
    }
    let feature_count = names.len() + 4;
    let transposed = if rows == feature_count {
        false
    } else if cols == feature_count {
        true
    } else {
        rows > cols
    };
    let (features, anchors) = if transposed { (cols, rows) } else { (rows, cols) };
    if features < 5 {
        return Err(anyhow!("YOLO output has {} features per anchor", features));
    }
    let at = |feature: usize, anchor: usize| {
        if transposed {
            values[anchor * features + feature]
        } else {
            values[feature * anchors + anchor]
        }
    };

    let (frame_w, frame_h) = (frame_size.0 as f32, frame_size.1 as f32);
    let mut candidates = Vec::new();
    for anchor in 0..anchors {
        let mut best_class = 0usize;
        let mut best_score = f32::NEG_INFINITY;
        for class in 0..features - 4 {
            let score = at(4 + class, anchor);
            if score > best_score {
                best_score = score;
                best_class = class;
            }
        }
        if !best_score.is_finite() || best_score < params.confidence_threshold {
            continue;
        }

        let (cx, cy, w, h) = (at(0, anchor), at(1, anchor), at(2, anchor), at(3, anchor));
        let (x1, y1) = letterbox.unmap(cx - w / 2.0, cy - h / 2.0);
        let (x2, y2) = letterbox.unmap(cx + w / 2.0, cy + h / 2.0);
        let bbox = BoundingBox::new(
            x1.clamp(0.0, frame_w),
            y1.clamp(0.0, frame_h),
            x2.clamp(0.0, frame_w),
            y2.clamp(0.0, frame_h),
        );
        candidates.push(Detection::new(
            best_class,
            names.label(best_class),
            best_score.min(1.0),
            bbox,
        ));
    }

    Ok(non_max_suppression(
        candidates,
        params.iou_threshold,
        params.max_detections,
    ))
}

/// Greedy per-class non-maximum suppression, highest confidence first.
pub fn non_max_suppression(
    mut candidates: Vec<Detection>,
    iou_threshold: f32,
    max_detections: usize,
) -> Vec<Detection> {
    candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    let mut kept: Vec<Detection> = Vec::new();
    for candidate in candidates {
        if kept.len() >= max_detections {
            break;
        }
        let suppressed = kept.iter().any(|k| {
            k.class_id == candidate.class_id && k.bbox.iou(&candidate.bbox) > iou_threshold
        });
        if !suppressed {
            kept.push(candidate);
        }
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names() -> ClassNames {
        ClassNames::new(vec!["apple".into(), "pear".into()])
    }

    #[test]
    fn letterbox_pads_short_side() {
        let lb = Letterbox::fit(640, 480, 640);
        assert_eq!(lb.scale, 1.0);
        assert_eq!((lb.scaled_width, lb.scaled_height), (640, 480));
        assert_eq!((lb.pad_x, lb.pad_y), (0, 80));
    }

    #[test]
    fn decodes_column_major_head() -> Result<()> {
        // 6 features (4 box + 2 classes) x 2 anchors.
        let values = vec![
            100.0, 300.0, // cx
            180.0, 300.0, // cy (model space, 80px pad)
            20.0, 10.0, // w
            40.0, 10.0, // h
            0.9, 0.1, // apple
            0.05, 0.2, // pear
        ];
        let lb = Letterbox::fit(640, 480, 640);
        let params = YoloParams {
            confidence_threshold: 0.5,
            ..YoloParams::default()
        };
        let dets = decode_yolov8(&values, 6, 2, &lb, &params, &names(), (640, 480))?;
        assert_eq!(dets.len(), 1);
        assert_eq!(dets[0].label, "apple");
        assert_eq!(dets[0].bbox, BoundingBox::new(90.0, 80.0, 110.0, 120.0));
        Ok(())
    }

    #[test]
    fn nms_keeps_best_per_class() {
        let a = Detection::new(0, "apple", 0.9, BoundingBox::new(0.0, 0.0, 10.0, 10.0));
        let b = Detection::new(0, "apple", 0.7, BoundingBox::new(1.0, 1.0, 10.0, 10.0));
        let c = Detection::new(1, "pear", 0.6, BoundingBox::new(1.0, 1.0, 10.0, 10.0));
        let kept = non_max_suppression(vec![b, c.clone(), a.clone()], 0.45, 300);
        assert_eq!(kept, vec![a, c]);
    }

    #[test]
    fn rejects_size_mismatch() {
        let lb = Letterbox::fit(10, 10, 10);
        let err = decode_yolov8(&[0.0; 5], 6, 2, &lb, &YoloParams::default(), &names(), (10, 10))
            .unwrap_err();
        assert!(err.to_string().contains("expected 6x2"));
    }
}
