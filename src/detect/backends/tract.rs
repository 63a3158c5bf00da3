#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::imageops::FilterType;
use tract_onnx::prelude::*;

use crate::detect::backend::{DetectionEngine, InferenceDevice};
use crate::detect::backends::yolo::{decode_yolov8, Letterbox, YoloParams};
use crate::detect::labels::ClassNames;
use crate::detect::result::Detection;
use crate::frame::Frame;

/// Tract-based backend for YOLOv8 ONNX exports.
///
/// Loads a local model file and runs it on the CPU. Input frames are
/// letterboxed to the square model input; boxes are mapped back to frame
/// pixels before they are returned.
pub struct TractBackend {
    model: SimplePlan<TypedFact, Box<dyn TypedOp>>,
    names: ClassNames,
    params: YoloParams,
}

impl TractBackend {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn new<P: AsRef<Path>>(
        model_path: P,
        names: ClassNames,
        params: YoloParams,
        device: InferenceDevice,
    ) -> Result<Self> {
        let model_path = model_path.as_ref();
        let size = params.input_size as usize;
        if device != InferenceDevice::Cpu {
            log::debug!("tract backend only executes on the CPU");
        }
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(f32::datum_type(), tvec!(1, 3, size, size)),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        Ok(Self {
            model,
            names,
            params,
        })
    }

    fn build_input(&self, frame: &Frame) -> Result<(Tensor, Letterbox)> {
        let size = self.params.input_size;
        let letterbox = Letterbox::fit(frame.width, frame.height, size);
        let image = frame.to_image()?;
        let resized = image::imageops::resize(
            &image,
            letterbox.scaled_width,
            letterbox.scaled_height,
            FilterType::Triangle,
        );

        let size = size as usize;
        let pad_x = letterbox.pad_x as usize;
        let pad_y = letterbox.pad_y as usize;
        let (rw, rh) = (resized.width() as usize, resized.height() as usize);
        let input = tract_ndarray::Array4::from_shape_fn((1, 3, size, size), |(_, c, y, x)| {
            if x < pad_x || y < pad_y || x >= pad_x + rw || y >= pad_y + rh {
                return 114.0 / 255.0;
            }
            let px = resized.get_pixel((x - pad_x) as u32, (y - pad_y) as u32);
            px.0[c] as f32 / 255.0
        });

        Ok((input.into_tensor(), letterbox))
    }
}

impl DetectionEngine for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn vocabulary(&self) -> &ClassNames {
        &self.names
    }

    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
        let (input, letterbox) = self.build_input(frame)?;
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let view = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?;
        let shape = view.shape().to_vec();
        if shape.len() != 3 || shape[0] != 1 {
            return Err(anyhow!("unexpected YOLO output shape {:?}", shape));
        }
        let values: Vec<f32> = view.iter().copied().collect();
        decode_yolov8(
            &values,
            shape[1],
            shape[2],
            &letterbox,
            &self.params,
            &self.names,
            (frame.width, frame.height),
        )
    }

    fn warm_up(&mut self) -> Result<()> {
        let size = self.params.input_size;
        let blank = Frame::solid(size, size, [114, 114, 114], 0);
        self.detect(&blank).map(|_| ())
    }
}
