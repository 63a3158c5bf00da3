mod backend;
pub mod backends;
mod labels;
mod result;

use anyhow::{anyhow, Result};

pub use backend::{DetectionEngine, InferenceDevice};
pub use backends::{Letterbox, ScriptedBackend, YoloParams};
pub use labels::{AllowList, ClassNames, COCO_CLASSES};
pub use result::{BoundingBox, Detection};

use crate::config::ModelSettings;

/// Open the detection engine named by the model settings.
pub fn open_engine(settings: &ModelSettings) -> Result<Box<dyn DetectionEngine>> {
    let names = match &settings.names_path {
        Some(path) => ClassNames::load(path)?,
        None => ClassNames::coco(),
    };
    let params = YoloParams {
        input_size: settings.input_size,
        confidence_threshold: settings.confidence,
        iou_threshold: settings.iou,
        max_detections: settings.max_detections,
    };

    match settings.backend.as_str() {
        "stub" => {
            log::warn!("using stub detection backend; no model will be loaded");
            Ok(Box::new(
                ScriptedBackend::new(names).with_threshold(params.confidence_threshold),
            ))
        }
        "tract" => open_tract(settings, names, params),
        other => Err(anyhow!(
            "unknown detection backend '{}'; expected tract or stub",
            other
        )),
    }
}

#[cfg(feature = "backend-tract")]
fn open_tract(
    settings: &ModelSettings,
    names: ClassNames,
    params: YoloParams,
) -> Result<Box<dyn DetectionEngine>> {
    if !settings.path.exists() {
        return Err(anyhow!("model file {} not found", settings.path.display()));
    }
    let backend = backends::TractBackend::new(&settings.path, names, params, settings.device)?;
    Ok(Box::new(backend))
}

#[cfg(not(feature = "backend-tract"))]
fn open_tract(
    _settings: &ModelSettings,
    _names: ClassNames,
    _params: YoloParams,
) -> Result<Box<dyn DetectionEngine>> {
    Err(anyhow!(
        "the tract backend requires the backend-tract feature"
    ))
}
