pub mod stub;
pub mod yolo;

#[cfg(feature = "backend-tract")]
pub mod tract;

pub use stub::ScriptedBackend;
pub use yolo::{decode_yolov8, non_max_suppression, Letterbox, YoloParams};

#[cfg(feature = "backend-tract")]
pub use tract::TractBackend;
