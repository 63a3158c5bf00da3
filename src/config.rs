use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::detect::InferenceDevice;

const DEFAULT_CAMERA_SOURCE: &str = "0";
const DEFAULT_CAMERA_WIDTH: u32 = 640;
const DEFAULT_CAMERA_HEIGHT: u32 = 480;
const DEFAULT_CAMERA_FPS: u32 = 30;
const DEFAULT_MODEL_BACKEND: &str = "tract";
const DEFAULT_INPUT_SIZE: u32 = 640;
const DEFAULT_IOU: f32 = 0.45;
const DEFAULT_MAX_DETECTIONS: usize = 300;
const DEFAULT_ITEM_DATA_PATH: &str = "item_data.json";
const DEFAULT_DATASET_PATH: &str = "yolo.yaml";
const DEFAULT_PRESSURE: f64 = 50.0;
const DEFAULT_PLC_ADDR: &str = "192.168.1.20";
const DEFAULT_PLC_PORT: u16 = 44818;
const DEFAULT_PLC_PULSE_MS: u64 = 500;
const DEFAULT_INDEX_TAG: &str = "Vision_Item_Index";
const DEFAULT_PRESSURE_TAG: &str = "Vision_Pressure";
const DEFAULT_NEW_DATA_TAG: &str = "Vision_NewData";
const DEFAULT_MODBUS_ADDR: &str = "127.0.0.7";
const DEFAULT_MODBUS_PORT: u16 = 502;
const DEFAULT_MODBUS_UNIT: u8 = 1;
const DEFAULT_MODBUS_COIL: u16 = 1;
const DEFAULT_NET_TIMEOUT_MS: u64 = 3_000;
const DEFAULT_UDP_TARGET: &str = "192.168.1.10:5000";

/// Which relay a configuration is loaded for. Each profile keeps its own
/// model, threshold and sending defaults.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Profile {
    Items,
    Presence,
    Broadcast,
}

impl Profile {
    fn model_path(self) -> &'static str {
        match self {
            Profile::Items | Profile::Presence => "yolov8s.onnx",
            Profile::Broadcast => "yolov8n.onnx",
        }
    }

    fn confidence(self) -> f32 {
        match self {
            Profile::Items | Profile::Presence => 0.6,
            Profile::Broadcast => 0.25,
        }
    }

    fn device(self) -> InferenceDevice {
        match self {
            Profile::Presence => InferenceDevice::Cpu,
            Profile::Items | Profile::Broadcast => InferenceDevice::Auto,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct RelayConfigFile {
    camera: Option<CameraConfigFile>,
    model: Option<ModelConfigFile>,
    items: Option<ItemsConfigFile>,
    plc: Option<PlcConfigFile>,
    modbus: Option<ModbusConfigFile>,
    udp: Option<UdpConfigFile>,
    preview: Option<PreviewConfigFile>,
    max_frames: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct CameraConfigFile {
    source: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    target_fps: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct ModelConfigFile {
    backend: Option<String>,
    path: Option<PathBuf>,
    names_path: Option<PathBuf>,
    input_size: Option<u32>,
    confidence: Option<f32>,
    iou: Option<f32>,
    max_detections: Option<usize>,
    device: Option<InferenceDevice>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct ItemsConfigFile {
    data_path: Option<PathBuf>,
    dataset_path: Option<PathBuf>,
    default_pressure: Option<f64>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct PlcConfigFile {
    enabled: Option<bool>,
    address: Option<String>,
    port: Option<u16>,
    slot: Option<u8>,
    micro800: Option<bool>,
    timeout_ms: Option<u64>,
    pulse_ms: Option<u64>,
    index_tag: Option<String>,
    pressure_tag: Option<String>,
    new_data_tag: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct ModbusConfigFile {
    enabled: Option<bool>,
    address: Option<String>,
    port: Option<u16>,
    unit_id: Option<u8>,
    coil: Option<u16>,
    timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct UdpConfigFile {
    enabled: Option<bool>,
    target: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct PreviewConfigFile {
    path: Option<PathBuf>,
    every_n_frames: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub profile: Profile,
    pub camera: CameraSettings,
    pub model: ModelSettings,
    pub items: ItemSettings,
    pub plc: PlcSettings,
    pub modbus: ModbusSettings,
    pub udp: UdpSettings,
    pub preview: PreviewSettings,
    /// Stop after this many frames (unbounded when `None`).
    pub max_frames: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct CameraSettings {
    /// `stub://name`, an image directory, `/dev/videoN`, or a bare index.
    pub source: String,
    pub width: u32,
    pub height: u32,
    pub target_fps: u32,
}

#[derive(Debug, Clone)]
pub struct ModelSettings {
    pub backend: String,
    pub path: PathBuf,
    pub names_path: Option<PathBuf>,
    pub input_size: u32,
    pub confidence: f32,
    pub iou: f32,
    pub max_detections: usize,
    pub device: InferenceDevice,
}

#[derive(Debug, Clone)]
pub struct ItemSettings {
    pub data_path: PathBuf,
    pub dataset_path: PathBuf,
    pub default_pressure: f64,
}

#[derive(Debug, Clone)]
pub struct PlcSettings {
    pub enabled: bool,
    pub address: String,
    pub port: u16,
    pub slot: u8,
    /// Micro800 controllers take requests without backplane routing.
    pub micro800: bool,
    pub timeout: Duration,
    /// How long the new-data flag stays raised.
    pub pulse: Duration,
    pub index_tag: String,
    pub pressure_tag: String,
    pub new_data_tag: String,
}

#[derive(Debug, Clone)]
pub struct ModbusSettings {
    pub enabled: bool,
    pub address: String,
    pub port: u16,
    pub unit_id: u8,
    pub coil: u16,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct UdpSettings {
    pub enabled: bool,
    pub target: String,
}

#[derive(Debug, Clone)]
pub struct PreviewSettings {
    /// Annotated snapshot path; headless when `None`.
    pub path: Option<PathBuf>,
    pub every_n_frames: u32,
}

impl RelayConfig {
    /// Load configuration: optional file (explicit path or `RELAY_CONFIG`),
    /// then environment overrides, then validation.
    pub fn load(profile: Profile, path: Option<&Path>) -> Result<Self> {
        let env_path = std::env::var("RELAY_CONFIG")
            .ok()
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from);
        let config_path = path.map(Path::to_path_buf).or(env_path);
        let file_cfg = match config_path.as_deref() {
            Some(path) => Some(read_config_file(path)?),
            None => None,
        };
        let mut cfg = Self::from_file(profile, file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Profile defaults with no file and no environment.
    pub fn defaults(profile: Profile) -> Self {
        Self::from_file(profile, RelayConfigFile::default())
    }

    fn from_file(profile: Profile, file: RelayConfigFile) -> Self {
        let camera = file.camera.unwrap_or_default();
        let model = file.model.unwrap_or_default();
        let items = file.items.unwrap_or_default();
        let plc = file.plc.unwrap_or_default();
        let modbus = file.modbus.unwrap_or_default();
        let udp = file.udp.unwrap_or_default();
        let preview = file.preview.unwrap_or_default();

        Self {
            profile,
            camera: CameraSettings {
                source: camera
                    .source
                    .unwrap_or_else(|| DEFAULT_CAMERA_SOURCE.to_string()),
                width: camera.width.unwrap_or(DEFAULT_CAMERA_WIDTH),
                height: camera.height.unwrap_or(DEFAULT_CAMERA_HEIGHT),
                target_fps: camera.target_fps.unwrap_or(DEFAULT_CAMERA_FPS),
            },
            model: ModelSettings {
                backend: model
                    .backend
                    .unwrap_or_else(|| DEFAULT_MODEL_BACKEND.to_string()),
                path: model
                    .path
                    .unwrap_or_else(|| PathBuf::from(profile.model_path())),
                names_path: model.names_path,
                input_size: model.input_size.unwrap_or(DEFAULT_INPUT_SIZE),
                confidence: model.confidence.unwrap_or_else(|| profile.confidence()),
                iou: model.iou.unwrap_or(DEFAULT_IOU),
                max_detections: model.max_detections.unwrap_or(DEFAULT_MAX_DETECTIONS),
                device: model.device.unwrap_or_else(|| profile.device()),
            },
            items: ItemSettings {
                data_path: items
                    .data_path
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_ITEM_DATA_PATH)),
                dataset_path: items
                    .dataset_path
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_DATASET_PATH)),
                default_pressure: items.default_pressure.unwrap_or(DEFAULT_PRESSURE),
            },
            plc: PlcSettings {
                enabled: plc.enabled.unwrap_or(false),
                address: plc.address.unwrap_or_else(|| DEFAULT_PLC_ADDR.to_string()),
                port: plc.port.unwrap_or(DEFAULT_PLC_PORT),
                slot: plc.slot.unwrap_or(0),
                micro800: plc.micro800.unwrap_or(false),
                timeout: Duration::from_millis(plc.timeout_ms.unwrap_or(DEFAULT_NET_TIMEOUT_MS)),
                pulse: Duration::from_millis(plc.pulse_ms.unwrap_or(DEFAULT_PLC_PULSE_MS)),
                index_tag: plc
                    .index_tag
                    .unwrap_or_else(|| DEFAULT_INDEX_TAG.to_string()),
                pressure_tag: plc
                    .pressure_tag
                    .unwrap_or_else(|| DEFAULT_PRESSURE_TAG.to_string()),
                new_data_tag: plc
                    .new_data_tag
                    .unwrap_or_else(|| DEFAULT_NEW_DATA_TAG.to_string()),
            },
            modbus: ModbusSettings {
                enabled: modbus.enabled.unwrap_or(profile == Profile::Presence),
                address: modbus
                    .address
                    .unwrap_or_else(|| DEFAULT_MODBUS_ADDR.to_string()),
                port: modbus.port.unwrap_or(DEFAULT_MODBUS_PORT),
                unit_id: modbus.unit_id.unwrap_or(DEFAULT_MODBUS_UNIT),
                coil: modbus.coil.unwrap_or(DEFAULT_MODBUS_COIL),
                timeout: Duration::from_millis(
                    modbus.timeout_ms.unwrap_or(DEFAULT_NET_TIMEOUT_MS),
                ),
            },
            udp: UdpSettings {
                enabled: udp.enabled.unwrap_or(false),
                target: udp.target.unwrap_or_else(|| DEFAULT_UDP_TARGET.to_string()),
            },
            preview: PreviewSettings {
                path: preview.path,
                every_n_frames: preview.every_n_frames.unwrap_or(1),
            },
            max_frames: file.max_frames,
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(source) = env_value("RELAY_CAMERA") {
            self.camera.source = source;
        }
        if let Some(path) = env_value("RELAY_MODEL_PATH") {
            self.model.path = PathBuf::from(path);
        }
        if let Some(backend) = env_value("RELAY_MODEL_BACKEND") {
            self.model.backend = backend;
        }
        if let Some(confidence) = env_value("RELAY_CONFIDENCE") {
            self.model.confidence = confidence
                .parse()
                .map_err(|_| anyhow!("RELAY_CONFIDENCE must be a number between 0 and 1"))?;
        }
        if let Some(device) = env_value("RELAY_DEVICE") {
            self.model.device = InferenceDevice::parse(&device)?;
        }
        if let Some(addr) = env_value("RELAY_PLC_ADDR") {
            self.plc.address = addr;
        }
        if let Some(addr) = env_value("RELAY_MODBUS_ADDR") {
            let (host, port) = split_host_port(&addr, self.modbus.port)?;
            self.modbus.address = host;
            self.modbus.port = port;
        }
        if let Some(target) = env_value("RELAY_UDP_TARGET") {
            self.udp.target = target;
        }
        if let Some(path) = env_value("RELAY_PREVIEW_PATH") {
            self.preview.path = Some(PathBuf::from(path));
        }
        if let Some(send) = env_value("RELAY_SEND") {
            let enabled = parse_bool(&send)
                .ok_or_else(|| anyhow!("RELAY_SEND must be true or false"))?;
            self.set_sending(enabled);
        }
        Ok(())
    }

    /// Enable or disable the outbound sink this profile writes to.
    pub fn set_sending(&mut self, enabled: bool) {
        match self.profile {
            Profile::Items => self.plc.enabled = enabled,
            Profile::Presence => self.modbus.enabled = enabled,
            Profile::Broadcast => self.udp.enabled = enabled,
        }
    }

    pub fn sending(&self) -> bool {
        match self.profile {
            Profile::Items => self.plc.enabled,
            Profile::Presence => self.modbus.enabled,
            Profile::Broadcast => self.udp.enabled,
        }
    }

    pub fn validate(&mut self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.model.confidence) {
            return Err(anyhow!("model confidence must be between 0 and 1"));
        }
        if !(0.0..=1.0).contains(&self.model.iou) {
            return Err(anyhow!("model iou must be between 0 and 1"));
        }
        if self.model.input_size == 0 || self.model.input_size % 32 != 0 {
            return Err(anyhow!("model input_size must be a positive multiple of 32"));
        }
        if self.camera.source.trim().is_empty() {
            return Err(anyhow!("camera source must not be empty"));
        }
        for (name, tag) in [
            ("index_tag", &self.plc.index_tag),
            ("pressure_tag", &self.plc.pressure_tag),
            ("new_data_tag", &self.plc.new_data_tag),
        ] {
            if tag.trim().is_empty() {
                return Err(anyhow!("plc {} must not be empty", name));
            }
        }
        if self.udp.enabled {
            self.udp_target()?;
        }
        if self.preview.every_n_frames == 0 {
            return Err(anyhow!("preview every_n_frames must be greater than zero"));
        }
        self.model.backend = self.model.backend.trim().to_ascii_lowercase();
        Ok(())
    }

    pub fn udp_target(&self) -> Result<SocketAddr> {
        self.udp
            .target
            .parse()
            .map_err(|e| anyhow!("invalid udp target '{}': {}", self.udp.target, e))
    }
}

/// Command-line flags shared by the relay binaries. They win over the file
/// and the environment.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub camera: Option<String>,
    pub model: Option<PathBuf>,
    pub no_send: bool,
    pub preview: Option<PathBuf>,
    pub max_frames: Option<u64>,
}

impl CliOverrides {
    pub fn apply(self, cfg: &mut RelayConfig) -> Result<()> {
        if let Some(camera) = self.camera {
            cfg.camera.source = camera;
        }
        if let Some(model) = self.model {
            cfg.model.path = model;
        }
        if self.no_send {
            cfg.set_sending(false);
        }
        if let Some(preview) = self.preview {
            cfg.preview.path = Some(preview);
        }
        if self.max_frames.is_some() {
            cfg.max_frames = self.max_frames;
        }
        cfg.validate()
    }
}

fn read_config_file(path: &Path) -> Result<RelayConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn split_host_port(value: &str, default_port: u16) -> Result<(String, u16)> {
    match value.rsplit_once(':') {
        Some((host, port)) if !host.is_empty() => {
            let port = port
                .parse()
                .map_err(|_| anyhow!("invalid port in address '{}'", value))?;
            Ok((host.to_string(), port))
        }
        _ => Ok((value.to_string(), default_port)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profiles_keep_their_defaults() {
        let items = RelayConfig::defaults(Profile::Items);
        assert_eq!(items.model.path, PathBuf::from("yolov8s.onnx"));
        assert_eq!(items.model.confidence, 0.6);
        assert!(!items.sending());
        assert_eq!(items.plc.pulse, Duration::from_millis(500));

        let presence = RelayConfig::defaults(Profile::Presence);
        assert!(presence.sending());
        assert_eq!(presence.model.device, InferenceDevice::Cpu);
        assert_eq!(presence.modbus.coil, 1);
        assert_eq!(presence.modbus.port, 502);

        let broadcast = RelayConfig::defaults(Profile::Broadcast);
        assert_eq!(broadcast.model.path, PathBuf::from("yolov8n.onnx"));
        assert_eq!(broadcast.model.confidence, 0.25);
        assert!(!broadcast.sending());
    }

    #[test]
    fn validate_rejects_bad_threshold() {
        let mut cfg = RelayConfig::defaults(Profile::Items);
        cfg.model.confidence = 1.5;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_rejects_bad_udp_target_only_when_enabled() {
        let mut cfg = RelayConfig::defaults(Profile::Broadcast);
        cfg.udp.target = "not-an-addr".into();
        assert!(cfg.validate().is_ok());
        cfg.set_sending(true);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn cli_overrides_win_and_revalidate() -> Result<()> {
        let mut cfg = RelayConfig::defaults(Profile::Presence);
        CliOverrides {
            camera: Some("stub://bench".into()),
            no_send: true,
            max_frames: Some(5),
            ..CliOverrides::default()
        }
        .apply(&mut cfg)?;
        assert_eq!(cfg.camera.source, "stub://bench");
        assert!(!cfg.sending());
        assert_eq!(cfg.max_frames, Some(5));

        let bad = CliOverrides {
            camera: Some(" ".into()),
            ..CliOverrides::default()
        };
        assert!(bad.apply(&mut cfg).is_err());
        Ok(())
    }

    #[test]
    fn splits_host_and_port() -> Result<()> {
        assert_eq!(split_host_port("10.0.0.5:1502", 502)?, ("10.0.0.5".into(), 1502));
        assert_eq!(split_host_port("10.0.0.5", 502)?, ("10.0.0.5".into(), 502));
        assert!(split_host_port("10.0.0.5:x", 502).is_err());
        Ok(())
    }
}
