use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use tempfile::NamedTempFile;

use vision_plc_bridge::config::{Profile, RelayConfig};
use vision_plc_bridge::detect::InferenceDevice;

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "RELAY_CONFIG",
        "RELAY_CAMERA",
        "RELAY_MODEL_PATH",
        "RELAY_MODEL_BACKEND",
        "RELAY_DEVICE",
        "RELAY_CONFIDENCE",
        "RELAY_PLC_ADDR",
        "RELAY_MODBUS_ADDR",
        "RELAY_UDP_TARGET",
        "RELAY_PREVIEW_PATH",
        "RELAY_SEND",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
fn loads_json_config_from_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    let json = r#"{
        "camera": { "source": "stub://line-2", "width": 320, "height": 240 },
        "model": { "backend": "STUB", "confidence": 0.7, "device": "cpu" },
        "items": { "data_path": "cell_b/items.json", "default_pressure": 40 },
        "plc": {
            "enabled": true,
            "address": "10.1.0.9",
            "slot": 2,
            "pulse_ms": 250,
            "index_tag": "Cell_B_Index"
        },
        "preview": { "path": "/tmp/cell_b.jpg", "every_n_frames": 5 },
        "max_frames": 100
    }"#;
    std::io::Write::write_all(&mut file, json.as_bytes()).expect("write config");

    std::env::set_var("RELAY_CONFIG", file.path());
    std::env::set_var("RELAY_PLC_ADDR", "10.1.0.10");
    std::env::set_var("RELAY_CONFIDENCE", "0.65");

    let cfg = RelayConfig::load(Profile::Items, None).expect("load config");

    assert_eq!(cfg.camera.source, "stub://line-2");
    assert_eq!((cfg.camera.width, cfg.camera.height), (320, 240));
    assert_eq!(cfg.model.backend, "stub");
    assert_eq!(cfg.model.confidence, 0.65);
    assert_eq!(cfg.model.device, InferenceDevice::Cpu);
    assert_eq!(cfg.model.path, PathBuf::from("yolov8s.onnx"));
    assert_eq!(cfg.items.data_path, PathBuf::from("cell_b/items.json"));
    assert_eq!(cfg.items.default_pressure, 40.0);
    assert!(cfg.plc.enabled);
    assert_eq!(cfg.plc.address, "10.1.0.10");
    assert_eq!(cfg.plc.slot, 2);
    assert_eq!(cfg.plc.pulse, Duration::from_millis(250));
    assert_eq!(cfg.plc.index_tag, "Cell_B_Index");
    assert_eq!(cfg.plc.pressure_tag, "Vision_Pressure");
    assert_eq!(cfg.preview.every_n_frames, 5);
    assert_eq!(cfg.max_frames, Some(100));

    clear_env();
}

#[test]
fn loads_toml_config_by_extension() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("presence.toml");
    std::fs::write(
        &path,
        r#"
[modbus]
address = "192.168.0.50"
coil = 7
timeout_ms = 1500

[camera]
source = "/dev/video2"
"#,
    )
    .expect("write config");
    std::env::set_var("RELAY_MODBUS_ADDR", "192.168.0.51:1502");

    let cfg = RelayConfig::load(Profile::Presence, Some(&path)).expect("load config");
    assert!(cfg.modbus.enabled);
    assert_eq!(cfg.modbus.address, "192.168.0.51");
    assert_eq!(cfg.modbus.port, 1502);
    assert_eq!(cfg.modbus.coil, 7);
    assert_eq!(cfg.modbus.timeout, Duration::from_millis(1500));
    assert_eq!(cfg.camera.source, "/dev/video2");
    assert_eq!(cfg.model.device, InferenceDevice::Cpu);

    clear_env();
}

#[test]
fn relay_send_toggles_the_profile_sink() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("RELAY_SEND", "true");
    std::env::set_var("RELAY_UDP_TARGET", "127.0.0.1:6000");
    let cfg = RelayConfig::load(Profile::Broadcast, None).expect("load config");
    assert!(cfg.udp.enabled);
    assert_eq!(cfg.udp_target().expect("target").port(), 6000);

    std::env::set_var("RELAY_SEND", "off");
    let cfg = RelayConfig::load(Profile::Presence, None).expect("load config");
    assert!(!cfg.modbus.enabled);

    std::env::set_var("RELAY_SEND", "maybe");
    assert!(RelayConfig::load(Profile::Items, None).is_err());

    clear_env();
}

#[test]
fn rejects_unknown_fields_and_bad_values() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    std::io::Write::write_all(&mut file, br#"{ "plc_ip": "10.0.0.1" }"#).expect("write config");
    assert!(RelayConfig::load(Profile::Items, Some(file.path())).is_err());

    // A misspelt key inside a section must not fall back to the default.
    let mut nested = NamedTempFile::new().expect("temp config");
    std::io::Write::write_all(&mut nested, br#"{ "plc": { "pulse_msec": 50 } }"#)
        .expect("write config");
    let err = RelayConfig::load(Profile::Items, Some(nested.path())).unwrap_err();
    assert!(format!("{:#}", err).contains("pulse_msec"));

    let mut toml_file = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .expect("temp toml");
    std::io::Write::write_all(&mut toml_file, b"[modbus]\ncoil_address = 3\n")
        .expect("write config");
    assert!(RelayConfig::load(Profile::Presence, Some(toml_file.path())).is_err());

    std::env::set_var("RELAY_DEVICE", "cuda");
    assert!(RelayConfig::load(Profile::Items, None).is_err());
    std::env::remove_var("RELAY_DEVICE");

    std::env::set_var("RELAY_CONFIDENCE", "1.2");
    assert!(RelayConfig::load(Profile::Items, None).is_err());

    clear_env();
}
