//! presence_relay - mirror "any object in view" onto a Modbus TCP coil.
//!
//! The coil is written only when presence changes. An unreachable
//! controller at startup or a failed write is logged and the relay keeps
//! running.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

use vision_plc_bridge::config::CliOverrides;
use vision_plc_bridge::{
    open_engine, open_preview, open_source, prepare, FrameLoop, ModbusTcpClient,
    PresencePipeline, Profile, QuitSignal, RelayConfig,
};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Write object presence to a Modbus coil"
)]
struct Args {
    /// Config file (.toml, otherwise JSON).
    #[arg(long, env = "RELAY_CONFIG")]
    config: Option<PathBuf>,

    /// Camera: stub://name, an image directory, /dev/videoN or an index.
    #[arg(long)]
    camera: Option<String>,

    /// ONNX model path.
    #[arg(long)]
    model: Option<PathBuf>,

    /// Track presence without connecting to the PLC.
    #[arg(long)]
    no_send: bool,

    /// Write an annotated JPEG snapshot here.
    #[arg(long)]
    preview: Option<PathBuf>,

    /// Stop after this many frames.
    #[arg(long)]
    max_frames: Option<u64>,
}

impl Args {
    fn overrides(&self) -> CliOverrides {
        CliOverrides {
            camera: self.camera.clone(),
            model: self.model.clone(),
            no_send: self.no_send,
            preview: self.preview.clone(),
            max_frames: self.max_frames,
        }
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let mut cfg = RelayConfig::load(Profile::Presence, args.config.as_deref())?;
    args.overrides().apply(&mut cfg)?;

    log::info!("Loading model on {:?}...", cfg.model.device);
    let mut engine = open_engine(&cfg.model)?;
    let mut source = open_source(&cfg.camera)?;
    prepare(source.as_mut(), engine.as_mut())?;

    let writer = ModbusTcpClient::connect_if_enabled(&cfg.modbus);
    let mut pipeline = PresencePipeline::new(writer, cfg.modbus.coil);
    let mut preview = open_preview(&cfg.preview)?;
    let quit = QuitSignal::new();
    quit.install()?;
    log::info!("System ready.");

    let outcome = FrameLoop::new(quit).with_max_frames(cfg.max_frames).run(
        source.as_mut(),
        engine.as_mut(),
        &mut pipeline,
        preview.as_mut(),
    );

    source.release();
    if let Err(err) = preview.close() {
        log::warn!("failed to close preview: {:#}", err);
    }
    if let Err(err) = pipeline.close() {
        log::warn!("failed to close PLC connection: {:#}", err);
    }
    let stats = outcome?;
    log::info!(
        "processed {} frame(s), {} failed write(s), stopped: {:?}",
        stats.frames,
        pipeline.failed_writes(),
        stats.stop
    );

    println!("\nProgram terminated successfully.");
    Ok(())
}
