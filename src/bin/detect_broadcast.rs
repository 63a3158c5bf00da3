//! detect_broadcast - log every detection and optionally send it over UDP.
//!
//! Each box becomes `{"object", "confidence", "cx", "cy"}` in one datagram.
//! Sending is best-effort: failures are logged and the loop continues.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

use vision_plc_bridge::config::CliOverrides;
use vision_plc_bridge::{
    open_engine, open_preview, open_source, prepare, BroadcastPipeline, FrameLoop, Profile,
    QuitSignal, RelayConfig, UdpBroadcaster,
};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Detect objects and broadcast them as JSON over UDP"
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

    /// Log detections without sending datagrams.
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
    let mut cfg = RelayConfig::load(Profile::Broadcast, args.config.as_deref())?;
    args.overrides().apply(&mut cfg)?;

    let mut engine = open_engine(&cfg.model)?;
    let mut source = open_source(&cfg.camera)?;
    prepare(source.as_mut(), engine.as_mut())?;

    let sink = if cfg.udp.enabled {
        let broadcaster = UdpBroadcaster::new(cfg.udp_target()?)?;
        log::info!("sending detections to {}", broadcaster.target());
        Some(broadcaster)
    } else {
        None
    };
    let mut pipeline = BroadcastPipeline::new(sink);
    let mut preview = open_preview(&cfg.preview)?;
    let quit = QuitSignal::new();
    quit.install()?;

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
    let stats = outcome?;
    log::info!(
        "processed {} frame(s), {} datagram(s) sent, {} failed, stopped: {:?}",
        stats.frames,
        pipeline.sent(),
        pipeline.send_errors(),
        stats.stop
    );

    println!("\nProgram ended successfully.");
    Ok(())
}
