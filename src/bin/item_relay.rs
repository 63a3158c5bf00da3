//! item_relay - report newly detected items to an EtherNet/IP controller.
//!
//! For every allowed item seen for the first time this session, the relay
//! looks up its index and pressure in the item map and writes
//! `Index -> Pressure -> NewData(true) -> NewData(false)` to the controller.
//! A failed write ends the run with an error.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

use vision_plc_bridge::config::CliOverrides;
use vision_plc_bridge::{
    open_engine, open_preview, open_source, prepare, AllowList, EnipClient, EnipSettings,
    FrameLoop, ItemPipeline, ItemPressureMap, ItemTags, Profile, QuitSignal, RelayConfig,
};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Detect items and send index and pressure to a PLC"
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

    /// Detect and log only; never open the PLC connection.
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
    let mut cfg = RelayConfig::load(Profile::Items, args.config.as_deref())?;
    args.overrides().apply(&mut cfg)?;

    log::info!("Loading model and dataset...");
    let mut engine = open_engine(&cfg.model)?;
    let allow = AllowList::from_dataset_or_vocabulary(&cfg.items.dataset_path, engine.vocabulary())?;
    log::info!("Model loaded: {}", cfg.model.path.display());
    log::info!("Dataset classes: {:?}", allow.labels());

    let items = ItemPressureMap::load(&cfg.items.data_path)?
        .with_default_pressure(cfg.items.default_pressure);
    log::info!("Loaded item-pressure map: {:?}", items.entries());

    let mut source = open_source(&cfg.camera)?;
    prepare(source.as_mut(), engine.as_mut())?;

    let writer = if cfg.plc.enabled {
        let client = EnipClient::connect(EnipSettings::from(&cfg.plc))?;
        log::info!("Connected to PLC at {}", cfg.plc.address);
        Some(client)
    } else {
        log::info!("PLC sending disabled; detections are logged only");
        None
    };

    let mut pipeline = ItemPipeline::new(
        allow,
        items,
        writer,
        ItemTags::from(&cfg.plc),
        cfg.plc.pulse,
    );
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
    let closed = pipeline.close();
    let stats = outcome?;
    closed?;
    log::info!("processed {} frame(s), stopped: {:?}", stats.frames, stats.stop);

    println!("\nProgram ended successfully.");
    println!("Final Detected Items:");
    for line in pipeline.summary() {
        println!("{}", line);
    }
    Ok(())
}
