//! Vision-to-controller relays.
//!
//! Three small pipelines run an object-detection model against a camera feed
//! and forward simple signals to an external device:
//!
//! - `item_relay`: newly seen items become an index, a pressure and a
//!   new-data pulse written as EtherNet/IP tags.
//! - `presence_relay`: "anything in view" becomes a Modbus TCP coil,
//!   written only when it changes.
//! - `detect_broadcast`: every detection becomes a JSON datagram over UDP.
//!
//! # Module Structure
//!
//! - `config`: `RelayConfig` (file, environment overrides, validation)
//! - `frame`, `ingest`: captured frames and the sources producing them
//! - `detect`: detection engines, class names and allow-lists
//! - `items`, `presence`: per-session state for the item and presence relays
//! - `pipeline`: the frame loop and the per-relay handlers
//! - `transport`: EtherNet/IP, Modbus TCP and UDP clients
//! - `overlay`, `preview`: annotated snapshots in place of a display window
//! - `shutdown`: quit requests from Ctrl-C or stdin

pub mod config;
pub mod detect;
pub mod frame;
pub mod ingest;
pub mod items;
pub mod overlay;
pub mod pipeline;
pub mod presence;
pub mod preview;
pub mod shutdown;
pub mod transport;

pub use config::{Profile, RelayConfig};
pub use detect::{open_engine, AllowList, BoundingBox, ClassNames, Detection, DetectionEngine};
pub use frame::Frame;
pub use ingest::{open_source, FrameSource};
pub use items::{ItemLookup, ItemPressureMap, SeenItems};
pub use pipeline::{
    BroadcastPipeline, FrameHandler, FrameLoop, ItemPipeline, ItemTags, LoopStats,
    PresencePipeline, StopReason,
};
pub use presence::PresenceTracker;
pub use preview::{open_preview, PreviewSink};
pub use shutdown::QuitSignal;
pub use transport::{
    CoilWriter, DatagramSink, EnipClient, EnipSettings, ModbusTcpClient, ProtocolError,
    TagValue, TagWriter, UdpBroadcaster,
};

/// Connect the source and warm up the engine, logging what was opened.
pub fn prepare(source: &mut dyn FrameSource, engine: &mut dyn DetectionEngine) -> anyhow::Result<()> {
    use anyhow::Context;

    source
        .connect()
        .with_context(|| format!("Camera not found or can't be opened: {}", source.describe()))?;
    log::info!("Camera started: {}", source.describe());
    engine.warm_up()?;
    log::info!(
        "Model loaded: {} backend, {} classes",
        engine.name(),
        engine.vocabulary().len()
    );
    Ok(())
}
