//! Item detector: report each newly seen allowed item to the controller.

use anyhow::{Context, Result};
use std::time::Duration;

use super::FrameHandler;
use crate::config::PlcSettings;
use crate::detect::{AllowList, Detection};
use crate::frame::Frame;
use crate::items::{ItemPressureMap, SeenItems};
use crate::overlay::{Overlay, BOX_COLOR};
use crate::transport::{FlagPulse, TagValue, TagWriter};

/// Controller tag names for one item notification.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ItemTags {
    pub index: String,
    pub pressure: String,
    pub new_data: String,
}

impl From<&PlcSettings> for ItemTags {
    fn from(plc: &PlcSettings) -> Self {
        Self {
            index: plc.index_tag.clone(),
            pressure: plc.pressure_tag.clone(),
            new_data: plc.new_data_tag.clone(),
        }
    }
}

pub struct ItemPipeline<W: TagWriter> {
    allow: AllowList,
    items: ItemPressureMap,
    seen: SeenItems,
    writer: Option<W>,
    tags: ItemTags,
    pulse: Duration,
}

impl<W: TagWriter> ItemPipeline<W> {
    pub fn new(
        allow: AllowList,
        items: ItemPressureMap,
        writer: Option<W>,
        tags: ItemTags,
        pulse: Duration,
    ) -> Self {
        Self {
            allow,
            items,
            seen: SeenItems::new(),
            writer,
            tags,
            pulse,
        }
    }

    /// Filter detections, notify new items, and return their overlays.
    pub fn handle_detections(&mut self, detections: &[Detection]) -> Result<Vec<Overlay>> {
        let mut overlays = Vec::new();
        for det in detections {
            if !self.allow.contains(&det.label) {
                continue;
            }
            overlays.push(Overlay::for_detection(det, BOX_COLOR));
            if self.seen.observe(&det.label) {
                log::info!("New item detected: {}", det.label);
                self.notify(&det.label)?;
            }
        }
        Ok(overlays)
    }

    /// Write index, pressure and the new-data pulse for a mapped item.
    fn notify(&mut self, label: &str) -> Result<()> {
        let lookup = self.items.resolve(label);
        let Some(writer) = self.writer.as_mut() else {
            return Ok(());
        };
        if !lookup.is_mapped() {
            log::debug!("{} has no entry in the item map; not sent", label);
            return Ok(());
        }
        writer
            .write_tag(&self.tags.index, TagValue::Dint(lookup.index as i32))
            .with_context(|| format!("send index for {}", label))?;
        writer
            .write_tag(&self.tags.pressure, TagValue::Real(lookup.pressure as f32))
            .with_context(|| format!("send pressure for {}", label))?;
        let pulse = FlagPulse::raise(writer, &self.tags.new_data)
            .with_context(|| format!("raise {}", self.tags.new_data))?;
        log::info!(
            "Sent to PLC: {} | Index={} | Pressure={} kPa",
            label,
            lookup.index,
            lookup.pressure
        );
        pulse
            .finish(self.pulse)
            .with_context(|| format!("reset {}", self.tags.new_data))
    }

    pub fn seen(&self) -> &SeenItems {
        &self.seen
    }

    pub fn writer(&self) -> Option<&W> {
        self.writer.as_ref()
    }

    /// `[i] <label>  ->  <pressure> kPa` for every seen item, in order.
    pub fn summary(&self) -> Vec<String> {
        self.seen
            .labels()
            .iter()
            .enumerate()
            .map(|(i, label)| {
                format!("[{}] {}  ->  {} kPa", i + 1, label, self.items.pressure(label))
            })
            .collect()
    }

    /// Close the controller connection, if any.
    pub fn close(&mut self) -> Result<()> {
        match self.writer.take() {
            Some(mut writer) => writer.close(),
            None => Ok(()),
        }
    }
}

impl<W: TagWriter> FrameHandler for ItemPipeline<W> {
    fn handle(&mut self, _frame: &Frame, detections: &[Detection]) -> Result<Vec<Overlay>> {
        self.handle_detections(detections)
    }
}
