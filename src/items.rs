//! Item-to-pressure lookup and the per-session log of seen items.

use anyhow::{anyhow, Context, Result};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::path::Path;

/// Pressure used for items missing from the map.
pub const DEFAULT_PRESSURE: f64 = 50.0;

/// Result of looking an item up in the map.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ItemLookup {
    /// 1-based position in the map's key order; 0 when absent.
    pub index: u32,
    pub pressure: f64,
}

impl ItemLookup {
    pub fn is_mapped(&self) -> bool {
        self.index > 0
    }
}

/// Ordered, read-only mapping from item label to pressure.
#[derive(Clone, Debug)]
pub struct ItemPressureMap {
    entries: Vec<(String, f64)>,
    default_pressure: f64,
}

impl ItemPressureMap {
    /// Build from entries in index order. Later duplicates are ignored.
    pub fn new<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        let mut seen = HashSet::new();
        let entries = entries
            .into_iter()
            .map(|(label, pressure)| (label.into(), pressure))
            .filter(|(label, _)| seen.insert(label.clone()))
            .collect();
        Self {
            entries,
            default_pressure: DEFAULT_PRESSURE,
        }
    }

    pub fn with_default_pressure(mut self, pressure: f64) -> Self {
        self.default_pressure = pressure;
        self
    }

    /// Load a JSON object of `label: pressure` pairs, keeping file order.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(anyhow!(
                "{} not found. Please create it (object: pressure).",
                path.display()
            ));
        }
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read item map {}", path.display()))?;
        Self::from_json(&raw).with_context(|| format!("invalid item map {}", path.display()))
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let object: Map<String, Value> =
            serde_json::from_str(raw).context("item map must be a JSON object")?;
        let mut entries = Vec::with_capacity(object.len());
        for (label, value) in object {
            let pressure = value
                .as_f64()
                .ok_or_else(|| anyhow!("pressure for '{}' is not a number: {}", label, value))?;
            entries.push((label, pressure));
        }
        Ok(Self::new(entries))
    }

    /// Index and pressure for a label, falling back to `(0, default)`.
    pub fn resolve(&self, label: &str) -> ItemLookup {
        match self.entries.iter().position(|(name, _)| name == label) {
            Some(pos) => ItemLookup {
                index: pos as u32 + 1,
                pressure: self.entries[pos].1,
            },
            None => ItemLookup {
                index: 0,
                pressure: self.default_pressure,
            },
        }
    }

    pub fn pressure(&self, label: &str) -> f64 {
        self.resolve(label).pressure
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[(String, f64)] {
        &self.entries
    }
}

/// Distinct labels in first-detection order.
#[derive(Clone, Debug, Default)]
pub struct SeenItems {
    order: Vec<String>,
    index: HashSet<String>,
}

impl SeenItems {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a label. Returns true the first time it is seen.
    pub fn observe(&mut self, label: &str) -> bool {
        if self.index.contains(label) {
            return false;
        }
        self.index.insert(label.to_string());
        self.order.push(label.to_string());
        true
    }

    pub fn contains(&self, label: &str) -> bool {
        self.index.contains(label)
    }

    pub fn labels(&self) -> &[String] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
