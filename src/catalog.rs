use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

/// One vehicle in the inventory. Loaded once at startup, never mutated.
#[derive(Debug, Clone, Deserialize)]
pub struct InventoryItem {
    pub brand: String,
    pub model: String,
    #[serde(default)]
    pub year: Option<u16>,
    pub price: String,
    #[serde(default)]
    pub speed: Option<String>,
    #[serde(default)]
    pub engine: Option<String>,
    #[serde(default)]
    pub features: Option<Vec<String>>,
}

impl InventoryItem {
    /// One human-readable line for the system prompt, e.g.
    /// `Toyota Sedan XYZ: Priced at 20,000 USD with features such as Bluetooth.`
    pub fn describe(&self) -> String {
        let mut line = format!("{} {}", self.brand, self.model);
        if let Some(year) = self.year {
            line.push_str(&format!(" ({year})"));
        }
        line.push_str(&format!(": Priced at {}", self.price));
        match (&self.speed, &self.engine, &self.features) {
            (Some(speed), Some(engine), _) => {
                line.push_str(&format!(", reaching {speed} with its {engine} engine."));
            }
            (Some(speed), None, _) => {
                line.push_str(&format!(", reaching {speed}."));
            }
            (None, Some(engine), _) => {
                line.push_str(&format!(", powered by a {engine} engine."));
            }
            (None, None, Some(features)) if !features.is_empty() => {
                line.push_str(&format!(
                    " with features such as {}.",
                    features.join(", ")
                ));
            }
            _ => line.push('.'),
        }
        line
    }
}

#[derive(Debug, Clone)]
pub struct Catalog {
    items: Vec<InventoryItem>,
}

impl Catalog {
    pub fn new(items: Vec<InventoryItem>) -> Result<Self> {
        if items.is_empty() {
            bail!("inventory is empty");
        }
        Ok(Catalog { items })
    }

    /// Load the inventory from a JSON file. A missing or malformed file is a
    /// fatal startup error surfaced by the caller.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("could not read catalog file {}", path.display()))?;
        let items: Vec<InventoryItem> = serde_json::from_str(&contents)
            .with_context(|| format!("malformed catalog file {}", path.display()))?;
        Catalog::new(items).with_context(|| format!("invalid catalog file {}", path.display()))
    }

    pub fn items(&self) -> &[InventoryItem] {
        &self.items
    }

    /// The full inventory block embedded in the system prompt. Deterministic:
    /// the same catalog always renders the same string.
    pub fn describe(&self) -> String {
        let mut out = String::from("Current inventory:\n");
        for item in &self.items {
            out.push_str("- ");
            out.push_str(&item.describe());
            out.push('\n');
        }
        out
    }
}
