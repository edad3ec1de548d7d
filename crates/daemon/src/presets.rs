//! Quality presets and their encoder parameters.
//!
//! The preset table is read once from configuration and never changes while
//! the process runs.

use crate::config::{PresetConfig, PresetTable};
use crate::encode::EncodeParams;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A preset key that is not one of low/medium/high.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown quality preset '{0}'")]
pub struct UnknownPresetKey(pub String);

/// Named quality level a user picks for a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityPreset {
    /// Small file, lower quality.
    Low,
    /// Balanced size and quality.
    #[default]
    Medium,
    /// Larger file, higher quality.
    High,
}

impl QualityPreset {
    pub const ALL: [QualityPreset; 3] = [
        QualityPreset::Low,
        QualityPreset::Medium,
        QualityPreset::High,
    ];

    /// Key used in commands and configuration.
    pub fn key(self) -> &'static str {
        match self {
            QualityPreset::Low => "low",
            QualityPreset::Medium => "medium",
            QualityPreset::High => "high",
        }
    }

    /// Capitalized name for user-facing text.
    pub fn label(self) -> &'static str {
        match self {
            QualityPreset::Low => "Low",
            QualityPreset::Medium => "Medium",
            QualityPreset::High => "High",
        }
    }
}

impl fmt::Display for QualityPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for QualityPreset {
    type Err = UnknownPresetKey;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(QualityPreset::Low),
            "medium" => Ok(QualityPreset::Medium),
            "high" => Ok(QualityPreset::High),
            _ => Err(UnknownPresetKey(s.to_string())),
        }
    }
}

/// Immutable mapping from preset to encoder parameters.
#[derive(Debug, Clone)]
pub struct PresetCatalog {
    table: PresetTable,
}

impl PresetCatalog {
    pub fn new(table: PresetTable) -> Self {
        Self { table }
    }

    fn entry(&self, preset: QualityPreset) -> &PresetConfig {
        match preset {
            QualityPreset::Low => &self.table.low,
            QualityPreset::Medium => &self.table.medium,
            QualityPreset::High => &self.table.high,
        }
    }

    /// Encoder parameters for `preset`.
    pub fn params(&self, preset: QualityPreset) -> EncodeParams {
        EncodeParams::from(self.entry(preset))
    }

    pub fn description(&self, preset: QualityPreset) -> &str {
        &self.entry(preset).description
    }
}

impl Default for PresetCatalog {
    fn default() -> Self {
        Self::new(PresetTable::default())
    }
}
