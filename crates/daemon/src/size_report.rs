//! Size Report Module
//!
//! Before/after byte counts for a finished encode and the reduction derived from them.

use serde::{Deserialize, Serialize};

/// Input and output sizes of one encode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizeReport {
    pub input_bytes: u64,
    pub output_bytes: u64,
}

impl SizeReport {
    pub fn new(input_bytes: u64, output_bytes: u64) -> Self {
        Self {
            input_bytes,
            output_bytes,
        }
    }

    /// Output size as a fraction of the input, `None` for an empty input.
    pub fn ratio(&self) -> Option<f64> {
        if self.input_bytes == 0 {
            None
        } else {
            Some(self.output_bytes as f64 / self.input_bytes as f64)
        }
    }

    /// Space saved in percent.
    ///
    /// Negative when the output grew. An empty input reports 0.
    pub fn reduction_percent(&self) -> f64 {
        match self.ratio() {
            Some(ratio) => 100.0 - ratio * 100.0,
            None => 0.0,
        }
    }

    /// Multi-line summary for status messages.
    pub fn summary(&self) -> String {
        format!(
            "Original size: {}\nCompressed size: {}\nReduction: {:.1}%",
            format_megabytes(self.input_bytes),
            format_megabytes(self.output_bytes),
            self.reduction_percent()
        )
    }
}

/// Format a byte count as megabytes with one decimal, e.g. `12.5MB`.
pub fn format_megabytes(bytes: u64) -> String {
    format!("{:.1}MB", bytes as f64 / (1024.0 * 1024.0))
}
