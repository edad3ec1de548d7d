//! Encode pool planning
//!
//! Derives the bounded number of concurrent encode slots from CPU core count
//! and configuration. The result is always at least one and never unbounded.

use crate::config::Config;

/// Upper bound on derived encode slots
const MAX_DERIVED_WORKERS: u32 = 8;

/// Logical cores assumed per concurrent encode when deriving
const CORES_PER_ENCODE: u32 = 4;

/// Encode pool plan derived from configuration and system resources
#[derive(Debug, Clone, PartialEq)]
pub struct EncodePoolPlan {
    /// Total logical CPU cores available
    pub total_cores: u32,
    /// Number of encodes allowed to run at once
    pub encode_workers: u32,
}

impl EncodePoolPlan {
    /// Derive a pool plan from configuration
    ///
    /// Uses the following rules:
    /// - Detects CPU cores via num_cpus if not specified in config
    /// - Uses `pool.encode_workers` unchanged when non-zero
    /// - Otherwise one slot per four cores, clamped to [1, 8]
    pub fn derive(cfg: &Config) -> Self {
        let total_cores = cfg
            .pool
            .logical_cores
            .unwrap_or_else(|| num_cpus::get() as u32);

        let encode_workers = if cfg.pool.encode_workers > 0 {
            cfg.pool.encode_workers
        } else {
            derive_workers(total_cores)
        };

        Self {
            total_cores,
            encode_workers,
        }
    }

    /// Plan with a fixed slot count, for tests and embedding
    pub fn fixed(encode_workers: u32) -> Self {
        Self {
            total_cores: encode_workers.max(1),
            encode_workers: encode_workers.max(1),
        }
    }
}

/// Derive encode slots based on core count
fn derive_workers(cores: u32) -> u32 {
    (cores / CORES_PER_ENCODE).clamp(1, MAX_DERIVED_WORKERS)
}

/// Public function to derive a pool plan from configuration
pub fn derive_plan(cfg: &Config) -> EncodePoolPlan {
    EncodePoolPlan::derive(cfg)
}
