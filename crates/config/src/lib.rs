//! Configuration for the video compressor
//!
//! Loads size limits, the quality preset table, and worker pool bounds from
//! TOML files with environment variable overrides.

pub mod config;

pub use config::*;
