//! Runtime glue: configuration, per-stream progress tracking, and telemetry.

pub mod config;
pub mod progress;
pub mod telemetry;
