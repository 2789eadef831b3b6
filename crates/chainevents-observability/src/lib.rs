//! # chainevents-observability
//!
//! Structured logging for the chainevents binaries.
//!
//! Text or JSON output, compatible with ELK, Loki, CloudWatch.
//! Log levels configurable globally and per component; `RUST_LOG` wins when set.

pub mod tracing_setup;

pub use tracing_setup::{init_tracing, LogConfig, LogInitError};
