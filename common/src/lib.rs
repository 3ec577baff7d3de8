//! Common CLI and observability scaffolding shared across RAOP binaries.
//!
//! This crate carries the ambient stack (colored CLI output, tracing
//! initialization, Prometheus metrics) so binaries built on top of the
//! `raop` engine don't duplicate this wiring.

pub mod cli;
pub mod observability;

pub use cli::ColorWhen;
pub use observability::{init_tracing, MetricsContext, MetricsServerConfig};
