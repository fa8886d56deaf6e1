//! AlphaForge Runner — batch orchestration over the core pipeline.
//!
//! This crate owns everything outside the per-call protocol:
//! - TOML batch configuration (scope, grammar, simulation, concurrency)
//! - Credential file loading
//! - Bounded-concurrency batch execution with per-result progress
//! - CSV and JSON reporting with expression provenance

pub mod batch;
pub mod config;
pub mod credentials;
pub mod report;

pub use batch::{
    run_batch, BatchError, BatchOptions, BatchProgress, BatchReport, BatchSummary, JobResult,
    StdoutProgress,
};
pub use config::{BatchConfig, BatchSettings, ConfigError};
pub use credentials::{load_credentials, CredentialsError};
pub use report::{export_results_csv, export_results_json, render_summary, write_results_csv};
