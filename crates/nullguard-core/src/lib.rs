//! nullguard core — configuration loading and analysis orchestration.

pub mod config;
pub mod orchestrator;

pub use config::{load_config, Config, ConfigError};
pub use orchestrator::{check_path, check_tu, infer_path, CheckOutput, OrchestratorError};
