pub mod agents;
pub mod run;
pub mod serve;
pub mod tools;

use agentloom_config::AppConfig;
use std::path::Path;

/// Load configuration from `path`, or the default location, with environment
/// overrides applied.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig, Box<dyn std::error::Error>> {
    let config = match path {
        Some(path) => AppConfig::load_with_env(path),
        None => AppConfig::load(),
    };
    config.map_err(|e| format!("Failed to load config: {e}").into())
}
