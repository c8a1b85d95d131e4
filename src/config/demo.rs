use std::path::PathBuf;
use std::time::Duration;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::ResourceType;
use crate::Result;

/// Settings for the `dynamic-cache` binary
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DemoConfig {
    /// Directory of JSON fixtures served by the in-memory source
    #[serde(default = "default_fixture_dir")]
    pub fixture_dir: PathBuf,

    /// Log directory; empty logs to stdout
    #[serde(default)]
    pub log_dir: String,

    #[serde(default = "default_render_interval_ms")]
    pub render_interval_ms: u64,

    #[serde(default = "default_render_rounds")]
    pub render_rounds: usize,

    /// Resource whose objects are printed on every round
    #[serde(default = "default_highlight")]
    pub highlight: ResourceType,

    /// Object key looked up in `highlight` before exiting
    #[serde(default = "default_lookup_key")]
    pub lookup_key: String,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            fixture_dir: default_fixture_dir(),
            log_dir: String::new(),
            render_interval_ms: default_render_interval_ms(),
            render_rounds: default_render_rounds(),
            highlight: default_highlight(),
            lookup_key: default_lookup_key(),
        }
    }
}

impl DemoConfig {
    pub fn validate(&self) -> Result<()> {
        if self.render_interval_ms == 0 {
            return Err(Error::Config(ConfigError::Message(
                "render_interval_ms must be greater than 0".into(),
            )));
        }
        Ok(())
    }

    pub fn render_interval(&self) -> Duration {
        Duration::from_millis(self.render_interval_ms)
    }
}

fn default_fixture_dir() -> PathBuf {
    PathBuf::from("demos/fixtures")
}

fn default_render_interval_ms() -> u64 {
    3000
}

fn default_render_rounds() -> usize {
    10
}

fn default_highlight() -> ResourceType {
    ResourceType::new("apps", "v1", "deployments")
}

fn default_lookup_key() -> String {
    "default/nginx-deployment".to_string()
}
