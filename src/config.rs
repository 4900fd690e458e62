use crate::session::SessionOptions;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Deserialize)]
pub struct Config {
    /// Options for the relayed session; validated when the controller connects
    #[serde(default)]
    pub session: SessionOptions,
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub http: HttpConfig,
}

#[derive(Debug, Default, Deserialize)]
pub struct CaptureConfig {
    /// WAV file relayed as the capture source
    pub input: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 8787,
        }
    }
}

impl Config {
    /// Load from `path` (extension optional) with `MEDIA_RELAY__*` environment
    /// overrides, e.g. `MEDIA_RELAY__SESSION__HOST=relay.example.com`.
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix("MEDIA_RELAY")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .with_context(|| format!("Failed to load config from {}", path))?;

        Ok(settings.try_deserialize()?)
    }
}
