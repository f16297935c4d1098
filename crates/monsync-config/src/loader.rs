use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ConfigError;

/// Process-wide configuration for a writer instance.
///
/// Loaded from a flat TOML file (`monsync.toml`), then overridden by
/// environment variables, mirroring the teacher's "file, then env"
/// layering but over one flat object rather than a directory tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WriterConfig {
    pub redis_url: String,
    pub environment: String,
    pub config_prefix: String,
    pub checksum_prefix: String,
    pub state_prefix: String,
    /// Outer work-queue concurrency (parallel typenames in flight).
    pub concurrency: usize,
    /// Objects per inner chunk during a full dump.
    pub chunk_size: usize,
    /// Objects processed between transaction flushes within a chunk.
    pub flush_every: usize,
}

impl Default for WriterConfig {
    fn default() -> Self {
        WriterConfig {
            redis_url: "redis://127.0.0.1:6379".to_string(),
            environment: "default".to_string(),
            config_prefix: "icinga:config:".to_string(),
            checksum_prefix: "icinga:config:checksum:".to_string(),
            state_prefix: "icinga:state:".to_string(),
            concurrency: 4,
            chunk_size: 500,
            flush_every: 100,
        }
    }
}

/// Loads `path` as TOML, falling back to defaults for any field the file
/// omits, then applies `MONSYNC_REDIS_URL` / `MONSYNC_ENVIRONMENT` /
/// `MONSYNC_CONCURRENCY` overrides from the process environment.
pub fn load_writer_config(path: &Path) -> Result<WriterConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
        path: path.display().to_string(),
        source: e,
    })?;
    let mut config = parse_writer_config(&content, path)?;
    apply_env_overrides(&mut config)?;
    Ok(config)
}

fn parse_writer_config(content: &str, path: &Path) -> Result<WriterConfig, ConfigError> {
    toml::from_str(content).map_err(|e| ConfigError::TomlParse {
        path: path.display().to_string(),
        source: e,
    })
}

fn apply_env_overrides(config: &mut WriterConfig) -> Result<(), ConfigError> {
    if let Ok(url) = std::env::var("MONSYNC_REDIS_URL") {
        debug!("overriding redis_url from MONSYNC_REDIS_URL");
        config.redis_url = url;
    }
    if let Ok(env) = std::env::var("MONSYNC_ENVIRONMENT") {
        debug!("overriding environment from MONSYNC_ENVIRONMENT");
        config.environment = env;
    }
    if let Ok(raw) = std::env::var("MONSYNC_CONCURRENCY") {
        let parsed: usize = raw.parse().map_err(|_| {
            ConfigError::Invalid(format!("MONSYNC_CONCURRENCY must be a positive integer, got '{raw}'"))
        })?;
        if parsed == 0 {
            return Err(ConfigError::Invalid("MONSYNC_CONCURRENCY must be non-zero".to_string()));
        }
        config.concurrency = parsed;
    }
    Ok(())
}
