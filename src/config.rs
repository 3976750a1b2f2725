//! Job configuration: an INI file (`dl.cfg` by default) layered under
//! `CONFLUENCE__<SECTION>__<KEY>` environment variables.

use std::fmt;
use std::path::{Path, PathBuf};

use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;
use sluice::{Codec, EngineConfig};

use crate::error::Result;
use crate::timestamp::Timezone;

pub const DEFAULT_CONFIG_FILE: &str = "dl.cfg";
pub const ENV_PREFIX: &str = "CONFLUENCE";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EtlConfig {
    #[serde(default)]
    pub paths: PathSettings,
    #[serde(default)]
    pub engine: EngineSettings,
    /// Object-store credentials. Only exported to the process environment;
    /// never read by the pipeline itself.
    #[serde(default, alias = "AWS_CREDENTIALS")]
    pub aws_credentials: Option<StorageCredentials>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathSettings {
    pub input_data: Option<PathBuf>,
    pub output_data: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    pub batch_size: usize,
    pub compression: Codec,
    pub timezone: Timezone,
    /// Show a progress bar while writing partitions.
    pub progress: bool,
    pub schema_inference_limit: Option<usize>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        let engine = EngineConfig::default();
        Self {
            batch_size: engine.batch_size,
            compression: engine.codec,
            timezone: Timezone::default(),
            progress: engine.show_progress,
            schema_inference_limit: engine.schema_inference_limit,
        }
    }
}

impl EngineSettings {
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            batch_size: self.batch_size.max(1),
            codec: self.compression,
            schema_inference_limit: self.schema_inference_limit,
            show_progress: self.progress,
        }
    }
}

#[derive(Clone, Deserialize)]
pub struct StorageCredentials {
    #[serde(alias = "AWS_ACCESS_KEY_ID")]
    pub aws_access_key_id: String,
    #[serde(alias = "AWS_SECRET_ACCESS_KEY")]
    pub aws_secret_access_key: String,
}

impl fmt::Debug for StorageCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageCredentials")
            .field("aws_access_key_id", &"<redacted>")
            .field("aws_secret_access_key", &"<redacted>")
            .finish()
    }
}

impl EtlConfig {
    /// Load `path` if it exists, then apply environment overrides.
    pub fn load(path: &Path) -> Result<Self> {
        let settings = Config::builder()
            .add_source(File::from(path).format(FileFormat::Ini).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        Ok(settings.try_deserialize()?)
    }
}
