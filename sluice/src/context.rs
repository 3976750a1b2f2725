//! The execution context: one per run, passed by reference to every
//! operation that reads, writes, or needs run-scoped state.

use std::ops::Range;
use std::path::Path;
use std::sync::atomic::{AtomicI64, Ordering};

use parquet::basic::{Compression, ZstdLevel};
use parquet::file::properties::WriterProperties;
use serde::Deserialize;
use tracing::info;

use crate::error::Result;
use crate::sink::{self, WriteOptions, WriteReport};
use crate::source;
use crate::table::Table;

// ============================================================================
// Configuration
// ============================================================================

/// Compression codec for written Parquet files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Codec {
    #[default]
    Snappy,
    Zstd,
    Uncompressed,
}

impl Codec {
    fn compression(self) -> Compression {
        match self {
            Codec::Snappy => Compression::SNAPPY,
            Codec::Zstd => Compression::ZSTD(ZstdLevel::default()),
            Codec::Uncompressed => Compression::UNCOMPRESSED,
        }
    }

    /// File name suffix, e.g. `snappy.parquet`.
    pub fn file_suffix(self) -> &'static str {
        match self {
            Codec::Snappy => "snappy.parquet",
            Codec::Zstd => "zstd.parquet",
            Codec::Uncompressed => "parquet",
        }
    }
}

#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Rows per decoded Arrow batch when reading JSON or Parquet.
    pub batch_size: usize,
    /// Compression for every written data file.
    pub codec: Codec,
    /// Number of JSON records scanned for schema inference (`None` = all).
    pub schema_inference_limit: Option<usize>,
    /// Draw a progress bar while writing partitions.
    pub show_progress: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            batch_size: 8192,
            codec: Codec::Snappy,
            schema_inference_limit: None,
            show_progress: false,
        }
    }
}

// ============================================================================
// Context
// ============================================================================

/// Run-scoped engine state. Created once at startup and dropped at exit; there
/// is no global instance.
#[derive(Debug)]
pub struct ExecutionContext {
    config: EngineConfig,
    run_id: String,
    next_id: AtomicI64,
}

impl ExecutionContext {
    pub fn new(config: EngineConfig) -> Self {
        let run_id = format!("{:016x}", rand::random::<u64>());
        info!(
            "Execution context {run_id}: batch_size={}, codec={:?}",
            config.batch_size, config.codec
        );
        Self {
            config,
            run_id,
            next_id: AtomicI64::new(0),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Identifier of this run; embedded in data file names and manifests.
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Reserve `n` identifiers. Successive reservations within one context
    /// are strictly increasing; nothing is shared across contexts.
    pub fn reserve_ids(&self, n: usize) -> Range<i64> {
        let start = self.next_id.fetch_add(n as i64, Ordering::SeqCst);
        start..start + n as i64
    }

    pub fn writer_properties(&self) -> WriterProperties {
        WriterProperties::builder()
            .set_compression(self.config.codec.compression())
            .build()
    }

    /// Read every `*.json` file exactly `depth` directory levels below `root`
    /// as newline-delimited JSON records.
    pub fn read_ndjson(&self, root: &Path, depth: usize) -> Result<Table> {
        source::read_ndjson(self, root, depth)
    }

    /// Read back a committed table directory.
    pub fn read_parquet(&self, table_dir: &Path) -> Result<Table> {
        source::read_parquet(self, table_dir)
    }

    pub fn write_parquet(
        &self,
        table: &Table,
        table_dir: &Path,
        options: &WriteOptions,
    ) -> Result<WriteReport> {
        sink::write_parquet(self, table, table_dir, options)
    }
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}
