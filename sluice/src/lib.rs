//! A small in-process columnar engine: newline-delimited JSON in, Arrow
//! tables in memory, Hive-partitioned Parquet out.

pub mod common;
pub mod context;
pub mod error;
pub mod sink;
pub mod source;
pub mod table;

pub use context::{Codec, EngineConfig, ExecutionContext};
pub use error::{EngineError, Result};
pub use sink::{SaveMode, WriteOptions, WriteReport};
pub use table::{ColumnExpr, Table, col};
