//! Common types and constants shared by the source and sink: partition
//! layout, value escaping, and the commit manifest.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use arrow::array::{ArrayRef, Int32Array, Int64Array, StringArray};
use arrow::datatypes::DataType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result, io_at};

/// Name of the marker file written last into every committed table directory.
pub const COMMIT_MARKER: &str = "_SUCCESS";

/// Directory value used for a null partition key.
pub const DEFAULT_PARTITION: &str = "__HIVE_DEFAULT_PARTITION__";

// ============================================================================
// Partition Columns
// ============================================================================

/// The Arrow types a partition column may have. Partition values live in
/// directory names, so only types with a lossless text form are allowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PartitionType {
    Int32,
    Int64,
    Utf8,
}

impl PartitionType {
    pub fn from_arrow(column: &str, data_type: &DataType) -> Result<Self> {
        match data_type {
            DataType::Int8 | DataType::Int16 | DataType::Int32 => Ok(Self::Int32),
            DataType::Int64 => Ok(Self::Int64),
            DataType::Utf8 | DataType::LargeUtf8 => Ok(Self::Utf8),
            other => Err(EngineError::UnsupportedPartitionType {
                column: column.to_string(),
                data_type: other.clone(),
            }),
        }
    }

    pub fn to_arrow(self) -> DataType {
        match self {
            Self::Int32 => DataType::Int32,
            Self::Int64 => DataType::Int64,
            Self::Utf8 => DataType::Utf8,
        }
    }

    /// Build a column of `len` copies of a partition value read back from a
    /// directory name.
    pub fn constant_array(self, value: Option<&str>, len: usize) -> Result<ArrayRef> {
        let parse_err = |v: &str| EngineError::InvalidPartitionPath(v.to_string());
        let array: ArrayRef = match self {
            Self::Int32 => {
                let v = value
                    .map(|v| v.parse::<i32>().map_err(|_| parse_err(v)))
                    .transpose()?;
                Arc::new(Int32Array::from(vec![v; len]))
            }
            Self::Int64 => {
                let v = value
                    .map(|v| v.parse::<i64>().map_err(|_| parse_err(v)))
                    .transpose()?;
                Arc::new(Int64Array::from(vec![v; len]))
            }
            Self::Utf8 => Arc::new(StringArray::from(vec![value; len])),
        };
        Ok(array)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionColumn {
    pub name: String,
    pub data_type: PartitionType,
}

// ============================================================================
// Path Escaping
// ============================================================================

fn needs_escape(c: char) -> bool {
    matches!(
        c,
        '\u{01}'..='\u{1F}'
            | '"'
            | '#'
            | '%'
            | '\''
            | '*'
            | '/'
            | ':'
            | '='
            | '?'
            | '\\'
            | '\u{7F}'
            | '{'
            | '['
            | ']'
            | '^'
    )
}

/// Percent-encode the characters that cannot appear in a partition directory
/// segment. Everything else, including non-ASCII text, passes through.
pub fn escape_partition_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if needs_escape(c) {
            out.push_str(&format!("%{:02X}", c as u32));
        } else {
            out.push(c);
        }
    }
    out
}

/// Inverse of [`escape_partition_value`]. Malformed escapes are kept verbatim.
pub fn unescape_partition_value(value: &str) -> String {
    let bytes = value.as_bytes();
    let mut out = String::with_capacity(value.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%'
            && i + 3 <= bytes.len()
            && bytes[i + 1].is_ascii_hexdigit()
            && bytes[i + 2].is_ascii_hexdigit()
        {
            if let Ok(code) = u8::from_str_radix(&value[i + 1..i + 3], 16) {
                out.push(code as char);
                i += 3;
                continue;
            }
        }
        let c = value[i..].chars().next().unwrap_or_default();
        out.push(c);
        i += c.len_utf8();
    }
    out
}

/// Format one `key=value` directory segment.
pub fn partition_segment(column: &str, value: Option<&str>) -> String {
    let value = match value {
        Some(v) if !v.is_empty() => escape_partition_value(v),
        _ => DEFAULT_PARTITION.to_string(),
    };
    format!("{}={}", escape_partition_value(column), value)
}

/// Split a data file's path (relative to the table root) into its
/// `(column, value)` partition segments.
pub fn parse_partition_segments(relative: &str) -> Result<Vec<(String, Option<String>)>> {
    let mut segments: Vec<&str> = relative.split('/').collect();
    segments.pop(); // file name
    segments
        .into_iter()
        .map(|segment| {
            let (key, value) = segment
                .split_once('=')
                .ok_or_else(|| EngineError::InvalidPartitionPath(relative.to_string()))?;
            let value = if value == DEFAULT_PARTITION {
                None
            } else {
                Some(unescape_partition_value(value))
            };
            Ok((unescape_partition_value(key), value))
        })
        .collect()
}

// ============================================================================
// Commit Manifest
// ============================================================================

/// Contents of the `_SUCCESS` marker. A table directory is only readable once
/// this has been written, which makes it the durability barrier between a
/// write and any later read of the same table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitManifest {
    pub table: String,
    pub run_id: String,
    pub num_rows: u64,
    pub partition_columns: Vec<PartitionColumn>,
    /// Data files relative to the table root, `/`-separated.
    pub files: Vec<String>,
    pub committed_at: DateTime<Utc>,
}

impl CommitManifest {
    pub fn load(table_dir: &Path) -> Result<Self> {
        let path = table_dir.join(COMMIT_MARKER);
        if !path.is_file() {
            return Err(EngineError::NotCommitted(table_dir.to_path_buf()));
        }
        let text = fs::read_to_string(&path).map_err(io_at(&path))?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn store(&self, table_dir: &Path) -> Result<()> {
        let path = table_dir.join(COMMIT_MARKER);
        let text = serde_json::to_string_pretty(self)?;
        fs::write(&path, text).map_err(io_at(&path))
    }

    pub fn num_partitions(&self) -> usize {
        let mut dirs: Vec<&str> = self
            .files
            .iter()
            .map(|f| f.rsplit_once('/').map(|(dir, _)| dir).unwrap_or(""))
            .collect();
        dirs.sort_unstable();
        dirs.dedup();
        dirs.len()
    }
}
