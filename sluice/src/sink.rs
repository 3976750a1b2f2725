//! Partitioned Parquet writer.
//!
//! A write never touches the target directory until every data file exists:
//!
//! 1. Rows are grouped by the partition columns' values.
//! 2. Each group is written (in parallel) into a staging directory next to
//!    the target, without the partition columns.
//! 3. The previous target is removed and the staging directory renamed into
//!    place.
//! 4. The commit manifest (`_SUCCESS`) is written last.
//!
//! A crash before step 4 leaves a directory that readers refuse to open.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::array::{Array, ArrayRef, AsArray, UInt32Array};
use arrow::compute::{cast, take};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::record_batch::{RecordBatch, RecordBatchOptions};
use chrono::Utc;
use indicatif::{ProgressBar, ProgressStyle};
use parquet::arrow::ArrowWriter;
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::common::{CommitManifest, PartitionColumn, PartitionType, partition_segment};
use crate::context::ExecutionContext;
use crate::error::{EngineError, Result, io_at};
use crate::table::Table;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SaveMode {
    /// Replace whatever is at the target.
    #[default]
    Overwrite,
    /// Fail if the target already exists.
    ErrorIfExists,
}

#[derive(Debug, Clone, Default)]
pub struct WriteOptions {
    pub partition_by: Vec<String>,
    pub mode: SaveMode,
}

impl WriteOptions {
    pub fn overwrite() -> Self {
        Self::default()
    }

    pub fn partition_by(mut self, columns: &[&str]) -> Self {
        self.partition_by = columns.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn mode(mut self, mode: SaveMode) -> Self {
        self.mode = mode;
        self
    }
}

/// Summary of a committed write.
#[derive(Debug, Clone)]
pub struct WriteReport {
    pub path: PathBuf,
    pub num_rows: usize,
    pub num_partitions: usize,
    pub files: Vec<String>,
}

/// One output file: its directory relative to the table root and the rows
/// that belong in it.
struct PartitionGroup {
    dir: String,
    rows: Vec<u32>,
}

pub fn write_parquet(
    ctx: &ExecutionContext,
    table: &Table,
    table_dir: &Path,
    options: &WriteOptions,
) -> Result<WriteReport> {
    if options.mode == SaveMode::ErrorIfExists && table_dir.exists() {
        return Err(EngineError::AlreadyExists(table_dir.to_path_buf()));
    }

    let table_name = table_dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "table".to_string());

    // ── Split the schema into partition and data columns ───────────────────
    let schema = table.schema();
    let mut partition_columns = Vec::with_capacity(options.partition_by.len());
    let mut partition_values: Vec<ArrayRef> = Vec::with_capacity(options.partition_by.len());
    for name in &options.partition_by {
        let array = table.column(name)?;
        partition_columns.push(PartitionColumn {
            name: name.clone(),
            data_type: PartitionType::from_arrow(name, array.data_type())?,
        });
        partition_values.push(cast(array, &DataType::Utf8)?);
    }

    let data_indices: Vec<usize> = (0..schema.fields().len())
        .filter(|&i| !options.partition_by.contains(schema.field(i).name()))
        .collect();
    let data_fields: Vec<Field> = data_indices
        .iter()
        .map(|&i| schema.field(i).clone())
        .collect();
    let data_schema: SchemaRef = Arc::new(Schema::new(data_fields));
    let data_columns: Vec<ArrayRef> = data_indices
        .iter()
        .map(|&i| Arc::clone(table.batch().column(i)))
        .collect();

    let groups = group_rows(&partition_columns, &partition_values, table.num_rows());

    // ── Write into staging ─────────────────────────────────────────────────
    let parent = table_dir.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent).map_err(io_at(parent))?;
    let staging = parent.join(format!(".{table_name}.staging-{}", ctx.run_id()));
    if staging.exists() {
        fs::remove_dir_all(&staging).map_err(io_at(&staging))?;
    }
    fs::create_dir_all(&staging).map_err(io_at(&staging))?;

    let pb = if ctx.config().show_progress {
        let pb = ProgressBar::new(groups.len() as u64);
        if let Ok(style) = ProgressStyle::with_template(
            "  Writing    {bar:40.cyan/blue} {pos}/{len} partitions [{elapsed_precise}]",
        ) {
            pb.set_style(style.progress_chars("##-"));
        }
        pb
    } else {
        ProgressBar::hidden()
    };

    let written: Result<Vec<String>> = groups
        .par_iter()
        .enumerate()
        .map(|(seq, group)| {
            let file_name = format!(
                "part-{seq:05}-{}.{}",
                ctx.run_id(),
                ctx.config().codec.file_suffix()
            );
            let relative = if group.dir.is_empty() {
                file_name
            } else {
                format!("{}/{file_name}", group.dir)
            };
            let indices = UInt32Array::from(group.rows.clone());
            let columns = data_columns
                .iter()
                .map(|c| take(c.as_ref(), &indices, None))
                .collect::<std::result::Result<Vec<_>, _>>()?;
            let options = RecordBatchOptions::new().with_row_count(Some(indices.len()));
            let batch =
                RecordBatch::try_new_with_options(Arc::clone(&data_schema), columns, &options)?;
            write_file(ctx, &staging.join(&relative), &batch)?;
            pb.inc(1);
            Ok(relative)
        })
        .collect();
    pb.finish_and_clear();
    let files = match written {
        Ok(files) => files,
        Err(e) => {
            if let Err(cleanup) = fs::remove_dir_all(&staging) {
                warn!(
                    "  Failed to remove staging directory {}: {cleanup}",
                    staging.display()
                );
            }
            return Err(e);
        }
    };

    // ── Swap staging into place, then commit ───────────────────────────────
    if table_dir.exists() {
        debug!("  Replacing existing {}", table_dir.display());
        fs::remove_dir_all(table_dir).map_err(io_at(table_dir))?;
    }
    fs::rename(&staging, table_dir).map_err(io_at(table_dir))?;

    let manifest = CommitManifest {
        table: table_name,
        run_id: ctx.run_id().to_string(),
        num_rows: table.num_rows() as u64,
        partition_columns,
        files: files.clone(),
        committed_at: Utc::now(),
    };
    manifest.store(table_dir)?;

    let num_partitions = manifest.num_partitions();
    info!(
        "  Wrote {} rows to {} ({} files, {} partitions)",
        table.num_rows(),
        table_dir.display(),
        files.len(),
        num_partitions
    );
    Ok(WriteReport {
        path: table_dir.to_path_buf(),
        num_rows: table.num_rows(),
        num_partitions,
        files,
    })
}

/// Group row indices by partition directory, in sorted directory order. An
/// empty table still yields one group so that its schema is written.
fn group_rows(
    columns: &[PartitionColumn],
    values: &[ArrayRef],
    num_rows: usize,
) -> Vec<PartitionGroup> {
    if num_rows == 0 {
        return vec![PartitionGroup {
            dir: String::new(),
            rows: Vec::new(),
        }];
    }
    let mut groups: BTreeMap<String, Vec<u32>> = BTreeMap::new();
    for row in 0..num_rows {
        let dir = columns
            .iter()
            .zip(values)
            .map(|(pc, array)| {
                let text = array.as_string::<i32>();
                let value = (!text.is_null(row)).then(|| text.value(row));
                partition_segment(&pc.name, value)
            })
            .collect::<Vec<_>>()
            .join("/");
        groups.entry(dir).or_default().push(row as u32);
    }
    groups
        .into_iter()
        .map(|(dir, rows)| PartitionGroup { dir, rows })
        .collect()
}

fn write_file(ctx: &ExecutionContext, path: &Path, batch: &RecordBatch) -> Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).map_err(io_at(dir))?;
    }
    let file = File::create(path).map_err(io_at(path))?;
    let mut writer = ArrowWriter::try_new(file, batch.schema(), Some(ctx.writer_properties()))?;
    if batch.num_rows() > 0 {
        writer.write(batch)?;
    }
    writer.close()?;
    Ok(())
}
