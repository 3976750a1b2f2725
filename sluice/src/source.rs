//! Readers: newline-delimited JSON input trees and committed Parquet tables.

use std::fs::{self, File};
use std::io::{self, Cursor};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::array::ArrayRef;
use arrow::datatypes::{Field, Schema, SchemaRef};
use arrow::json::ReaderBuilder;
use arrow::json::reader::infer_json_schema;
use arrow::record_batch::RecordBatch;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::common::{CommitManifest, parse_partition_segments};
use crate::context::ExecutionContext;
use crate::error::{EngineError, Result, io_at};
use crate::table::Table;

// ============================================================================
// NDJSON
// ============================================================================

/// List the files with `extension` that sit exactly `depth` levels below
/// `root`, i.e. the matches of `root/*/…/*.ext` with `depth` stars. Hidden
/// entries are skipped. Paths come back sorted.
pub fn discover_files(root: &Path, depth: usize, extension: &str) -> Result<Vec<PathBuf>> {
    if !root.exists() {
        return Err(EngineError::Io {
            path: root.to_path_buf(),
            source: io::ErrorKind::NotFound.into(),
        });
    }
    let mut files = Vec::new();
    let walker = WalkDir::new(root)
        .min_depth(depth)
        .max_depth(depth)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !e.file_name().to_string_lossy().starts_with('.'));
    for entry in walker {
        let entry = entry?;
        if entry.file_type().is_file()
            && entry.path().extension().and_then(|e| e.to_str()) == Some(extension)
        {
            files.push(entry.into_path());
        }
    }
    files.sort();
    Ok(files)
}

fn glob_pattern(root: &Path, depth: usize, extension: &str) -> String {
    let stars = vec!["*"; depth.saturating_sub(1)];
    let mut pattern = root.display().to_string();
    for s in stars {
        pattern.push('/');
        pattern.push_str(s);
    }
    format!("{pattern}/*.{extension}")
}

/// Read every JSON record under `root` at `depth`. One schema is inferred
/// over all records of all files, so a field that is an integer in one file
/// and a float in another is read as a float everywhere.
pub fn read_ndjson(ctx: &ExecutionContext, root: &Path, depth: usize) -> Result<Table> {
    let files = discover_files(root, depth, "json")?;
    if files.is_empty() {
        return Err(EngineError::NoInputFiles {
            pattern: glob_pattern(root, depth, "json"),
        });
    }

    let mut buffer = Vec::new();
    for path in &files {
        let bytes = fs::read(path).map_err(io_at(path))?;
        buffer.extend_from_slice(&bytes);
        if !bytes.ends_with(b"\n") {
            buffer.push(b'\n');
        }
    }

    let limit = ctx.config().schema_inference_limit;
    let (schema, num_records) = infer_json_schema(Cursor::new(&buffer), limit)?;
    let schema: SchemaRef = Arc::new(schema);
    debug!(
        "  Inferred {} fields from {} records",
        schema.fields().len(),
        num_records
    );

    let reader = ReaderBuilder::new(Arc::clone(&schema))
        .with_batch_size(ctx.config().batch_size)
        .with_coerce_primitive(true)
        .build(Cursor::new(&buffer))?;
    let batches: Vec<RecordBatch> = reader.collect::<std::result::Result<Vec<_>, _>>()?;
    let table = Table::from_batches(schema, &batches)?;

    info!(
        "  Read {} records from {} files under {}",
        table.num_rows(),
        files.len(),
        root.display()
    );
    Ok(table)
}

// ============================================================================
// Parquet
// ============================================================================

/// Read a table written by [`crate::sink::write_parquet`]. Fails unless the
/// table's commit marker exists. Partition columns are rebuilt from the
/// directory names and appended after the data columns.
pub fn read_parquet(ctx: &ExecutionContext, table_dir: &Path) -> Result<Table> {
    let manifest = CommitManifest::load(table_dir)?;

    let mut data_schema: Option<SchemaRef> = None;
    let mut batches: Vec<RecordBatch> = Vec::new();

    for relative in &manifest.files {
        let path = table_dir.join(relative);
        let segments = parse_partition_segments(relative)?;

        let file = File::open(&path).map_err(io_at(&path))?;
        let builder = ParquetRecordBatchReaderBuilder::try_new(file)?;
        let file_schema = Arc::clone(builder.schema());
        let reader = builder.with_batch_size(ctx.config().batch_size).build()?;

        for batch in reader {
            let batch = batch?;
            let mut columns: Vec<ArrayRef> = batch.columns().to_vec();
            for pc in &manifest.partition_columns {
                let value = segments
                    .iter()
                    .find(|(name, _)| name == &pc.name)
                    .and_then(|(_, v)| v.as_deref());
                columns.push(pc.data_type.constant_array(value, batch.num_rows())?);
            }
            batches.push(RecordBatch::try_new(
                with_partition_fields(&file_schema, &manifest),
                columns,
            )?);
        }
        data_schema.get_or_insert(file_schema);
    }

    let schema = match data_schema {
        Some(s) => with_partition_fields(&s, &manifest),
        None => with_partition_fields(&Arc::new(Schema::empty()), &manifest),
    };
    let table = Table::from_batches(schema, &batches)?;
    debug!(
        "  Read {} rows from {} files in {}",
        table.num_rows(),
        manifest.files.len(),
        table_dir.display()
    );
    Ok(table)
}

fn with_partition_fields(data_schema: &SchemaRef, manifest: &CommitManifest) -> SchemaRef {
    let mut fields: Vec<Field> = data_schema
        .fields()
        .iter()
        .map(|f| f.as_ref().clone())
        .collect();
    for pc in &manifest.partition_columns {
        fields.push(Field::new(&pc.name, pc.data_type.to_arrow(), true));
    }
    Arc::new(Schema::new(fields))
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Array, AsArray};
    use arrow::datatypes::{DataType, Float64Type, Int64Type};

    fn write(path: &Path, contents: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    #[test]
    fn test_discover_files_respects_depth() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write(&root.join("A/B/C/one.json"), "{}");
        write(&root.join("A/B/C/two.json"), "{}");
        write(&root.join("A/B/shallow.json"), "{}");
        write(&root.join("A/B/C/D/deep.json"), "{}");
        write(&root.join("A/B/C/notes.txt"), "");
        write(&root.join("A/B/C/.hidden.json"), "{}");
        write(&root.join("A/.checkpoints/C/skipped.json"), "{}");

        let files = discover_files(root, 4, "json").unwrap();
        let names: Vec<String> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["one.json", "two.json"]);
    }

    #[test]
    fn test_discover_files_missing_root() {
        let dir = tempfile::tempdir().unwrap();
        let err = discover_files(&dir.path().join("nope"), 3, "json").unwrap_err();
        assert!(matches!(err, EngineError::Io { .. }));
    }

    #[test]
    fn test_read_ndjson_no_files_reports_pattern() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ExecutionContext::default();
        let err = read_ndjson(&ctx, dir.path(), 3).unwrap_err();
        match err {
            EngineError::NoInputFiles { pattern } => assert!(pattern.ends_with("/*/*/*.json")),
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn test_read_ndjson_merges_numeric_types_across_files() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        // First file has no trailing newline; the second has two records.
        write(
            &root.join("a/b/1.json"),
            r#"{"song_id": "S1", "year": 0, "duration": 218}"#,
        );
        write(
            &root.join("a/c/2.json"),
            "{\"song_id\": \"S2\", \"year\": 2004, \"duration\": 118.2}\n\n{\"song_id\": \"S3\", \"year\": 1999, \"duration\": 12.5}\n",
        );

        let ctx = ExecutionContext::default();
        let table = read_ndjson(&ctx, root, 3).unwrap();
        assert_eq!(table.num_rows(), 3);
        assert_eq!(table.column("year").unwrap().data_type(), &DataType::Int64);
        let duration = table.column("duration").unwrap().as_primitive::<Float64Type>();
        assert_eq!(duration.value(0), 218.0);
        let years = table.column("year").unwrap().as_primitive::<Int64Type>();
        assert_eq!(years.value(1), 2004);
    }

    #[test]
    fn test_read_ndjson_coerces_numbers_in_string_fields() {
        let dir = tempfile::tempdir().unwrap();
        write(
            &dir.path().join("x/y/z/log.json"),
            "{\"userId\": 39}\n{\"userId\": \"\"}\n",
        );
        let ctx = ExecutionContext::default();
        let table = read_ndjson(&ctx, dir.path(), 4).unwrap();
        let ids = table.column("userId").unwrap().as_string::<i32>();
        assert_eq!(ids.value(0), "39");
        assert_eq!(ids.value(1), "");
        assert_eq!(ids.null_count(), 0);
    }

    #[test]
    fn test_read_ndjson_malformed_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        write(&dir.path().join("x/bad.json"), "{\"song_id\": ");
        let ctx = ExecutionContext::default();
        assert!(read_ndjson(&ctx, dir.path(), 2).is_err());
    }

    #[test]
    fn test_read_parquet_requires_commit_marker() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ExecutionContext::default();
        let err = read_parquet(&ctx, dir.path()).unwrap_err();
        assert!(matches!(err, EngineError::NotCommitted(_)));
    }
}
