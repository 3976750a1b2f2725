//! Inspect a built lake: dump each table's commit manifest, schema, and
//! sample rows in a human-readable format.
//!
//! ## Usage
//!
//! ```sh
//! cargo run --release --bin inspect -- --lake lake/
//! cargo run --release --bin inspect -- --lake lake/ --sample-rows 10
//! ```

use std::path::PathBuf;

use arrow::util::display::{ArrayFormatter, FormatOptions};
use clap::Parser;
use confluence::schema::LakeTable;
use sluice::common::CommitManifest;
use sluice::{EngineConfig, EngineError, ExecutionContext, Table};

#[derive(Parser, Debug)]
#[command(about = "Inspect a lake written by the etl binary")]
struct Args {
    /// Lake root holding the table directories.
    #[arg(long)]
    lake: PathBuf,

    /// Number of sample rows to dump per table (0 to skip).
    #[arg(long, default_value_t = 5)]
    sample_rows: usize,
}

const CELL_WIDTH: usize = 18;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let ctx = ExecutionContext::new(EngineConfig::default());

    let mut manifests = Vec::with_capacity(LakeTable::ALL.len());
    for table in LakeTable::ALL {
        match CommitManifest::load(&table.path(&args.lake)) {
            Ok(m) => manifests.push((table, Some(m))),
            Err(EngineError::NotCommitted(_)) => manifests.push((table, None)),
            Err(e) => return Err(e.into()),
        }
    }
    let committed = manifests.iter().filter(|(_, m)| m.is_some()).count();
    let total_rows: u64 = manifests
        .iter()
        .filter_map(|(_, m)| m.as_ref().map(|m| m.num_rows))
        .sum();

    // ── Overview ──────────────────────────────────────────────────────────
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║  Lake: {}", args.lake.display());
    println!("╠══════════════════════════════════════════════════════════════╣");
    println!("║  Committed tables: {committed:>4} / {}", LakeTable::ALL.len());
    println!("║  Total rows:       {total_rows:>10}");
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();

    // ── Tables ────────────────────────────────────────────────────────────
    for (table, manifest) in &manifests {
        println!("┌─ Table \"{table}\"");
        let Some(manifest) = manifest else {
            println!("│  Not committed (no {} marker)", sluice::common::COMMIT_MARKER);
            println!("└──────────────────────────────────────────────────────────────");
            println!();
            continue;
        };

        let partition_str = if manifest.partition_columns.is_empty() {
            "(none)".to_string()
        } else {
            manifest
                .partition_columns
                .iter()
                .map(|pc| format!("{} ({:?})", pc.name, pc.data_type))
                .collect::<Vec<_>>()
                .join(", ")
        };
        println!(
            "│  Rows: {}  Partitions: {}  Files: {}",
            manifest.num_rows,
            manifest.num_partitions(),
            manifest.files.len()
        );
        println!("│  Partitioned by: {partition_str}");
        println!(
            "│  Run: {}  Committed: {}",
            manifest.run_id,
            manifest.committed_at.to_rfc3339()
        );

        if args.sample_rows > 0 {
            let data = ctx.read_parquet(&table.path(&args.lake))?;
            println!("│");
            print_schema(&data);
            println!("│");
            print_sample(&data, args.sample_rows)?;
        }

        println!("└──────────────────────────────────────────────────────────────");
        println!();
    }

    Ok(())
}

fn print_schema(data: &Table) {
    let schema = data.schema();
    for (i, field) in schema.fields().iter().enumerate() {
        println!("│  [{i}] {} : {}", field.name(), field.data_type());
    }
}

fn print_sample(data: &Table, sample_rows: usize) -> Result<(), Box<dyn std::error::Error>> {
    let n = data.num_rows();
    let show = n.min(sample_rows);
    println!("│  Sample rows (first {show} of {n}):");

    let schema = data.schema();
    print!("│  {:>6}", "row");
    for field in schema.fields() {
        print!(" │ {:>CELL_WIDTH$}", truncate(field.name()));
    }
    println!();

    print!("│  {:─>6}", "");
    for _ in schema.fields() {
        print!("─┼─{:─>CELL_WIDTH$}", "");
    }
    println!();

    let options = FormatOptions::default().with_null("null");
    let formatters = data
        .batch()
        .columns()
        .iter()
        .map(|c| ArrayFormatter::try_new(c.as_ref(), &options))
        .collect::<Result<Vec<_>, _>>()?;
    for row in 0..show {
        print!("│  {row:>6}");
        for formatter in &formatters {
            let cell = formatter.value(row).to_string();
            print!(" │ {:>CELL_WIDTH$}", truncate(&cell));
        }
        println!();
    }
    if n > show {
        println!("│  ... ({} more rows)", n - show);
    }
    Ok(())
}

fn truncate(text: &str) -> String {
    text.chars().take(CELL_WIDTH).collect()
}
