//! Catalog pipeline: song metadata records into the `songs` and `artists`
//! dimensions.

use std::path::Path;

use arrow::datatypes::DataType;
use sluice::{ColumnExpr, ExecutionContext, Table, WriteReport, col};
use tracing::info;

use crate::error::{Result, Stage, StageContext};
use crate::schema::{LakeTable, SONG_DATA_DEPTH, SONG_DATA_DIR};

const ARTIST_PREFIX: &str = "artist_";

/// Artist attributes carried by every catalog record, prefixed.
const ARTIST_SOURCE_COLUMNS: [(&str, Option<DataType>); 4] = [
    ("artist_name", None),
    ("artist_location", None),
    ("artist_latitude", Some(DataType::Float64)),
    ("artist_longitude", Some(DataType::Float64)),
];

#[derive(Debug, Clone)]
pub struct CatalogSummary {
    pub records: usize,
    pub songs: WriteReport,
    pub artists: WriteReport,
}

// ============================================================================
// Builders
// ============================================================================

/// Project the song columns and drop exact-duplicate rows.
pub fn build_songs(catalog: &Table) -> sluice::Result<Table> {
    catalog
        .select(&[
            col("song_id").cast(DataType::Utf8),
            col("title").cast(DataType::Utf8),
            col("artist_id").cast(DataType::Utf8),
            col("artist_name").cast(DataType::Utf8),
            col("year").cast(DataType::Int64),
            col("duration").cast(DataType::Float64),
        ])?
        .distinct()
}

/// Project `artist_id` plus the `artist_`-prefixed attributes with the prefix
/// stripped, and drop exact-duplicate rows.
pub fn build_artists(catalog: &Table) -> sluice::Result<Table> {
    let mut exprs: Vec<ColumnExpr> = vec![col("artist_id").cast(DataType::Utf8)];
    for (source, data_type) in ARTIST_SOURCE_COLUMNS {
        let name = source.strip_prefix(ARTIST_PREFIX).unwrap_or(source);
        exprs.push(
            col(source)
                .cast(data_type.unwrap_or(DataType::Utf8))
                .alias(name),
        );
    }
    catalog.select(&exprs)?.distinct()
}

// ============================================================================
// Pipeline
// ============================================================================

/// Read the catalog under `<input>/song_data` and overwrite `songs` and
/// `artists` under `output`.
pub fn process_song_data(
    ctx: &ExecutionContext,
    input: &Path,
    output: &Path,
) -> Result<CatalogSummary> {
    let song_data = input.join(SONG_DATA_DIR);

    info!("Step 1: Reading song catalog from {}...", song_data.display());
    let catalog = ctx
        .read_ndjson(&song_data, SONG_DATA_DEPTH)
        .stage(Stage::Catalog)?;

    info!("Step 2: Building songs...");
    let songs = build_songs(&catalog).stage(Stage::Catalog)?;
    info!(
        "  {} songs from {} records",
        songs.num_rows(),
        catalog.num_rows()
    );
    let songs_report = write(ctx, &songs, LakeTable::Songs, output)?;

    info!("Step 3: Building artists...");
    let artists = build_artists(&catalog).stage(Stage::Catalog)?;
    info!("  {} artists", artists.num_rows());
    let artists_report = write(ctx, &artists, LakeTable::Artists, output)?;

    Ok(CatalogSummary {
        records: catalog.num_rows(),
        songs: songs_report,
        artists: artists_report,
    })
}

fn write(
    ctx: &ExecutionContext,
    table: &Table,
    target: LakeTable,
    output: &Path,
) -> Result<WriteReport> {
    ctx.write_parquet(table, &target.path(output), &target.write_options())
        .stage(Stage::Catalog)
}
