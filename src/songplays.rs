//! The `songplays` fact table: play events resolved against the committed
//! `songs` dimension.

use std::path::Path;

use arrow::datatypes::DataType;
use sluice::{ExecutionContext, Table, WriteReport, col};
use tracing::{info, warn};

use crate::error::{Result, Stage, StageContext};
use crate::schema::LakeTable;
use crate::timestamp::year_month_columns;

/// Event key columns and the song columns they must equal.
const JOIN_KEYS: [(&str, &str); 2] = [("song", "title"), ("artist", "artist_name")];

/// Reduce `songs` to one row per `(title, artist_name)`, keeping the smallest
/// `song_id`, so that a play resolves to at most one song.
pub fn resolve_songs(songs: &Table) -> sluice::Result<Table> {
    songs
        .sort_by(&["song_id"])?
        .distinct_on(&["title", "artist_name"])?
        .select(&[
            col("song_id").cast(DataType::Utf8),
            col("artist_id").cast(DataType::Utf8),
            col("title").cast(DataType::Utf8),
            col("artist_name").cast(DataType::Utf8),
        ])
}

/// Build the fact rows for prepared plays. Ids are reserved for every play
/// before the join, so unmatched plays leave gaps but ids stay increasing.
pub fn build_songplays(
    ctx: &ExecutionContext,
    plays: &Table,
    songs: &Table,
) -> sluice::Result<Table> {
    let events = plays.select(&[
        col("start_time"),
        col("userId").cast(DataType::Int32).alias("user_id"),
        col("level").cast(DataType::Utf8),
        col("sessionId").cast(DataType::Int32).alias("session_id"),
        col("location").cast(DataType::Utf8),
        col("userAgent").cast(DataType::Utf8).alias("user_agent"),
        col("song").cast(DataType::Utf8),
        col("artist").cast(DataType::Utf8),
    ])?;
    let (year, month) = year_month_columns(events.column("start_time")?)?;
    let events = events
        .with_column("year", year)?
        .with_column("month", month)?
        .with_monotonic_id(ctx, "songplay_id")?;

    let resolved = resolve_songs(songs)?;
    let joined = events.inner_join(&resolved, &JOIN_KEYS)?;

    let columns: Vec<_> = LakeTable::Songplays.columns().iter().map(|c| col(c)).collect();
    joined.select(&columns)
}

/// Re-read the committed `songs` table from `output`, build `songplays` from
/// `plays` and overwrite it.
pub fn process_songplays(
    ctx: &ExecutionContext,
    plays: &Table,
    output: &Path,
) -> Result<WriteReport> {
    let songs_dir = LakeTable::Songs.path(output);
    let songs = ctx.read_parquet(&songs_dir).stage(Stage::Songplays)?;
    info!(
        "  Read back {} songs from {}",
        songs.num_rows(),
        songs_dir.display()
    );

    let songplays = build_songplays(ctx, plays, &songs).stage(Stage::Songplays)?;
    if songplays.num_rows() == 0 {
        warn!(
            "No play matched a catalog song; writing an empty {} table",
            LakeTable::Songplays
        );
    } else {
        info!(
            "  Matched {} of {} plays",
            songplays.num_rows(),
            plays.num_rows()
        );
    }

    let target = LakeTable::Songplays;
    ctx.write_parquet(&songplays, &target.path(output), &target.write_options())
        .stage(Stage::Songplays)
}
