//! Event pipeline: play logs into the `users` and `time` dimensions, then the
//! `songplays` fact table.

use std::path::Path;

use arrow::datatypes::DataType;
use sluice::{ExecutionContext, Table, WriteReport, col};
use tracing::info;

use crate::error::{Result, Stage, StageContext};
use crate::schema::{LOG_DATA_DEPTH, LOG_DATA_DIR, LakeTable, NEXT_SONG};
use crate::songplays;
use crate::timestamp::{Timezone, calendar_columns, start_time_column};

#[derive(Debug, Clone)]
pub struct EventSummary {
    pub events: usize,
    pub plays: usize,
    pub users: WriteReport,
    pub time: WriteReport,
    pub songplays: WriteReport,
}

// ============================================================================
// Builders
// ============================================================================

/// Keep `NextSong` events and attach their derived `start_time`. Every later
/// step reads `start_time` from here instead of recomputing it.
pub fn prepare_plays(events: &Table, tz: Timezone) -> sluice::Result<Table> {
    let plays = events.filter_eq("page", NEXT_SONG)?;
    let start_time = start_time_column(plays.column("ts")?, tz)?;
    plays.with_column("start_time", start_time)
}

/// One row per distinct `(user_id, first_name, last_name, gender, level)`.
pub fn build_users(plays: &Table) -> sluice::Result<Table> {
    plays
        .select(&[
            col("userId").cast(DataType::Int32).alias("user_id"),
            col("firstName").cast(DataType::Utf8).alias("first_name"),
            col("lastName").cast(DataType::Utf8).alias("last_name"),
            col("gender").cast(DataType::Utf8),
            col("level").cast(DataType::Utf8),
        ])?
        .distinct()
}

/// One row per distinct `start_time`, with its calendar fields.
pub fn build_time(plays: &Table) -> sluice::Result<Table> {
    let mut time = plays.select(&[col("start_time")])?.distinct()?;
    for (name, array) in calendar_columns(time.column("start_time")?)? {
        time = time.with_column(name, array)?;
    }
    Ok(time)
}

// ============================================================================
// Pipeline
// ============================================================================

/// Read the logs under `<input>/log_data`, overwrite `users` and `time`, then
/// build `songplays` against the `songs` table already committed in `output`.
pub fn process_log_data(
    ctx: &ExecutionContext,
    input: &Path,
    output: &Path,
    tz: Timezone,
) -> Result<EventSummary> {
    let log_data = input.join(LOG_DATA_DIR);

    info!("Step 4: Reading event logs from {}...", log_data.display());
    let events = ctx
        .read_ndjson(&log_data, LOG_DATA_DEPTH)
        .stage(Stage::Events)?;
    let plays = prepare_plays(&events, tz).stage(Stage::Events)?;
    info!(
        "  {} {NEXT_SONG} events out of {} (timezone {tz})",
        plays.num_rows(),
        events.num_rows()
    );

    info!("Step 5: Building users...");
    let users = build_users(&plays).stage(Stage::Events)?;
    info!("  {} users", users.num_rows());
    let users_report = write(ctx, &users, LakeTable::Users, output)?;

    info!("Step 6: Building time...");
    let time = build_time(&plays).stage(Stage::Events)?;
    info!("  {} distinct start times", time.num_rows());
    let time_report = write(ctx, &time, LakeTable::Time, output)?;

    info!("Step 7: Building songplays...");
    let songplays_report = songplays::process_songplays(ctx, &plays, output)?;

    Ok(EventSummary {
        events: events.num_rows(),
        plays: plays.num_rows(),
        users: users_report,
        time: time_report,
        songplays: songplays_report,
    })
}

fn write(
    ctx: &ExecutionContext,
    table: &Table,
    target: LakeTable,
    output: &Path,
) -> Result<WriteReport> {
    ctx.write_parquet(table, &target.path(output), &target.write_options())
        .stage(Stage::Events)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Arc;

    use arrow::array::{Array, ArrayRef, AsArray, Int64Array, StringArray};
    use arrow::datatypes::Int32Type;

    /// Events in log order: a login, two plays by user 39 (who upgrades
    /// between them), a play with an empty user id and a home page visit.
    pub(crate) fn events() -> Table {
        let s = |v: Vec<Option<&str>>| Arc::new(StringArray::from(v)) as ArrayRef;
        Table::from_columns(vec![
            (
                "artist",
                s(vec![None, Some("Adele"), Some("Adele"), Some("Nobody"), None]),
            ),
            (
                "firstName",
                s(vec![Some("Kate"), Some("Kate"), Some("Kate"), None, Some("Kate")]),
            ),
            (
                "gender",
                s(vec![Some("F"), Some("F"), Some("F"), None, Some("F")]),
            ),
            (
                "lastName",
                s(vec![Some("H"), Some("H"), Some("H"), None, Some("H")]),
            ),
            (
                "level",
                s(vec![Some("free"), Some("free"), Some("paid"), Some("free"), Some("paid")]),
            ),
            (
                "location",
                s(vec![Some("SF"), Some("SF"), Some("SF"), None, Some("SF")]),
            ),
            (
                "page",
                s(vec![
                    Some("Login"),
                    Some("NextSong"),
                    Some("NextSong"),
                    Some("NextSong"),
                    Some("Home"),
                ]),
            ),
            (
                "sessionId",
                Arc::new(Int64Array::from(vec![7, 7, 7, 8, 7])) as ArrayRef,
            ),
            (
                "song",
                s(vec![
                    None,
                    Some("Chasing Pavements"),
                    Some("Chasing Pavements"),
                    Some("Lost"),
                    None,
                ]),
            ),
            (
                "ts",
                Arc::new(Int64Array::from(vec![
                    1_542_242_800_000,
                    1_542_242_826_796,
                    1_542_242_826_796,
                    1_543_622_400_000,
                    1_542_242_900_000,
                ])) as ArrayRef,
            ),
            (
                "userAgent",
                s(vec![Some("ua"), Some("ua"), Some("ua"), None, Some("ua")]),
            ),
            (
                "userId",
                s(vec![Some("39"), Some("39"), Some("39"), Some(""), Some("39")]),
            ),
        ])
        .unwrap()
    }

    #[test]
    fn test_prepare_plays_keeps_next_song_only() {
        let plays = prepare_plays(&events(), Timezone::Utc).unwrap();
        assert_eq!(plays.num_rows(), 3);
        let pages = plays.column("page").unwrap().as_string::<i32>();
        assert!(pages.iter().all(|p| p == Some(NEXT_SONG)));
        let st = plays.column("start_time").unwrap().as_string::<i32>();
        assert_eq!(st.value(0), "2018-11-15T00:47:06.796000");
        assert_eq!(st.value(2), "2018-12-01T00:00:00");
    }

    #[test]
    fn test_prepare_plays_drops_null_page() {
        let table = Table::from_columns(vec![
            (
                "page",
                Arc::new(StringArray::from(vec![None, Some("NextSong")])) as ArrayRef,
            ),
            ("ts", Arc::new(Int64Array::from(vec![1, 2])) as ArrayRef),
        ])
        .unwrap();
        assert_eq!(prepare_plays(&table, Timezone::Utc).unwrap().num_rows(), 1);
    }

    #[test]
    fn test_build_users_one_row_per_level() {
        let plays = prepare_plays(&events(), Timezone::Utc).unwrap();
        let users = build_users(&plays).unwrap();
        assert_eq!(
            users.column_names(),
            LakeTable::Users.columns().iter().map(|c| c.to_string()).collect::<Vec<_>>()
        );
        // 39/free, 39/paid and the anonymous play.
        assert_eq!(users.num_rows(), 3);
        let ids = users.column("user_id").unwrap().as_primitive::<Int32Type>();
        assert_eq!(ids.value(0), 39);
        assert_eq!(ids.value(1), 39);
        assert!(ids.is_null(2));
        let levels = users.column("level").unwrap().as_string::<i32>();
        assert_eq!(levels.value(0), "free");
        assert_eq!(levels.value(1), "paid");
    }

    #[test]
    fn test_build_time_one_row_per_start_time() {
        let plays = prepare_plays(&events(), Timezone::Utc).unwrap();
        let time = build_time(&plays).unwrap();
        assert_eq!(
            time.column_names(),
            LakeTable::Time.columns().iter().map(|c| c.to_string()).collect::<Vec<_>>()
        );
        assert_eq!(time.num_rows(), 2);
        let col = |name: &str| time.column(name).unwrap().as_primitive::<Int32Type>().value(0);
        assert_eq!(
            (col("year"), col("month"), col("week"), col("weekday"), col("day"), col("hour")),
            (2018, 11, 46, 5, 15, 0)
        );
    }

    #[test]
    fn test_missing_ts_column_is_an_error() {
        let table = Table::from_columns(vec![(
            "page",
            Arc::new(StringArray::from(vec!["NextSong"])) as ArrayRef,
        )])
        .unwrap();
        assert!(prepare_plays(&table, Timezone::Utc).is_err());
    }
}
