//! Whole-run orchestration: the catalog first, then the event pipeline whose
//! fact join reads the catalog's committed `songs` output.

use std::path::Path;
use std::time::{Duration, Instant};

use sluice::ExecutionContext;
use tracing::info;

use crate::catalog::{self, CatalogSummary};
use crate::error::Result;
use crate::events::{self, EventSummary};
use crate::timestamp::Timezone;

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub catalog: CatalogSummary,
    pub events: EventSummary,
    pub elapsed: Duration,
}

pub fn run(
    ctx: &ExecutionContext,
    input: &Path,
    output: &Path,
    tz: Timezone,
) -> Result<RunSummary> {
    let start = Instant::now();
    info!("Input:  {}", input.display());
    info!("Output: {}", output.display());

    let catalog = catalog::process_song_data(ctx, input, output)?;
    let events = events::process_log_data(ctx, input, output, tz)?;

    let elapsed = start.elapsed();
    info!(
        "Run {} finished in {:.2?}: {} songs, {} artists, {} users, {} times, {} songplays",
        ctx.run_id(),
        elapsed,
        catalog.songs.num_rows,
        catalog.artists.num_rows,
        events.users.num_rows,
        events.time.num_rows,
        events.songplays.num_rows
    );
    Ok(RunSummary {
        catalog,
        events,
        elapsed,
    })
}
