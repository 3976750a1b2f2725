//! Run the full lake build: catalog, then events and the fact join.
//!
//! ## Usage
//!
//! ```sh
//! cargo run --release --bin etl -- data/ lake/
//! cargo run --release --bin etl -- --config dl.cfg
//! CONFLUENCE__ENGINE__TIMEZONE=local cargo run --release --bin etl
//! cargo run --release --bin etl -- data/ lake/ --timezone +05:30
//! ```

use std::path::PathBuf;

use clap::Parser;
use confluence::config::{DEFAULT_CONFIG_FILE, EtlConfig, StorageCredentials};
use confluence::error::EtlError;
use confluence::pipeline;
use confluence::timestamp::Timezone;
use sluice::ExecutionContext;
use tracing::{debug, info};

#[derive(Parser, Debug)]
#[command(about = "Build the song-play star schema from raw JSON logs")]
struct Args {
    /// Root holding `song_data/` and `log_data/`. Defaults to `paths.input_data`.
    input: Option<PathBuf>,

    /// Lake root the five tables are written under. Defaults to `paths.output_data`.
    output: Option<PathBuf>,

    /// INI configuration file. Missing files are ignored.
    #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Timezone for `start_time` (`UTC`, `local` or `+HH:MM`). Overrides
    /// `engine.timezone`.
    #[arg(long)]
    timezone: Option<String>,
}

/// Expose credentials to storage clients through the usual variables, without
/// clobbering ones already set.
fn export_credentials(creds: &StorageCredentials) {
    for (key, value) in [
        ("AWS_ACCESS_KEY_ID", &creds.aws_access_key_id),
        ("AWS_SECRET_ACCESS_KEY", &creds.aws_secret_access_key),
    ] {
        if std::env::var_os(key).is_none() {
            // SAFETY: called from main before any other thread is started.
            unsafe { std::env::set_var(key, value) };
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();
    let config = EtlConfig::load(&args.config)?;
    debug!("Loaded configuration from {}: {config:?}", args.config.display());

    if let Some(creds) = &config.aws_credentials {
        export_credentials(creds);
        info!("Exported storage credentials from {}", args.config.display());
    }

    let input = args
        .input
        .or(config.paths.input_data.clone())
        .ok_or(EtlError::MissingPath("input path"))?;
    let output = args
        .output
        .or(config.paths.output_data.clone())
        .ok_or(EtlError::MissingPath("output path"))?;

    let timezone: Timezone = match &args.timezone {
        Some(tz) => tz.parse().map_err(EtlError::from)?,
        None => config.engine.timezone,
    };

    let ctx = ExecutionContext::new(config.engine.engine_config());
    let summary = pipeline::run(&ctx, &input, &output, timezone)?;

    info!(
        "Read {} catalog records and {} events ({} plays) in {:.2?}",
        summary.catalog.records, summary.events.events, summary.events.plays, summary.elapsed
    );
    Ok(())
}
