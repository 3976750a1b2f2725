use std::fmt;

use sluice::EngineError;
use thiserror::Error;

use crate::timestamp::InvalidTimezone;

/// The pipeline stage an engine failure happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Catalog,
    Events,
    Songplays,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Catalog => "catalog",
            Stage::Events => "events",
            Stage::Songplays => "songplays",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum EtlError {
    #[error("failed to load configuration: {0}")]
    Config(#[from] config::ConfigError),

    #[error(transparent)]
    Timezone(#[from] InvalidTimezone),

    #[error("missing {0}: pass it on the command line or set it in the config file")]
    MissingPath(&'static str),

    #[error("{stage} stage failed: {source}")]
    Stage {
        stage: Stage,
        #[source]
        source: EngineError,
    },
}

pub type Result<T> = std::result::Result<T, EtlError>;

/// Tag engine errors with the stage they surfaced in.
pub trait StageContext<T> {
    fn stage(self, stage: Stage) -> Result<T>;
}

impl<T> StageContext<T> for sluice::Result<T> {
    fn stage(self, stage: Stage) -> Result<T> {
        self.map_err(|source| EtlError::Stage { stage, source })
    }
}
