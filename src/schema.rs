//! Input layout and the lake's output tables.

use std::fmt;
use std::path::{Path, PathBuf};

use sluice::WriteOptions;

/// Song catalog directory under the input root; files sit 4 levels below it.
pub const SONG_DATA_DIR: &str = "song_data";
pub const SONG_DATA_DEPTH: usize = 4;

/// Event log directory under the input root; files sit 3 levels below it.
pub const LOG_DATA_DIR: &str = "log_data";
pub const LOG_DATA_DEPTH: usize = 3;

/// Only events with this `page` value are plays.
pub const NEXT_SONG: &str = "NextSong";

// ============================================================================
// Lake Tables
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LakeTable {
    Songs,
    Artists,
    Users,
    Time,
    Songplays,
}

impl LakeTable {
    /// In the order a run writes them.
    pub const ALL: [LakeTable; 5] = [
        LakeTable::Songs,
        LakeTable::Artists,
        LakeTable::Users,
        LakeTable::Time,
        LakeTable::Songplays,
    ];

    pub fn name(self) -> &'static str {
        match self {
            LakeTable::Songs => "songs",
            LakeTable::Artists => "artists",
            LakeTable::Users => "users",
            LakeTable::Time => "time",
            LakeTable::Songplays => "songplays",
        }
    }

    pub fn partition_by(self) -> &'static [&'static str] {
        match self {
            LakeTable::Songs => &["year", "artist_name"],
            LakeTable::Time | LakeTable::Songplays => &["year", "month"],
            LakeTable::Artists | LakeTable::Users => &[],
        }
    }

    /// Column order of the table as written, partition columns included.
    pub fn columns(self) -> &'static [&'static str] {
        match self {
            LakeTable::Songs => &[
                "song_id",
                "title",
                "artist_id",
                "artist_name",
                "year",
                "duration",
            ],
            LakeTable::Artists => &["artist_id", "name", "location", "latitude", "longitude"],
            LakeTable::Users => &["user_id", "first_name", "last_name", "gender", "level"],
            LakeTable::Time => &[
                "start_time",
                "year",
                "month",
                "week",
                "weekday",
                "day",
                "hour",
            ],
            LakeTable::Songplays => &[
                "songplay_id",
                "start_time",
                "song_id",
                "artist_id",
                "user_id",
                "level",
                "session_id",
                "location",
                "user_agent",
                "year",
                "month",
            ],
        }
    }

    pub fn path(self, output: &Path) -> PathBuf {
        output.join(self.name())
    }

    pub fn write_options(self) -> WriteOptions {
        WriteOptions::overwrite().partition_by(self.partition_by())
    }
}

impl fmt::Display for LakeTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
