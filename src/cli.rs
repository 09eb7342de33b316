use anyhow::{bail, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::workflows::filters::Filter;

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum FilterKind {
    All,
    States,
    Genres,
    Available,
    Unwatched,
}

impl FilterKind {
    /// Pairs the kind with its value. `states`, `genres` and `available`
    /// need one; the others ignore it.
    pub fn into_filter(self, value: Option<&str>) -> Result<Filter> {
        let value = value.map(str::trim).filter(|v| !v.is_empty());
        let filter = match (self, value) {
            (FilterKind::All, _) => Filter::All,
            (FilterKind::Unwatched, _) => Filter::Unwatched,
            (FilterKind::States, Some(v)) => Filter::States(v.parse()?),
            (FilterKind::Genres, Some(v)) => Filter::Genres(v.to_string()),
            (FilterKind::Available, Some(v)) => Filter::Available(v.to_string()),
            (kind, None) => bail!("Filter '{kind:?}' needs a value"),
        };
        Ok(filter)
    }
}

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum TagAction {
    Add,
    Remove,
}

#[derive(Parser)]
#[command(name = "tvr")]
#[command(about = "Keep a TV show library in sync with the episode files on disk")]
pub struct Cli {
    /// Log at debug level
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Config file to use instead of the default location
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create records for show directories found in the index files
    Import,

    /// Look up provider ids and refresh show metadata
    Fetch {
        /// Also refresh shows that have ended
        #[arg(long)]
        all: bool,
    },

    /// Bind episode files listed in the index files to their episodes
    Scan {
        /// Only scan this show (disk name)
        show: Option<String>,
    },

    /// Recompute which episodes aired recently and are not downloaded
    Availability,

    /// Import, fetch, scan and recompute availability in one go
    Refresh,

    /// List shows matching a filter
    Filter {
        #[arg(value_enum, default_value = "all")]
        kind: FilterKind,

        /// State group, genre or air day, depending on the filter
        value: Option<String>,
    },

    /// Print every show grouping
    Groups,

    /// Mark an episode file as seen
    Seen {
        /// Path the episode is currently bound to
        old_path: String,

        /// Path after renaming; defaults to the name with a leading `-`
        new_path: Option<String>,
    },

    /// Add a show by name
    Add { name: String },

    /// Remove a show and its cached cover
    Remove { show: String },

    /// Hide a show from the unwatched listing
    Ignore {
        show: String,

        /// Show it again
        #[arg(long)]
        undo: bool,
    },

    /// Add or remove a tag on a show
    Tag {
        show: String,

        #[arg(value_enum)]
        action: TagAction,

        tag: String,
    },

    /// List index lines that belong to no known show
    Unknown,
}
