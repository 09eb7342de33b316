//! Named show collections derived from the store.
//!
//! Groupings are rebuilt whenever the store revision or the current date
//! moves on, or after [`ShowFilters::invalidate`].

use anyhow::Result;
use chrono::{Datelike, NaiveDate};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use crate::domain::models::Show;
use crate::infra::store::ShowStore;

/// Sort key for air days that are not a weekday name.
const UNKNOWN_DAY_RANK: u32 = 999;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    All,
    States(StateGroup),
    Genres(String),
    Available(String),
    Unwatched,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum StateGroup {
    Unwatched,
    Available,
    Running,
    Ended,
    Ignored,
}

impl StateGroup {
    pub const ALL: [StateGroup; 5] = [
        StateGroup::Unwatched,
        StateGroup::Available,
        StateGroup::Running,
        StateGroup::Ended,
        StateGroup::Ignored,
    ];

    fn contains(self, show: &Show, today: NaiveDate) -> bool {
        match self {
            StateGroup::Unwatched => is_recently_unwatched(show, today),
            StateGroup::Available => show.has_available_episodes(),
            StateGroup::Running => !show.has_ended(),
            StateGroup::Ended => show.has_ended(),
            StateGroup::Ignored => show.ignore_unwatched,
        }
    }
}

impl fmt::Display for StateGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StateGroup::Unwatched => "unwatched",
            StateGroup::Available => "available",
            StateGroup::Running => "running",
            StateGroup::Ended => "ended",
            StateGroup::Ignored => "ignored",
        };
        f.write_str(name)
    }
}

impl FromStr for StateGroup {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        StateGroup::ALL
            .into_iter()
            .find(|group| group.to_string().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| anyhow::anyhow!("Unknown state group: {s}"))
    }
}

/// Precomputed show buckets.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterGroups {
    pub states: BTreeMap<StateGroup, Vec<Show>>,
    /// One bucket per air day, in weekday order starting Sunday.
    pub available: Vec<(String, Vec<Show>)>,
    pub genres: BTreeMap<String, Vec<Show>>,
}

#[derive(Debug)]
struct CachedGroups {
    revision: u64,
    today: NaiveDate,
    groups: FilterGroups,
}

/// Owner of the cached groupings.
#[derive(Debug, Default)]
pub struct ShowFilters {
    cached: Option<CachedGroups>,
}

impl ShowFilters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn invalidate(&mut self) {
        self.cached = None;
    }

    pub fn groups(&mut self, store: &ShowStore, today: NaiveDate) -> &FilterGroups {
        let revision = store.revision();
        let fresh = self
            .cached
            .as_ref()
            .is_some_and(|c| c.revision == revision && c.today == today);
        if !fresh {
            self.cached = None;
        }
        let cached = self.cached.get_or_insert_with(|| {
            tracing::debug!(revision, "rebuilding show groups");
            CachedGroups {
                revision,
                today,
                groups: build_groups(&store.all(), today),
            }
        });
        &cached.groups
    }

    pub fn filter_shows(&mut self, store: &ShowStore, filter: &Filter, today: NaiveDate) -> Vec<Show> {
        match filter {
            Filter::States(group) => self
                .groups(store, today)
                .states
                .get(group)
                .cloned()
                .unwrap_or_default(),
            other => filter_shows(&store.all(), other, today),
        }
    }
}

/// Applies a filter to `shows`, returning matches ordered by lowercase name.
pub fn filter_shows(shows: &[Show], filter: &Filter, today: NaiveDate) -> Vec<Show> {
    let keep = |show: &&Show| match filter {
        Filter::All => true,
        Filter::States(group) => group.contains(show, today),
        Filter::Genres(genre) => has_genre(show, genre),
        Filter::Available(day) => show.airday() == Some(day.as_str()) && show.has_available_episodes(),
        Filter::Unwatched => is_recently_unwatched(show, today),
    };
    sorted(shows.iter().filter(keep).cloned().collect())
}

pub fn build_groups(shows: &[Show], today: NaiveDate) -> FilterGroups {
    let states = StateGroup::ALL
        .into_iter()
        .map(|group| (group, filter_shows(shows, &Filter::States(group), today)))
        .collect();

    let mut available: Vec<(String, Vec<Show>)> = airdays(shows)
        .into_iter()
        .map(|day| {
            let members = filter_shows(shows, &Filter::Available(day.clone()), today);
            (day, members)
        })
        .collect();
    available.sort_by(|(a, _), (b, _)| weekday_rank(a).cmp(&weekday_rank(b)).then_with(|| a.cmp(b)));

    let genres = genres(shows)
        .into_iter()
        .map(|genre| {
            let members = filter_shows(shows, &Filter::Genres(genre.clone()), today);
            (genre, members)
        })
        .collect();

    FilterGroups {
        states,
        available,
        genres,
    }
}

/// Sunday is 1 through Saturday 7; anything else sorts last.
pub fn weekday_rank(day: &str) -> u32 {
    match day.trim().to_lowercase().as_str() {
        "sunday" => 1,
        "monday" => 2,
        "tuesday" => 3,
        "wednesday" => 4,
        "thursday" => 5,
        "friday" => 6,
        "saturday" => 7,
        _ => UNKNOWN_DAY_RANK,
    }
}

pub fn airdays(shows: &[Show]) -> BTreeSet<String> {
    shows
        .iter()
        .filter_map(|s| s.airday())
        .map(str::to_string)
        .collect()
}

pub fn genres(shows: &[Show]) -> BTreeSet<String> {
    shows
        .iter()
        .flat_map(|s| s.summary_genres().iter().cloned())
        .collect()
}

fn has_genre(show: &Show, genre: &str) -> bool {
    show.summary_genres().iter().any(|g| g == genre)
}

/// Not ignored, with a downloaded-but-unseen episode that aired this
/// calendar month or the one before.
fn is_recently_unwatched(show: &Show, today: NaiveDate) -> bool {
    if show.ignore_unwatched {
        return false;
    }
    let months = recent_month_prefixes(today);
    show.episodes().any(|e| {
        e.is_unwatched()
            && e
                .air_date
                .as_deref()
                .is_some_and(|d| months.iter().any(|m| d.starts_with(m.as_str())))
    })
}

fn recent_month_prefixes(today: NaiveDate) -> [String; 2] {
    let (year, month) = (today.year(), today.month());
    let (last_year, last_month) = if month == 1 { (year - 1, 12) } else { (year, month - 1) };
    [
        format!("{year:04}-{month:02}"),
        format!("{last_year:04}-{last_month:02}"),
    ]
}

fn sorted(mut shows: Vec<Show>) -> Vec<Show> {
    shows.sort_by(|a, b| {
        a.name_in_lowercase
            .cmp(&b.name_in_lowercase)
            .then_with(|| a.name_on_disk.cmp(&b.name_on_disk))
    });
    shows
}
