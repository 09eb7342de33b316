use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// One tracked series, keyed by the directory name it has on disk.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct Show {
    pub name: String,
    pub name_in_lowercase: String,
    pub name_on_disk: String,
    pub name_in_dots: String,
    pub showid: Option<String>,
    pub last_calculated: Option<NaiveDate>,
    pub ignore_unwatched: bool,
    pub tags: Vec<String>,
    /// Files that look like they belong to the show but carry no SxxEyy marker.
    pub files: Vec<String>,
    pub genres: Vec<String>,
    pub spam: Vec<String>,
    pub aliases: Vec<String>,
    pub summary: Option<ShowSummary>,
    pub summary_timestamp: Option<DateTime<Utc>>,
    pub started_as_date: Option<NaiveDate>,
    pub ended_as_date: Option<NaiveDate>,
}

/// Normalized metadata for a show as returned by the metadata provider.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct ShowSummary {
    pub started: Option<String>,
    pub ended: Option<String>,
    pub status: Option<String>,
    pub airday: Option<String>,
    pub airtime: Option<String>,
    pub runtime: Option<u32>,
    pub network: Option<String>,
    pub classification: Option<String>,
    pub genres: Vec<String>,
    pub image: Option<String>,
    pub seasons: Vec<Season>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct Season {
    pub number: String,
    pub episodes: Vec<Episode>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct Episode {
    pub season: String,
    /// In-season episode number.
    pub number: String,
    pub title: Option<String>,
    pub air_date: Option<String>,
    pub binary: Option<String>,
    pub watched: bool,
    pub available: bool,
}

impl Show {
    pub fn new(name_on_disk: &str) -> Self {
        let mut show = Self {
            name_on_disk: name_on_disk.to_string(),
            ..Self::default()
        };
        show.normalize();
        show
    }

    /// Recomputes the derived name and date fields. Run before every save.
    pub fn normalize(&mut self) {
        if self.name.trim().is_empty() && !self.name_on_disk.trim().is_empty() {
            self.name = self.name_on_disk.clone();
        }
        if !self.name.is_empty() {
            self.name_in_lowercase = self.name.to_lowercase();
            self.name_in_dots = self.name_on_disk.to_lowercase().replace(' ', ".");
        }
        let summary = self.summary.as_ref();
        self.started_as_date = summary
            .and_then(|s| s.started.as_deref())
            .and_then(parse_loose_date);
        self.ended_as_date = summary
            .and_then(|s| s.ended.as_deref())
            .and_then(parse_loose_date);
    }

    pub fn seasons(&self) -> &[Season] {
        self.summary.as_ref().map_or(&[], |s| s.seasons.as_slice())
    }

    pub fn episodes(&self) -> impl Iterator<Item = &Episode> {
        self.seasons().iter().flat_map(|s| s.episodes.iter())
    }

    pub fn episodes_mut(&mut self) -> impl Iterator<Item = &mut Episode> {
        self.summary
            .iter_mut()
            .flat_map(|s| s.seasons.iter_mut())
            .flat_map(|s| s.episodes.iter_mut())
    }

    /// Looks up a catalog slot by season and in-season episode number,
    /// comparing numerically so that "1" and "01" address the same slot.
    pub fn episode_mut(&mut self, season: &str, episode: &str) -> Option<&mut Episode> {
        self.summary
            .as_mut()?
            .seasons
            .iter_mut()
            .find(|s| same_number(&s.number, season))?
            .episodes
            .iter_mut()
            .find(|e| same_number(&e.number, episode))
    }

    pub fn airday(&self) -> Option<&str> {
        self.summary.as_ref().and_then(|s| s.airday.as_deref())
    }

    pub fn summary_genres(&self) -> &[String] {
        self.summary.as_ref().map_or(&[], |s| s.genres.as_slice())
    }

    pub fn image(&self) -> Option<&str> {
        self.summary
            .as_ref()
            .and_then(|s| s.image.as_deref())
            .filter(|url| !url.trim().is_empty())
    }

    pub fn has_ended(&self) -> bool {
        self.summary.as_ref().is_some_and(|s| s.ended.is_some())
    }

    pub fn has_available_episodes(&self) -> bool {
        self.episodes().any(|e| e.available)
    }

    /// End date, or the provider status in parentheses for running shows.
    pub fn ended_label(&self) -> String {
        let summary = self.summary.as_ref();
        match summary.and_then(|s| s.ended.clone()) {
            Some(ended) => ended,
            None => format!(
                "({})",
                summary.and_then(|s| s.status.as_deref()).unwrap_or("")
            ),
        }
    }
}

impl Episode {
    pub fn is_bound(&self) -> bool {
        self.binary.as_deref().is_some_and(|b| !b.trim().is_empty())
    }

    /// Downloaded but not yet seen.
    pub fn is_unwatched(&self) -> bool {
        self.is_bound() && !self.watched
    }
}

/// Numeric equality for catalog identifiers, which the provider may hand us
/// zero-padded or not. Non-numeric values fall back to trimmed text equality.
pub fn same_number(a: &str, b: &str) -> bool {
    match (canonical_digits(a), canonical_digits(b)) {
        (Some(x), Some(y)) => x == y,
        _ => a.trim() == b.trim(),
    }
}

fn canonical_digits(value: &str) -> Option<&str> {
    let value = value.trim();
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let stripped = value.trim_start_matches('0');
    Some(if stripped.is_empty() { "0" } else { stripped })
}

/// Parses start/end dates that may carry zeroed components ("0000", "-00").
pub fn parse_loose_date(raw: &str) -> Option<NaiveDate> {
    let fixed = raw.trim().replace("0000", "1971").replace("-00", "-01");
    ["%Y-%m-%d", "%b/%d/%Y", "%b %d, %Y", "%Y-%m"]
        .iter()
        .find_map(|fmt| match *fmt {
            "%Y-%m" => NaiveDate::parse_from_str(&format!("{fixed}-01"), "%Y-%m-%d").ok(),
            fmt => NaiveDate::parse_from_str(&fixed, fmt).ok(),
        })
}
