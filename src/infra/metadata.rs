use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;

use crate::domain::models::{Episode, Season, ShowSummary};
use crate::infra::rate_limiter::RateLimiter;

pub const TVMAZE_API_BASE: &str = "https://api.tvmaze.com";

/// Result of looking a show up by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchHit {
    pub external_id: String,
    pub canonical_name: String,
}

/// Source of show metadata. Implementations return only well-formed
/// catalogs: every season and episode has a number.
pub trait MetadataFetcher: Send + Sync {
    fn search(&self, show_name: &str) -> Result<SearchHit>;
    fn fetch_summary(&self, external_id: &str) -> Result<ShowSummary>;
}

#[derive(Debug)]
pub struct TvMazeClient {
    client: reqwest::blocking::Client,
    base_url: String,
    limiter: RateLimiter,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    id: u64,
    name: String,
}

#[derive(Debug, Deserialize)]
struct ShowResponse {
    #[serde(rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    genres: Vec<String>,
    status: Option<String>,
    runtime: Option<u32>,
    premiered: Option<String>,
    ended: Option<String>,
    schedule: Option<Schedule>,
    network: Option<Network>,
    #[serde(rename = "webChannel")]
    web_channel: Option<Network>,
    image: Option<Image>,
    #[serde(rename = "_embedded")]
    embedded: Option<Embedded>,
}

#[derive(Debug, Deserialize)]
struct Schedule {
    time: Option<String>,
    #[serde(default)]
    days: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct Network {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Image {
    original: Option<String>,
    medium: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Embedded {
    #[serde(default)]
    episodes: Vec<EpisodeResponse>,
}

#[derive(Debug, Deserialize)]
struct EpisodeResponse {
    season: Option<u32>,
    number: Option<u32>,
    name: Option<String>,
    airdate: Option<String>,
}

impl TvMazeClient {
    pub fn new(base_url: &str, timeout: Duration, min_interval: Duration) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            limiter: RateLimiter::new(min_interval),
        })
    }

    fn get_text(&self, url: &str, query: &[(&str, &str)]) -> Result<String> {
        self.limiter.acquire();
        tracing::debug!(url, "metadata request");
        let response = self.client.get(url).query(query).send()?;

        if !response.status().is_success() {
            bail!("Metadata lookup failed: HTTP {} ({url})", response.status());
        }

        Ok(response.text()?)
    }
}

impl MetadataFetcher for TvMazeClient {
    fn search(&self, show_name: &str) -> Result<SearchHit> {
        let url = format!("{}/singlesearch/shows", self.base_url);
        let body = self.get_text(&url, &[("q", show_name)])?;
        let found: SearchResponse = serde_json::from_str(&body)?;
        Ok(SearchHit {
            external_id: found.id.to_string(),
            canonical_name: found.name,
        })
    }

    fn fetch_summary(&self, external_id: &str) -> Result<ShowSummary> {
        let url = format!("{}/shows/{}", self.base_url, external_id);
        let body = self.get_text(&url, &[("embed", "episodes")])?;
        parse_summary(&body)
    }
}

/// Converts a provider show document into a [`ShowSummary`], dropping
/// episodes that carry no season or episode number. When a (season, number)
/// pair repeats, the first entry is kept.
pub fn parse_summary(body: &str) -> Result<ShowSummary> {
    let show: ShowResponse =
        serde_json::from_str(body).context("Unexpected show document shape")?;

    let mut seasons: BTreeMap<u32, Vec<Episode>> = BTreeMap::new();
    let episodes = show.embedded.map(|e| e.episodes).unwrap_or_default();
    for raw in episodes {
        let (Some(season), Some(number)) = (raw.season, raw.number) else {
            tracing::debug!(title = ?raw.name, "dropping episode without a number");
            continue;
        };
        let slots = seasons.entry(season).or_default();
        if slots.iter().any(|e| e.number == number.to_string()) {
            tracing::debug!(season, number, title = ?raw.name, "dropping duplicate episode number");
            continue;
        }
        slots.push(Episode {
            season: season.to_string(),
            number: number.to_string(),
            title: raw.name,
            air_date: raw.airdate.filter(|d| !d.trim().is_empty()),
            ..Episode::default()
        });
    }

    let (airday, airtime) = match show.schedule {
        Some(schedule) => (
            schedule.days.into_iter().next(),
            schedule.time.filter(|t| !t.is_empty()),
        ),
        None => (None, None),
    };

    Ok(ShowSummary {
        started: show.premiered,
        ended: show.ended,
        status: show.status,
        airday,
        airtime,
        runtime: show.runtime,
        network: show.network.or(show.web_channel).and_then(|n| n.name),
        classification: show.kind,
        genres: show.genres,
        image: show.image.and_then(|i| i.original.or(i.medium)),
        seasons: seasons
            .into_iter()
            .map(|(number, episodes)| Season {
                number: number.to_string(),
                episodes,
            })
            .collect(),
    })
}
