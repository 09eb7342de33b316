use chrono::{Duration, NaiveDate};

use crate::domain::models::Show;

/// How far back an air date still counts as recent.
pub const AVAILABILITY_WINDOW_DAYS: i64 = 7;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct AvailabilityReport {
    pub available: usize,
    /// Episodes whose air date could not be parsed; their flag was left alone.
    pub undated: usize,
}

/// Recently aired and not yet downloaded.
pub fn is_available(air_date: NaiveDate, today: NaiveDate, bound: bool) -> bool {
    !bound && air_date <= today && air_date > today - Duration::days(AVAILABILITY_WINDOW_DAYS)
}

/// Recomputes the `available` flag of every episode and stamps the show.
/// Shows without a catalog are left untouched.
pub fn calculate_availability(show: &mut Show, today: NaiveDate) -> AvailabilityReport {
    let mut report = AvailabilityReport::default();
    if show.summary.is_none() {
        return report;
    }

    let show_name = show.name.clone();
    for episode in show.episodes_mut() {
        let parsed = episode
            .air_date
            .as_deref()
            .and_then(|d| NaiveDate::parse_from_str(d.trim(), "%Y-%m-%d").ok());
        let Some(air_date) = parsed else {
            tracing::warn!(
                show = %show_name,
                season = %episode.season,
                episode = %episode.number,
                air_date = ?episode.air_date,
                "unparseable air date, leaving availability alone"
            );
            report.undated += 1;
            continue;
        };

        episode.available = is_available(air_date, today, episode.is_bound());
        if episode.available {
            report.available += 1;
        }
    }

    show.last_calculated = Some(today);
    report
}
