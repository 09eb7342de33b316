//! Batch jobs over the whole show library.
//!
//! Every per-show step takes the show's lock, re-reads the record, mutates
//! it and saves it. Failures that concern one show (a provider error, a name
//! too short to search for) are logged and counted; store failures abort.

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use rayon::prelude::*;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::domain::models::Show;
use crate::error::{StoreError, StoreResult};
use crate::infra::covers::CoverCache;
use crate::infra::listing::IndexFile;
use crate::infra::metadata::MetadataFetcher;
use crate::infra::store::ShowStore;
use crate::workflows::availability::{calculate_availability, AvailabilityReport};
use crate::workflows::filters::{Filter, FilterGroups, ShowFilters};
use crate::workflows::reconcile::{mark_seen, reconcile, ScanReport};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RefreshReport {
    pub refreshed: usize,
    pub skipped: usize,
    /// Disk names of shows whose step failed.
    pub failed: Vec<String>,
}

impl RefreshReport {
    fn record(&mut self, name: &str, outcome: StepOutcome) {
        match outcome {
            StepOutcome::Done => self.refreshed += 1,
            StepOutcome::Skipped => self.skipped += 1,
            StepOutcome::Failed => self.failed.push(name.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StepOutcome {
    Done,
    Skipped,
    Failed,
}

pub struct Library {
    store: ShowStore,
    fetcher: Box<dyn MetadataFetcher>,
    covers: Option<CoverCache>,
    pool: rayon::ThreadPool,
    filters: Mutex<ShowFilters>,
}

impl Library {
    pub fn new(
        store: ShowStore,
        fetcher: Box<dyn MetadataFetcher>,
        covers: Option<CoverCache>,
        workers: usize,
    ) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers.max(1))
            .thread_name(|i| format!("tvr-worker-{i}"))
            .build()
            .context("Failed to start worker pool")?;
        Ok(Self {
            store,
            fetcher,
            covers,
            pool,
            filters: Mutex::new(ShowFilters::new()),
        })
    }

    pub fn store(&self) -> &ShowStore {
        &self.store
    }

    /// Creates a record for every show directory listed in `files`,
    /// remembering the tag it was found under. Returns how many were new.
    pub fn import(&self, files: &[IndexFile]) -> Result<usize> {
        let mut created = 0;
        for file in files {
            tracing::debug!(index = %file.path.display(), base = %file.base_path, "importing shows");
            for found in file.discovered_shows()? {
                let existed = self.store.find(&found.name).is_some();
                let mut show = self.store.create_or_get(&found.name)?;
                if !existed {
                    tracing::info!(show = %found.name, tag = %found.tag, "imported show");
                    created += 1;
                }
                if !show.tags.contains(&found.tag) {
                    show.tags.push(found.tag);
                    self.store.save(&show)?;
                }
            }
        }
        Ok(created)
    }

    /// Looks up the provider id of every listed show that lacks one.
    pub fn fetch_ids(&self, names: &[String]) -> StoreResult<RefreshReport> {
        self.for_each_show(names, |show| self.fetch_id(show))
    }

    /// Refreshes provider metadata. Without `include_ended`, shows the
    /// provider already reports as ended are left alone.
    pub fn fetch_summaries(&self, names: &[String], include_ended: bool) -> StoreResult<RefreshReport> {
        self.for_each_show(names, |show| {
            if !include_ended && show.has_ended() {
                return Ok(StepOutcome::Skipped);
            }
            self.fetch_summary(show)
        })
    }

    /// Reconciles the listed shows against the index files.
    pub fn scan(&self, names: &[String], files: &[IndexFile]) -> StoreResult<(RefreshReport, ScanReport)> {
        let totals = std::sync::Mutex::new(ScanReport::default());
        let report = self.for_each_show(names, |show| {
            let mut candidates = Vec::new();
            for file in files {
                match file.episode_candidates(&show.name_in_dots) {
                    Ok(lines) => candidates.extend(lines),
                    Err(e) => {
                        tracing::warn!(show = %show.name_on_disk, error = %e, "cannot scan show");
                        return Ok(StepOutcome::Failed);
                    }
                }
            }
            let before = show.clone();
            let scan = reconcile(show, &candidates);
            totals
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .add(scan);
            tracing::debug!(show = %show.name_on_disk, ?scan, "scanned show");
            Ok(if *show == before {
                StepOutcome::Skipped
            } else {
                StepOutcome::Done
            })
        })?;
        let totals = totals.into_inner().unwrap_or_else(PoisonError::into_inner);
        Ok((report, totals))
    }

    /// Recomputes availability for every show.
    pub fn calculate_availability(&self, today: NaiveDate) -> StoreResult<AvailabilityReport> {
        let mut totals = AvailabilityReport::default();
        for name in self.names() {
            let lock = self.store.show_lock(&name);
            let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
            let Some(mut show) = self.store.find(&name) else {
                continue;
            };
            let report = calculate_availability(&mut show, today);
            totals.available += report.available;
            totals.undated += report.undated;
            self.store.save(&show)?;
        }
        Ok(totals)
    }

    /// Rebinds an episode file that moved to `new_path` and marks it seen.
    /// Returns how many episodes were updated across the library.
    pub fn seen_it(&self, old_path: &str, new_path: &str) -> StoreResult<usize> {
        let mut changed = 0;
        for name in self.names() {
            let lock = self.store.show_lock(&name);
            let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
            let Some(mut show) = self.store.find(&name) else {
                continue;
            };
            let updated = mark_seen(&mut show, old_path, new_path);
            if updated > 0 {
                self.store.save(&show)?;
                changed += updated;
            }
        }
        Ok(changed)
    }

    /// Creates a show from a free-form name and looks up its provider id.
    pub fn add_show(&self, raw_name: &str) -> Result<Show> {
        let show = self.store.create(&humanize(raw_name))?;
        let name = show.name_on_disk.clone();
        self.fetch_ids(std::slice::from_ref(&name))?;
        self.store
            .find(&name)
            .ok_or_else(|| StoreError::NotFound(name).into())
    }

    /// Deletes a show and its cached cover.
    pub fn remove_show(&self, name_on_disk: &str) -> Result<Show> {
        let lock = self.store.show_lock(name_on_disk);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
        let show = self.store.remove(name_on_disk)?;
        if let Some(covers) = &self.covers {
            if let Err(e) = covers.remove(&show) {
                tracing::warn!(show = %show.name, error = %e, "failed to remove cover");
            }
        }
        self.filters().invalidate();
        Ok(show)
    }

    /// Applies `change` to one show under its lock and saves the result.
    pub fn update_show(&self, name_on_disk: &str, change: impl FnOnce(&mut Show)) -> StoreResult<Show> {
        let lock = self.store.show_lock(name_on_disk);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut show = self
            .store
            .find(name_on_disk)
            .ok_or_else(|| StoreError::NotFound(name_on_disk.to_string()))?;
        change(&mut show);
        let saved = self.store.save(&show)?;
        self.filters().invalidate();
        Ok(saved)
    }

    /// Shows matching `filter`. `states` filters read the cached groupings.
    pub fn filter_shows(&self, filter: &Filter, today: NaiveDate) -> Vec<Show> {
        self.filters().filter_shows(&self.store, filter, today)
    }

    pub fn groups(&self, today: NaiveDate) -> FilterGroups {
        self.filters().groups(&self.store, today).clone()
    }

    /// Index lines that belong to no known show.
    pub fn unknown_files(&self, files: &[IndexFile]) -> Result<Vec<String>> {
        let shows = self.store.all();
        let dots: Vec<String> = shows.iter().map(|s| s.name_in_dots.clone()).collect();
        let disks: Vec<String> = shows.iter().map(|s| s.name_on_disk.clone()).collect();
        let mut unknown = Vec::new();
        for file in files {
            unknown.extend(file.unknown_lines(&dots, &disks)?);
        }
        Ok(unknown)
    }

    /// Import, look up ids, refresh metadata, scan files, recompute availability.
    pub fn refresh_everything(&self, files: &[IndexFile], today: NaiveDate) -> Result<()> {
        let imported = self.import(files)?;
        let names = self.names();
        tracing::info!(shows = names.len(), imported, "refreshing library");

        let ids = self.fetch_ids(&names)?;
        let summaries = self.fetch_summaries(&names, false)?;
        let (scanned, scan) = self.scan(&names, files)?;
        let availability = self.calculate_availability(today)?;

        tracing::info!(
            ids = ids.refreshed,
            summaries = summaries.refreshed,
            fetch_failures = ids.failed.len() + summaries.failed.len(),
            shows_changed = scanned.refreshed,
            matched = scan.matched,
            available = availability.available,
            "library refresh finished"
        );
        Ok(())
    }

    pub fn names(&self) -> Vec<String> {
        self.store.all().into_iter().map(|s| s.name_on_disk).collect()
    }

    /// Runs `step` for each named show on the worker pool. Each show is
    /// locked, re-read, handed to `step`, and saved if the step changed it.
    /// The first store error stops the batch.
    fn for_each_show<F>(&self, names: &[String], step: F) -> StoreResult<RefreshReport>
    where
        F: Fn(&mut Show) -> StoreResult<StepOutcome> + Sync,
    {
        let outcomes: Vec<(String, StepOutcome)> = self.pool.install(|| {
            names
                .par_iter()
                .map(|name| {
                    let lock = self.store.show_lock(name);
                    let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
                    let Some(mut show) = self.store.find(name) else {
                        return Ok((name.clone(), StepOutcome::Skipped));
                    };
                    let before = show.clone();
                    let outcome = step(&mut show)?;
                    if show != before {
                        self.store.save(&show)?;
                    }
                    Ok((name.clone(), outcome))
                })
                .collect::<StoreResult<Vec<_>>>()
        })?;

        let mut report = RefreshReport::default();
        for (name, outcome) in outcomes {
            report.record(&name, outcome);
        }
        Ok(report)
    }

    fn filters(&self) -> MutexGuard<'_, ShowFilters> {
        self.filters.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn fetch_id(&self, show: &mut Show) -> StoreResult<StepOutcome> {
        if show.showid.is_some() {
            return Ok(StepOutcome::Skipped);
        }
        tracing::debug!(show = %show.name_on_disk, "searching provider");
        match self.fetcher.search(&show.name_on_disk) {
            Ok(hit) => {
                show.showid = Some(hit.external_id);
                show.name = hit.canonical_name;
                Ok(StepOutcome::Done)
            }
            Err(e) => {
                tracing::warn!(show = %show.name_on_disk, error = %e, "show search failed");
                Ok(StepOutcome::Failed)
            }
        }
    }

    fn fetch_summary(&self, show: &mut Show) -> StoreResult<StepOutcome> {
        if show.showid.is_none() && self.fetch_id(show)? != StepOutcome::Done {
            return Ok(StepOutcome::Failed);
        }
        let Some(showid) = show.showid.clone() else {
            return Ok(StepOutcome::Failed);
        };

        tracing::debug!(show = %show.name, showid = %showid, "fetching summary");
        match self.fetcher.fetch_summary(&showid) {
            Ok(summary) => {
                show.genres = summary.genres.clone();
                show.summary = Some(summary);
                show.summary_timestamp = Some(Utc::now());
                self.cache_cover(show);
                Ok(StepOutcome::Done)
            }
            Err(e) => {
                tracing::warn!(show = %show.name, error = %e, "summary fetch failed, keeping stale metadata");
                Ok(StepOutcome::Failed)
            }
        }
    }

    fn cache_cover(&self, show: &Show) {
        let Some(covers) = &self.covers else {
            return;
        };
        if let Err(e) = covers.fetch(show) {
            tracing::warn!(show = %show.name, error = %e, "failed to cache cover");
        }
    }
}

/// "the_wire" -> "The wire"
pub fn humanize(raw: &str) -> String {
    let spaced = raw.trim().replace('_', " ");
    let mut chars = spaced.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{Episode, Season, ShowSummary};
    use crate::infra::metadata::SearchHit;
    use crate::workflows::filters::StateGroup;
    use anyhow::bail;
    use std::path::Path;

    /// Provider stub: knows "Lost" and "Fargo", fails everything else.
    struct FakeFetcher;

    impl MetadataFetcher for FakeFetcher {
        fn search(&self, show_name: &str) -> Result<SearchHit> {
            match show_name {
                "Lost" => Ok(SearchHit {
                    external_id: "123".to_string(),
                    canonical_name: "Lost".to_string(),
                }),
                "Fargo" => Ok(SearchHit {
                    external_id: "456".to_string(),
                    canonical_name: "Fargo (2014)".to_string(),
                }),
                other => bail!("no match for {other}"),
            }
        }

        fn fetch_summary(&self, external_id: &str) -> Result<ShowSummary> {
            if external_id != "123" {
                bail!("HTTP 500");
            }
            Ok(ShowSummary {
                airday: Some("Tuesday".to_string()),
                genres: vec!["Drama".to_string()],
                seasons: vec![Season {
                    number: "1".to_string(),
                    episodes: vec![
                        Episode {
                            season: "1".to_string(),
                            number: "1".to_string(),
                            air_date: Some("2024-03-12".to_string()),
                            ..Episode::default()
                        },
                        Episode {
                            season: "1".to_string(),
                            number: "2".to_string(),
                            air_date: Some("2024-03-13".to_string()),
                            ..Episode::default()
                        },
                    ],
                }],
                ..ShowSummary::default()
            })
        }
    }

    const INDEX: &str = "/tv\n\
/tv/Lost\n\
/tv/Lost/Lost.S01E01.720p.mkv\n\
/tv/Lost/-Lost.S01E02.mkv\n\
/tv/Lost/Lost.S01E02.srt\n\
/tv/Lost/Lost.S05E01.mkv\n\
/tv/Lost/Lost - Making Of.mkv\n\
/tv/_crime/Fargo\n\
/tv/Ugly/Ugly.s01e01.mkv\n";

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 15).unwrap()
    }

    fn library() -> Library {
        Library::new(ShowStore::in_memory(), Box::new(FakeFetcher), None, 2).unwrap()
    }

    fn index() -> Vec<IndexFile> {
        vec![IndexFile::parse(Path::new("index.txt"), INDEX)]
    }

    #[test]
    fn test_import_creates_and_tags_shows() {
        let library = library();
        assert_eq!(library.import(&index()).unwrap(), 2);
        assert_eq!(library.import(&index()).unwrap(), 0);

        let fargo = library.store().find("Fargo").unwrap();
        assert_eq!(fargo.tags, vec!["crime".to_string()]);
        let lost = library.store().find("Lost").unwrap();
        assert_eq!(lost.tags, vec!["current".to_string()]);
    }

    #[test]
    fn test_fetch_failures_are_isolated() {
        let library = library();
        library.import(&index()).unwrap();
        library.store().create("Unknown Show").unwrap();

        let names = library.names();
        let ids = library.fetch_ids(&names).unwrap();
        assert_eq!(ids.refreshed, 2);
        assert_eq!(ids.failed, vec!["Unknown Show".to_string()]);

        let summaries = library.fetch_summaries(&names, true).unwrap();
        assert_eq!(summaries.refreshed, 1);
        assert_eq!(summaries.failed.len(), 2);

        let fargo = library.store().find("Fargo").unwrap();
        assert_eq!(fargo.name, "Fargo (2014)");
        assert!(fargo.summary.is_none());

        let lost = library.store().find("Lost").unwrap();
        assert_eq!(lost.genres, vec!["Drama".to_string()]);
        assert!(lost.summary_timestamp.is_some());
    }

    #[test]
    fn test_found_id_survives_failed_summary() {
        let library = library();
        library.store().create("Fargo").unwrap();
        let report = library.fetch_summaries(&library.names(), true).unwrap();
        assert_eq!(report.failed, vec!["Fargo".to_string()]);
        assert_eq!(library.store().find("Fargo").unwrap().showid.as_deref(), Some("456"));
    }

    #[test]
    fn test_fetch_summaries_skips_ended_shows() {
        let library = library();
        let mut show = library.store().create("Lost").unwrap();
        show.showid = Some("123".to_string());
        show.summary = Some(ShowSummary {
            ended: Some("2010-05-23".to_string()),
            ..ShowSummary::default()
        });
        library.store().save(&show).unwrap();

        let report = library.fetch_summaries(&library.names(), false).unwrap();
        assert_eq!(report.skipped, 1);
        assert!(library.store().find("Lost").unwrap().seasons().is_empty());
    }

    #[test]
    fn test_refresh_everything() {
        let library = library();
        library.refresh_everything(&index(), today()).unwrap();

        let mut lost = library.store().find("Lost").unwrap();
        let first = lost.episode_mut("1", "1").unwrap().clone();
        assert_eq!(first.binary.as_deref(), Some("/tv/Lost/Lost.S01E01.720p.mkv"));
        assert!(!first.watched);
        assert!(!first.available);

        let second = lost.episode_mut("01", "02").unwrap().clone();
        assert_eq!(second.binary.as_deref(), Some("/tv/Lost/-Lost.S01E02.mkv"));
        assert!(second.watched);

        assert_eq!(lost.files, vec!["Lost - Making Of.mkv".to_string()]);
        assert_eq!(lost.spam, vec!["720p".to_string()]);
        assert_eq!(lost.last_calculated, Some(today()));
    }

    #[test]
    fn test_availability_tracks_downloads() {
        let library = library();
        library.store().create("Lost").unwrap();
        let names = library.names();
        library.fetch_summaries(&names, true).unwrap();

        let report = library.calculate_availability(today()).unwrap();
        assert_eq!(report.available, 2);

        library.scan(&names, &index()).unwrap();
        let report = library.calculate_availability(today()).unwrap();
        assert_eq!(report.available, 0);
    }

    #[test]
    fn test_scan_is_idempotent() {
        let library = library();
        library.store().create("Lost").unwrap();
        let names = library.names();
        library.fetch_summaries(&names, true).unwrap();

        let (first, _) = library.scan(&names, &index()).unwrap();
        assert_eq!(first.refreshed, 1);
        let snapshot = serde_json::to_string(&library.store().all()).unwrap();

        let (second, totals) = library.scan(&names, &index()).unwrap();
        assert_eq!(second.refreshed, 0);
        assert_eq!(second.skipped, 1);
        assert_eq!(totals.matched, 2);
        assert_eq!(serde_json::to_string(&library.store().all()).unwrap(), snapshot);
    }

    #[test]
    fn test_scan_refuses_short_names() {
        let library = library();
        library.store().create("V").unwrap();
        let (report, _) = library.scan(&library.names(), &index()).unwrap();
        assert_eq!(report.failed, vec!["V".to_string()]);
    }

    #[test]
    fn test_seen_it_marks_episode_watched() {
        let library = library();
        library.store().create("Lost").unwrap();
        let names = library.names();
        library.fetch_summaries(&names, true).unwrap();
        library.scan(&names, &index()).unwrap();

        let changed = library
            .seen_it("/tv/Lost/Lost.S01E01.720p.mkv", "/tv/Lost/-Lost.S01E01.720p.mkv")
            .unwrap();
        assert_eq!(changed, 1);

        let mut lost = library.store().find("Lost").unwrap();
        let episode = lost.episode_mut("1", "1").unwrap();
        assert_eq!(episode.binary.as_deref(), Some("/tv/Lost/-Lost.S01E01.720p.mkv"));
        assert!(episode.watched);
    }

    #[test]
    fn test_add_and_remove_show() {
        let library = library();
        let show = library.add_show("lost").unwrap();
        assert_eq!(show.name_on_disk, "Lost");
        assert_eq!(show.showid.as_deref(), Some("123"));

        assert!(library.add_show("LOST").is_err());

        library.remove_show("Lost").unwrap();
        assert_eq!(library.store().len(), 0);
        assert!(library.remove_show("Lost").is_err());
    }

    #[test]
    fn test_update_show() {
        let library = library();
        library.store().create("Lost").unwrap();
        let show = library.update_show("Lost", |s| s.ignore_unwatched = true).unwrap();
        assert!(show.ignore_unwatched);
        assert!(matches!(
            library.update_show("Nope", |_| {}).unwrap_err(),
            StoreError::NotFound(_)
        ));
    }

    #[test]
    fn test_groups_follow_show_updates() {
        let library = library();
        library.store().create("Lost").unwrap();
        library.store().create("Fargo").unwrap();
        let today = today();
        assert!(library.groups(today).states[&StateGroup::Ignored].is_empty());

        library.update_show("Lost", |s| s.ignore_unwatched = true).unwrap();
        let ignored = library.filter_shows(&Filter::States(StateGroup::Ignored), today);
        assert_eq!(ignored.len(), 1);
        assert_eq!(ignored[0].name_on_disk, "Lost");

        library.remove_show("Lost").unwrap();
        assert!(library.groups(today).states[&StateGroup::Ignored].is_empty());
        assert_eq!(library.filter_shows(&Filter::All, today).len(), 1);
    }

    #[test]
    fn test_unknown_files() {
        let library = library();
        library.import(&index()).unwrap();
        let unknown = library.unknown_files(&index()).unwrap();
        assert_eq!(unknown, vec!["/tv/Ugly/Ugly.s01e01.mkv".to_string()]);
    }

    #[test]
    fn test_humanize() {
        assert_eq!(humanize("the_wire"), "The wire");
        assert_eq!(humanize("  LOST "), "Lost");
        assert_eq!(humanize(""), "");
    }
}
