//! Binds episode files found on disk to a show's episode catalog.

use std::collections::BTreeSet;
use std::path::Path;

use crate::domain::models::Show;
use crate::workflows::parser::{parse_path, ParseOutcome};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ScanReport {
    pub matched: usize,
    pub extras: usize,
    pub rejected: usize,
    pub unmatched: usize,
    pub directories: usize,
}

impl ScanReport {
    pub fn add(&mut self, other: ScanReport) {
        self.matched += other.matched;
        self.extras += other.extras;
        self.rejected += other.rejected;
        self.unmatched += other.unmatched;
        self.directories += other.directories;
    }
}

/// Applies a scan of candidate paths to `show` in place.
///
/// Paths are processed in sorted order, so when two files address the same
/// catalog slot the lexicographically last one is bound. A matched slot is
/// overwritten outright: binary path and watched flag both come from the file.
/// Files with no catalog slot are skipped, never turned into new episodes.
/// The show's spam list is replaced by the tokens seen in this scan.
pub fn reconcile(show: &mut Show, paths: &[String]) -> ScanReport {
    let mut ordered: Vec<&str> = paths.iter().map(String::as_str).collect();
    ordered.sort_unstable();
    ordered.dedup();

    let mut report = ScanReport::default();
    let mut spam = BTreeSet::new();

    for path in ordered {
        let parsed = match parse_path(path) {
            ParseOutcome::Episode(parsed) => parsed,
            ParseOutcome::Extra(file_name) if !looks_like_file(&file_name) => {
                tracing::debug!(show = %show.name, path, "directory entry, skipping");
                report.directories += 1;
                continue;
            }
            ParseOutcome::Extra(file_name) => {
                tracing::debug!(show = %show.name, path, "no season or episode, keeping as extra");
                if !show.files.contains(&file_name) {
                    show.files.push(file_name);
                }
                report.extras += 1;
                continue;
            }
            ParseOutcome::Rejected { extension, .. } => {
                tracing::debug!(show = %show.name, path, ?extension, "extension is not a video container, skipping");
                report.rejected += 1;
                continue;
            }
        };

        spam.extend(parsed.spam.iter().cloned());

        let Some(episode) = show.episode_mut(&parsed.season, &parsed.episode) else {
            tracing::debug!(
                show = %show.name,
                path,
                season = %parsed.season,
                episode = %parsed.episode,
                "no catalog entry, skipping"
            );
            report.unmatched += 1;
            continue;
        };

        episode.binary = Some(path.to_string());
        episode.watched = parsed.watched;
        report.matched += 1;
    }

    show.spam = spam.into_iter().collect();
    report
}

/// Index lines for directories (the show's own folder, season folders)
/// carry no extension.
fn looks_like_file(file_name: &str) -> bool {
    Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| !e.is_empty() && !e.contains(char::is_whitespace))
}

/// Rebinds every episode of `show` currently bound to `old_path` to
/// `new_path` and marks it watched. Returns how many episodes changed.
pub fn mark_seen(show: &mut Show, old_path: &str, new_path: &str) -> usize {
    let mut changed = 0;
    for episode in show.episodes_mut() {
        if episode.binary.as_deref() == Some(old_path) {
            episode.binary = Some(new_path.to_string());
            episode.watched = true;
            changed += 1;
        }
    }
    changed
}

/// The path a file gets once it is marked seen: its name prefixed with `-`.
pub fn watched_path_for(path: &str) -> String {
    let as_path = Path::new(path);
    let Some(name) = as_path.file_name().map(|n| n.to_string_lossy()) else {
        return path.to_string();
    };
    if name.starts_with('-') {
        return path.to_string();
    }
    match as_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        Some(parent) => format!("{}/-{name}", parent.display()),
        None => format!("-{name}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{Episode, Season, ShowSummary};

    fn catalog_show() -> Show {
        let season = |number: &str, episodes: &[&str]| Season {
            number: number.to_string(),
            episodes: episodes
                .iter()
                .map(|e| Episode {
                    season: number.to_string(),
                    number: e.to_string(),
                    air_date: Some("2020-01-01".to_string()),
                    ..Episode::default()
                })
                .collect(),
        };
        let mut show = Show::new("Show");
        show.summary = Some(ShowSummary {
            seasons: vec![season("1", &["1", "2", "3"]), season("2", &["1"])],
            ..ShowSummary::default()
        });
        show
    }

    fn paths(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn slot(show: &mut Show, season: &str, episode: &str) -> Episode {
        show.episode_mut(season, episode).unwrap().clone()
    }

    #[test]
    fn test_binds_unwatched_file() {
        let mut show = catalog_show();
        let report = reconcile(&mut show, &paths(&["/tv/Show/Show.s01e03.720p-whatever.mkv"]));

        assert_eq!(report.matched, 1);
        let episode = slot(&mut show, "1", "3");
        assert_eq!(
            episode.binary.as_deref(),
            Some("/tv/Show/Show.s01e03.720p-whatever.mkv")
        );
        assert!(!episode.watched);
        assert_eq!(show.spam, vec!["720p-whatever".to_string()]);
    }

    #[test]
    fn test_binds_watched_file() {
        let mut show = catalog_show();
        reconcile(&mut show, &paths(&["/tv/Show/-Show.s01e03.mkv"]));
        let episode = slot(&mut show, "1", "3");
        assert_eq!(episode.binary.as_deref(), Some("/tv/Show/-Show.s01e03.mkv"));
        assert!(episode.watched);
    }

    #[test]
    fn test_rescan_overwrites_previous_binding() {
        let mut show = catalog_show();
        reconcile(&mut show, &paths(&["/old/-Show.s01e02.mkv"]));
        reconcile(&mut show, &paths(&["/new/Show.s01e02.mkv"]));

        let episode = slot(&mut show, "1", "2");
        assert_eq!(episode.binary.as_deref(), Some("/new/Show.s01e02.mkv"));
        assert!(!episode.watched);
    }

    #[test]
    fn test_padding_does_not_affect_matching() {
        let mut padded = catalog_show();
        let mut plain = catalog_show();
        reconcile(&mut padded, &paths(&["/tv/Show.s01e01.mkv"]));
        reconcile(&mut plain, &paths(&["/tv/Show.s1e1.mkv"]));
        assert!(slot(&mut padded, "1", "1").is_bound());
        assert!(slot(&mut plain, "1", "1").is_bound());
    }

    #[test]
    fn test_sidecar_never_binds() {
        let mut show = catalog_show();
        let report = reconcile(&mut show, &paths(&["/tv/Show.s01e01.srt"]));
        assert_eq!(report.rejected, 1);
        assert!(!slot(&mut show, "1", "1").is_bound());
    }

    #[test]
    fn test_missing_catalog_entry_is_not_fabricated() {
        let mut show = catalog_show();
        let before = show.clone();
        let report = reconcile(&mut show, &paths(&["/tv/Show.s03e01.mkv", "/tv/Show.s01e09.mkv"]));
        assert_eq!(report.unmatched, 2);
        assert_eq!(show.seasons(), before.seasons());
    }

    #[test]
    fn test_show_without_catalog() {
        let mut show = Show::new("Fresh");
        let report = reconcile(&mut show, &paths(&["/tv/Fresh.s01e01.mkv"]));
        assert_eq!(report.unmatched, 1);
        assert!(show.summary.is_none());
    }

    #[test]
    fn test_extras_are_recorded_once() {
        let mut show = catalog_show();
        let scan = paths(&["/tv/Show/Show - Pilot Commentary.mkv"]);
        reconcile(&mut show, &scan);
        reconcile(&mut show, &scan);
        assert_eq!(show.files, vec!["Show - Pilot Commentary.mkv".to_string()]);
    }

    #[test]
    fn test_directory_lines_are_not_extras() {
        let mut show = catalog_show();
        let report = reconcile(
            &mut show,
            &paths(&["/tv/Show", "/tv/Show/Season 1", "/tv/Mr. Robot", "/tv/Show/notes.txt"]),
        );
        assert_eq!(report.directories, 3);
        assert_eq!(show.files, vec!["notes.txt".to_string()]);
    }

    #[test]
    fn test_duplicate_slot_resolution_is_order_independent() {
        let scan = paths(&["/b/Show.s01e01.mkv", "/a/-Show.s01e01.avi"]);
        let mut reversed = scan.clone();
        reversed.reverse();

        let mut first = catalog_show();
        let mut second = catalog_show();
        reconcile(&mut first, &scan);
        reconcile(&mut second, &reversed);

        assert_eq!(first, second);
        assert_eq!(
            slot(&mut first, "1", "1").binary.as_deref(),
            Some("/b/Show.s01e01.mkv")
        );
    }

    #[test]
    fn test_reconcile_is_idempotent() {
        let scan = paths(&[
            "/tv/Show/-Show.s01e01.HDTV.mkv",
            "/tv/Show/Show.s01e02.WEB.mp4",
            "/tv/Show/Show.s02e01.srt",
            "/tv/Show/extras.txt",
        ]);
        let mut show = catalog_show();
        reconcile(&mut show, &scan);
        let once = serde_json::to_string(&show).unwrap();
        reconcile(&mut show, &scan);
        assert_eq!(serde_json::to_string(&show).unwrap(), once);
    }

    #[test]
    fn test_spam_is_replaced_per_scan() {
        let mut show = catalog_show();
        reconcile(&mut show, &paths(&["/tv/Show.s01e01.HDTV.LOL.mkv"]));
        assert_eq!(show.spam, vec!["HDTV".to_string(), "LOL".to_string()]);
        reconcile(&mut show, &paths(&["/tv/Show.s01e01.WEB.mkv"]));
        assert_eq!(show.spam, vec!["WEB".to_string()]);
    }

    #[test]
    fn test_mark_seen_rebinds_and_forces_watched() {
        let mut show = catalog_show();
        reconcile(&mut show, &paths(&["/tv/Show/Show.s01e02.mkv"]));

        let changed = mark_seen(&mut show, "/tv/Show/Show.s01e02.mkv", "/tv/Show/-Show.s01e02.mkv");
        assert_eq!(changed, 1);
        let episode = slot(&mut show, "1", "2");
        assert_eq!(episode.binary.as_deref(), Some("/tv/Show/-Show.s01e02.mkv"));
        assert!(episode.watched);

        assert_eq!(mark_seen(&mut show, "/nowhere.mkv", "/x.mkv"), 0);
    }

    #[test]
    fn test_watched_path_for() {
        assert_eq!(watched_path_for("/tv/Show/Show.s01e02.mkv"), "/tv/Show/-Show.s01e02.mkv");
        assert_eq!(watched_path_for("/tv/Show/-Show.s01e02.mkv"), "/tv/Show/-Show.s01e02.mkv");
        assert_eq!(watched_path_for("Show.s01e02.mkv"), "-Show.s01e02.mkv");
    }
}
