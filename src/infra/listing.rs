//! Index files produced by the external indexer.
//!
//! Each file lists absolute paths one per line; the first line is the base
//! path every listed show directory lives under.

use anyhow::{bail, Context, Result};
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use walkdir::WalkDir;

/// Tag given to shows found directly under the base path.
pub const CURRENT_TAG: &str = "current";

#[derive(Debug, Clone)]
pub struct IndexFile {
    pub path: PathBuf,
    pub base_path: String,
    /// Every non-empty line after the base path header.
    pub lines: Vec<String>,
}

/// A show directory found in an index file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredShow {
    pub tag: String,
    pub name: String,
}

/// Reads every index file matching the glob `pattern`, in path order.
/// `*`, `?` and `[...]` may appear in any path component; wildcards never
/// match a leading dot.
pub fn index_files(pattern: &str) -> Result<Vec<IndexFile>> {
    let components: Vec<&str> = pattern.split('/').collect();
    let literal = components.iter().take_while(|c| !has_wildcard(c)).count();
    let (fixed, globbed) = components.split_at(literal);

    if globbed.is_empty() {
        let path = Path::new(pattern);
        return if path.is_file() {
            Ok(vec![IndexFile::read(path)?])
        } else {
            tracing::warn!(path = %path.display(), "index file does not exist");
            Ok(Vec::new())
        };
    }

    let root = match fixed.join("/") {
        joined if !joined.is_empty() => PathBuf::from(joined),
        _ if pattern.starts_with('/') => PathBuf::from("/"),
        _ => PathBuf::from("."),
    };
    if !root.is_dir() {
        tracing::warn!(dir = %root.display(), "index directory does not exist");
        return Ok(Vec::new());
    }

    let matchers = globbed
        .iter()
        .map(|c| glob_regex(c))
        .collect::<Result<Vec<_>>>()?;
    let walker = WalkDir::new(&root)
        .follow_links(true)
        .min_depth(matchers.len())
        .max_depth(matchers.len())
        .into_iter()
        .filter_entry(|entry| {
            let depth = entry.depth();
            if depth == 0 {
                return true;
            }
            let name = entry.file_name().to_string_lossy();
            if name.starts_with('.') && !globbed[depth - 1].starts_with('.') {
                return false;
            }
            matchers[depth - 1].is_match(&name)
        });

    let mut paths = Vec::new();
    for entry in walker {
        let entry = entry?;
        if entry.file_type().is_file() {
            paths.push(entry.into_path());
        }
    }
    paths.sort();

    paths.iter().map(|path| IndexFile::read(path)).collect()
}

fn has_wildcard(component: &str) -> bool {
    component.contains(['*', '?', '['])
}

/// Translates one glob path component into an anchored regex.
fn glob_regex(glob: &str) -> Result<Regex> {
    let mut pattern = String::from("^");
    let mut chars = glob.chars();
    while let Some(c) = chars.next() {
        match c {
            '*' => pattern.push_str("[^/]*"),
            '?' => pattern.push_str("[^/]"),
            '[' => {
                let rest: String = chars.clone().collect();
                let Some(end) = rest.find(']').filter(|&end| end > 0) else {
                    pattern.push_str(r"\[");
                    continue;
                };
                let class = &rest[..end];
                for _ in 0..=class.chars().count() {
                    chars.next();
                }
                pattern.push('[');
                let body = match class.strip_prefix('!') {
                    Some(negated) => {
                        pattern.push('^');
                        negated
                    }
                    None => class,
                };
                pattern.push_str(&body.replace('\\', r"\\").replace('[', r"\["));
                pattern.push(']');
            }
            c => pattern.push_str(&regex::escape(&c.to_string())),
        }
    }
    pattern.push('$');
    Ok(Regex::new(&pattern)?)
}

fn season_marker() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)s[0-9]{2,}").expect("Invalid regex pattern defined in code"))
}

/// Builds a pattern from a dot-normalized show name in which each `.`
/// matches any single character and everything else is literal.
pub fn dotted_name_regex(name_in_dots: &str, case_insensitive: bool) -> Result<Regex> {
    let body = name_in_dots
        .split('.')
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(".");
    let pattern = if case_insensitive {
        format!("(?i){body}")
    } else {
        body
    };
    Ok(Regex::new(&pattern)?)
}

fn strip_through_last_colon(line: &str) -> &str {
    line.rsplit_once(':').map_or(line, |(_, rest)| rest)
}

impl IndexFile {
    pub fn read(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read index file {}", path.display()))?;
        Ok(Self::parse(path, &content))
    }

    pub fn parse(path: &Path, content: &str) -> Self {
        let mut lines = content.lines().map(|l| l.trim_end_matches('\r'));
        let base_path = lines.next().unwrap_or_default().trim_end().to_string();
        Self {
            path: path.to_path_buf(),
            base_path,
            lines: lines
                .filter(|l| !l.trim().is_empty())
                .map(str::to_string)
                .collect(),
        }
    }

    /// Show directories listed directly under the base path (tagged
    /// `current`) or one level down under an `_tag` directory. Entries that
    /// look like episode files are skipped, as is anything under `_flix`.
    pub fn discovered_shows(&self) -> Result<Vec<DiscoveredShow>> {
        let base = regex::escape(&self.base_path);
        let untagged = Regex::new(&format!("(?i)^{base}/[^/_]*$"))?;
        let tagged = Regex::new(&format!("(?i)^{base}/_[^/]*/[^/_]*$"))?;
        let prefix_len = self.base_path.len() + 1;

        let mut shows = Vec::new();
        for line in &self.lines {
            if season_marker().is_match(line) {
                continue;
            }
            if untagged.is_match(line) {
                if let Some(name) = line.get(prefix_len..).filter(|n| !n.is_empty()) {
                    shows.push(DiscoveredShow {
                        tag: CURRENT_TAG.to_string(),
                        name: name.to_string(),
                    });
                }
            } else if tagged.is_match(line) && !line.contains("_flix") {
                let rest = line.get(prefix_len + 1..).and_then(|r| r.split_once('/'));
                if let Some((tag, name)) = rest.filter(|(_, n)| !n.is_empty()) {
                    shows.push(DiscoveredShow {
                        tag: tag.to_string(),
                        name: name.to_string(),
                    });
                }
            }
        }
        Ok(shows)
    }

    /// Lines that mention the show, each cut after its last `:`.
    pub fn episode_candidates(&self, name_in_dots: &str) -> Result<Vec<String>> {
        if name_in_dots.chars().count() <= 3 {
            bail!("Name too short ({name_in_dots})");
        }
        let pattern = dotted_name_regex(name_in_dots, true)?;
        Ok(self
            .lines
            .iter()
            .filter(|line| pattern.is_match(line))
            .map(|line| strip_through_last_colon(line).to_string())
            .collect())
    }

    /// Lines that belong to no known show, matched case-sensitively against
    /// both the dot-normalized and on-disk names.
    pub fn unknown_lines(&self, names_in_dots: &[String], names_on_disk: &[String]) -> Result<Vec<String>> {
        let dots = names_in_dots
            .iter()
            .filter(|n| !n.is_empty())
            .map(|n| dotted_name_regex(n, false))
            .collect::<Result<Vec<_>>>()?;
        let disks: Vec<&str> = names_on_disk
            .iter()
            .map(String::as_str)
            .filter(|n| !n.is_empty())
            .collect();

        Ok(self
            .lines
            .iter()
            .filter(|line| !dots.iter().any(|re| re.is_match(line)))
            .filter(|line| !disks.iter().any(|name| line.contains(name)))
            .cloned()
            .collect())
    }
}
