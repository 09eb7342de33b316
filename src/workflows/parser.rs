use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;

/// Container formats accepted as episode files.
pub const BINARY_TYPES: [&str; 7] = ["mkv", "avi", "mp4", "mpg", "m4v", "ts", "divx"];

/// An episode file name broken into its parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedFileRef {
    /// The file name carried a leading `-`, our marker for "seen".
    pub watched: bool,
    pub show_name: String,
    pub season: String,
    pub episode: String,
    /// Release noise between the episode number and the extension.
    pub spam: Vec<String>,
    pub extension: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseOutcome {
    Episode(ParsedFileRef),
    /// No SxxEyy marker; the file name belongs on the show's extras list.
    Extra(String),
    /// Looked like an episode but the extension is not a video container.
    Rejected {
        file_name: String,
        extension: Option<String>,
    },
}

fn show_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^(-?)(.+)s([0-9]+)e([0-9]+)(.+)$")
            .expect("Invalid regex pattern defined in code")
    })
}

pub fn file_name(path: &str) -> String {
    Path::new(path)
        .file_name()
        .map_or_else(|| path.to_string(), |n| n.to_string_lossy().into_owned())
}

/// Classifies one path by its file name.
pub fn parse_path(path: &str) -> ParseOutcome {
    let file_name = file_name(path);
    let Some(caps) = show_pattern().captures(&file_name) else {
        return ParseOutcome::Extra(file_name);
    };

    let mut tokens: Vec<String> = caps[5]
        .split('.')
        .filter(|s| !s.trim().is_empty())
        .map(str::to_string)
        .collect();
    let extension = tokens.pop();

    match extension {
        Some(extension) if is_binary_type(&extension) => ParseOutcome::Episode(ParsedFileRef {
            watched: caps[1].contains('-'),
            show_name: caps[2].to_string(),
            season: caps[3].to_string(),
            episode: caps[4].to_string(),
            spam: tokens,
            extension: extension.to_lowercase(),
        }),
        extension => ParseOutcome::Rejected {
            file_name,
            extension,
        },
    }
}

fn is_binary_type(extension: &str) -> bool {
    let extension = extension.to_lowercase();
    BINARY_TYPES.contains(&extension.as_str())
}
