//! The second, independently maintained mirror: one track file per activity
//! named `<YYYYMMDD>-<HHMMSS>-<kind>.<ext>`.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDateTime, Utc};
use once_cell::sync::Lazy;
use once_cell::unsync::OnceCell;
use regex::Regex;
use tracing::warn;
use walkdir::WalkDir;

use crate::error::{RecordError, StoreError};
use crate::reconcile::Timestamped;

pub const DEFAULT_EXTENSION: &str = "gpx";

#[derive(Debug)]
pub struct ComparisonActivity {
    pub path: PathBuf,
    pub timestamp: DateTime<Utc>,
    pub kind: String,
    name: OnceCell<String>,
}

impl ComparisonActivity {
    pub fn from_path(path: impl Into<PathBuf>) -> Result<Self, RecordError> {
        let path = path.into();
        let display = path.display().to_string();
        let stem = path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(|n| n.rsplit_once('.').map(|(stem, _)| stem))
            .ok_or_else(|| RecordError::malformed(&display, "missing file extension"))?;
        let (timestamp, kind) = parse_stem(stem).ok_or_else(|| {
            RecordError::malformed(&display, "expected <YYYYMMDD>-<HHMMSS>-<kind>")
        })?;
        Ok(Self {
            path,
            timestamp,
            kind,
            name: OnceCell::new(),
        })
    }

    /// First track name inside the file, read on first use.
    pub fn name(&self) -> &str {
        self.name.get_or_init(|| match fs::read_to_string(&self.path) {
            Ok(text) => track_name(&text).unwrap_or_else(|| "Unknown".to_string()),
            Err(err) => {
                warn!(path = %self.path.display(), %err, "unable to read track file");
                "Unknown".to_string()
            }
        })
    }
}

fn parse_stem(stem: &str) -> Option<(DateTime<Utc>, String)> {
    let mut parts = stem.splitn(3, '-');
    let first = parts.next()?;
    let second = parts.next()?;
    let (stamp, kind) = if first.len() == 8 && second.len() == 6 {
        (format!("{first}{second}"), parts.next()?.to_string())
    } else if first.len() == 14 {
        let rest = stem.split_once('-')?.1;
        (first.to_string(), rest.to_string())
    } else {
        return None;
    };
    if kind.is_empty() || !stamp.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let naive = NaiveDateTime::parse_from_str(&stamp, "%Y%m%d%H%M%S").ok()?;
    Some((naive.and_utc(), kind))
}

static TRACK_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)<trk>.*?<name>(.*?)</name>").expect("track name regex")
});

fn track_name(text: &str) -> Option<String> {
    let raw = TRACK_NAME.captures(text)?.get(1)?.as_str().trim();
    if raw.is_empty() {
        return None;
    }
    let raw = raw
        .strip_prefix("<![CDATA[")
        .and_then(|s| s.strip_suffix("]]>"))
        .unwrap_or(raw);
    Some(
        raw.replace("&lt;", "<")
            .replace("&gt;", ">")
            .replace("&quot;", "\"")
            .replace("&apos;", "'")
            .replace("&amp;", "&"),
    )
}

impl Timestamped for ComparisonActivity {
    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

impl fmt::Display for ComparisonActivity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}: {}",
            self.timestamp.format("%Y-%m-%d %H:%M:%S"),
            self.kind,
            self.name()
        )
    }
}

/// Walk `dir` recursively for files ending in `.{extension}`.
///
/// With `ordered`, files come out sorted by name within each directory, which
/// is chronological for this naming scheme.
pub fn walk_activities(
    dir: &Path,
    extension: &str,
    ordered: bool,
) -> impl Iterator<Item = Result<ComparisonActivity, RecordError>> {
    let suffix = format!(".{}", extension.trim_start_matches('.'));
    let mut walk = WalkDir::new(dir).min_depth(1);
    if ordered {
        walk = walk.sort_by_file_name();
    }
    let root = dir.to_path_buf();
    walk.into_iter().filter_map(move |entry| {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                let path = err.path().unwrap_or(root.as_path()).to_path_buf();
                let source = err.into_io_error().unwrap_or_else(|| {
                    std::io::Error::new(std::io::ErrorKind::Other, "walk failed")
                });
                return Some(Err(StoreError::io(path, source).into()));
            }
        };
        if !entry.file_type().is_file() {
            return None;
        }
        let name = entry.file_name().to_str()?;
        if !name.ends_with(suffix.as_str()) {
            return None;
        }
        Some(ComparisonActivity::from_path(entry.into_path()))
    })
}
