//! Exported file formats of a single activity and how each one is produced.

use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::SourceError;
use crate::source::RemoteActivity;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Representation {
    Json,
    #[serde(rename = "orig.zip")]
    OrigZip,
    Tcx,
    Gpx,
    Kml,
    Csv,
}

impl Representation {
    pub const ALL: [Representation; 6] = [
        Representation::Json,
        Representation::OrigZip,
        Representation::Tcx,
        Representation::Gpx,
        Representation::Kml,
        Representation::Csv,
    ];

    /// Every representation rendered from the canonical JSON state.
    pub const DERIVED: [Representation; 5] = [
        Representation::OrigZip,
        Representation::Tcx,
        Representation::Gpx,
        Representation::Kml,
        Representation::Csv,
    ];

    pub fn extension(&self) -> &'static str {
        match self {
            Representation::Json => "json",
            Representation::OrigZip => "orig.zip",
            Representation::Tcx => "tcx",
            Representation::Gpx => "gpx",
            Representation::Kml => "kml",
            Representation::Csv => "csv",
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        let normalized = ext.trim().trim_start_matches('.').to_ascii_lowercase();
        match normalized.as_str() {
            "json" => Some(Representation::Json),
            "orig.zip" | "orig" | "zip" => Some(Representation::OrigZip),
            "tcx" => Some(Representation::Tcx),
            "gpx" => Some(Representation::Gpx),
            "kml" => Some(Representation::Kml),
            "csv" => Some(Representation::Csv),
            _ => None,
        }
    }

    pub fn is_canonical(&self) -> bool {
        matches!(self, Representation::Json)
    }

    /// Store filename for this representation of activity `activity_id`.
    pub fn filename(&self, activity_id: &str) -> String {
        format!("{}.{}", activity_id, self.extension())
    }

    /// Split a store filename into activity id and representation.
    ///
    /// `orig.zip` is checked first so `123.orig.zip` never parses as a `.zip`
    /// of activity `123.orig`.
    pub fn parse_filename(filename: &str) -> Option<(&str, Representation)> {
        for repr in Representation::ALL {
            let suffix = format!(".{}", repr.extension());
            if let Some(stem) = filename.strip_suffix(suffix.as_str()) {
                if !stem.is_empty() && !stem.contains('.') {
                    return Some((stem, repr));
                }
            }
        }
        None
    }
}

impl fmt::Display for Representation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for Representation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Representation::from_extension(s).ok_or_else(|| {
            let known: Vec<&str> = Representation::ALL.iter().map(|r| r.extension()).collect();
            format!("unknown format '{s}' (expected one of {})", known.join(", "))
        })
    }
}

/// Serialize a listed activity into its canonical JSON bytes.
///
/// Object keys come out sorted, so the same remote state always yields the
/// same bytes and byte equality is a valid change check.
pub fn canonical_json(activity: &Value) -> Vec<u8> {
    let sorted = sort_keys(activity);
    serde_json::to_vec(&sorted).unwrap_or_else(|_| activity.to_string().into_bytes())
}

fn sort_keys(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut out = serde_json::Map::new();
            for key in keys {
                out.insert(key.clone(), sort_keys(&map[key]));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(sort_keys).collect()),
        other => other.clone(),
    }
}

/// How a source produces one representation.
#[derive(Clone, Debug)]
pub enum FetchPlan {
    /// Rendered locally from the listed activity document.
    LocalTransform(fn(&Value) -> Vec<u8>),
    /// Downloaded from a URL template with `{field}` placeholders filled from
    /// the listed activity document.
    RemoteTemplate(String),
}

/// A [`FetchPlan`] applied to one activity.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PlannedFetch {
    Bytes(Vec<u8>),
    Url(String),
}

impl FetchPlan {
    pub fn resolve(&self, activity: &RemoteActivity) -> Result<PlannedFetch, SourceError> {
        match self {
            FetchPlan::LocalTransform(render) => Ok(PlannedFetch::Bytes(render(&activity.raw))),
            FetchPlan::RemoteTemplate(template) => {
                expand_template(template, &activity.raw).map(PlannedFetch::Url)
            }
        }
    }
}

static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("placeholder regex"));

/// Replace every `{field}` in `template` with the matching top-level scalar of `doc`.
pub fn expand_template(template: &str, doc: &Value) -> Result<String, SourceError> {
    let mut out = String::with_capacity(template.len());
    let mut last = 0;
    for caps in PLACEHOLDER.captures_iter(template) {
        let whole = caps.get(0).expect("capture 0 always present");
        let key = &caps[1];
        let value = match doc.get(key) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            Some(Value::Bool(b)) => b.to_string(),
            _ => {
                return Err(SourceError::Malformed(format!(
                    "template field '{key}' missing from activity"
                )))
            }
        };
        out.push_str(&template[last..whole.start()]);
        out.push_str(&value);
        last = whole.end();
    }
    out.push_str(&template[last..]);
    Ok(out)
}
