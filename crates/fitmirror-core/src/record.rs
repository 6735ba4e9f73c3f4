use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, NaiveDateTime, Timelike, Utc};
use serde::Deserialize;
use serde_json::Value;

use crate::error::RecordError;
use crate::reconcile::Timestamped;
use crate::representation::Representation;

/// Metadata view of one mirrored activity, parsed from its canonical JSON.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ActivityRecord {
    pub id: String,
    /// Begin time, UTC, truncated to whole seconds.
    pub timestamp: DateTime<Utc>,
    pub kind: String,
    pub name: String,
    pub formats_on_disk: BTreeSet<Representation>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ActivityDocument {
    activity_id: Value,
    #[serde(default)]
    activity_name: Option<String>,
    activity_type: ActivityTypeDocument,
    activity_summary: ActivitySummaryDocument,
}

#[derive(Deserialize)]
struct ActivityTypeDocument {
    display: String,
}

#[derive(Deserialize)]
struct ActivitySummaryDocument {
    #[serde(rename = "BeginTimestamp")]
    begin_timestamp: SummaryValue,
}

#[derive(Deserialize)]
struct SummaryValue {
    value: String,
}

impl ActivityRecord {
    /// Parse the canonical JSON stored as `filename` (`<id>.json`).
    ///
    /// The `activityId` inside the document must match the filename stem.
    pub fn parse(filename: &str, bytes: &[u8]) -> Result<Self, RecordError> {
        let stem = match Representation::parse_filename(filename) {
            Some((stem, Representation::Json)) => stem,
            _ => return Err(RecordError::malformed(filename, "not a canonical json filename")),
        };
        let doc: ActivityDocument = serde_json::from_slice(bytes)
            .map_err(|e| RecordError::malformed(filename, e.to_string()))?;
        let id = match &doc.activity_id {
            Value::Number(n) => n.to_string(),
            Value::String(s) => s.clone(),
            other => {
                return Err(RecordError::malformed(
                    filename,
                    format!("unusable activityId {other}"),
                ))
            }
        };
        if id != stem {
            return Err(RecordError::malformed(
                filename,
                format!("activityId {id} does not match filename"),
            ));
        }
        let timestamp = parse_begin_timestamp(&doc.activity_summary.begin_timestamp.value)
            .ok_or_else(|| {
                RecordError::malformed(
                    filename,
                    format!(
                        "unparseable begin timestamp '{}'",
                        doc.activity_summary.begin_timestamp.value
                    ),
                )
            })?;
        Ok(Self {
            id,
            timestamp,
            kind: doc.activity_type.display,
            name: doc.activity_name.unwrap_or_default(),
            formats_on_disk: BTreeSet::from([Representation::Json]),
        })
    }

    pub fn has_format(&self, representation: Representation) -> bool {
        self.formats_on_disk.contains(&representation)
    }
}

/// Parse a begin time such as `2014-03-02T07:15:00.000Z`.
pub fn parse_begin_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    let parsed = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.fZ")
        .map(|naive| naive.and_utc())
        .or_else(|_| DateTime::parse_from_rfc3339(raw).map(|dt| dt.with_timezone(&Utc)))
        .ok()?;
    parsed.with_nanosecond(0)
}

impl Timestamped for ActivityRecord {
    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

impl fmt::Display for ActivityRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {}: {}",
            self.timestamp.format("%Y-%m-%d %H:%M:%S"),
            self.id,
            self.kind,
            self.name
        )
    }
}
