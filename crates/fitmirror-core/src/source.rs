//! The remote activity service as seen by the sync engine.

use std::fmt;

use serde_json::Value;

use crate::error::SourceError;
use crate::representation::Representation;

/// One activity as listed by the remote service.
#[derive(Clone, Debug, PartialEq)]
pub struct RemoteActivity {
    pub id: String,
    pub raw: Value,
}

impl RemoteActivity {
    /// Wrap a listed document, extracting its `activityId`.
    pub fn from_listing(raw: Value) -> Result<Self, SourceError> {
        let id = match raw.get("activityId") {
            Some(Value::Number(n)) => n.to_string(),
            Some(Value::String(s)) if is_plain_id(s) => s.clone(),
            Some(other) => {
                return Err(SourceError::Malformed(format!(
                    "unusable activityId {other}"
                )))
            }
            None => {
                return Err(SourceError::Malformed(
                    "listed activity has no activityId".to_string(),
                ))
            }
        };
        Ok(Self { id, raw })
    }
}

// Ids become filenames, so they must not carry separators or dots.
fn is_plain_id(s: &str) -> bool {
    !s.is_empty()
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// One page of the newest-first listing.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ActivityPage {
    /// Listed documents; each still has to pass [`RemoteActivity::from_listing`].
    pub items: Vec<Value>,
    /// Total number of activities the service reported for this request.
    pub total_found: usize,
}

/// Result of fetching one representation of one activity.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    Fetched(Vec<u8>),
    /// The representation does not exist for this activity (e.g. no route map
    /// for an indoor workout).
    NotAvailable,
    Failed(SourceError),
}

#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Capability consumed by [`crate::sync::SyncEngine`].
///
/// Calls are blocking and strictly sequential; implementations carry their
/// own session state behind `&self`.
pub trait ActivitySource {
    fn authenticate(&self, credentials: &Credentials) -> Result<(), SourceError>;

    /// List up to `count` activities starting at `offset`, newest first.
    fn list_activities(&self, offset: usize, count: usize) -> Result<ActivityPage, SourceError>;

    fn fetch(&self, activity: &RemoteActivity, representation: Representation) -> FetchOutcome;
}

impl<S: ActivitySource + ?Sized> ActivitySource for &S {
    fn authenticate(&self, credentials: &Credentials) -> Result<(), SourceError> {
        (**self).authenticate(credentials)
    }

    fn list_activities(&self, offset: usize, count: usize) -> Result<ActivityPage, SourceError> {
        (**self).list_activities(offset, count)
    }

    fn fetch(&self, activity: &RemoteActivity, representation: Representation) -> FetchOutcome {
        (**self).fetch(activity, representation)
    }
}
