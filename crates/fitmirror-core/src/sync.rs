//! Incremental mirror of a remote activity history into an [`ActivityStore`].
//!
//! The canonical JSON of each listed activity is the change fingerprint. When
//! it matches the stored copy byte for byte, the derived formats are assumed
//! current and are not fetched again; otherwise the JSON is committed first and
//! every derived format is re-fetched and overwritten. A refresh that stops
//! early removes the new JSON again, so the next run repeats it.

use std::fmt;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{SourceError, SyncError};
use crate::pages::{ActivityPages, DEFAULT_BATCH_SIZE};
use crate::representation::Representation;
use crate::source::{ActivitySource, FetchOutcome, RemoteActivity};
use crate::store::ActivityStore;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SyncOptions {
    pub batch_size: usize,
    pub limit: Option<usize>,
    /// Fetch derived formats that are missing on disk even when the JSON is unchanged.
    pub fill_missing: bool,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            limit: None,
            fill_missing: false,
        }
    }
}

/// Per-item decisions, reported to the caller as they happen.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SyncEvent {
    Unchanged { filename: String },
    Downloading { filename: String },
    NotAvailable { filename: String },
    Malformed { activity: String, reason: String },
}

impl fmt::Display for SyncEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncEvent::Unchanged { filename } => write!(f, "Skipping {filename} (already exists)..."),
            SyncEvent::Downloading { filename } => write!(f, "Downloading {filename}..."),
            SyncEvent::NotAvailable { filename } => {
                write!(f, "Failed to download {filename}. Skipping!")
            }
            SyncEvent::Malformed { activity, reason } => {
                write!(f, "Skipping malformed activity {activity}: {reason}")
            }
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub activities_seen: usize,
    pub unchanged: usize,
    pub updated: usize,
    pub files_written: usize,
    pub not_available: usize,
    pub malformed: usize,
}

#[derive(Clone, Debug, Default)]
pub struct SyncEngine {
    options: SyncOptions,
}

impl SyncEngine {
    pub fn new(options: SyncOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &SyncOptions {
        &self.options
    }

    pub fn sync<S>(&self, source: &S, store: &ActivityStore) -> Result<SyncReport, SyncError>
    where
        S: ActivitySource + ?Sized,
    {
        self.sync_with(source, store, |_| {})
    }

    /// Run a full pass, calling `observe` for every per-item decision.
    ///
    /// Returns on the first listing, authentication, transport or store
    /// failure; files committed before that point stay valid.
    pub fn sync_with<S, F>(
        &self,
        source: &S,
        store: &ActivityStore,
        mut observe: F,
    ) -> Result<SyncReport, SyncError>
    where
        S: ActivitySource + ?Sized,
        F: FnMut(&SyncEvent),
    {
        let mut report = SyncReport::default();
        let mut emit = |report: &mut SyncReport, event: SyncEvent| {
            match &event {
                SyncEvent::NotAvailable { .. } => report.not_available += 1,
                SyncEvent::Malformed { .. } => report.malformed += 1,
                _ => {}
            }
            observe(&event);
        };

        let pages = ActivityPages::new(source, self.options.batch_size).with_limit(self.options.limit);
        for listed in pages {
            let raw = listed?;
            report.activities_seen += 1;
            let activity = match RemoteActivity::from_listing(raw) {
                Ok(activity) => activity,
                Err(err) => {
                    warn!(target: "fitmirror::sync", %err, "skipping listed activity");
                    emit(
                        &mut report,
                        SyncEvent::Malformed {
                            activity: "<unknown>".to_string(),
                            reason: err.to_string(),
                        },
                    );
                    continue;
                }
            };
            self.sync_activity(source, store, &activity, &mut report, &mut emit)?;
        }

        info!(
            target: "fitmirror::sync",
            seen = report.activities_seen,
            updated = report.updated,
            unchanged = report.unchanged,
            files_written = report.files_written,
            "sync finished"
        );
        Ok(report)
    }

    fn sync_activity<S, E>(
        &self,
        source: &S,
        store: &ActivityStore,
        activity: &RemoteActivity,
        report: &mut SyncReport,
        emit: &mut E,
    ) -> Result<(), SyncError>
    where
        S: ActivitySource + ?Sized,
        E: FnMut(&mut SyncReport, SyncEvent),
    {
        let json_name = Representation::Json.filename(&activity.id);
        let remote_json = match source.fetch(activity, Representation::Json) {
            FetchOutcome::Fetched(bytes) => bytes,
            FetchOutcome::NotAvailable => {
                emit(report, SyncEvent::NotAvailable { filename: json_name });
                return Ok(());
            }
            FetchOutcome::Failed(err) => return skip_or_abort(err, activity, report, emit),
        };

        let unchanged = store.read_optional(&json_name)?.as_deref() == Some(remote_json.as_slice());
        if unchanged {
            report.unchanged += 1;
            emit(report, SyncEvent::Unchanged { filename: json_name });
            if !self.options.fill_missing {
                return Ok(());
            }
            return self.sync_derived(source, store, activity, true, report, emit).map(|_| ());
        }

        emit(report, SyncEvent::Downloading { filename: json_name.clone() });
        store.write(&json_name, &remote_json)?;
        report.updated += 1;
        report.files_written += 1;

        // A committed JSON vouches for every derived file next to it. If the
        // refresh stops early, drop the JSON so the next run sees a change.
        let outcome = self.sync_derived(source, store, activity, false, report, emit);
        if !matches!(outcome, Ok(true)) {
            if let Err(err) = store.remove(&json_name) {
                warn!(target: "fitmirror::sync", file = %json_name, %err, "unable to roll back json");
            }
        }
        outcome.map(|_| ())
    }

    /// Fetch the derived formats of `activity`. Returns `Ok(false)` when the
    /// activity was abandoned as malformed part way through.
    fn sync_derived<S, E>(
        &self,
        source: &S,
        store: &ActivityStore,
        activity: &RemoteActivity,
        unchanged: bool,
        report: &mut SyncReport,
        emit: &mut E,
    ) -> Result<bool, SyncError>
    where
        S: ActivitySource + ?Sized,
        E: FnMut(&mut SyncReport, SyncEvent),
    {
        for representation in Representation::DERIVED {
            let filename = representation.filename(&activity.id);
            if unchanged && store.exists(&filename) {
                emit(report, SyncEvent::Unchanged { filename });
                continue;
            }
            emit(report, SyncEvent::Downloading { filename: filename.clone() });
            match source.fetch(activity, representation) {
                FetchOutcome::Fetched(bytes) => {
                    store.write(&filename, &bytes)?;
                    report.files_written += 1;
                }
                FetchOutcome::NotAvailable => {
                    debug!(target: "fitmirror::sync", %filename, "representation not available");
                    emit(report, SyncEvent::NotAvailable { filename });
                }
                FetchOutcome::Failed(err) => {
                    return skip_or_abort(err, activity, report, emit).map(|()| false)
                }
            }
        }
        Ok(true)
    }
}

fn skip_or_abort<E>(
    err: SourceError,
    activity: &RemoteActivity,
    report: &mut SyncReport,
    emit: &mut E,
) -> Result<(), SyncError>
where
    E: FnMut(&mut SyncReport, SyncEvent),
{
    if err.is_per_activity() {
        warn!(target: "fitmirror::sync", activity = %activity.id, %err, "abandoning activity");
        emit(
            report,
            SyncEvent::Malformed {
                activity: activity.id.clone(),
                reason: err.to_string(),
            },
        );
        Ok(())
    } else {
        Err(err.into())
    }
}
