use std::cell::{Cell, RefCell};
use std::collections::HashSet;

use anyhow::Result;
use fitmirror_core::{
    canonical_json, ActivityPage, ActivitySource, ActivityStore, Credentials, FetchOutcome,
    FetchPlan, PlannedFetch, RemoteActivity, Representation, SourceError, SyncEngine, SyncError,
    SyncEvent, SyncOptions,
};
use serde_json::{json, Value};
use tempfile::TempDir;

/// In-memory remote with call accounting.
struct MockRemote {
    activities: RefCell<Vec<Value>>,
    unavailable: HashSet<(String, Representation)>,
    failures: RefCell<Vec<(String, Representation, SourceError)>>,
    render_version: Cell<u32>,
    fetches: RefCell<Vec<(String, Representation)>>,
}

impl MockRemote {
    fn new(activities: Vec<Value>) -> Self {
        Self {
            activities: RefCell::new(activities),
            unavailable: HashSet::new(),
            failures: RefCell::new(Vec::new()),
            render_version: Cell::new(1),
            fetches: RefCell::new(Vec::new()),
        }
    }

    fn derived_fetches(&self) -> Vec<(String, Representation)> {
        self.fetches
            .borrow()
            .iter()
            .filter(|(_, repr)| !repr.is_canonical())
            .cloned()
            .collect()
    }

    fn reset_calls(&self) {
        self.fetches.borrow_mut().clear();
    }

    fn plan(representation: Representation) -> FetchPlan {
        if representation.is_canonical() {
            FetchPlan::LocalTransform(canonical_json)
        } else {
            FetchPlan::RemoteTemplate(format!("mock://{{activityId}}/{}", representation))
        }
    }
}

impl ActivitySource for MockRemote {
    fn authenticate(&self, _credentials: &Credentials) -> Result<(), SourceError> {
        Ok(())
    }

    fn list_activities(&self, offset: usize, count: usize) -> Result<ActivityPage, SourceError> {
        let all = self.activities.borrow();
        Ok(ActivityPage {
            items: all.iter().skip(offset).take(count).cloned().collect(),
            total_found: all.len(),
        })
    }

    fn fetch(&self, activity: &RemoteActivity, representation: Representation) -> FetchOutcome {
        self.fetches
            .borrow_mut()
            .push((activity.id.clone(), representation));
        if let Some((_, _, err)) = self
            .failures
            .borrow()
            .iter()
            .find(|(id, repr, _)| *id == activity.id && *repr == representation)
        {
            return FetchOutcome::Failed(err.clone());
        }
        if self
            .unavailable
            .contains(&(activity.id.clone(), representation))
        {
            return FetchOutcome::NotAvailable;
        }
        match Self::plan(representation).resolve(activity) {
            Ok(PlannedFetch::Bytes(bytes)) => FetchOutcome::Fetched(bytes),
            Ok(PlannedFetch::Url(url)) => {
                FetchOutcome::Fetched(format!("{url}#v{}", self.render_version.get()).into_bytes())
            }
            Err(err) => FetchOutcome::Failed(err),
        }
    }
}

fn activity(id: u64, name: &str, day: u32) -> Value {
    json!({
        "activityId": id,
        "activityName": name,
        "activityType": { "display": "Running", "key": "running" },
        "activitySummary": {
            "BeginTimestamp": { "value": format!("2014-03-{day:02}T07:00:00.000Z") }
        }
    })
}

fn fixture() -> Result<(TempDir, ActivityStore, MockRemote)> {
    let dir = TempDir::new()?;
    let store = ActivityStore::open(dir.path().join("runner"))?;
    let remote = MockRemote::new(vec![
        activity(300, "Tempo", 3),
        activity(200, "Long run", 2),
        activity(100, "Easy", 1),
    ]);
    Ok((dir, store, remote))
}

fn small_pages() -> SyncEngine {
    SyncEngine::new(SyncOptions {
        batch_size: 2,
        ..SyncOptions::default()
    })
}

#[test]
fn first_run_writes_every_representation() -> Result<()> {
    let (_dir, store, remote) = fixture()?;
    let report = small_pages().sync(&remote, &store)?;

    assert_eq!(report.activities_seen, 3);
    assert_eq!(report.updated, 3);
    assert_eq!(report.unchanged, 0);
    assert_eq!(report.files_written, 3 * Representation::ALL.len());
    for id in ["100", "200", "300"] {
        for repr in Representation::ALL {
            assert!(store.exists(&repr.filename(id)), "{id}.{repr} missing");
        }
    }
    assert_eq!(store.read("100.tcx")?, b"mock://100/tcx#v1".to_vec());
    Ok(())
}

#[test]
fn second_run_against_unchanged_remote_fetches_no_derived_formats() -> Result<()> {
    let (_dir, store, remote) = fixture()?;
    let engine = small_pages();
    engine.sync(&remote, &store)?;
    remote.reset_calls();

    let mut events = Vec::new();
    let report = engine.sync_with(&remote, &store, |e| events.push(e.clone()))?;

    assert!(remote.derived_fetches().is_empty());
    assert_eq!(report.unchanged, 3);
    assert_eq!(report.files_written, 0);
    assert!(events
        .iter()
        .all(|e| matches!(e, SyncEvent::Unchanged { .. })));
    Ok(())
}

#[test]
fn changed_json_refetches_and_overwrites_every_format() -> Result<()> {
    let (_dir, store, remote) = fixture()?;
    let engine = small_pages();
    engine.sync(&remote, &store)?;
    remote.reset_calls();

    remote.activities.borrow_mut()[1] = activity(200, "Long run (renamed)", 2);
    remote.render_version.set(2);
    let report = engine.sync(&remote, &store)?;

    assert_eq!(report.updated, 1);
    assert_eq!(report.unchanged, 2);
    let refetched: Vec<_> = remote.derived_fetches();
    assert_eq!(refetched.len(), Representation::DERIVED.len());
    assert!(refetched.iter().all(|(id, _)| id == "200"));
    assert_eq!(store.read("200.gpx")?, b"mock://200/gpx#v2".to_vec());
    assert_eq!(store.read("100.gpx")?, b"mock://100/gpx#v1".to_vec());
    let stored: Value = serde_json::from_slice(&store.read("200.json")?)?;
    assert_eq!(stored["activityName"], "Long run (renamed)");
    Ok(())
}

#[test]
fn unavailable_format_does_not_block_the_rest() -> Result<()> {
    let (_dir, store, mut remote) = fixture()?;
    remote
        .unavailable
        .insert(("300".to_string(), Representation::Kml));

    let mut events = Vec::new();
    let report = small_pages().sync_with(&remote, &store, |e| events.push(e.clone()))?;

    assert_eq!(report.not_available, 1);
    assert!(!store.exists("300.kml"));
    assert!(store.exists("300.csv"));
    assert!(store.exists("200.kml"));
    assert!(events.contains(&SyncEvent::NotAvailable {
        filename: "300.kml".to_string()
    }));
    Ok(())
}

#[test]
fn transport_failure_aborts_run_but_keeps_finished_activities() -> Result<()> {
    let (_dir, store, remote) = fixture()?;
    remote.failures.borrow_mut().push((
        "200".to_string(),
        Representation::Tcx,
        SourceError::Transient("connection reset".to_string()),
    ));

    let err = small_pages().sync(&remote, &store).unwrap_err();
    assert!(matches!(err, SyncError::Source(SourceError::Transient(_))));

    for repr in Representation::ALL {
        assert!(store.exists(&repr.filename("300")));
    }
    assert!(!store.exists("200.json"), "half-refreshed activity must look changed");
    assert!(store.exists("200.orig.zip"));
    assert!(!store.exists("200.tcx"));
    assert!(!store.exists("200.gpx"));
    assert!(!store.exists("100.json"));
    Ok(())
}

#[test]
fn auth_failure_is_fatal() -> Result<()> {
    let (_dir, store, remote) = fixture()?;
    remote.failures.borrow_mut().push((
        "300".to_string(),
        Representation::OrigZip,
        SourceError::Auth("session expired".to_string()),
    ));
    let err = small_pages().sync(&remote, &store).unwrap_err();
    assert!(matches!(err, SyncError::Source(SourceError::Auth(_))));
    Ok(())
}

#[test]
fn malformed_activity_is_skipped_and_run_continues() -> Result<()> {
    let (_dir, store, remote) = fixture()?;
    remote
        .activities
        .borrow_mut()
        .insert(1, json!({ "activityName": "lost its id" }));
    remote.failures.borrow_mut().push((
        "200".to_string(),
        Representation::Gpx,
        SourceError::Malformed("bad export".to_string()),
    ));

    let report = small_pages().sync(&remote, &store)?;

    assert_eq!(report.activities_seen, 4);
    assert_eq!(report.malformed, 2);
    assert!(!store.exists("200.kml"), "activity 200 processing stops at gpx");
    assert!(!store.exists("200.json"));
    assert!(store.exists("100.kml"));
    Ok(())
}

#[test]
fn fill_missing_retries_only_absent_formats() -> Result<()> {
    let (_dir, store, mut remote) = fixture()?;
    remote
        .unavailable
        .insert(("100".to_string(), Representation::Kml));
    small_pages().sync(&remote, &store)?;
    remote.reset_calls();
    remote.unavailable.clear();

    let engine = SyncEngine::new(SyncOptions {
        batch_size: 2,
        fill_missing: true,
        ..SyncOptions::default()
    });
    let report = engine.sync(&remote, &store)?;

    assert_eq!(
        remote.derived_fetches(),
        vec![("100".to_string(), Representation::Kml)]
    );
    assert_eq!(report.files_written, 1);
    assert!(store.exists("100.kml"));
    Ok(())
}

#[test]
fn limit_caps_listed_activities() -> Result<()> {
    let (_dir, store, remote) = fixture()?;
    let engine = SyncEngine::new(SyncOptions {
        batch_size: 2,
        limit: Some(1),
        fill_missing: false,
    });
    let report = engine.sync(&remote, &store)?;
    assert_eq!(report.activities_seen, 1);
    assert!(store.exists("300.json"));
    assert!(!store.exists("200.json"));
    Ok(())
}

#[test]
fn synced_store_enumerates_as_records() -> Result<()> {
    let (_dir, store, mut remote) = fixture()?;
    remote
        .unavailable
        .insert(("200".to_string(), Representation::Kml));
    small_pages().sync(&remote, &store)?;

    let records: Vec<_> = store.activities(true).collect::<Result<_, _>>()?;
    let ids: Vec<&str> = records.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["100", "200", "300"]);
    let long_run = &records[1];
    assert_eq!(long_run.name, "Long run");
    assert!(long_run.has_format(Representation::Tcx));
    assert!(!long_run.has_format(Representation::Kml));
    Ok(())
}

#[test]
fn interrupted_refresh_is_repeated_on_the_next_run() -> Result<()> {
    let (_dir, store, remote) = fixture()?;
    let engine = small_pages();
    engine.sync(&remote, &store)?;

    remote.activities.borrow_mut()[1] = activity(200, "Long run (renamed)", 2);
    remote.render_version.set(2);
    remote.failures.borrow_mut().push((
        "200".to_string(),
        Representation::Tcx,
        SourceError::Transient("connection reset".to_string()),
    ));
    assert!(engine.sync(&remote, &store).is_err());

    remote.failures.borrow_mut().clear();
    remote.reset_calls();
    let report = engine.sync(&remote, &store)?;

    assert_eq!(report.updated, 1);
    let refetched = remote.derived_fetches();
    assert_eq!(refetched.len(), Representation::DERIVED.len());
    assert!(refetched.iter().all(|(id, _)| id == "200"));
    assert_eq!(store.read("200.tcx")?, b"mock://200/tcx#v2".to_vec());
    assert_eq!(store.read("200.gpx")?, b"mock://200/gpx#v2".to_vec());
    let stored: Value = serde_json::from_slice(&store.read("200.json")?)?;
    assert_eq!(stored["activityName"], "Long run (renamed)");
    Ok(())
}

#[test]
fn malformed_refresh_is_repeated_on_the_next_run() -> Result<()> {
    let (_dir, store, remote) = fixture()?;
    remote.failures.borrow_mut().push((
        "100".to_string(),
        Representation::Kml,
        SourceError::Malformed("bad export".to_string()),
    ));
    let engine = small_pages();
    engine.sync(&remote, &store)?;
    assert!(!store.exists("100.json"));

    remote.failures.borrow_mut().clear();
    remote.reset_calls();
    engine.sync(&remote, &store)?;
    assert!(store.exists("100.json"));
    assert!(store.exists("100.kml"));
    assert!(store.exists("100.csv"));
    Ok(())
}

#[test]
fn store_failure_aborts_run_without_further_writes() -> Result<()> {
    let (_dir, store, remote) = fixture()?;
    std::fs::create_dir_all(store.basedir().join("200.tcx").join("x"))?;

    let err = small_pages().sync(&remote, &store).unwrap_err();
    assert!(matches!(err, SyncError::Store(_)));

    assert!(store.exists("300.csv"));
    assert!(!store.exists("200.gpx"));
    assert!(!store.exists("200.json"));
    assert!(!store.exists("100.json"));
    let leftovers = std::fs::read_dir(store.basedir())?
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
        .count();
    assert_eq!(leftovers, 0);
    Ok(())
}

#[test]
fn unexpected_response_is_fatal() -> Result<()> {
    let (_dir, store, remote) = fixture()?;
    remote.failures.borrow_mut().push((
        "300".to_string(),
        Representation::Gpx,
        SourceError::UnexpectedResponse("html instead of gpx".to_string()),
    ));
    let err = small_pages().sync(&remote, &store).unwrap_err();
    assert!(matches!(
        err,
        SyncError::Source(SourceError::UnexpectedResponse(_))
    ));
    assert!(!store.exists("200.json"));
    Ok(())
}

#[test]
fn unavailable_json_skips_only_that_activity() -> Result<()> {
    let (_dir, store, mut remote) = fixture()?;
    remote
        .unavailable
        .insert(("200".to_string(), Representation::Json));

    let mut events = Vec::new();
    let report = small_pages().sync_with(&remote, &store, |e| events.push(e.clone()))?;

    assert_eq!(report.not_available, 1);
    assert!(events.contains(&SyncEvent::NotAvailable {
        filename: "200.json".to_string()
    }));
    assert!(remote
        .derived_fetches()
        .iter()
        .all(|(id, _)| id != "200"));
    for repr in Representation::ALL {
        assert!(!store.exists(&repr.filename("200")));
        assert!(store.exists(&repr.filename("100")));
    }
    Ok(())
}
