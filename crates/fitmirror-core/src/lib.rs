//! Local, durable mirror of a remote fitness-activity history.
//!
//! The crate keeps one directory per account ([`ActivityStore`]), fills it
//! incrementally from an [`ActivitySource`] ([`SyncEngine`]) and compares it
//! with a second mirror kept by another service ([`reconcile`]).

pub mod comparison;
pub mod config;
pub mod error;
pub mod pages;
pub mod reconcile;
pub mod record;
pub mod representation;
pub mod source;
pub mod store;
pub mod sync;

pub use comparison::ComparisonActivity;
pub use config::{config_schema_json, load_config, parse_config, Config};
pub use error::{ConfigError, RecordError, SourceError, StoreError, SyncError};
pub use pages::ActivityPages;
pub use reconcile::{batches, reconcile, Reconciliation, Timestamped};
pub use record::ActivityRecord;
pub use representation::{canonical_json, FetchPlan, PlannedFetch, Representation};
pub use source::{ActivityPage, ActivitySource, Credentials, FetchOutcome, RemoteActivity};
pub use store::{ActivityStore, StoreEntry};
pub use sync::{SyncEngine, SyncEvent, SyncOptions, SyncReport};
