//! Filesystem-backed mirror of one account's activities.
//!
//! Every file is committed by writing a temporary sibling and renaming it over
//! the target, so a reader sees either the previous content or the new one.
//! There is no locking: one writer per store directory.

use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::{RecordError, StoreError};
use crate::record::ActivityRecord;
use crate::representation::Representation;

/// Name prefix reserved for in-flight temporary files.
pub const TEMP_PREFIX: &str = ".fitmirror-";
pub const TEMP_SUFFIX: &str = ".tmp";

#[derive(Clone, Debug)]
pub struct ActivityStore {
    basedir: PathBuf,
}

/// A committed file found while enumerating the store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoreEntry {
    pub filename: String,
    pub path: PathBuf,
    pub len: u64,
}

impl ActivityStore {
    /// Open the store rooted at `basedir`, creating the directory if needed.
    ///
    /// Temporary files left behind by a killed writer are removed.
    pub fn open(basedir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let basedir = basedir.into();
        fs::create_dir_all(&basedir).map_err(|e| StoreError::io(&basedir, e))?;
        let store = Self { basedir };
        store.remove_stale_temp_files()?;
        Ok(store)
    }

    fn remove_stale_temp_files(&self) -> Result<usize, StoreError> {
        let dir = fs::read_dir(&self.basedir).map_err(|e| StoreError::io(&self.basedir, e))?;
        let mut removed = 0;
        for entry in dir {
            let entry = entry.map_err(|e| StoreError::io(&self.basedir, e))?;
            let name = entry.file_name();
            let is_stale = name.to_str().is_some_and(is_temp_filename)
                && entry.file_type().map(|t| t.is_file()).unwrap_or(false);
            if !is_stale {
                continue;
            }
            match fs::remove_file(entry.path()) {
                Ok(()) => removed += 1,
                Err(err) => {
                    warn!(target: "fitmirror::store", file = %entry.path().display(), %err, "unable to remove stale temp file")
                }
            }
        }
        if removed > 0 {
            debug!(target: "fitmirror::store", removed, "removed stale temp files");
        }
        Ok(removed)
    }

    pub fn basedir(&self) -> &Path {
        &self.basedir
    }

    /// Path of `filename` inside the store; rejects names that could escape it.
    pub fn path(&self, filename: &str) -> Result<PathBuf, StoreError> {
        if !is_valid_filename(filename) {
            return Err(StoreError::InvalidFilename(filename.to_string()));
        }
        Ok(self.basedir.join(filename))
    }

    pub fn exists(&self, filename: &str) -> bool {
        self.path(filename).map(|p| p.is_file()).unwrap_or(false)
    }

    pub fn read(&self, filename: &str) -> Result<Vec<u8>, StoreError> {
        self.read_optional(filename)?
            .ok_or_else(|| StoreError::NotFound(filename.to_string()))
    }

    pub fn read_optional(&self, filename: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let path = self.path(filename)?;
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(StoreError::io(path, err)),
        }
    }

    pub fn write(&self, filename: &str, bytes: &[u8]) -> Result<(), StoreError> {
        self.write_with(filename, |file| file.write_all(bytes))
    }

    /// Atomically replace `filename` with whatever `fill` writes.
    ///
    /// If `fill` fails, the temporary file is removed and `filename` keeps its
    /// previous state (absent or old content).
    pub fn write_with<F>(&self, filename: &str, fill: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut File) -> io::Result<()>,
    {
        let target = self.path(filename)?;
        let mut tmp = tempfile::Builder::new()
            .prefix(TEMP_PREFIX)
            .suffix(TEMP_SUFFIX)
            .tempfile_in(&self.basedir)
            .map_err(|e| StoreError::io(&self.basedir, e))?;
        {
            let file = tmp.as_file_mut();
            fill(file).map_err(|e| StoreError::io(&target, e))?;
            file.flush().map_err(|e| StoreError::io(&target, e))?;
            file.sync_all().map_err(|e| StoreError::io(&target, e))?;
        }
        tmp.persist(&target)
            .map_err(|e| StoreError::io(&target, e.error))?;
        debug!(target: "fitmirror::store", file = %target.display(), "committed");
        Ok(())
    }

    /// Delete `filename`; deleting an absent file is not an error.
    pub fn remove(&self, filename: &str) -> Result<(), StoreError> {
        let path = self.path(filename)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(StoreError::io(path, err)),
        }
    }

    /// Walk the committed files of the store.
    ///
    /// Each call starts a fresh directory walk. With `ordered`, filenames come
    /// out in lexicographic order, which only approximates chronological
    /// order: remote ids follow upload order, not activity time.
    pub fn entries(&self, ordered: bool) -> impl Iterator<Item = Result<StoreEntry, StoreError>> {
        let mut walk = WalkDir::new(&self.basedir).min_depth(1).max_depth(1);
        if ordered {
            walk = walk.sort_by_file_name();
        }
        let basedir = self.basedir.clone();
        walk.into_iter().filter_map(move |entry| {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    let path = err.path().unwrap_or(basedir.as_path()).to_path_buf();
                    let source = err
                        .into_io_error()
                        .unwrap_or_else(|| io::Error::new(io::ErrorKind::Other, "walk failed"));
                    return Some(Err(StoreError::io(path, source)));
                }
            };
            if !entry.file_type().is_file() {
                return None;
            }
            let filename = entry.file_name().to_str()?.to_string();
            if is_temp_filename(&filename) {
                return None;
            }
            let len = match entry.metadata() {
                Ok(meta) => meta.len(),
                Err(err) => {
                    let source = err
                        .into_io_error()
                        .unwrap_or_else(|| io::Error::new(io::ErrorKind::Other, "metadata failed"));
                    return Some(Err(StoreError::io(entry.path(), source)));
                }
            };
            Some(Ok(StoreEntry {
                filename,
                path: entry.into_path(),
                len,
            }))
        })
    }

    /// Parse every canonical JSON entry into an [`ActivityRecord`].
    ///
    /// A record that fails to parse is yielded as an error and the walk
    /// continues with the next entry.
    pub fn activities(
        &self,
        ordered: bool,
    ) -> impl Iterator<Item = Result<ActivityRecord, RecordError>> + '_ {
        self.entries(ordered).filter_map(move |entry| {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => return Some(Err(err.into())),
            };
            match Representation::parse_filename(&entry.filename) {
                Some((_, Representation::Json)) => Some(self.load_record(&entry.filename)),
                _ => None,
            }
        })
    }

    /// Load the record stored under `json_filename`.
    pub fn load_record(&self, json_filename: &str) -> Result<ActivityRecord, RecordError> {
        let bytes = self.read(json_filename)?;
        let mut record = ActivityRecord::parse(json_filename, &bytes)?;
        record.formats_on_disk = self.formats_on_disk(&record.id);
        Ok(record)
    }

    pub fn formats_on_disk(&self, activity_id: &str) -> BTreeSet<Representation> {
        Representation::ALL
            .into_iter()
            .filter(|repr| self.exists(&repr.filename(activity_id)))
            .collect()
    }

    /// Path of one representation of `record`.
    pub fn record_path(
        &self,
        record: &ActivityRecord,
        representation: Representation,
    ) -> Result<PathBuf, StoreError> {
        self.path(&representation.filename(&record.id))
    }
}

fn is_temp_filename(name: &str) -> bool {
    name.starts_with(TEMP_PREFIX) && name.ends_with(TEMP_SUFFIX)
}

fn is_valid_filename(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains('/')
        && !name.contains('\\')
        && !name.contains(std::path::MAIN_SEPARATOR)
        && !name.starts_with(TEMP_PREFIX)
}
