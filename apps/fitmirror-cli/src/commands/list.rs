use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Subcommand;
use fitmirror_core::comparison::walk_activities;
use fitmirror_core::{ActivityRecord, ActivityStore, ComparisonActivity};

#[derive(Subcommand)]
pub enum ListCmd {
    /// Activities of one account's Garmin mirror, in store order
    Garmin {
        /// Directory holding <id>.json and its derived files
        #[arg(short, long, default_value = "./garmin")]
        dir: PathBuf,
    },
    /// Track files of the Strava mirror, in filename order
    Strava {
        #[arg(short, long, default_value = "./strava")]
        dir: PathBuf,
        /// Track file extension (default from config, else gpx)
        #[arg(long)]
        ext: Option<String>,
        /// TOML configuration file
        #[arg(long, value_name = "FILE")]
        config: Option<PathBuf>,
    },
}

pub fn run(cmd: ListCmd) -> Result<()> {
    match cmd {
        ListCmd::Garmin { dir } => {
            for record in garmin_records(&dir)? {
                println!("{record}");
            }
        }
        ListCmd::Strava { dir, ext, config } => {
            let config = super::load_config(config.as_deref())?;
            let ext = ext.as_deref().unwrap_or(config.comparison_extension());
            for activity in strava_activities(&dir, ext)? {
                println!("{activity}");
            }
        }
    }
    Ok(())
}

/// Every parseable record of the store at `dir`; unparseable ones are
/// reported on stderr and left out.
pub(crate) fn garmin_records(dir: &Path) -> Result<Vec<ActivityRecord>> {
    super::existing_dir(dir)?;
    let store = ActivityStore::open(dir).with_context(|| format!("opening {}", dir.display()))?;
    let mut records = Vec::new();
    for record in store.activities(true) {
        match record {
            Ok(record) => records.push(record),
            Err(err) => eprintln!("Skipping {err}"),
        }
    }
    Ok(records)
}

pub(crate) fn strava_activities(dir: &Path, ext: &str) -> Result<Vec<ComparisonActivity>> {
    super::existing_dir(dir)?;
    let mut activities = Vec::new();
    for activity in walk_activities(dir, ext, true) {
        match activity {
            Ok(activity) => activities.push(activity),
            Err(err) => eprintln!("Skipping {err}"),
        }
    }
    Ok(activities)
}
