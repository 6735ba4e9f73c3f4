use std::num::NonZeroUsize;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use fitmirror_core::{reconcile, ActivityStore, Representation};

use super::list::{garmin_records, strava_activities};

#[derive(Args)]
pub struct ReconcileArgs {
    /// Directory where Garmin activities are stored
    #[arg(short, long, default_value = "./garmin")]
    pub garmin: PathBuf,
    /// Directory where Strava track files are stored
    #[arg(short, long, default_value = "./strava")]
    pub strava: PathBuf,
    /// List activities that appear on both Garmin and Strava
    #[arg(short, long)]
    pub both: bool,
    /// Print upload paths in this format (default from config, else tcx)
    #[arg(short, long)]
    pub format: Option<Representation>,
    /// Paths per upload group (default from config, else 25)
    #[arg(long)]
    pub batch_size: Option<NonZeroUsize>,
    /// Extension of Strava track files (default from config, else gpx)
    #[arg(long)]
    pub ext: Option<String>,
    /// TOML configuration file
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,
}

pub fn run(args: ReconcileArgs) -> Result<()> {
    let config = super::load_config(args.config.as_deref())?;
    let format = args.format.unwrap_or_else(|| config.upload_format());
    let batch_size = args.batch_size.unwrap_or_else(|| config.upload_batch_size());
    let ext = args
        .ext
        .as_deref()
        .unwrap_or(config.comparison_extension());

    let mut strava = strava_activities(&args.strava, ext)?;
    strava.sort_by_key(|a| a.timestamp);
    println!(
        "Found {} Strava activities in {}",
        strava.len(),
        args.strava.display()
    );

    let mut garmin = garmin_records(&args.garmin)?;
    garmin.sort_by_key(|r| r.timestamp);
    println!(
        "Found {} Garmin activities in {}",
        garmin.len(),
        args.garmin.display()
    );

    let outcome = reconcile(garmin.iter(), strava.iter());
    if !outcome.both.is_empty() {
        println!("Present on both Garmin and Strava ({}):", outcome.both.len());
        if args.both {
            for (g, s) in &outcome.both {
                println!("    {g} / {s}");
            }
        }
    }
    if !outcome.only_a.is_empty() {
        println!("Only on Garmin ({}):", outcome.only_a.len());
        for g in &outcome.only_a {
            println!("    {g}");
        }
    }
    if !outcome.only_b.is_empty() {
        println!("Only on Strava ({}):", outcome.only_b.len());
        for s in &outcome.only_b {
            println!("    {s}");
        }
    }

    let store = ActivityStore::open(&args.garmin)
        .with_context(|| format!("opening {}", args.garmin.display()))?;
    for group in outcome.upload_batches_a(batch_size) {
        let mut paths = Vec::with_capacity(group.len());
        for record in group {
            let path = store.record_path(record, format)?;
            let path = std::path::absolute(&path)
                .with_context(|| format!("resolving {}", path.display()))?;
            paths.push(format!("\"{}\"", path.display()));
        }
        println!("---");
        println!("{}", paths.join(" "));
    }
    Ok(())
}
