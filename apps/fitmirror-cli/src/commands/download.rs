use std::fs::File;
use std::io;
use std::path::PathBuf;

use anyhow::{ensure, Context, Result};
use clap::Args;
use fitmirror_connect::{ConnectClient, ConnectSettings};
use fitmirror_core::{ActivitySource, ActivityStore, Credentials, SyncEngine};
use serde_json::json;
use tracing::info;

use super::credentials;

#[derive(Args)]
pub struct DownloadArgs {
    /// CSV file with username,password pairs (one account per line)
    #[arg(short = 'c', long, value_name = "FILE")]
    pub csv: Option<PathBuf>,
    /// Account to mirror; the password comes from FITMIRROR_PASSWORD or stdin
    #[arg(short, long, conflicts_with = "csv", required_unless_present = "csv")]
    pub username: Option<String>,
    /// Read the password from the first line of stdin
    #[arg(long, requires = "username")]
    pub password_stdin: bool,
    /// Output directory; each account is mirrored into <OUTPUT>/<username>
    #[arg(short, long, default_value = ".")]
    pub output: PathBuf,
    /// Activities requested per listing page
    #[arg(long)]
    pub batch_size: Option<usize>,
    /// Stop after this many listed activities
    #[arg(long)]
    pub limit: Option<usize>,
    /// Also fetch derived files missing on disk for unchanged activities
    #[arg(long)]
    pub fill_missing: bool,
    /// TOML configuration file
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,
    /// Print a JSON report per account when its sync finishes
    #[arg(long)]
    pub json: bool,
}

pub fn run(args: DownloadArgs) -> Result<()> {
    let config = super::load_config(args.config.as_deref())?;
    let mut options = config.sync_options();
    if let Some(batch_size) = args.batch_size {
        ensure!(batch_size > 0, "--batch-size must be at least 1");
        options.batch_size = batch_size;
    }
    if args.limit.is_some() {
        options.limit = args.limit;
    }
    options.fill_missing |= args.fill_missing;
    let settings =
        ConnectSettings::from_config(&config.connect).context("reading [connect] settings")?;

    let accounts = accounts(&args)?;
    let engine = SyncEngine::new(options);
    for creds in &accounts {
        let client = ConnectClient::new(settings.clone())?;
        client
            .authenticate(creds)
            .with_context(|| format!("signing in as {}", creds.username))?;
        println!("Login successful! Proceeding...");

        let dir = args.output.join(&creds.username);
        let store = ActivityStore::open(&dir)
            .with_context(|| format!("opening {}", dir.display()))?;
        println!(
            "Downloading from {}'s Garmin account into {}/...",
            creds.username,
            store.basedir().display()
        );

        let report = engine
            .sync_with(&client, &store, |event| println!("{event}"))
            .with_context(|| format!("mirroring {}", creds.username))?;
        info!(account = %creds.username, ?report, "account mirrored");
        if args.json {
            let out = json!({ "account": creds.username, "report": report });
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
    }
    Ok(())
}

fn accounts(args: &DownloadArgs) -> Result<Vec<Credentials>> {
    if let Some(path) = &args.csv {
        let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
        return credentials::from_csv(file, |line| {
            println!("Skipping malformed line \"{line}\"");
        });
    }
    let username = args
        .username
        .as_deref()
        .context("either --csv or --username is required")?;
    let creds = credentials::from_args(username, args.password_stdin, io::stdin().lock())?;
    Ok(vec![creds])
}
