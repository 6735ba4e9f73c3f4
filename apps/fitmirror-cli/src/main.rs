mod commands;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

use commands::{ConfigCmd, DownloadArgs, ListCmd, ReconcileArgs};

#[derive(Parser)]
#[command(
    name = "fitmirror",
    version,
    about = "Mirror fitness activities locally and compare mirrors",
    after_help = "Because the hell with APIs!"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Mirror Garmin Connect accounts into local directories
    Download(DownloadArgs),
    /// Print the activities of a local mirror
    List {
        #[command(subcommand)]
        cmd: ListCmd,
    },
    /// Compare the Garmin mirror with the Strava mirror and print upload groups
    Reconcile(ReconcileArgs),
    /// Configuration helpers
    Config {
        #[command(subcommand)]
        cmd: ConfigCmd,
    },
}

fn main() {
    let _ = fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .try_init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Download(args) => commands::download::run(args),
        Commands::List { cmd } => commands::list::run(cmd),
        Commands::Reconcile(args) => commands::reconcile::run(args),
        Commands::Config { cmd } => commands::config::run(cmd),
    };
    if let Err(e) = result {
        eprintln!("{e:#}");
        std::process::exit(1);
    }
}
