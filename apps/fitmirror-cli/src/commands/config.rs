use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Subcommand;

#[derive(Subcommand)]
pub enum ConfigCmd {
    /// Print the JSON schema of the configuration file
    Schema {
        /// Pretty-print JSON
        #[arg(long)]
        pretty: bool,
    },
    /// Validate a configuration file and print the effective settings
    Check {
        /// TOML configuration file
        path: PathBuf,
    },
}

pub fn run(cmd: ConfigCmd) -> Result<()> {
    match cmd {
        ConfigCmd::Schema { pretty } => {
            let schema = fitmirror_core::config_schema_json();
            if pretty {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&schema).unwrap_or_else(|_| schema.to_string())
                );
            } else {
                println!("{schema}");
            }
        }
        ConfigCmd::Check { path } => {
            let config = super::load_config(Some(&path))?;
            let options = config.sync_options();
            let effective = serde_json::json!({
                "connect": config.connect,
                "sync": {
                    "batch_size": options.batch_size,
                    "limit": options.limit,
                    "fill_missing": options.fill_missing,
                },
                "reconcile": {
                    "comparison_extension": config.comparison_extension(),
                    "upload_format": config.upload_format().extension(),
                    "batch_size": config.upload_batch_size().get(),
                },
            });
            println!(
                "{}",
                serde_json::to_string_pretty(&effective).context("rendering config")?
            );
        }
    }
    Ok(())
}
