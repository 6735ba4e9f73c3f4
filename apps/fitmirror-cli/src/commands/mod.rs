pub mod config;
pub mod credentials;
pub mod download;
pub mod list;
pub mod reconcile;

pub use config::ConfigCmd;
pub use download::DownloadArgs;
pub use list::ListCmd;
pub use reconcile::ReconcileArgs;

use std::path::Path;

use anyhow::{Context, Result};
use fitmirror_core::Config;

/// Load `path` when given, otherwise fall back to built-in defaults.
pub(crate) fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => fitmirror_core::load_config(path)
            .with_context(|| format!("loading {}", path.display())),
        None => Ok(Config::default()),
    }
}

pub(crate) fn existing_dir(dir: &Path) -> Result<()> {
    anyhow::ensure!(dir.is_dir(), "{} is not a directory", dir.display());
    Ok(())
}
