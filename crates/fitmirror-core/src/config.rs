use std::collections::BTreeMap;
use std::num::NonZeroUsize;
use std::path::Path;

use jsonschema::{validator_for, Validator};
use once_cell::sync::Lazy;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::comparison::DEFAULT_EXTENSION;
use crate::error::ConfigError;
use crate::pages::DEFAULT_BATCH_SIZE;
use crate::representation::Representation;
use crate::sync::SyncOptions;

pub const DEFAULT_UPLOAD_BATCH: usize = 25;

#[derive(Debug, Default, Clone, Deserialize, Serialize, JsonSchema)]
pub struct ConnectConfig {
    /// Login page of the single sign-on service
    #[serde(default)]
    pub login_url: Option<String>,
    /// Service URL handed to the login page
    #[serde(default)]
    pub login_service: Option<String>,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub user_agent: Option<String>,
    /// Listing URL template with `{start}` and `{limit}` placeholders
    #[serde(default)]
    pub activities_url: Option<String>,
    /// Download URL template per format extension, e.g. `tcx = "https://.../{activityId}"`
    #[serde(default)]
    pub representations: BTreeMap<String, String>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize, JsonSchema)]
pub struct SyncConfig {
    /// Activities requested per listing page (default 100)
    #[serde(default)]
    #[schemars(range(min = 1))]
    pub batch_size: Option<usize>,
    /// Stop after this many listed activities
    #[serde(default)]
    pub limit: Option<usize>,
    /// Fetch missing derived files for unchanged activities
    #[serde(default)]
    pub fill_missing: Option<bool>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize, JsonSchema)]
pub struct ReconcileConfig {
    /// Extension of track files in the comparison mirror (default `gpx`)
    #[serde(default)]
    pub comparison_extension: Option<String>,
    /// Format whose paths are printed for upload (default `tcx`)
    #[serde(default)]
    pub upload_format: Option<String>,
    /// Paths per upload group (default 25)
    #[serde(default)]
    #[schemars(range(min = 1))]
    pub batch_size: Option<usize>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize, JsonSchema)]
pub struct Config {
    #[serde(default)]
    pub connect: ConnectConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub reconcile: ReconcileConfig,
}

static CONFIG_SCHEMA: Lazy<Validator> = Lazy::new(|| {
    let schema_value = config_schema_json();
    validator_for(&schema_value).expect("valid schema")
});

/// Returns the JSON schema describing the configuration structure.
///
/// # Panics
///
/// Panics if schema generation fails; this indicates a programming error.
pub fn config_schema_json() -> serde_json::Value {
    let schema = schemars::schema_for!(Config);
    serde_json::to_value(&schema).expect("schema json")
}

pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_config(&content)
}

pub fn parse_config(content: &str) -> Result<Config, ConfigError> {
    let raw: toml::Value = toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
    let json_value = serde_json::to_value(&raw).map_err(|e| ConfigError::Parse(e.to_string()))?;
    let validation_errors: Vec<_> = CONFIG_SCHEMA
        .iter_errors(&json_value)
        .map(|e| e.to_string())
        .collect();
    if !validation_errors.is_empty() {
        return Err(ConfigError::Invalid(validation_errors.join(", ")));
    }
    let cfg: Config = toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
    cfg.check()?;
    Ok(cfg)
}

impl Config {
    fn check(&self) -> Result<(), ConfigError> {
        for ext in self.connect.representations.keys() {
            match Representation::from_extension(ext) {
                Some(repr) if !repr.is_canonical() => {}
                Some(_) => {
                    return Err(ConfigError::Invalid(
                        "json is rendered locally and cannot have a download template".into(),
                    ))
                }
                None => {
                    return Err(ConfigError::Invalid(format!(
                        "unknown representation '{ext}' in connect.representations"
                    )))
                }
            }
        }
        if self.sync.batch_size == Some(0) || self.reconcile.batch_size == Some(0) {
            return Err(ConfigError::Invalid("batch_size must be at least 1".into()));
        }
        if let Some(format) = &self.reconcile.upload_format {
            format
                .parse::<Representation>()
                .map_err(ConfigError::Invalid)?;
        }
        Ok(())
    }

    pub fn sync_options(&self) -> SyncOptions {
        SyncOptions {
            batch_size: self.sync.batch_size.unwrap_or(DEFAULT_BATCH_SIZE),
            limit: self.sync.limit,
            fill_missing: self.sync.fill_missing.unwrap_or(false),
        }
    }

    pub fn comparison_extension(&self) -> &str {
        self.reconcile
            .comparison_extension
            .as_deref()
            .unwrap_or(DEFAULT_EXTENSION)
    }

    pub fn upload_format(&self) -> Representation {
        self.reconcile
            .upload_format
            .as_deref()
            .and_then(Representation::from_extension)
            .unwrap_or(Representation::Tcx)
    }

    pub fn upload_batch_size(&self) -> NonZeroUsize {
        self.reconcile
            .batch_size
            .and_then(NonZeroUsize::new)
            .or_else(|| NonZeroUsize::new(DEFAULT_UPLOAD_BATCH))
            .unwrap_or(NonZeroUsize::MIN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_yields_defaults() {
        let cfg = parse_config("").expect("empty config");
        assert_eq!(cfg.sync_options(), SyncOptions::default());
        assert_eq!(cfg.comparison_extension(), "gpx");
        assert_eq!(cfg.upload_format(), Representation::Tcx);
        assert_eq!(cfg.upload_batch_size().get(), 25);
    }

    #[test]
    fn sections_are_read() {
        let cfg = parse_config(
            r#"
[connect]
activities_url = "http://127.0.0.1:9/list?start={start}&limit={limit}"

[connect.representations]
tcx = "http://127.0.0.1:9/tcx/{activityId}"

[sync]
batch_size = 20
fill_missing = true

[reconcile]
upload_format = "gpx"
batch_size = 10
"#,
        )
        .expect("config");
        assert_eq!(cfg.sync_options().batch_size, 20);
        assert!(cfg.sync_options().fill_missing);
        assert_eq!(cfg.upload_format(), Representation::Gpx);
        assert_eq!(cfg.upload_batch_size().get(), 10);
        assert_eq!(cfg.connect.representations.len(), 1);
    }

    #[test]
    fn schema_rejects_wrong_types() {
        let err = parse_config("[sync]\nbatch_size = \"many\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
        let err = parse_config("[sync]\nbatch_size = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn unknown_representation_template_is_rejected() {
        let err = parse_config("[connect.representations]\nfit = \"http://x/{activityId}\"\n")
            .unwrap_err();
        assert!(err.to_string().contains("fit"));
        let err = parse_config("[connect.representations]\njson = \"http://x/{activityId}\"\n")
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn schema_json_names_sections() {
        let schema = config_schema_json();
        let text = schema.to_string();
        assert!(text.contains("connect"));
        assert!(text.contains("reconcile"));
    }

    #[test]
    fn load_config_reports_missing_file() {
        let err = load_config(Path::new("/definitely/not/here.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
