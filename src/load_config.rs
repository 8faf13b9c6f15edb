/// `load_config` module: Loads a static YAML config, injects secrets from the environment,
/// and maps it into pipeline requests.
///
/// This module is the only place where user-supplied YAML is parsed. Derived-text inputs are
/// checked for shape while parsing, so an unsupported shape (e.g. a bare string) fails here
/// with a descriptive error instead of being skipped at run time.
///
/// # Errors
/// All errors in this module use `anyhow::Error` for context-rich diagnostics, and are surfaced
/// at the CLI boundary.
use anyhow::{Context, Result};
use archive_pipeline_core::contract::{DerivedKind, DerivedTextInput, Destination, RootSource};
use archive_pipeline_core::pipeline::{PipelineRequest, DEFAULT_ASSET_LABEL};
use archive_pipeline_core::retry::RetryPolicy;
use archive_pipeline_core::tool::ToolCommand;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{error, info};

/// Environment variable holding the archive API token.
pub const API_TOKEN_ENV: &str = "ARCHIVE_API_TOKEN";

#[derive(Debug, Deserialize)]
pub struct CliConfig {
    pub output_dir: PathBuf,
    #[serde(default)]
    pub json_output_dir: Option<PathBuf>,
    pub destination: Destination,
    #[serde(default = "default_overwrite")]
    pub overwrite: bool,
    #[serde(default = "default_asset_label")]
    pub asset_label: String,
    #[serde(default)]
    pub destinations: DestinationUrls,
    #[serde(default)]
    pub retry: RetrySection,
    #[serde(default)]
    pub tools: Option<ToolsSection>,
    #[serde(default)]
    pub jobs: Vec<JobSection>,
    /// Injected from the environment, never read from YAML.
    #[serde(skip)]
    pub api_token: Option<String>,
}

fn default_overwrite() -> bool {
    true
}

fn default_asset_label() -> String {
    DEFAULT_ASSET_LABEL.to_string()
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct DestinationUrls {
    #[serde(default)]
    pub staging: Option<String>,
    #[serde(default)]
    pub production: Option<String>,
}

impl DestinationUrls {
    pub fn url_for(&self, destination: Destination) -> Option<&str> {
        match destination {
            Destination::Staging => self.staging.as_deref(),
            Destination::Production => self.production.as_deref(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetrySection {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub multiplier: u32,
    pub attempt_timeout_secs: Option<u64>,
}

impl Default for RetrySection {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            max_attempts: policy.max_attempts,
            initial_backoff_ms: policy.initial_backoff.as_millis() as u64,
            max_backoff_ms: policy.max_backoff.as_millis() as u64,
            multiplier: policy.multiplier,
            attempt_timeout_secs: policy.attempt_timeout.map(|t| t.as_secs()),
        }
    }
}

impl RetrySection {
    pub fn to_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
            multiplier: self.multiplier,
            attempt_timeout: self.attempt_timeout_secs.map(Duration::from_secs),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ToolsSection {
    pub parser: ToolCommand,
    pub serializer: ToolCommand,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JobSection {
    pub kind: DerivedKind,
    pub root: RootSource,
    #[serde(default)]
    pub derived: DerivedTextInput,
}

impl CliConfig {
    pub fn json_output_dir(&self) -> PathBuf {
        self.json_output_dir
            .clone()
            .unwrap_or_else(|| self.output_dir.join("json"))
    }

    /// One request per job, in file order, all bound for `destination`.
    pub fn requests(&self, destination: Destination) -> Vec<PipelineRequest> {
        self.jobs
            .iter()
            .map(|job| {
                PipelineRequest::new(
                    job.kind,
                    job.root.clone(),
                    job.derived.clone(),
                    self.output_dir.clone(),
                    destination,
                )
                .with_json_output_dir(self.json_output_dir())
                .with_overwrite(self.overwrite)
                .with_asset_label(self.asset_label.clone())
            })
            .collect()
    }

    /// Overwrite flag for direct uploads: the config value, unless `--no-overwrite` turns it off.
    pub fn upload_overwrite(&self, no_overwrite: bool) -> bool {
        self.overwrite && !no_overwrite
    }

    pub fn require_destination_url(&self, destination: Destination) -> Result<&str> {
        self.destinations.url_for(destination).with_context(|| {
            format!("no URL configured under `destinations.{destination}`")
        })
    }

    /// Problems that would stop jobs from running; empty when the config is usable.
    pub fn problems(&self, destination: Destination) -> Vec<String> {
        let mut problems = Vec::new();
        if self.destinations.url_for(destination).is_none() {
            problems.push(format!("no URL configured under `destinations.{destination}`"));
        }
        if self.tools.is_none() {
            problems.push("`tools` section (parser and serializer) is missing".to_string());
        }
        if self.jobs.is_empty() {
            problems.push("no jobs configured".to_string());
        }
        for (index, job) in self.jobs.iter().enumerate() {
            let documents = match &job.root {
                RootSource::Document(input) => std::iter::once(input)
                    .chain(job.derived.iter())
                    .collect::<Vec<_>>(),
                RootSource::Parsed {
                    storage_path,
                    layer,
                } => {
                    if !storage_path.exists() {
                        problems.push(format!(
                            "job {index}: parsed root {} does not exist",
                            storage_path.display()
                        ));
                    }
                    if !layer.as_path().exists() {
                        problems.push(format!(
                            "job {index}: root layer {layer} does not exist"
                        ));
                    }
                    job.derived.iter().collect()
                }
            };
            for input in documents {
                for path in [&input.document, &input.sheet] {
                    if !path.is_file() {
                        problems.push(format!("job {index}: {} not found", path.display()));
                    }
                }
            }
        }
        problems
    }
}

/// Loads a static YAML config file (no secrets) and injects the API token from the environment.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<CliConfig> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let config_content = match fs::read_to_string(path_ref) {
        Ok(content) => {
            info!(config_path = ?path_ref, "Config file read successfully");
            content
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
            return Err(anyhow::anyhow!(
                "Failed to read config file {:?}: {}",
                path_ref,
                e
            ));
        }
    };

    let mut config: CliConfig = match serde_yaml::from_str(&config_content) {
        Ok(conf) => {
            info!(config_path = ?path_ref, "Parsed config YAML successfully");
            conf
        }
        Err(e) => {
            error!(error = %e, config_path = ?path_ref, "Failed to parse config YAML");
            return Err(anyhow::anyhow!("Failed to parse config YAML: {e}"));
        }
    };

    config.api_token = std::env::var(API_TOKEN_ENV)
        .ok()
        .filter(|token| !token.trim().is_empty());
    if config.api_token.is_some() {
        info!("{API_TOKEN_ENV} found in env");
    } else {
        info!("{API_TOKEN_ENV} not set; uploads will be unauthenticated");
    }

    info!(
        output_dir = %config.output_dir.display(),
        destination = %config.destination,
        jobs = config.jobs.len(),
        "Config loaded"
    );
    Ok(config)
}
