//! Run configuration.
//!
//! Configuration is resolved once at startup and passed explicitly into the
//! client, the fact collector and the report driver. Sources, from lowest to
//! highest precedence:
//!
//! 1. built-in defaults,
//! 2. an optional YAML file,
//! 3. environment variables (`OWNER`, `GITHUB_TOKEN`, `GITHUB_API_URL`,
//!    `GITHUB_GRAPHQL_URL`).
//!
//! # Example YAML
//!
//! ```yaml
//! owner: my-org
//! api_url: https://github.example.com/api/v3
//! workers: 5
//! alert_batch_size: 100
//! orphan_commit_count: 5
//! governance: true
//! ```

use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::{AuditError, Result};

/// Public GitHub REST endpoint.
pub const DEFAULT_API_URL: &str = "https://api.github.com";

/// Largest page the vulnerability alert connection will serve.
pub const MAX_ALERT_BATCH: u32 = 100;

const DEFAULT_WORKERS: usize = 5;
const DEFAULT_ORPHAN_COMMITS: usize = 5;

/// Optional settings read from a YAML file. Every field may be omitted.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    pub owner: Option<String>,
    pub token: Option<String>,
    pub api_url: Option<String>,
    pub graphql_url: Option<String>,
    pub workers: Option<usize>,
    pub alert_batch_size: Option<u32>,
    pub orphan_commit_count: Option<usize>,
    pub governance: Option<bool>,
}

impl ConfigFile {
    /// Load settings from a YAML file.
    pub fn from_yaml(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            AuditError::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to read config file: {}", e),
            ))
        })?;

        Self::from_yaml_str(&content)
    }

    /// Parse settings from YAML text.
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).map_err(|e| {
            AuditError::InvalidConfig(format!("Failed to parse YAML config: {}", e))
        })
    }
}

/// Resolved configuration for one report run.
#[derive(Clone)]
pub struct AuditConfig {
    /// Organization whose repositories are audited.
    pub owner: String,
    /// Access token sent as a bearer credential on every request.
    pub token: String,
    /// REST API root, without a trailing slash.
    pub api_url: String,
    /// GraphQL endpoint.
    pub graphql_url: String,
    /// Size of the worker pool used for per-repository lookups.
    pub workers: usize,
    /// Alert nodes requested per GraphQL page.
    pub alert_batch_size: u32,
    /// Number of recent commits kept per orphan repository.
    pub orphan_commit_count: usize,
    /// Collect the optional governance columns.
    pub governance: bool,
}

impl fmt::Debug for AuditConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuditConfig")
            .field("owner", &self.owner)
            .field("token", &"<redacted>")
            .field("api_url", &self.api_url)
            .field("graphql_url", &self.graphql_url)
            .field("workers", &self.workers)
            .field("alert_batch_size", &self.alert_batch_size)
            .field("orphan_commit_count", &self.orphan_commit_count)
            .field("governance", &self.governance)
            .finish()
    }
}

impl AuditConfig {
    /// Create a configuration for the public GitHub API with default settings.
    pub fn new(owner: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            token: token.into(),
            api_url: DEFAULT_API_URL.into(),
            graphql_url: graphql_url_for(DEFAULT_API_URL),
            workers: DEFAULT_WORKERS,
            alert_batch_size: MAX_ALERT_BATCH,
            orphan_commit_count: DEFAULT_ORPHAN_COMMITS,
            governance: false,
        }
    }

    /// Point the configuration at another API root (GitHub Enterprise or a
    /// test server). The GraphQL endpoint is derived from it.
    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = normalize_url(api_url.into());
        self.graphql_url = graphql_url_for(&self.api_url);
        self
    }

    /// Load configuration from an optional YAML file and the process environment.
    ///
    /// Without an explicit path, `<config dir>/repo-audit/config.yaml` is used
    /// when it exists.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(path) => ConfigFile::from_yaml(path)?,
            None => match default_config_path() {
                Some(path) if path.is_file() => ConfigFile::from_yaml(&path)?,
                _ => ConfigFile::default(),
            },
        };

        Self::from_lookup(file, |key| std::env::var(key).ok())
    }

    /// Resolve configuration from file settings and a variable lookup.
    pub fn from_lookup<F>(file: ConfigFile, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let owner = env("OWNER").or(file.owner).unwrap_or_default();
        let token = env("GITHUB_TOKEN").or(file.token).unwrap_or_default();
        let api_url = normalize_url(
            env("GITHUB_API_URL")
                .or(file.api_url)
                .unwrap_or_else(|| DEFAULT_API_URL.into()),
        );
        let graphql_url = env("GITHUB_GRAPHQL_URL")
            .or(file.graphql_url)
            .map(normalize_url)
            .unwrap_or_else(|| graphql_url_for(&api_url));

        let config = Self {
            owner,
            token,
            api_url,
            graphql_url,
            workers: file.workers.unwrap_or(DEFAULT_WORKERS),
            alert_batch_size: file.alert_batch_size.unwrap_or(MAX_ALERT_BATCH),
            orphan_commit_count: file.orphan_commit_count.unwrap_or(DEFAULT_ORPHAN_COMMITS),
            governance: file.governance.unwrap_or(false),
        };
        config.validate()?;
        Ok(config)
    }

    /// Check that the configuration can drive a run.
    pub fn validate(&self) -> Result<()> {
        if self.owner.trim().is_empty() {
            return Err(AuditError::InvalidConfig(
                "organization name is required (set OWNER)".into(),
            ));
        }
        if self.token.trim().is_empty() {
            return Err(AuditError::InvalidConfig(
                "access token is required (set GITHUB_TOKEN)".into(),
            ));
        }
        if self.workers == 0 {
            return Err(AuditError::InvalidConfig(
                "workers must be at least 1".into(),
            ));
        }
        if self.alert_batch_size == 0 || self.alert_batch_size > MAX_ALERT_BATCH {
            return Err(AuditError::InvalidConfig(format!(
                "alert_batch_size must be between 1 and {}",
                MAX_ALERT_BATCH
            )));
        }
        Ok(())
    }
}

/// Default location of the YAML configuration file.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("repo-audit").join("config.yaml"))
}

fn normalize_url(mut url: String) -> String {
    while url.ends_with('/') {
        url.pop();
    }
    url
}

/// GraphQL endpoint that belongs to a REST API root.
///
/// `https://api.github.com` serves GraphQL at `/graphql`; Enterprise roots of
/// the form `https://host/api/v3` serve it at `https://host/api/graphql`.
fn graphql_url_for(api_url: &str) -> String {
    match api_url.strip_suffix("/v3") {
        Some(root) => format!("{}/graphql", root),
        None => format!("{}/graphql", api_url),
    }
}
