//! Scan configuration and its loader.
//!
//! Every threshold, feature gate and service setting the pipeline consults
//! lives in one immutable [`ScanConfig`] that is handed to each component
//! at construction.

use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::exclusions::ExclusionRule;

/// Environment variable overriding [`ServiceConfig::url`].
pub const SERVICE_URL_ENV: &str = "SECRET_PUSH_PROTECTION_SERVICE_URL";

/// Environment variable overriding [`ServiceConfig::auth_token`].
pub const AUTH_TOKEN_ENV: &str = "SECRET_PUSH_PROTECTION_AUTH_TOKEN";

/// Default documentation link shown in block messages.
const DEFAULT_DOCS_URL: &str =
    "https://docs.gitlab.com/user/application_security/secret_detection/secret_push_protection/";

/// Complete configuration for one push evaluation.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Whether secret push protection is licensed for the target project.
    pub licensed: bool,

    /// Whether the project has push protection turned on.
    pub enabled: bool,

    /// Whether the (stricter) exclusions entitlement is available.
    pub exclusions_licensed: bool,

    /// Resource ceilings enforced by the pipeline.
    pub limits: ScanLimits,

    /// Remote scanning service settings.
    pub service: ServiceConfig,

    /// Use the richer raw-info variant when fetching diff blobs.
    pub use_raw_info_diffs: bool,

    /// Documentation link included in the block message.
    pub docs_url: String,

    /// Exclusion rules configured for the project.
    pub exclusions: Vec<ExclusionRule>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            licensed: true,
            enabled: true,
            exclusions_licensed: true,
            limits: ScanLimits::default(),
            service: ServiceConfig::default(),
            use_raw_info_diffs: false,
            docs_url: DEFAULT_DOCS_URL.to_string(),
            exclusions: Vec::new(),
        }
    }
}

/// Hard resource bounds for a single push.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ScanLimits {
    /// Maximum number of changed paths (after exclusions) that will be scanned.
    pub max_changed_paths: usize,
    /// Maximum total number of diff lines across the push.
    pub max_diff_lines: usize,
    /// Per-patch byte ceiling; larger patches are dropped.
    pub patch_bytes_limit: usize,
    /// Number of blob pairs requested from the git backend per call.
    pub diff_blobs_batch_size: usize,
    /// Paths with more segments than this are never matched against exclusions.
    pub max_path_depth: usize,
    /// Maximum number of exclusion rules considered per rule type.
    pub max_exclusions_per_type: usize,
}

impl Default for ScanLimits {
    fn default() -> Self {
        Self {
            max_changed_paths: 1_000,
            max_diff_lines: 100_000,
            patch_bytes_limit: 1024 * 1024,
            diff_blobs_batch_size: 50,
            max_path_depth: 20,
            max_exclusions_per_type: 10,
        }
    }
}

/// Where the instance is deployed.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum Deployment {
    /// Multi-tenant hosted offering.
    Saas,
    /// Single-tenant hosted instance.
    Dedicated,
    /// Customer-operated instance.
    #[default]
    SelfManaged,
}

/// Remote scanning service configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Capability flag for routing scans to the remote service.
    pub remote_enabled: bool,
    /// Deployment type of this instance.
    pub deployment: Deployment,
    /// Service target as `host[:port]`.
    pub url: Option<String>,
    /// Auth token; its presence also selects a secure transport.
    pub auth_token: Option<String>,
    /// Request timeout in seconds.
    pub request_timeout_secs: u64,
    /// Tags attached to every scan request.
    pub tags: Vec<String>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            remote_enabled: false,
            deployment: Deployment::default(),
            url: None,
            auth_token: None,
            request_timeout_secs: 10,
            tags: Vec::new(),
        }
    }
}

impl ServiceConfig {
    /// Returns the configured endpoint, ignoring blank values.
    pub fn endpoint(&self) -> Option<&str> {
        self.url.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }

    /// Returns the configured token, ignoring blank values.
    pub fn token(&self) -> Option<&str> {
        self.auth_token
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

impl ScanConfig {
    /// Applies environment overrides for the service endpoint and token.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|key| env::var(key).ok())
    }

    /// Applies overrides read through `lookup`, keyed by environment variable name.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(url) = lookup(SERVICE_URL_ENV) {
            self.service.url = Some(url);
        }
        if let Some(token) = lookup(AUTH_TOKEN_ENV) {
            self.service.auth_token = Some(token);
        }
        self
    }
}

/// Loads [`ScanConfig`] from a YAML file.
pub struct ConfigManager {
    config_path: PathBuf,
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self {
            config_path: Self::default_config_path(),
        }
    }
}

impl ConfigManager {
    /// Creates a manager reading the default location.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a manager reading a custom path.
    pub fn with_path(path: PathBuf) -> Self {
        Self { config_path: path }
    }

    /// Returns the default config path (~/.secret-push-protection/config.yaml).
    pub fn default_config_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".secret-push-protection")
            .join("config.yaml")
    }

    /// Loads the configuration, returning defaults when the file is missing.
    pub fn load_config(&self) -> Result<ScanConfig> {
        if !self.config_path.exists() {
            return Ok(ScanConfig::default());
        }

        let content = std::fs::read_to_string(&self.config_path)
            .with_context(|| format!("Failed to read config file: {:?}", self.config_path))?;

        let config: ScanConfig = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", self.config_path))?;

        Ok(config)
    }
}
