//! Node configuration
//!
//! The config file is TOML with three tables: `[rabbitmq]` (broker
//! settings), `[paths]` (where warren reads and writes its own files) and
//! `[run]`. Every field has a default, so an empty or missing file is a
//! valid configuration. Before a run the config is flattened into dotted
//! node attributes (`rabbitmq.nodename`, ...) for templates, guards, and
//! script placeholders.

use anyhow::{Context, Result};
use declarative::Attributes;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::paths;

// ============================================================================
// Main Config Schema
// ============================================================================

/// The warren configuration structure
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WarrenConfig {
    #[serde(default)]
    pub rabbitmq: RabbitConfig,

    #[serde(default)]
    pub paths: PathsConfig,

    #[serde(default)]
    pub run: RunConfig,
}

impl WarrenConfig {
    /// Load the first config file that exists, or defaults when none does
    ///
    /// An explicitly requested file must exist.
    pub fn load(explicit: Option<&Path>) -> Result<(Self, Option<PathBuf>)> {
        for path in paths::config_candidates(explicit) {
            if !path.exists() {
                if explicit.is_some() {
                    anyhow::bail!("Config file not found: {}", path.display());
                }
                continue;
            }

            let config = Self::load_file(&path)?;
            log::debug!("Loaded config from {}", path.display());
            return Ok((config, Some(path)));
        }

        log::debug!("No config file found, using defaults");
        Ok((Self::default(), None))
    }

    /// Load and validate one config file
    pub fn load_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Could not read config file: {}", path.display()))?;
        let config = Self::from_toml(&content)
            .with_context(|| format!("Invalid config file: {}", path.display()))?;
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).context("Invalid TOML format in warren config")?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.rabbitmq.validate().context("Invalid [rabbitmq] section")
    }

    /// Flatten into node attributes
    pub fn node_attributes(&self) -> Attributes {
        let mut attrs = self.rabbitmq.attributes(&self.paths);
        attrs.insert(
            "run.strict_platform".to_string(),
            self.run.strict_platform.to_string(),
        );
        attrs
    }
}

// ============================================================================
// [rabbitmq]
// ============================================================================

/// Broker settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RabbitConfig {
    /// Broker version, used for the RPM download on RedHat hosts
    pub version: String,
    pub nodename: String,
    pub address: String,
    pub port: u16,
    /// Directory holding `rabbitmq.config` and `rabbitmq-env.conf`
    pub config_dir: String,
    pub log_dir: String,
    pub mnesia_dir: String,

    /// Write the shared Erlang cookie so this node can join a cluster
    pub cluster: bool,
    pub cluster_disk_nodes: Vec<String>,
    pub erlang_cookie: String,

    /// Administrator account created after install
    pub default_user: String,
    pub default_pass: String,
    pub management_port: u16,

    pub apt_uri: String,
    pub apt_distribution: String,
    pub apt_components: Vec<String>,
    pub signing_key_url: String,
    pub release_base_url: String,
}

impl Default for RabbitConfig {
    fn default() -> Self {
        Self {
            version: "2.8.7".to_string(),
            nodename: "rabbit".to_string(),
            address: "0.0.0.0".to_string(),
            port: 5672,
            config_dir: "/etc/rabbitmq".to_string(),
            log_dir: "/var/log/rabbitmq".to_string(),
            mnesia_dir: "/var/lib/rabbitmq/mnesia".to_string(),
            cluster: false,
            cluster_disk_nodes: Vec::new(),
            erlang_cookie: String::new(),
            default_user: "admin".to_string(),
            default_pass: "changeme".to_string(),
            management_port: 55672,
            apt_uri: "http://www.rabbitmq.com/debian/".to_string(),
            apt_distribution: "testing".to_string(),
            apt_components: vec!["main".to_string()],
            signing_key_url: "http://www.rabbitmq.com/rabbitmq-signing-key-public.asc".to_string(),
            release_base_url: "https://www.rabbitmq.com/releases/rabbitmq-server".to_string(),
        }
    }
}

/// A `[rabbitmq]` setting that cannot produce a working broker
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} cannot be empty")]
    Empty(&'static str),
    #[error("{0} must be non-zero")]
    ZeroPort(&'static str),
    #[error("cluster = true requires a non-empty erlang_cookie")]
    ClusterWithoutCookie,
    #[error("default_user cannot be 'guest': the guest account is removed after install")]
    GuestDefaultUser,
}

impl RabbitConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version.trim().is_empty() {
            return Err(ConfigError::Empty("version"));
        }
        if self.cluster && self.erlang_cookie.trim().is_empty() {
            return Err(ConfigError::ClusterWithoutCookie);
        }
        if self.default_user.trim().is_empty() {
            return Err(ConfigError::Empty("default_user"));
        }
        if self.default_user == "guest" {
            return Err(ConfigError::GuestDefaultUser);
        }
        if self.port == 0 {
            return Err(ConfigError::ZeroPort("port"));
        }
        if self.management_port == 0 {
            return Err(ConfigError::ZeroPort("management_port"));
        }
        if self.apt_components.is_empty() {
            return Err(ConfigError::Empty("apt_components"));
        }
        Ok(())
    }

    /// File name of the release RPM
    pub fn rpm_file_name(&self) -> String {
        format!("rabbitmq-server-{}-1.noarch.rpm", self.version)
    }

    /// Download URL of the release RPM
    pub fn rpm_url(&self) -> String {
        format!(
            "{}/v{}/{}",
            self.release_base_url.trim_end_matches('/'),
            self.version,
            self.rpm_file_name()
        )
    }

    /// Cluster nodes as an Erlang list body: `'rabbit@a', 'rabbit@b'`
    pub fn erlang_cluster_nodes(&self) -> String {
        self.cluster_disk_nodes
            .iter()
            .map(|n| format!("'{n}'"))
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn attributes(&self, paths: &PathsConfig) -> Attributes {
        let rpm_path = paths.download_dir().join(self.rpm_file_name());
        let pairs = [
            ("version", self.version.clone()),
            ("nodename", self.nodename.clone()),
            ("address", self.address.clone()),
            ("port", self.port.to_string()),
            ("config_dir", self.config_dir.clone()),
            ("config_file", format!("{}/rabbitmq", self.config_dir.trim_end_matches('/'))),
            ("log_dir", self.log_dir.clone()),
            ("mnesia_dir", self.mnesia_dir.clone()),
            ("cluster", self.cluster.to_string()),
            ("cluster_disk_nodes", self.cluster_disk_nodes.join(",")),
            ("cluster_nodes", self.erlang_cluster_nodes()),
            ("erlang_cookie", self.erlang_cookie.clone()),
            ("default_user", self.default_user.clone()),
            ("default_pass", self.default_pass.clone()),
            ("management_port", self.management_port.to_string()),
            ("apt_uri", self.apt_uri.clone()),
            ("apt_distribution", self.apt_distribution.clone()),
            ("apt_components", self.apt_components.join(" ")),
            ("signing_key_url", self.signing_key_url.clone()),
            ("rpm_url", self.rpm_url()),
            ("rpm_path", rpm_path.display().to_string()),
        ];
        pairs
            .into_iter()
            .map(|(k, v)| (format!("rabbitmq.{k}"), v))
            .collect()
    }
}

// ============================================================================
// [paths]
// ============================================================================

/// Where warren reads templates and files, and writes its own artifacts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PathsConfig {
    /// Directory of template overrides; built-in templates are used otherwise
    pub templates_dir: Option<String>,
    /// Directory of static file overrides
    pub files_dir: Option<String>,
    pub apt_sources_dir: String,
    pub apt_keyring_dir: String,
    /// Where downloaded packages and keys are stored
    pub download_dir: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            templates_dir: None,
            files_dir: None,
            apt_sources_dir: "/etc/apt/sources.list.d".to_string(),
            apt_keyring_dir: "/etc/apt/trusted.gpg.d".to_string(),
            download_dir: "/tmp".to_string(),
        }
    }
}

impl PathsConfig {
    pub fn templates_dir(&self) -> Option<PathBuf> {
        self.templates_dir.as_deref().map(paths::expand)
    }

    pub fn files_dir(&self) -> Option<PathBuf> {
        self.files_dir.as_deref().map(paths::expand)
    }

    pub fn apt_sources_dir(&self) -> PathBuf {
        paths::expand(&self.apt_sources_dir)
    }

    pub fn apt_keyring_dir(&self) -> PathBuf {
        paths::expand(&self.apt_keyring_dir)
    }

    pub fn download_dir(&self) -> PathBuf {
        paths::expand(&self.download_dir)
    }
}

// ============================================================================
// [run]
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunConfig {
    /// Fail instead of skipping platform-specific resources on unknown platforms
    pub strict_platform: bool,
}

// ============================================================================
// Tests
// ============================================================================
