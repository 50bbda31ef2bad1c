//! Platform facts and branch selection.
//!
//! Facts are gathered once at the start of a run and never change after.
//! The dispatcher maps the platform identifier onto a closed set of
//! families; each family selects one branch of platform-specific resources.
//!
//! | Platform id                                              | Family         |
//! |----------------------------------------------------------|----------------|
//! | `debian`, `ubuntu`                                       | `Debian`       |
//! | `redhat`, `rhel`, `centos`, `scientific`, `amazon`, `amzn` | `RedHat`     |
//! | anything else                                            | `Unsupported`  |

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;

use crate::resource::Resource;
use crate::types::Attributes;

/// Locations of the os-release file, in lookup order
const OS_RELEASE_PATHS: [&str; 2] = ["/etc/os-release", "/usr/lib/os-release"];

/// Platform family a run is dispatched on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlatformFamily {
    Debian,
    RedHat,
    Unsupported,
}

impl PlatformFamily {
    /// Map a platform identifier to its family
    #[must_use]
    pub fn from_platform(platform: &str) -> Self {
        match platform.trim().to_ascii_lowercase().as_str() {
            "debian" | "ubuntu" => Self::Debian,
            "redhat" | "rhel" | "centos" | "scientific" | "amazon" | "amzn" => Self::RedHat,
            _ => Self::Unsupported,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Debian => "debian",
            Self::RedHat => "rhel",
            Self::Unsupported => "unsupported",
        }
    }

    #[must_use]
    pub fn is_supported(self) -> bool {
        !matches!(self, Self::Unsupported)
    }
}

impl fmt::Display for PlatformFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable snapshot of host identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformFacts {
    pub platform: String,
    pub version: String,
    pub family: PlatformFamily,
    pub hostname: String,
}

impl PlatformFacts {
    pub fn new(platform: impl Into<String>, version: impl Into<String>) -> Self {
        let platform = platform.into();
        Self {
            family: PlatformFamily::from_platform(&platform),
            platform,
            version: version.into(),
            hostname: "localhost".to_string(),
        }
    }

    pub fn with_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = hostname.into();
        self
    }

    /// Parse the contents of an os-release file
    ///
    /// Only `ID` and `VERSION_ID` are used; `ID_LIKE` is deliberately ignored
    /// so that dispatch stays an exact mapping of the platform id.
    pub fn from_os_release(content: &str) -> Self {
        let mut id = String::new();
        let mut version = String::new();

        for line in content.lines() {
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let value = value.trim().trim_matches('"').trim_matches('\'');
            match key.trim() {
                "ID" => id = value.to_string(),
                "VERSION_ID" => version = value.to_string(),
                _ => {}
            }
        }

        if id.is_empty() {
            id = "unknown".to_string();
        }
        Self::new(id, version)
    }

    /// Detect facts for the local host
    pub fn detect() -> Self {
        let facts = OS_RELEASE_PATHS
            .iter()
            .find_map(|path| fs::read_to_string(path).ok())
            .map_or_else(
                || {
                    log::warn!("No os-release file found; platform is unknown");
                    Self::new(std::env::consts::OS, "")
                },
                |content| Self::from_os_release(&content),
            );
        facts.with_hostname(detect_hostname())
    }

    /// Look up a fact by its attribute name
    pub fn get(&self, key: &str) -> Option<&str> {
        match key {
            "platform" => Some(&self.platform),
            "platform_version" => Some(&self.version),
            "platform_family" => Some(self.family.as_str()),
            "hostname" => Some(&self.hostname),
            _ => None,
        }
    }

    /// Facts as node attributes
    pub fn as_attributes(&self) -> Attributes {
        ["platform", "platform_version", "platform_family", "hostname"]
            .into_iter()
            .filter_map(|key| self.get(key).map(|v| (key.to_string(), v.to_string())))
            .collect()
    }
}

fn detect_hostname() -> String {
    ["/proc/sys/kernel/hostname", "/etc/hostname"]
        .iter()
        .find_map(|path| fs::read_to_string(path).ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "localhost".to_string())
}

/// Platform-specific resource branches of a script
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlatformBranches {
    pub debian: Vec<Resource>,
    pub redhat: Vec<Resource>,
}

impl PlatformBranches {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn debian(mut self, resources: impl IntoIterator<Item = Resource>) -> Self {
        self.debian.extend(resources);
        self
    }

    pub fn redhat(mut self, resources: impl IntoIterator<Item = Resource>) -> Self {
        self.redhat.extend(resources);
        self
    }

    /// Resources of the branch for `family`; empty for unsupported platforms
    pub fn branch(&self, family: PlatformFamily) -> &[Resource] {
        match family {
            PlatformFamily::Debian => &self.debian,
            PlatformFamily::RedHat => &self.redhat,
            PlatformFamily::Unsupported => &[],
        }
    }
}

/// Select the resource subset for the host described by `facts`
pub fn select_branch<'a>(facts: &PlatformFacts, branches: &'a PlatformBranches) -> &'a [Resource] {
    branches.branch(facts.family)
}
