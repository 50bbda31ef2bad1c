//! Package manager backends
//!
//! Debian hosts use dpkg/apt-get, RedHat hosts use rpm/yum. A local package
//! file (`source`) is installed with the low-level tool directly.

use anyhow::Result;
use declarative::{CommandRunner, CommandSpec, PackageManager, PlatformFamily};
use std::path::Path;
use std::sync::Arc;

/// Pick the backend for a platform family
pub fn package_manager_for(
    family: PlatformFamily,
    runner: Arc<dyn CommandRunner>,
) -> Box<dyn PackageManager> {
    match family {
        PlatformFamily::Debian => Box::new(AptPackages::new(runner)),
        PlatformFamily::RedHat => Box::new(RpmPackages::new(runner)),
        PlatformFamily::Unsupported => Box::new(UnsupportedPackages),
    }
}

// ============================================================================
// Debian
// ============================================================================

pub struct AptPackages {
    runner: Arc<dyn CommandRunner>,
}

impl AptPackages {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    fn apt_get(&self) -> CommandSpec {
        CommandSpec::new("apt-get")
            .env("DEBIAN_FRONTEND", "noninteractive")
            .args(["-q", "-y"])
    }
}

/// Parse `dpkg-query -f '${Status} ${Version}'` output
///
/// Only `install ok installed` counts; removed packages with leftover
/// config files report `deinstall ok config-files`.
fn parse_dpkg_status(output: &str) -> Option<String> {
    let mut parts = output.split_whitespace();
    let state = parts.nth(2)?;
    let version = parts.next()?;
    (state == "installed").then(|| version.to_string())
}

impl PackageManager for AptPackages {
    fn query_installed(&self, name: &str) -> Result<Option<String>> {
        let output = self.runner.run(
            &CommandSpec::new("dpkg-query")
                .args(["-W", "-f=${Status} ${Version}"])
                .arg(name),
        )?;
        if !output.success() {
            return Ok(None);
        }
        Ok(parse_dpkg_status(&output.stdout_str()))
    }

    fn install(&self, name: &str, version: Option<&str>, source: Option<&Path>) -> Result<()> {
        if let Some(file) = source {
            self.runner.run_checked(
                &CommandSpec::new("dpkg")
                    .arg("-i")
                    .arg(file.display().to_string()),
            )?;
            return Ok(());
        }

        let target = match version {
            Some(v) => format!("{name}={v}"),
            None => name.to_string(),
        };
        self.runner
            .run_checked(&self.apt_get().arg("install").arg(target))?;
        Ok(())
    }

    fn remove(&self, name: &str) -> Result<()> {
        self.runner.run_checked(&self.apt_get().arg("remove").arg(name))?;
        Ok(())
    }
}

// ============================================================================
// RedHat
// ============================================================================

pub struct RpmPackages {
    runner: Arc<dyn CommandRunner>,
}

impl RpmPackages {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }
}

impl PackageManager for RpmPackages {
    fn query_installed(&self, name: &str) -> Result<Option<String>> {
        let output = self.runner.run(
            &CommandSpec::new("rpm")
                .args(["-q", "--qf", "%{VERSION}-%{RELEASE}"])
                .arg(name),
        )?;
        if !output.success() {
            return Ok(None);
        }
        let version = output.stdout_str().trim().to_string();
        Ok((!version.is_empty()).then_some(version))
    }

    fn install(&self, name: &str, version: Option<&str>, source: Option<&Path>) -> Result<()> {
        if let Some(file) = source {
            self.runner.run_checked(
                &CommandSpec::new("rpm")
                    .arg("-Uvh")
                    .arg(file.display().to_string()),
            )?;
            return Ok(());
        }

        let target = match version {
            Some(v) => format!("{name}-{v}"),
            None => name.to_string(),
        };
        self.runner.run_checked(
            &CommandSpec::new("yum")
                .args(["install", "-y", "-q"])
                .arg(target),
        )?;
        Ok(())
    }

    fn remove(&self, name: &str) -> Result<()> {
        self.runner
            .run_checked(&CommandSpec::new("rpm").arg("-e").arg(name))?;
        Ok(())
    }
}

// ============================================================================
// Anything else
// ============================================================================

/// Backend for hosts with no known package manager; every call fails
pub struct UnsupportedPackages;

impl PackageManager for UnsupportedPackages {
    fn query_installed(&self, name: &str) -> Result<Option<String>> {
        anyhow::bail!("No package manager for this platform (querying {name})")
    }

    fn install(&self, name: &str, _version: Option<&str>, _source: Option<&Path>) -> Result<()> {
        anyhow::bail!("No package manager for this platform (installing {name})")
    }

    fn remove(&self, name: &str) -> Result<()> {
        anyhow::bail!("No package manager for this platform (removing {name})")
    }
}
