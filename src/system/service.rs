//! Init system backend
//!
//! Start, stop and status go through systemd when it is running and the
//! `service` wrapper otherwise. Boot-time enablement falls back to
//! `update-rc.d` on Debian and `chkconfig` on RedHat. Custom commands on a
//! [`ServiceSpec`] always take precedence.

use anyhow::Result;
use declarative::{
    CommandRunner, CommandSpec, PlatformFamily, ServiceManager, ServiceSpec, ServiceStatus,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub struct InitServices {
    runner: Arc<dyn CommandRunner>,
    family: PlatformFamily,
    systemd: bool,
    /// Root of the sysv runlevel directories (`/etc` on a real host)
    rc_root: PathBuf,
}

impl InitServices {
    pub fn new(runner: Arc<dyn CommandRunner>, family: PlatformFamily) -> Self {
        Self {
            runner,
            family,
            systemd: Path::new("/run/systemd/system").exists(),
            rc_root: PathBuf::from("/etc"),
        }
    }

    /// Force systemd on or off instead of detecting it
    pub fn with_systemd(mut self, systemd: bool) -> Self {
        self.systemd = systemd;
        self
    }

    pub fn with_rc_root(mut self, rc_root: impl Into<PathBuf>) -> Self {
        self.rc_root = rc_root.into();
        self
    }

    /// `systemctl <verb> <name>` or `service <name> <verb>`
    fn control(&self, verb: &str, name: &str) -> CommandSpec {
        if self.systemd {
            CommandSpec::new("systemctl").args([verb, name])
        } else {
            CommandSpec::new("service").args([name, verb])
        }
    }

    fn run_custom_or(&self, custom: Option<&str>, verb: &str, service: &ServiceSpec) -> Result<()> {
        let spec = match custom {
            Some(command) => CommandSpec::shell(command),
            None => self.control(verb, &service.name),
        };
        self.runner.run_checked(&spec)?;
        Ok(())
    }

    fn is_running(&self, service: &ServiceSpec) -> Result<bool> {
        if let Some(command) = &service.status_command {
            return self.runner.run_status(&CommandSpec::shell(command));
        }
        if self.systemd {
            return self.runner.run_status(
                &CommandSpec::new("systemctl").args(["is-active", "--quiet", &service.name]),
            );
        }
        if service.supports_status {
            return self.runner.run_status(&self.control("status", &service.name));
        }
        // No status support: look for the process
        self.runner
            .run_status(&CommandSpec::new("pgrep").args(["-f", &service.name]))
    }

    fn is_enabled(&self, name: &str) -> Result<bool> {
        if self.systemd {
            return self.runner.run_status(
                &CommandSpec::new("systemctl").args(["is-enabled", "--quiet", name]),
            );
        }
        match self.family {
            PlatformFamily::Debian => Ok(rc_links_enabled(&self.rc_root, name)),
            PlatformFamily::RedHat => {
                let output = self
                    .runner
                    .run(&CommandSpec::new("chkconfig").args(["--list", name]))?;
                Ok(output.success() && chkconfig_enabled(&output.stdout_str()))
            }
            PlatformFamily::Unsupported => Ok(false),
        }
    }

    fn enablement(&self, name: &str, enable: bool) -> Result<CommandSpec> {
        if self.systemd {
            let verb = if enable { "enable" } else { "disable" };
            return Ok(CommandSpec::new("systemctl").args([verb, name]));
        }
        match self.family {
            PlatformFamily::Debian if enable => {
                Ok(CommandSpec::new("update-rc.d").args([name, "defaults"]))
            }
            PlatformFamily::Debian => {
                Ok(CommandSpec::new("update-rc.d").args(["-f", name, "remove"]))
            }
            PlatformFamily::RedHat => Ok(CommandSpec::new("chkconfig")
                .arg(name)
                .arg(if enable { "on" } else { "off" })),
            PlatformFamily::Unsupported => {
                anyhow::bail!("Don't know how to change boot-time state of {name} on this platform")
            }
        }
    }
}

/// Whether a start link (`S20name`) exists in any multi-user runlevel
fn rc_links_enabled(rc_root: &Path, name: &str) -> bool {
    ["rc2.d", "rc3.d", "rc4.d", "rc5.d"].iter().any(|level| {
        fs::read_dir(rc_root.join(level)).is_ok_and(|entries| {
            entries.flatten().any(|entry| {
                let file = entry.file_name();
                let file = file.to_string_lossy();
                file.starts_with('S')
                    && file.trim_start_matches('S').trim_start_matches(|c: char| c.is_ascii_digit())
                        == name
            })
        })
    })
}

/// Parse `chkconfig --list` output: enabled when any runlevel is `on`
fn chkconfig_enabled(output: &str) -> bool {
    output
        .split_whitespace()
        .any(|field| field.split_once(':').is_some_and(|(_, state)| state == "on"))
}

impl ServiceManager for InitServices {
    fn status(&self, service: &ServiceSpec) -> Result<ServiceStatus> {
        Ok(ServiceStatus {
            running: self.is_running(service)?,
            enabled: self.is_enabled(&service.name)?,
        })
    }

    fn start(&self, service: &ServiceSpec) -> Result<()> {
        self.run_custom_or(service.start_command.as_deref(), "start", service)
    }

    fn stop(&self, service: &ServiceSpec) -> Result<()> {
        self.run_custom_or(service.stop_command.as_deref(), "stop", service)
    }

    fn restart(&self, service: &ServiceSpec) -> Result<()> {
        if let Some(command) = &service.restart_command {
            self.runner.run_checked(&CommandSpec::shell(command))?;
            return Ok(());
        }
        if service.supports_restart {
            self.runner
                .run_checked(&self.control("restart", &service.name))?;
            return Ok(());
        }
        self.stop(service)?;
        self.start(service)
    }

    fn reload(&self, service: &ServiceSpec) -> Result<()> {
        self.runner
            .run_checked(&self.control("reload", &service.name))?;
        Ok(())
    }

    fn enable(&self, service: &ServiceSpec) -> Result<()> {
        self.runner
            .run_checked(&self.enablement(&service.name, true)?)?;
        Ok(())
    }

    fn disable(&self, service: &ServiceSpec) -> Result<()> {
        self.runner
            .run_checked(&self.enablement(&service.name, false)?)?;
        Ok(())
    }
}
