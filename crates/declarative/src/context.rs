//! Run context and collaborator traits
//!
//! These traits allow the declarative crate to be used without
//! depending on specific package managers, init systems, shells, etc.
//! Providers receive implementations at construction time; the engine
//! only ever sees the [`RunContext`].

use crate::engine::ResourceFailure;
use crate::notify::FiredNotification;
use crate::platform::PlatformFacts;
use crate::resource::ResourceId;
use crate::types::{Attributes, ChangeRecord, CommandOutput};
use anyhow::Result;
use std::path::{Path, PathBuf};

/// Read-only view of the host used by guards
///
/// Kept as a trait so guard evaluation can be tested without a real filesystem.
pub trait HostProbe {
    fn path_exists(&self, path: &Path) -> bool;
}

/// Probe backed by the local filesystem
pub struct LocalHost;

impl HostProbe for LocalHost {
    fn path_exists(&self, path: &Path) -> bool {
        path.exists()
    }
}

/// Context passed to guards and providers for one run
pub struct RunContext<'a> {
    pub facts: &'a PlatformFacts,
    /// Node attributes collected before the run (config, derived values)
    pub attributes: &'a Attributes,
    pub host: &'a dyn HostProbe,
    /// Whether this is a dry run (no provider apply calls)
    pub dry_run: bool,
}

impl<'a> RunContext<'a> {
    pub fn new(facts: &'a PlatformFacts, attributes: &'a Attributes, host: &'a dyn HostProbe) -> Self {
        Self {
            facts,
            attributes,
            host,
            dry_run: false,
        }
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Look up a node attribute, falling back to platform facts
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .get(key)
            .map(String::as_str)
            .or_else(|| self.facts.get(key))
    }

    /// Node attributes merged with platform facts, for template variables
    pub fn variables(&self) -> Attributes {
        let mut vars = self.facts.as_attributes();
        vars.extend(self.attributes.iter().map(|(k, v)| (k.clone(), v.clone())));
        vars
    }
}

/// A command to execute
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub env: Vec<(String, String)>,
    /// Arguments carry credentials and must not be logged
    pub sensitive: bool,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Self::default()
        }
    }

    /// Run `command` through `sh -c`
    pub fn shell(command: &str) -> Self {
        Self::new("sh").args(["-c", command])
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn sensitive(mut self, sensitive: bool) -> Self {
        self.sensitive = sensitive;
        self
    }

    /// The command line for logs and error messages
    ///
    /// Arguments of a sensitive command are replaced by `<sensitive>`.
    pub fn redacted(&self) -> String {
        if self.sensitive {
            format!("{} <sensitive>", self.program)
        } else {
            self.display()
        }
    }

    /// The command line as it would be typed
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Executes external commands
pub trait CommandRunner: Send + Sync {
    /// Run a command to completion and capture its output
    fn run(&self, spec: &CommandSpec) -> Result<CommandOutput>;

    /// Run a command and fail unless it exits 0
    fn run_checked(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        let output = self.run(spec)?;
        if !output.success() {
            anyhow::bail!(
                "`{}` exited with {}: {}",
                spec.redacted(),
                output
                    .code
                    .map_or_else(|| "a signal".to_string(), |c| c.to_string()),
                output.stderr_str().trim()
            );
        }
        Ok(output)
    }

    /// Run a command and report only whether it exited 0
    fn run_status(&self, spec: &CommandSpec) -> Result<bool> {
        Ok(self.run(spec)?.success())
    }
}

/// System package manager
pub trait PackageManager: Send + Sync {
    /// Installed version, or `None` when the package is absent
    fn query_installed(&self, name: &str) -> Result<Option<String>>;

    /// Install a package, optionally pinned to a version or from a local file
    fn install(&self, name: &str, version: Option<&str>, source: Option<&Path>) -> Result<()>;

    fn remove(&self, name: &str) -> Result<()>;
}

/// How to drive one service
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceSpec {
    pub name: String,
    pub start_command: Option<String>,
    pub stop_command: Option<String>,
    pub restart_command: Option<String>,
    pub status_command: Option<String>,
    pub supports_status: bool,
    pub supports_restart: bool,
}

/// Observed service state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceStatus {
    pub running: bool,
    pub enabled: bool,
}

/// Init system / service supervisor
pub trait ServiceManager: Send + Sync {
    fn status(&self, service: &ServiceSpec) -> Result<ServiceStatus>;
    fn start(&self, service: &ServiceSpec) -> Result<()>;
    fn stop(&self, service: &ServiceSpec) -> Result<()>;
    fn restart(&self, service: &ServiceSpec) -> Result<()>;
    fn reload(&self, service: &ServiceSpec) -> Result<()>;
    fn enable(&self, service: &ServiceSpec) -> Result<()>;
    fn disable(&self, service: &ServiceSpec) -> Result<()>;
}

/// Renders a named template with string variables
pub trait TemplateRenderer: Send + Sync {
    fn render(&self, template_id: &str, variables: &Attributes) -> Result<Vec<u8>>;
}

/// Downloads remote content
pub trait Fetcher: Send + Sync {
    /// Fetch `url` and return its body
    fn fetch(&self, url: &str) -> Result<Vec<u8>>;
}

/// Progress callback for convergence runs
///
/// Implement this trait to receive progress updates during a run.
pub trait ProgressCallback {
    /// Called once before the first resource
    fn on_run_start(&mut self, _total: usize) {}

    /// Called when starting to evaluate a resource
    fn on_resource_start(&mut self, id: &ResourceId, description: &str);

    /// Called when a resource evaluation completes
    fn on_resource_complete(&mut self, record: &ChangeRecord);

    /// Called after a notified action was performed
    fn on_notification(&mut self, fired: &FiredNotification);

    /// Called when a resource fails and the run halts
    fn on_resource_failed(&mut self, _failure: &ResourceFailure) {}
}

/// No-op progress callback
pub struct NoProgress;

impl ProgressCallback for NoProgress {
    fn on_resource_start(&mut self, _id: &ResourceId, _description: &str) {}
    fn on_resource_complete(&mut self, _record: &ChangeRecord) {}
    fn on_notification(&mut self, _fired: &FiredNotification) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Scripted(Option<i32>);

    impl CommandRunner for Scripted {
        fn run(&self, _spec: &CommandSpec) -> Result<CommandOutput> {
            Ok(CommandOutput {
                code: self.0,
                stderr: b"boom".to_vec(),
                ..CommandOutput::default()
            })
        }
    }

    #[test]
    fn test_command_spec_display() {
        let spec = CommandSpec::new("rabbitmqctl").args(["add_user", "admin", "secret"]);
        assert_eq!(spec.display(), "rabbitmqctl add_user admin secret");
        assert_eq!(CommandSpec::shell("true").args, vec!["-c", "true"]);
    }

    #[test]
    fn test_sensitive_spec_is_redacted() {
        let spec = CommandSpec::new("rabbitmqctl")
            .args(["add_user", "admin", "secret"])
            .sensitive(true);
        assert_eq!(spec.redacted(), "rabbitmqctl <sensitive>");
        let err = Scripted(Some(2)).run_checked(&spec).unwrap_err();
        assert!(!err.to_string().contains("secret"));

        let plain = CommandSpec::new("rabbitmqctl").arg("status");
        assert_eq!(plain.redacted(), "rabbitmqctl status");
    }

    #[test]
    fn test_run_checked() {
        assert!(Scripted(Some(0)).run_checked(&CommandSpec::new("true")).is_ok());

        let err = Scripted(Some(2))
            .run_checked(&CommandSpec::new("false"))
            .unwrap_err();
        assert!(err.to_string().contains("exited with 2"));
        assert!(err.to_string().contains("boom"));

        assert!(Scripted(None).run_checked(&CommandSpec::new("x")).is_err());
    }

    #[test]
    fn test_context_attribute_falls_back_to_facts() {
        let facts = PlatformFacts::new("centos", "7");
        let mut attrs = Attributes::new();
        attrs.insert("rabbitmq.version".into(), "2.8.4".into());
        let ctx = RunContext::new(&facts, &attrs, &LocalHost);

        assert_eq!(ctx.attribute("rabbitmq.version"), Some("2.8.4"));
        assert_eq!(ctx.attribute("platform_family"), Some("rhel"));
        assert_eq!(ctx.attribute("missing"), None);
        assert!(ctx.variables().contains_key("platform"));
    }
}
