//! Concrete providers for every resource kind
//!
//! Each provider reaches the host only through the collaborators it is
//! built with, so the same code runs against a real system or against the
//! recording doubles in the tests.

pub mod apt_repository;
pub mod directory;
pub mod execute;
pub mod file_attrs;
pub mod managed_file;
pub mod package;
pub mod remote_file;
pub mod service;

use anyhow::{Context, Result};
use declarative::{
    CommandRunner, Fetcher, PackageManager, ProviderRegistry, ServiceManager, TemplateRenderer,
};
use std::fs;
use std::io::Write;
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::system::AssetStore;

pub use apt_repository::AptRepositoryProvider;
pub use directory::DirectoryProvider;
pub use execute::ExecuteProvider;
pub use managed_file::{CookbookFileSource, ManagedFile, TemplateSource};
pub use package::PackageProvider;
pub use remote_file::RemoteFileProvider;
pub use service::ServiceProvider;

/// Everything the providers need from the host
pub struct Collaborators {
    pub runner: Arc<dyn CommandRunner>,
    pub packages: Arc<dyn PackageManager>,
    pub services: Arc<dyn ServiceManager>,
    pub templates: Arc<dyn TemplateRenderer>,
    pub files: AssetStore,
    pub fetcher: Arc<dyn Fetcher>,
    pub apt_sources_dir: PathBuf,
    pub apt_keyring_dir: PathBuf,
}

/// Build a registry with one provider per resource kind
pub fn build_registry(c: Collaborators) -> ProviderRegistry {
    ProviderRegistry::new()
        .with(DirectoryProvider)
        .with(ManagedFile::new(TemplateSource::new(c.templates)))
        .with(ManagedFile::new(CookbookFileSource::new(c.files)))
        .with(RemoteFileProvider::new(c.fetcher.clone()))
        .with(PackageProvider::new(c.packages))
        .with(ExecuteProvider::new(c.runner.clone()))
        .with(ServiceProvider::new(c.services))
        .with(AptRepositoryProvider::new(
            c.runner,
            c.fetcher,
            c.apt_sources_dir,
            c.apt_keyring_dir,
        ))
}

/// BLAKE3 content digest, hex encoded
pub fn digest(content: &[u8]) -> String {
    blake3::hash(content).to_hex().to_string()
}

/// Permission bits of a newly written file with no declared mode
pub const DEFAULT_FILE_MODE: u32 = 0o644;

/// Replace `path` with `content` via a temporary file and rename
///
/// The temporary file is private (0600) while it is written. Before the
/// rename it takes `mode`, else the replaced file's permission bits, else
/// [`DEFAULT_FILE_MODE`]. Ownership is not carried over.
pub fn write_atomic(path: &Path, content: &[u8], mode: Option<u32>) -> Result<()> {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let file_name = path
        .file_name()
        .with_context(|| format!("Not a file path: {}", path.display()))?;
    let tmp = parent.join(format!(".{}.warren-tmp", file_name.to_string_lossy()));

    // a leftover from an interrupted run may carry wider permissions
    let _ = fs::remove_file(&tmp);
    let mut file = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(0o600)
        .open(&tmp)
        .with_context(|| format!("Failed to create {}", tmp.display()))?;
    file.write_all(content)
        .with_context(|| format!("Failed to write {}", tmp.display()))?;
    drop(file);

    let bits = match (mode, fs::metadata(path)) {
        (Some(bits), _) => bits,
        (None, Ok(existing)) => existing.permissions().mode() & 0o7777,
        (None, Err(_)) => DEFAULT_FILE_MODE,
    };
    fs::set_permissions(&tmp, fs::Permissions::from_mode(bits))
        .with_context(|| format!("Failed to set permissions on {}", tmp.display()))?;
    fs::rename(&tmp, path).with_context(|| {
        let _ = fs::remove_file(&tmp);
        format!("Failed to move {} into place", path.display())
    })?;
    Ok(())
}

#[cfg(test)]
pub mod testing {
    //! Doubles for provider tests

    use anyhow::Result;
    use declarative::{
        Attributes, Fetcher, PackageManager, PlatformFacts, RunContext, ServiceManager,
        ServiceSpec, ServiceStatus,
    };
    use std::collections::BTreeMap;
    use std::path::Path;
    use std::sync::Mutex;

    pub fn debian() -> PlatformFacts {
        PlatformFacts::new("debian", "12").with_hostname("mq1")
    }

    pub fn ctx<'a>(facts: &'a PlatformFacts, attrs: &'a Attributes) -> RunContext<'a> {
        RunContext::new(facts, attrs, &declarative::LocalHost)
    }

    /// In-memory package database
    #[derive(Default)]
    pub struct FakePackages {
        pub installed: Mutex<BTreeMap<String, String>>,
        pub calls: Mutex<Vec<String>>,
    }

    impl PackageManager for FakePackages {
        fn query_installed(&self, name: &str) -> Result<Option<String>> {
            Ok(self.installed.lock().unwrap().get(name).cloned())
        }

        fn install(&self, name: &str, version: Option<&str>, source: Option<&Path>) -> Result<()> {
            self.calls.lock().unwrap().push(format!(
                "install {name} {} {}",
                version.unwrap_or("-"),
                source.map_or_else(|| "-".to_string(), |p| p.display().to_string())
            ));
            self.installed
                .lock()
                .unwrap()
                .insert(name.to_string(), version.unwrap_or("1.0").to_string());
            Ok(())
        }

        fn remove(&self, name: &str) -> Result<()> {
            self.calls.lock().unwrap().push(format!("remove {name}"));
            self.installed.lock().unwrap().remove(name);
            Ok(())
        }
    }

    /// In-memory init system
    #[derive(Default)]
    pub struct FakeServices {
        pub state: Mutex<BTreeMap<String, ServiceStatus>>,
        pub calls: Mutex<Vec<String>>,
    }

    impl FakeServices {
        fn update(&self, verb: &str, service: &ServiceSpec, f: impl FnOnce(&mut ServiceStatus)) {
            self.calls
                .lock()
                .unwrap()
                .push(format!("{verb} {}", service.name));
            let mut state = self.state.lock().unwrap();
            let status = state.entry(service.name.clone()).or_insert(ServiceStatus {
                running: false,
                enabled: false,
            });
            f(status);
        }
    }

    impl ServiceManager for FakeServices {
        fn status(&self, service: &ServiceSpec) -> Result<ServiceStatus> {
            Ok(self
                .state
                .lock()
                .unwrap()
                .get(&service.name)
                .copied()
                .unwrap_or(ServiceStatus {
                    running: false,
                    enabled: false,
                }))
        }

        fn start(&self, service: &ServiceSpec) -> Result<()> {
            self.update("start", service, |s| s.running = true);
            Ok(())
        }

        fn stop(&self, service: &ServiceSpec) -> Result<()> {
            self.update("stop", service, |s| s.running = false);
            Ok(())
        }

        fn restart(&self, service: &ServiceSpec) -> Result<()> {
            self.update("restart", service, |s| s.running = true);
            Ok(())
        }

        fn reload(&self, service: &ServiceSpec) -> Result<()> {
            self.update("reload", service, |_| {});
            Ok(())
        }

        fn enable(&self, service: &ServiceSpec) -> Result<()> {
            self.update("enable", service, |s| s.enabled = true);
            Ok(())
        }

        fn disable(&self, service: &ServiceSpec) -> Result<()> {
            self.update("disable", service, |s| s.enabled = false);
            Ok(())
        }
    }

    /// Serves fixed bodies by URL and counts requests
    #[derive(Default)]
    pub struct FakeFetcher {
        pub bodies: BTreeMap<String, Vec<u8>>,
        pub requests: Mutex<Vec<String>>,
    }

    impl FakeFetcher {
        pub fn serving(url: &str, body: &[u8]) -> Self {
            Self {
                bodies: BTreeMap::from([(url.to_string(), body.to_vec())]),
                ..Self::default()
            }
        }

        pub fn request_count(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    impl Fetcher for FakeFetcher {
        fn fetch(&self, url: &str) -> Result<Vec<u8>> {
            self.requests.lock().unwrap().push(url.to_string());
            self.bodies
                .get(url)
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("404 Not Found: {url}"))
        }
    }
}
