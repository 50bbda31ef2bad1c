//! Host collaborators: package managers, init systems, downloads, templates
//!
//! Everything here implements a `declarative` collaborator trait on top of
//! external commands run through a [`CommandRunner`], so each backend can
//! be tested with a recording runner.

pub mod assets;
pub mod fetch;
pub mod packages;
pub mod render;
pub mod service;
pub mod users;

pub use assets::AssetStore;
pub use fetch::HttpFetcher;
pub use packages::{AptPackages, RpmPackages, UnsupportedPackages, package_manager_for};
pub use render::{TemplateEngine, render_str};
pub use service::InitServices;

#[cfg(test)]
pub mod testing {
    //! Recording command runner shared by collaborator and provider tests

    use anyhow::Result;
    use declarative::{CommandOutput, CommandRunner, CommandSpec};
    use std::sync::{Arc, Mutex};

    /// Records every command line; answers from scripted prefixes, else exit 0
    #[derive(Default)]
    pub struct RecordingRunner {
        calls: Mutex<Vec<String>>,
        scripted: Mutex<Vec<(String, CommandOutput)>>,
    }

    impl RecordingRunner {
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        /// Answer commands starting with `prefix`; later scripts win
        pub fn respond(&self, prefix: &str, code: i32, stdout: &str) {
            let output = CommandOutput {
                stdout: stdout.as_bytes().to_vec(),
                ..CommandOutput::with_code(code)
            };
            self.scripted
                .lock()
                .unwrap()
                .insert(0, (prefix.to_string(), output));
        }

        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        pub fn clear(&self) {
            self.calls.lock().unwrap().clear();
        }
    }

    impl CommandRunner for RecordingRunner {
        fn run(&self, spec: &CommandSpec) -> Result<CommandOutput> {
            let line = spec.display();
            self.calls.lock().unwrap().push(line.clone());
            let scripted = self.scripted.lock().unwrap();
            Ok(scripted
                .iter()
                .find(|(prefix, _)| line.starts_with(prefix.as_str()))
                .map(|(_, out)| out.clone())
                .unwrap_or_else(|| CommandOutput::with_code(0)))
        }
    }
}
