//! Centralized path resolution for warren
//!
//! # Environment Variables
//!
//! - `WARREN_CONFIG_DIR` - Override config directory
//! - `WARREN_STATE_DIR` - Override state directory (run reports)
//!
//! # Config File Resolution Priority
//!
//! 1. `--config FILE` on the command line
//! 2. `$WARREN_CONFIG_DIR/config.toml`
//! 3. `~/.config/warren/config.toml` (or `$XDG_CONFIG_HOME/warren`)
//! 4. `/etc/warren/config.toml`
//!
//! For state_dir():
//! 1. `WARREN_STATE_DIR` environment variable
//! 2. `XDG_STATE_HOME/warren` (if set)
//! 3. `~/.local/state/warren`

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Environment variable for config directory override
pub const ENV_CONFIG_DIR: &str = "WARREN_CONFIG_DIR";

/// Environment variable for state directory override
pub const ENV_STATE_DIR: &str = "WARREN_STATE_DIR";

/// System-wide config directory, used when no user config exists
pub const SYSTEM_CONFIG_DIR: &str = "/etc/warren";

/// Config file name inside a config directory
pub const CONFIG_FILE: &str = "config.toml";

/// Get the user config directory path
///
/// Priority:
/// 1. `WARREN_CONFIG_DIR` env var
/// 2. `XDG_CONFIG_HOME/warren`
/// 3. `~/.config/warren`
pub fn config_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var(ENV_CONFIG_DIR) {
        let path = expand(&dir);
        log::debug!(
            "Using config dir from {}: {}",
            ENV_CONFIG_DIR,
            path.display()
        );
        return Ok(path);
    }

    if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
        let path = PathBuf::from(xdg_config).join("warren");
        log::debug!("Using XDG_CONFIG_HOME: {}", path.display());
        return Ok(path);
    }

    let home = dirs::home_dir().context("Could not determine home directory")?;
    let path = home.join(".config").join("warren");
    log::debug!("Using default config dir: {}", path.display());
    Ok(path)
}

/// Candidate config files in lookup order
pub fn config_candidates(explicit: Option<&Path>) -> Vec<PathBuf> {
    if let Some(path) = explicit {
        return vec![path.to_path_buf()];
    }

    let mut candidates = Vec::new();
    match config_dir() {
        Ok(dir) => candidates.push(dir.join(CONFIG_FILE)),
        Err(e) => log::debug!("No user config dir: {e}"),
    }
    candidates.push(Path::new(SYSTEM_CONFIG_DIR).join(CONFIG_FILE));
    candidates
}

/// Get the warren state directory path
///
/// Priority:
/// 1. `WARREN_STATE_DIR` env var
/// 2. `XDG_STATE_HOME/warren`
/// 3. `~/.local/state/warren`
pub fn state_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var(ENV_STATE_DIR) {
        let path = expand(&dir);
        log::debug!("Using state dir from {}: {}", ENV_STATE_DIR, path.display());
        return Ok(path);
    }

    if let Ok(xdg_state) = std::env::var("XDG_STATE_HOME") {
        let path = PathBuf::from(xdg_state).join("warren");
        log::debug!("Using XDG_STATE_HOME: {}", path.display());
        return Ok(path);
    }

    let home = dirs::home_dir().context("Could not determine home directory")?;
    let path = home.join(".local").join("state").join("warren");
    log::debug!("Using default state dir: {}", path.display());
    Ok(path)
}

/// Expand ~ and environment variables in a path string.
///
/// This is the canonical path expansion function for warren. All modules
/// should use this instead of calling shellexpand directly.
pub fn expand(path: &str) -> PathBuf {
    let expanded = shellexpand::full(path).unwrap_or(std::borrow::Cow::Borrowed(path));
    PathBuf::from(expanded.as_ref())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::{Mutex, MutexGuard};

    /// Serializes tests that mutate process environment variables
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn env_lock() -> MutexGuard<'static, ()> {
        ENV_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Helper to run a test with temporary env var
    ///
    /// # Safety
    /// This function uses unsafe env::set_var/remove_var which can cause issues
    /// if other threads read environment variables concurrently.
    /// Callers hold [`env_lock`].
    fn with_env_var<F, R>(key: &str, value: &str, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let original = env::var(key).ok();
        // SAFETY: env-mutating tests are serialized by ENV_LOCK
        unsafe { env::set_var(key, value) };
        let result = f();
        match original {
            // SAFETY: still under ENV_LOCK
            Some(v) => unsafe { env::set_var(key, v) },
            None => unsafe { env::remove_var(key) },
        }
        result
    }

    /// Helper to run a test with env var removed
    fn without_env_var<F, R>(key: &str, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let original = env::var(key).ok();
        // SAFETY: env-mutating tests are serialized by ENV_LOCK
        unsafe { env::remove_var(key) };
        let result = f();
        if let Some(v) = original {
            // SAFETY: still under ENV_LOCK
            unsafe { env::set_var(key, v) };
        }
        result
    }

    #[test]
    fn test_config_dir_env_override() {
        let _env = env_lock();
        with_env_var(ENV_CONFIG_DIR, "/custom/warren/config", || {
            let result = config_dir().unwrap();
            assert_eq!(result, PathBuf::from("/custom/warren/config"));
        });
    }

    #[test]
    fn test_config_candidates_explicit_wins() {
        let explicit = Path::new("/tmp/broker.toml");
        assert_eq!(config_candidates(Some(explicit)), vec![explicit.to_path_buf()]);
    }

    #[test]
    fn test_config_candidates_end_with_system_dir() {
        let _env = env_lock();
        with_env_var(ENV_CONFIG_DIR, "/opt/warren-candidates", || {
            let candidates = config_candidates(None);
            assert_eq!(
                candidates,
                vec![
                    PathBuf::from("/opt/warren-candidates/config.toml"),
                    PathBuf::from("/etc/warren/config.toml"),
                ]
            );
        });
    }

    #[test]
    fn test_state_dir_env_override() {
        let _env = env_lock();
        with_env_var(ENV_STATE_DIR, "/custom/warren/state", || {
            let result = state_dir().unwrap();
            assert_eq!(result, PathBuf::from("/custom/warren/state"));
        });
    }

    #[test]
    fn test_xdg_state_home() {
        let _env = env_lock();
        without_env_var(ENV_STATE_DIR, || {
            with_env_var("XDG_STATE_HOME", "/tmp/xdg-state-warren", || {
                let result = state_dir().unwrap();
                assert_eq!(result, PathBuf::from("/tmp/xdg-state-warren/warren"));
            });
        });
    }

    #[test]
    fn test_expand_with_tilde() {
        let result = expand("~/templates");
        let home = dirs::home_dir().unwrap();
        assert_eq!(result, home.join("templates"));
    }

    #[test]
    fn test_expand_with_env_var() {
        let _env = env_lock();
        with_env_var("WARREN_TEST_VAR", "broker", || {
            let result = expand("/srv/$WARREN_TEST_VAR/files");
            assert_eq!(result, PathBuf::from("/srv/broker/files"));
        });
    }

    #[test]
    fn test_expand_unknown_env_var_unchanged() {
        let result = expand("/path/$NONEXISTENT_WARREN_VAR_9876/file");
        assert_eq!(result, PathBuf::from("/path/$NONEXISTENT_WARREN_VAR_9876/file"));
    }
}
