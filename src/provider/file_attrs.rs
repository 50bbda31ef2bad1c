//! Ownership and permission bits shared by the filesystem providers

use anyhow::{Context, Result};
use declarative::{Attributes, Resource};
use std::fs;
use std::os::unix::fs::{MetadataExt, PermissionsExt};
use std::path::Path;

use crate::system::users;

/// Parse an octal mode (`755`, `0755`, `00755`) into permission bits
pub fn parse_mode(mode: &str) -> Result<u32> {
    let bits = u32::from_str_radix(mode.trim(), 8)
        .with_context(|| format!("Invalid file mode '{mode}'"))?;
    if bits > 0o7777 {
        anyhow::bail!("Invalid file mode '{mode}'");
    }
    Ok(bits)
}

/// The declared `mode` attribute as permission bits
pub fn declared_mode(resource: &Resource) -> Result<Option<u32>> {
    resource.attribute("mode").map(parse_mode).transpose()
}

fn format_mode(bits: u32) -> String {
    format!("{:04o}", bits & 0o7777)
}

/// Owner, group and mode as declared on `resource`, normalised for comparison
pub fn declared(resource: &Resource) -> Result<Attributes> {
    let mut attrs = Attributes::new();
    if let Some(owner) = resource.attribute("owner") {
        let name = match owner.parse::<u32>() {
            Ok(uid) => users::user_name(uid),
            Err(_) => owner.to_string(),
        };
        attrs.insert("owner".to_string(), name);
    }
    if let Some(group) = resource.attribute("group") {
        let name = match group.parse::<u32>() {
            Ok(gid) => users::group_name(gid),
            Err(_) => group.to_string(),
        };
        attrs.insert("group".to_string(), name);
    }
    if let Some(mode) = resource.attribute("mode") {
        attrs.insert("mode".to_string(), format_mode(parse_mode(mode)?));
    }
    Ok(attrs)
}

/// Owner, group and mode of an existing path
pub fn observe(path: &Path) -> Result<Attributes> {
    let meta =
        fs::metadata(path).with_context(|| format!("Failed to stat {}", path.display()))?;
    Ok(Attributes::from([
        ("owner".to_string(), users::user_name(meta.uid())),
        ("group".to_string(), users::group_name(meta.gid())),
        ("mode".to_string(), format_mode(meta.mode())),
    ]))
}

/// Bring `path` in line with the declared owner, group and mode
///
/// Returns whether anything had to change.
pub fn enforce(path: &Path, resource: &Resource) -> Result<bool> {
    let want = declared(resource)?;
    let have = observe(path)?;
    let differs = |key: &str| want.get(key).is_some_and(|w| have.get(key) != Some(w));

    let mut changed = false;
    if differs("mode") {
        let bits = parse_mode(&want["mode"])?;
        fs::set_permissions(path, fs::Permissions::from_mode(bits))
            .with_context(|| format!("Failed to chmod {}", path.display()))?;
        log::debug!("chmod {} {}", want["mode"], path.display());
        changed = true;
    }

    if differs("owner") || differs("group") {
        let uid = want.get("owner").map(|o| users::uid_for(o)).transpose()?;
        let gid = want.get("group").map(|g| users::gid_for(g)).transpose()?;
        std::os::unix::fs::chown(path, uid, gid)
            .with_context(|| format!("Failed to chown {}", path.display()))?;
        log::debug!("chown {:?}:{:?} {}", uid, gid, path.display());
        changed = true;
    }
    Ok(changed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_mode() {
        assert_eq!(parse_mode("0755").unwrap(), 0o755);
        assert_eq!(parse_mode("644").unwrap(), 0o644);
        assert_eq!(parse_mode("00400").unwrap(), 0o400);
        assert!(parse_mode("0999").is_err());
        assert!(parse_mode("77777").is_err());
    }

    #[test]
    fn test_declared_normalises() {
        let r = Resource::directory("/etc/rabbitmq").mode("755").owner("0");
        let attrs = declared(&r).unwrap();
        assert_eq!(attrs["mode"], "0755");
        assert_eq!(attrs["owner"], "root");
        assert!(!attrs.contains_key("group"));
    }

    #[test]
    fn test_enforce_mode() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("enabled_plugins");
        fs::write(&path, "[rabbitmq_management].").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o600)).unwrap();

        let r = Resource::file(path.display().to_string()).mode("0644");
        assert!(enforce(&path, &r).unwrap());
        assert_eq!(observe(&path).unwrap()["mode"], "0644");
        assert!(!enforce(&path, &r).unwrap());
    }

    #[test]
    fn test_enforce_without_declarations_is_noop() {
        let dir = TempDir::new().unwrap();
        let r = Resource::directory(dir.path().display().to_string());
        assert!(!enforce(dir.path(), &r).unwrap());
    }
}
