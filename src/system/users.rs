//! User and group name resolution

use anyhow::{Context, Result};
use std::ffi::{CStr, CString};

/// Resolve a user name (or a numeric uid) to a uid
pub fn uid_for(name: &str) -> Result<u32> {
    if let Ok(uid) = name.parse::<u32>() {
        return Ok(uid);
    }
    let c_name = CString::new(name).context("Invalid user name")?;

    // SAFETY: getpwnam is a standard POSIX call. The returned record is only
    // read before the next passwd lookup, and the run is single-threaded.
    unsafe {
        let pw = libc::getpwnam(c_name.as_ptr());
        if pw.is_null() {
            anyhow::bail!("Unknown user: {name}");
        }
        Ok((*pw).pw_uid)
    }
}

/// Resolve a group name (or a numeric gid) to a gid
pub fn gid_for(name: &str) -> Result<u32> {
    if let Ok(gid) = name.parse::<u32>() {
        return Ok(gid);
    }
    let c_name = CString::new(name).context("Invalid group name")?;

    // SAFETY: see uid_for
    unsafe {
        let gr = libc::getgrnam(c_name.as_ptr());
        if gr.is_null() {
            anyhow::bail!("Unknown group: {name}");
        }
        Ok((*gr).gr_gid)
    }
}

/// Name of `uid`, or the number itself when it has no passwd entry
pub fn user_name(uid: u32) -> String {
    // SAFETY: see uid_for; pw_name is a NUL-terminated string owned by libc
    unsafe {
        let pw = libc::getpwuid(uid);
        if pw.is_null() {
            return uid.to_string();
        }
        CStr::from_ptr((*pw).pw_name).to_string_lossy().into_owned()
    }
}

/// Name of `gid`, or the number itself when it has no group entry
pub fn group_name(gid: u32) -> String {
    // SAFETY: see uid_for
    unsafe {
        let gr = libc::getgrgid(gid);
        if gr.is_null() {
            return gid.to_string();
        }
        CStr::from_ptr((*gr).gr_name).to_string_lossy().into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_resolves() {
        assert_eq!(uid_for("root").unwrap(), 0);
        assert_eq!(user_name(0), "root");
    }

    #[test]
    fn test_numeric_ids_pass_through() {
        assert_eq!(uid_for("1234").unwrap(), 1234);
        assert_eq!(gid_for("4321").unwrap(), 4321);
    }

    #[test]
    fn test_unknown_names() {
        assert!(uid_for("warren-no-such-user").is_err());
        assert!(gid_for("warren-no-such-group").is_err());
        assert_eq!(user_name(3_999_999), "3999999");
    }
}
