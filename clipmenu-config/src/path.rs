//! Resolution of the various paths clipmenu tools need: the config file
//! itself, the runtime scratch directory, and the store root under it.

use std::fs::Permissions;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

use clipmenu_buildcfg::store_dir_name;

/// First of `$XDG_RUNTIME_DIR`, `$TMPDIR`, `/tmp` that is set and
/// non-empty. This is *not* consulted when `$CM_DIR`/`cm_dir` is set;
/// that takes priority and is handled by the caller.
pub fn runtime_directory() -> String {
    for var in ["XDG_RUNTIME_DIR", "TMPDIR"] {
        if let Ok(value) = std::env::var(var) {
            if !value.is_empty() {
                return value;
            }
        }
    }
    "/tmp".to_string()
}

/// Where the clipmenu config file lives: `$CM_CONFIG`, else
/// `$XDG_CONFIG_HOME/clipmenu/clipmenu.conf`, else
/// `$HOME/.config/clipmenu/clipmenu.conf`.
pub fn config_file_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("CM_CONFIG") {
        return Ok(PathBuf::from(path));
    }
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        return Ok(Path::new(&xdg).join("clipmenu").join("clipmenu.conf"));
    }
    let home = std::env::var("HOME")
        .context("none of $CM_CONFIG, $XDG_CONFIG_HOME, or $HOME is set")?;
    Ok(Path::new(&home).join(".config").join("clipmenu").join("clipmenu.conf"))
}

/// The store root directory for this user: `<runtime_dir>/clipmenu.<version>.<uid>`.
/// Created with mode 0700 if it doesn't already exist.
pub fn store_root(runtime_dir: &str) -> Result<PathBuf> {
    let uid = nix::unistd::getuid();
    let dir = Path::new(runtime_dir).join(store_dir_name!(uid.as_raw()));

    match std::fs::create_dir(&dir) {
        Ok(()) => {
            std::fs::set_permissions(&dir, Permissions::from_mode(0o700))?;
        }
        Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {}
        Err(err) => bail!("failed to create store directory {dir:?}: {err}"),
    }

    Ok(dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runtime_directory_falls_back_to_tmp() {
        std::env::remove_var("XDG_RUNTIME_DIR");
        std::env::remove_var("TMPDIR");
        assert_eq!(runtime_directory(), "/tmp");
    }

    #[test]
    fn runtime_directory_prefers_xdg() {
        std::env::set_var("XDG_RUNTIME_DIR", "/run/user/1000");
        std::env::set_var("TMPDIR", "/var/tmp");
        assert_eq!(runtime_directory(), "/run/user/1000");
        std::env::remove_var("XDG_RUNTIME_DIR");
        std::env::remove_var("TMPDIR");
    }

    #[test]
    fn store_root_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let runtime_dir = dir.path().to_str().unwrap();
        let first = store_root(runtime_dir).unwrap();
        let second = store_root(runtime_dir).unwrap();
        assert_eq!(first, second);
        assert!(first.exists());
    }
}
