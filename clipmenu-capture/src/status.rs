//! The on-disk status file mirroring whether capture is currently
//! enabled, polled by `clipctl status` and written by the daemon
//! whenever enablement changes.

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use clipmenu_buildcfg::STATUS_FILE_NAME;

/// Path to the status file under a store root.
pub fn status_path(store_root: &Path) -> PathBuf {
    store_root.join(STATUS_FILE_NAME)
}

/// Write `enabled` (as `"1"` or `"0"`) to the status file, matching the
/// original's `write_status`, which always truncates and rewrites.
pub fn write_status(store_root: &Path, enabled: bool) -> Result<()> {
    let path = status_path(store_root);
    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode_or_default()
        .open(&path)
        .with_context(|| format!("failed to open status file {path:?}"))?;
    write!(file, "{}", enabled as u8)
        .with_context(|| format!("failed to write status file {path:?}"))?;
    Ok(())
}

/// Read the current enabled status, defaulting to `true` if the file
/// doesn't exist yet (the daemon hasn't started, or never disabled).
pub fn read_status(store_root: &Path) -> Result<bool> {
    let path = status_path(store_root);
    match std::fs::read_to_string(&path) {
        Ok(contents) => Ok(contents.trim() != "0"),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(true),
        Err(err) => Err(err).with_context(|| format!("failed to read status file {path:?}")),
    }
}

trait OpenOptionsExt {
    fn mode_or_default(&mut self) -> &mut Self;
}

impl OpenOptionsExt for std::fs::OpenOptions {
    #[cfg(unix)]
    fn mode_or_default(&mut self) -> &mut Self {
        use std::os::unix::fs::OpenOptionsExt;
        self.mode(0o600);
        self
    }

    #[cfg(not(unix))]
    fn mode_or_default(&mut self) -> &mut Self {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_status_file_reads_as_enabled() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_status(dir.path()).unwrap());
    }

    #[test]
    fn round_trips_enabled_and_disabled() {
        let dir = tempfile::tempdir().unwrap();
        write_status(dir.path(), false).unwrap();
        assert!(!read_status(dir.path()).unwrap());
        write_status(dir.path(), true).unwrap();
        assert!(read_status(dir.path()).unwrap());
    }
}
