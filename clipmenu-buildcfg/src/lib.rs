//! Shared constants for the clipmenu workspace

/// On-disk store format version. Bumping this invalidates stores left over
/// from an older release by giving them a new store root.
pub const STORE_VERSION: u32 = 7;

/// Process name the capture daemon registers under, used by `clipctl` to
/// find it in `/proc`.
pub const DAEMON_NAME: &str = "clipmenud";

/// Window title the re-server gives its helper window, used by the capture
/// daemon to avoid capturing its own re-served selection.
pub const CLIPSERVE_WINDOW_TITLE: &str = "clipserve";

/// Name of the snip index file inside the store root.
pub const INDEX_FILE_NAME: &str = "line_cache";

/// Name of the capture-enabled status file inside the store root.
pub const STATUS_FILE_NAME: &str = "enabled";

/// Prepend the store root directory name for a given runtime dir and uid.
#[macro_export]
macro_rules! store_dir_name {
    ($uid:expr) => {
        format!("clipmenu.{}.{}", $crate::STORE_VERSION, $uid)
    };
}
