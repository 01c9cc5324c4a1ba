//! Turns a converted selection payload into a store entry: the salience
//! filter, the ignored-window check, the partial-merge decision, batch
//! trimming, and the enabled/disabled status file. This is the part of
//! the daemon that doesn't need a live X connection to test.

mod partial;
mod status;

use std::time::Instant;

use clipmenu_buildcfg::CLIPSERVE_WINDOW_TITLE;
use clipmenu_config::Config;
use clipmenu_store::{ClipStore, Direction};

pub use partial::{is_possible_partial, PARTIAL_MAX_AGE};
pub use status::{read_status, status_path, write_status};

/// True if `text` contains at least one non-whitespace byte. Clips
/// that are empty or whitespace-only are dropped rather than stored.
pub fn is_salient(text: &str) -> bool {
    text.bytes().any(|b| !b.is_ascii_whitespace())
}

/// True if `title` names clipserve's own re-server window, which we
/// must never capture from (it would immediately re-store whatever it
/// is re-serving, in a loop).
pub fn is_clipserve_window(title: Option<&str>) -> bool {
    title == Some(CLIPSERVE_WINDOW_TITLE)
}

/// True if `title` matches the user's configured `ignore_window`
/// pattern, if any.
pub fn is_ignored_window(config: &Config, title: Option<&str>) -> bool {
    match (&config.ignore_window, title) {
        (Some(pattern), Some(title)) => pattern.is_match(title),
        _ => false,
    }
}

/// Remembers the most recently captured clip so a follow-up capture can
/// be recognised as a partial of it and merged in place instead of
/// appended as a new entry.
pub struct LastClip {
    text: String,
    at: Instant,
}

/// Drives the store side of capture: given newly converted text, decide
/// whether to merge it into the last entry or append a new one, and
/// keep the store under its configured batch trim threshold.
pub struct Capture {
    last: Option<LastClip>,
}

impl Capture {
    pub fn new() -> Self {
        Capture { last: None }
    }

    /// Store `text`, merging it into the previous clip if it looks like
    /// a partial of it and arrived within [`PARTIAL_MAX_AGE`]. Returns
    /// the content hash of the stored (or merged-into) entry.
    pub fn store_clip(&mut self, store: &ClipStore, text: &str) -> clipmenu_store::Result<u64> {
        let now = Instant::now();
        let merge = match &self.last {
            Some(last) => {
                now.saturating_duration_since(last.at) <= PARTIAL_MAX_AGE
                    && is_possible_partial(&last.text, text)
            }
            None => false,
        };

        let hash = if merge {
            log::debug!("possible partial of last clip, replacing");
            store.replace(Direction::NewestFirst, 0, text.as_bytes())?
        } else {
            store.add(text.as_bytes())?
        };

        self.last = Some(LastClip { text: text.to_string(), at: now });
        Ok(hash)
    }

    /// Trim the store down to `config.max_clips` once it has grown past
    /// `config.max_clips_batch`, avoiding a compaction pass on every
    /// single capture.
    pub fn maybe_trim(&self, store: &ClipStore, config: &Config) -> clipmenu_store::Result<()> {
        if store.length()? > config.max_clips_batch as u64 {
            store.trim(Direction::NewestFirst, config.max_clips as u64)?;
        }
        Ok(())
    }
}

impl Default for Capture {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn salient_text_detects_non_whitespace() {
        assert!(is_salient("hello"));
        assert!(is_salient("  x  "));
        assert!(!is_salient("   "));
        assert!(!is_salient(""));
    }

    #[test]
    fn clipserve_window_is_recognised_by_title() {
        assert!(is_clipserve_window(Some("clipserve")));
        assert!(!is_clipserve_window(Some("xterm")));
        assert!(!is_clipserve_window(None));
    }

    #[test]
    fn capture_merges_fast_partial_growth() {
        let dir = tempfile::tempdir().unwrap();
        let store = ClipStore::open(&dir.path().join("idx"), &dir.path().join("content")).unwrap();
        let mut capture = Capture::new();

        capture.store_clip(&store, "a").unwrap();
        capture.store_clip(&store, "ab").unwrap();
        capture.store_clip(&store, "abc").unwrap();

        assert_eq!(store.length().unwrap(), 1);
        let top = store
            .iterate(Direction::NewestFirst)
            .unwrap()
            .next()
            .unwrap();
        assert_eq!(top.preview, "abc");
    }

    #[test]
    fn capture_appends_unrelated_text() {
        let dir = tempfile::tempdir().unwrap();
        let store = ClipStore::open(&dir.path().join("idx"), &dir.path().join("content")).unwrap();
        let mut capture = Capture::new();

        capture.store_clip(&store, "hello").unwrap();
        capture.store_clip(&store, "goodbye").unwrap();

        assert_eq!(store.length().unwrap(), 2);
    }
}
