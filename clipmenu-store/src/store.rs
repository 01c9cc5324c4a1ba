//! The clip store: an ordered, appendable, iterable sequence of captured
//! clips backed by a memory-mapped index file and a content-addressed
//! payload directory.

use std::cell::Cell;
use std::ffi::c_void;
use std::fs::{self, OpenOptions};
use std::num::NonZeroUsize;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};

use nix::sys::mman::{mmap, mremap, munmap, MapFlags, MRemapFlags, ProtFlags};
use nix::unistd::ftruncate;

use crate::content::{self, ContentHandle};
use crate::error::{Result, StoreError};
use crate::lock;
use crate::record::{self, Header, Snip, RECORD_SIZE};

/// Which end of the store an operation is anchored to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    NewestFirst,
    OldestFirst,
}

impl Direction {
    fn index_for(self, nr_snips: u64, pos: u64) -> u64 {
        match self {
            Direction::NewestFirst => nr_snips - 1 - pos,
            Direction::OldestFirst => pos,
        }
    }
}

/// A snapshot of one live snip, safe to hold after the store's lock has
/// been released.
#[derive(Clone, Debug)]
pub struct SnipView {
    /// Position from the iteration's starting end, 0-based.
    pub age: u64,
    pub hash: u64,
    pub nr_lines: u64,
    pub preview: String,
}

/// What [`ClipStore::remove`]'s predicate wants done with the current
/// entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RemoveAction {
    remove: bool,
    stop: bool,
}

impl RemoveAction {
    pub const KEEP: Self = Self {
        remove: false,
        stop: false,
    };
    pub const REMOVE: Self = Self {
        remove: true,
        stop: false,
    };

    /// Stop iterating after this entry is processed.
    #[must_use]
    pub fn stop(mut self) -> Self {
        self.stop = true;
        self
    }
}

/// A handle to a shared, memory-mapped clip store.
///
/// Not `Sync`/`Send`: every binary in this workspace is single-threaded,
/// so the locking protocol only needs to guard against *other
/// processes*, not other threads in this one.
#[derive(Debug)]
pub struct ClipStore {
    index_file: fs::File,
    content_dir: PathBuf,
    mapping: Cell<*mut u8>,
    /// Number of snip slots currently mapped, beyond the header. Only
    /// ever grows; see `remap_on_acquire`.
    mapped_alloc: Cell<u64>,
    lock_depth: Cell<u32>,
}

struct LockGuard<'a> {
    store: &'a ClipStore,
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        let depth = self.store.lock_depth.get();
        self.store.lock_depth.set(depth - 1);
        if depth - 1 == 0 {
            if let Err(err) = lock::unlock(self.store.index_file.as_raw_fd()) {
                log::error!("failed to release clip store lock: {err}");
            }
        }
    }
}

impl ClipStore {
    /// Open (creating if necessary) the index at `index_path`, with
    /// content entries stored under `content_dir`.
    pub fn open(index_path: &Path, content_dir: &Path) -> Result<Self> {
        fs::create_dir_all(content_dir)?;

        let index_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(index_path)?;

        if index_file.metadata()?.len() == 0 {
            index_file.set_len(RECORD_SIZE as u64)?;
        }

        let len = index_file.metadata()?.len();
        if len == 0 || len % RECORD_SIZE as u64 != 0 {
            return Err(StoreError::InvalidFormat(format!(
                "index length {len} is not a positive multiple of the record size"
            )));
        }

        let ptr = unsafe {
            mmap(
                None,
                NonZeroUsize::new(len as usize).expect("checked above"),
                ProtFlags::PROT_READ | ProtFlags::PROT_WRITE,
                MapFlags::MAP_SHARED,
                index_file.as_raw_fd(),
                0,
            )
        }? as *mut u8;

        let store = ClipStore {
            index_file,
            content_dir: content_dir.to_path_buf(),
            mapping: Cell::new(ptr),
            mapped_alloc: Cell::new(len / RECORD_SIZE as u64 - 1),
            lock_depth: Cell::new(0),
        };

        {
            let _guard = store.lock()?;
            let header = store.header();
            if header.nr_snips > header.nr_snips_alloc {
                return Err(StoreError::InvalidFormat(format!(
                    "nr_snips {} exceeds nr_snips_alloc {}",
                    header.nr_snips, header.nr_snips_alloc
                )));
            }
            let expected_len = (header.nr_snips_alloc + 1) * RECORD_SIZE as u64;
            if expected_len != store.index_file.metadata()?.len() {
                return Err(StoreError::InvalidFormat(
                    "index length does not match header's nr_snips_alloc".into(),
                ));
            }
        }

        Ok(store)
    }

    fn header(&self) -> &Header {
        unsafe { &*(self.mapping.get() as *const Header) }
    }

    #[allow(clippy::mut_from_ref)]
    fn header_mut(&self) -> &mut Header {
        unsafe { &mut *(self.mapping.get() as *mut Header) }
    }

    fn nr_snips(&self) -> u64 {
        self.header().nr_snips
    }

    fn nr_snips_alloc(&self) -> u64 {
        self.header().nr_snips_alloc
    }

    fn set_nr_snips(&self, n: u64) {
        self.header_mut().nr_snips = n;
    }

    fn snip_ptr(&self, idx: u64) -> *mut Snip {
        unsafe {
            self.mapping
                .get()
                .add(((idx + 1) * RECORD_SIZE as u64) as usize) as *mut Snip
        }
    }

    fn snip_view(&self, idx: u64, age: u64) -> SnipView {
        let snip = unsafe { &*self.snip_ptr(idx) };
        SnipView {
            age,
            hash: snip.hash,
            nr_lines: snip.nr_lines,
            preview: record::preview_to_string(&snip.preview),
        }
    }

    /// Acquire the cross-process lock, reentrantly. The first acquisition
    /// in this process after another process has grown the store remaps
    /// to cover the new slots.
    fn lock(&self) -> Result<LockGuard<'_>> {
        let depth = self.lock_depth.get();
        if depth == 0 {
            lock::lock_exclusive(self.index_file.as_raw_fd())?;
            if let Err(err) = self.remap_on_acquire() {
                let _ = lock::unlock(self.index_file.as_raw_fd());
                return Err(err);
            }
        }
        self.lock_depth.set(depth + 1);
        Ok(LockGuard { store: self })
    }

    fn remap_on_acquire(&self) -> Result<()> {
        let header_alloc = self.header().nr_snips_alloc;
        if self.header().nr_snips > header_alloc {
            return Err(StoreError::InvalidFormat(format!(
                "nr_snips {} exceeds nr_snips_alloc {}",
                self.header().nr_snips,
                header_alloc
            )));
        }
        if header_alloc > self.mapped_alloc.get() {
            let old_len = ((self.mapped_alloc.get() + 1) * RECORD_SIZE as u64) as usize;
            let new_len = ((header_alloc + 1) * RECORD_SIZE as u64) as usize;
            let new_ptr = unsafe {
                mremap(
                    self.mapping.get() as *mut c_void,
                    old_len,
                    new_len,
                    MRemapFlags::MREMAP_MAYMOVE,
                    None,
                )
            }? as *mut u8;
            self.mapping.set(new_ptr);
            self.mapped_alloc.set(header_alloc);
        }
        Ok(())
    }

    fn grow_to(&self, new_alloc: u64) -> Result<()> {
        let old_len = ((self.mapped_alloc.get() + 1) * RECORD_SIZE as u64) as usize;
        let new_len = ((new_alloc + 1) * RECORD_SIZE as u64) as usize;
        ftruncate(self.index_file.as_raw_fd(), new_len as i64)?;
        let new_ptr = unsafe {
            mremap(
                self.mapping.get() as *mut c_void,
                old_len,
                new_len,
                MRemapFlags::MREMAP_MAYMOVE,
                None,
            )
        }? as *mut u8;
        self.mapping.set(new_ptr);
        self.mapped_alloc.set(new_alloc);
        self.header_mut().nr_snips_alloc = new_alloc;
        Ok(())
    }

    fn shrink_to(&self, new_alloc: u64) -> Result<()> {
        let new_len = ((new_alloc + 1) * RECORD_SIZE as u64) as i64;
        ftruncate(self.index_file.as_raw_fd(), new_len)?;
        self.header_mut().nr_snips_alloc = new_alloc;
        Ok(())
    }

    fn resize_to(&self, nr_snips_wanted: u64) -> Result<()> {
        let cur_alloc = self.nr_snips_alloc();
        if nr_snips_wanted > cur_alloc {
            self.grow_to(record::round_up_batch(nr_snips_wanted))?;
        } else if nr_snips_wanted < cur_alloc {
            self.shrink_to(nr_snips_wanted)?;
        }
        Ok(())
    }

    /// Current number of live entries.
    pub fn length(&self) -> Result<u64> {
        let _guard = self.lock()?;
        Ok(self.nr_snips())
    }

    /// Hash, store the content for, and append `payload` as the newest
    /// entry. Returns its content hash.
    pub fn add(&self, payload: &[u8]) -> Result<u64> {
        let _guard = self.lock()?;
        let hash = record::hash_payload(payload);
        // content before snip: a crash here leaves an orphaned content
        // entry, never a snip pointing at missing content.
        content::add_content(&self.content_dir, hash, payload)?;
        self.append_snip(hash, payload);
        Ok(hash)
    }

    fn append_snip(&self, hash: u64, payload: &[u8]) {
        let nr_snips = self.nr_snips();
        if nr_snips >= self.nr_snips_alloc() {
            // grow_to can't fail here in any way callers should see
            // differently from add()'s own Result, so propagate via
            // expect: a growth failure mid-add means the store is in an
            // unrecoverable state anyway.
            self.grow_to(record::round_up_batch(nr_snips + 1))
                .expect("failed to grow clip store index");
        }
        let (nr_lines, preview) = record::first_line_preview(payload);
        unsafe {
            let slot = self.snip_ptr(nr_snips);
            (*slot).hash = hash;
            (*slot).doomed = 0;
            (*slot).nr_lines = nr_lines;
            (*slot).preview = preview;
        }
        self.set_nr_snips(nr_snips + 1);
    }

    /// Replace the entry `age` positions from the `direction` end with
    /// `payload`. Fails with [`StoreError::OutOfRange`] if `age` is past
    /// the end.
    pub fn replace(&self, direction: Direction, age: u64, payload: &[u8]) -> Result<u64> {
        let _guard = self.lock()?;
        let nr_snips = self.nr_snips();
        if age >= nr_snips {
            return Err(StoreError::OutOfRange(age));
        }
        let idx = direction.index_for(nr_snips, age);
        let old_hash = unsafe { (*self.snip_ptr(idx)).hash };
        content::remove_content(&self.content_dir, old_hash)?;

        let hash = record::hash_payload(payload);
        content::add_content(&self.content_dir, hash, payload)?;
        let (nr_lines, preview) = record::first_line_preview(payload);
        unsafe {
            let slot = self.snip_ptr(idx);
            (*slot).hash = hash;
            (*slot).doomed = 0;
            (*slot).nr_lines = nr_lines;
            (*slot).preview = preview;
        }
        Ok(hash)
    }

    /// Iterate live entries in the given direction. Holds the store's
    /// lock for the lifetime of the returned iterator.
    pub fn iterate(&self, direction: Direction) -> Result<Iter<'_>> {
        let guard = self.lock()?;
        let nr_snips = self.nr_snips();
        Ok(Iter {
            store: self,
            direction,
            pos: 0,
            nr_snips,
            _guard: guard,
        })
    }

    /// Remove entries for which `predicate` returns
    /// [`RemoveAction::REMOVE`], walking in `direction`. Returns the
    /// number removed.
    pub fn remove<F>(&self, direction: Direction, predicate: F) -> Result<u64>
    where
        F: FnMut(&SnipView) -> RemoveAction,
    {
        let _guard = self.lock()?;
        self.remove_locked(direction, predicate)
    }

    fn remove_locked<F>(&self, direction: Direction, mut predicate: F) -> Result<u64>
    where
        F: FnMut(&SnipView) -> RemoveAction,
    {
        let nr_snips = self.nr_snips();
        let mut removed = 0u64;
        let mut pos = 0u64;

        while pos < nr_snips {
            let idx = direction.index_for(nr_snips, pos);
            let view = self.snip_view(idx, pos);
            let action = predicate(&view);
            if action.remove {
                content::remove_content(&self.content_dir, view.hash)?;
                unsafe {
                    (*self.snip_ptr(idx)).doomed = 1;
                }
                removed += 1;
            }
            pos += 1;
            if action.stop {
                break;
            }
        }

        if removed > 0 {
            self.compact()?;
        }

        Ok(removed)
    }

    /// Keep only the newest/oldest (per `direction`) `keep_n` entries,
    /// discarding the rest. No-op if there aren't more than `keep_n`
    /// entries already.
    pub fn trim(&self, direction: Direction, keep_n: u64) -> Result<u64> {
        let _guard = self.lock()?;
        let nr_snips = self.nr_snips();
        if keep_n >= nr_snips {
            return Ok(0);
        }
        let mut kept = 0u64;
        self.remove_locked(direction, move |_view| {
            if kept < keep_n {
                kept += 1;
                RemoveAction::KEEP
            } else {
                RemoveAction::REMOVE
            }
        })
    }

    fn compact(&self) -> Result<()> {
        let nr_snips = self.nr_snips();
        let mut write_idx = 0u64;
        for read_idx in 0..nr_snips {
            let doomed = unsafe { (*self.snip_ptr(read_idx)).doomed };
            if doomed != 0 {
                continue;
            }
            if write_idx != read_idx {
                let src = unsafe { *self.snip_ptr(read_idx) };
                unsafe {
                    *self.snip_ptr(write_idx) = src;
                }
            }
            write_idx += 1;
        }
        self.set_nr_snips(write_idx);
        self.resize_to(write_idx)
    }

    /// Map and return the full payload for `hash`.
    pub fn content_get(&self, hash: u64) -> Result<ContentHandle> {
        let _guard = self.lock()?;
        content::open_content(&self.content_dir, hash)
    }
}

impl Drop for ClipStore {
    fn drop(&mut self) {
        let len = ((self.mapped_alloc.get() + 1) * RECORD_SIZE as u64) as usize;
        let ptr = self.mapping.get();
        if !ptr.is_null() {
            unsafe {
                if let Err(err) = munmap(ptr as *mut c_void, len) {
                    log::error!("failed to unmap clip store index: {err}");
                }
            }
        }
    }
}

/// Lazy walk of live entries in one direction, holding the store's lock.
pub struct Iter<'a> {
    store: &'a ClipStore,
    direction: Direction,
    pos: u64,
    nr_snips: u64,
    _guard: LockGuard<'a>,
}

impl Iterator for Iter<'_> {
    type Item = SnipView;

    fn next(&mut self) -> Option<SnipView> {
        if self.pos >= self.nr_snips {
            return None;
        }
        let idx = self.direction.index_for(self.nr_snips, self.pos);
        let view = self.store.snip_view(idx, self.pos);
        self.pos += 1;
        Some(view)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_store(dir: &tempfile::TempDir) -> ClipStore {
        let content_dir = dir.path().join("content");
        ClipStore::open(&dir.path().join("line_cache"), &content_dir).unwrap()
    }

    #[test]
    fn fresh_store_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir);
        assert_eq!(store.length().unwrap(), 0);
    }

    #[test]
    fn add_and_iterate_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir);
        store.add(b"first").unwrap();
        store.add(b"second").unwrap();
        store.add(b"third").unwrap();

        let previews: Vec<String> = store
            .iterate(Direction::NewestFirst)
            .unwrap()
            .map(|v| v.preview)
            .collect();
        assert_eq!(previews, vec!["third", "second", "first"]);

        let previews: Vec<String> = store
            .iterate(Direction::OldestFirst)
            .unwrap()
            .map(|v| v.preview)
            .collect();
        assert_eq!(previews, vec!["first", "second", "third"]);
    }

    #[test]
    fn add_dedups_content_but_not_snips() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir);
        let h1 = store.add(b"same").unwrap();
        let h2 = store.add(b"same").unwrap();
        assert_eq!(h1, h2);
        assert_eq!(store.length().unwrap(), 2);

        let content = store.content_get(h1).unwrap();
        assert_eq!(&content[..], b"same");
    }

    #[test]
    fn replace_out_of_range_fails() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir);
        store.add(b"only").unwrap();
        match store.replace(Direction::NewestFirst, 5, b"nope") {
            Err(StoreError::OutOfRange(5)) => {}
            other => panic!("expected OutOfRange(5), got {other:?}"),
        }
    }

    #[test]
    fn replace_newest_swaps_content() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir);
        let old_hash = store.add(b"draft").unwrap();
        let new_hash = store.replace(Direction::NewestFirst, 0, b"final").unwrap();
        assert_ne!(old_hash, new_hash);
        assert_eq!(store.length().unwrap(), 1);
        assert!(store.content_get(new_hash).is_ok());
        match store.content_get(old_hash) {
            Err(StoreError::NotFound) => {}
            other => panic!("expected old content gone, got {other:?}"),
        }
    }

    #[test]
    fn trim_is_noop_when_under_limit() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir);
        store.add(b"one").unwrap();
        store.add(b"two").unwrap();
        let removed = store.trim(Direction::NewestFirst, 10).unwrap();
        assert_eq!(removed, 0);
        assert_eq!(store.length().unwrap(), 2);
    }

    #[test]
    fn trim_keeps_newest() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir);
        for i in 0..5 {
            store.add(format!("clip {i}").as_bytes()).unwrap();
        }
        let removed = store.trim(Direction::NewestFirst, 2).unwrap();
        assert_eq!(removed, 3);
        let previews: Vec<String> = store
            .iterate(Direction::OldestFirst)
            .unwrap()
            .map(|v| v.preview)
            .collect();
        assert_eq!(previews, vec!["clip 3", "clip 4"]);
    }

    #[test]
    fn remove_compacts_and_frees_content() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir);
        let h1 = store.add(b"keep me").unwrap();
        store.add(b"drop this one").unwrap();
        store.add(b"keep me too").unwrap();

        let removed = store
            .remove(Direction::OldestFirst, |view| {
                if view.preview.contains("drop") {
                    RemoveAction::REMOVE
                } else {
                    RemoveAction::KEEP
                }
            })
            .unwrap();
        assert_eq!(removed, 1);
        assert_eq!(store.length().unwrap(), 2);
        assert!(store.content_get(h1).is_ok());

        let previews: Vec<String> = store
            .iterate(Direction::OldestFirst)
            .unwrap()
            .map(|v| v.preview)
            .collect();
        assert_eq!(previews, vec!["keep me", "keep me too"]);
    }

    #[test]
    fn remove_stop_halts_early() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir);
        for i in 0..5 {
            store.add(format!("{i}").as_bytes()).unwrap();
        }
        let mut seen = 0u64;
        let removed = store
            .remove(Direction::OldestFirst, |_view| {
                seen += 1;
                if seen >= 2 {
                    RemoveAction::REMOVE.stop()
                } else {
                    RemoveAction::KEEP
                }
            })
            .unwrap();
        assert_eq!(removed, 1);
        assert_eq!(seen, 2);
        assert_eq!(store.length().unwrap(), 4);
    }

    #[test]
    fn growth_across_batch_boundary_is_visible() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir);
        for i in 0..1200u32 {
            store.add(format!("clip {i}").as_bytes()).unwrap();
        }
        assert_eq!(store.length().unwrap(), 1200);
        let previews: Vec<String> = store
            .iterate(Direction::OldestFirst)
            .unwrap()
            .map(|v| v.preview)
            .collect();
        assert_eq!(previews[0], "clip 0");
        assert_eq!(previews[1199], "clip 1199");
    }

    #[test]
    fn reopening_store_preserves_contents() {
        let dir = tempfile::tempdir().unwrap();
        let index_path = dir.path().join("line_cache");
        let content_dir = dir.path().join("content");
        {
            let store = ClipStore::open(&index_path, &content_dir).unwrap();
            store.add(b"persisted").unwrap();
        }
        let store = ClipStore::open(&index_path, &content_dir).unwrap();
        assert_eq!(store.length().unwrap(), 1);
        let preview = store.iterate(Direction::NewestFirst).unwrap().next().unwrap();
        assert_eq!(preview.preview, "persisted");
    }

    #[test]
    fn corrupt_header_is_rejected() {
        use std::io::Write;
        let dir = tempfile::tempdir().unwrap();
        let index_path = dir.path().join("line_cache");
        let content_dir = dir.path().join("content");
        fs::create_dir_all(&content_dir).unwrap();
        let mut file = fs::File::create(&index_path).unwrap();
        // nr_snips > nr_snips_alloc, which is never valid.
        file.write_all(&5u64.to_ne_bytes()).unwrap();
        file.write_all(&1u64.to_ne_bytes()).unwrap();
        file.write_all(&[0u8; RECORD_SIZE - 16]).unwrap();
        file.set_len(RECORD_SIZE as u64 * 2).unwrap();
        drop(file);

        match ClipStore::open(&index_path, &content_dir) {
            Err(StoreError::InvalidFormat(_)) => {}
            other => panic!("expected InvalidFormat, got {other:?}"),
        }
    }
}
