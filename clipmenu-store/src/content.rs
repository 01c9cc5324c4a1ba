//! Content-addressed storage for full clip payloads.
//!
//! Each unique payload lives under `<content_dir>/<hash>/`, with hard
//! links `1`, `2`, ... standing in for the reference count: the link
//! count on `1` is always the number of live snips referencing that
//! hash. The directory is removed when the last reference goes away.

use std::ffi::c_void;
use std::fs;
use std::num::NonZeroUsize;
use std::os::unix::fs::MetadataExt;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};

use nix::sys::mman::{mmap, munmap, MapFlags, ProtFlags};

use crate::error::{Result, StoreError};

fn entry_dir(content_dir: &Path, hash: u64) -> PathBuf {
    content_dir.join(hash.to_string())
}

/// Add a reference to `payload` under `hash`, creating the content entry
/// if this is the first reference.
pub(crate) fn add_content(content_dir: &Path, hash: u64, payload: &[u8]) -> Result<()> {
    let dir = entry_dir(content_dir, hash);
    match fs::create_dir(&dir) {
        Ok(()) => {
            use std::io::Write;
            let first = dir.join("1");
            let mut file = fs::OpenOptions::new()
                .create_new(true)
                .write(true)
                .open(&first)?;
            file.write_all(payload)?;
            Ok(())
        }
        Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
            // Same hash already stored; assume the same content (hash
            // collisions on text payloads are treated as negligible, as
            // in the reference implementation this store is modeled on)
            // and just add another hard link.
            let first = dir.join("1");
            let nlink = fs::metadata(&first)?.nlink();
            let next = dir.join((nlink + 1).to_string());
            fs::hard_link(&first, &next)?;
            Ok(())
        }
        Err(err) => Err(err.into()),
    }
}

/// Drop one reference to `hash`, removing the content directory entirely
/// once the last reference is gone.
pub(crate) fn remove_content(content_dir: &Path, hash: u64) -> Result<()> {
    let dir = entry_dir(content_dir, hash);
    let first = dir.join("1");
    let nlink = fs::metadata(&first)?.nlink();
    let victim = dir.join(nlink.to_string());
    fs::remove_file(&victim)?;
    if nlink == 1 {
        fs::remove_dir(&dir)?;
    }
    Ok(())
}

#[derive(Debug)]
enum MappedData {
    Empty,
    Mapped { ptr: *mut u8, len: usize },
}

/// A read-only view of one content entry's payload, memory-mapped for
/// the lifetime of the handle.
#[derive(Debug)]
pub struct ContentHandle {
    data: MappedData,
    _file: fs::File,
}

impl std::ops::Deref for ContentHandle {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match self.data {
            MappedData::Empty => &[],
            MappedData::Mapped { ptr, len } => unsafe { std::slice::from_raw_parts(ptr, len) },
        }
    }
}

impl Drop for ContentHandle {
    fn drop(&mut self) {
        if let MappedData::Mapped { ptr, len } = self.data {
            unsafe {
                if let Err(err) = munmap(ptr as *mut c_void, len) {
                    log::error!("failed to unmap content entry: {err}");
                }
            }
        }
    }
}

/// Open and map the payload for `hash` read-only.
pub(crate) fn open_content(content_dir: &Path, hash: u64) -> Result<ContentHandle> {
    let path = entry_dir(content_dir, hash).join("1");
    let file = fs::File::open(&path).map_err(|err| {
        if err.kind() == std::io::ErrorKind::NotFound {
            StoreError::NotFound
        } else {
            StoreError::Io(err)
        }
    })?;

    let len = file.metadata()?.len() as usize;
    if len == 0 {
        return Ok(ContentHandle {
            data: MappedData::Empty,
            _file: file,
        });
    }

    let ptr = unsafe {
        mmap(
            None,
            NonZeroUsize::new(len).expect("checked non-zero above"),
            ProtFlags::PROT_READ,
            MapFlags::MAP_PRIVATE,
            file.as_raw_fd(),
            0,
        )
    }? as *mut u8;

    Ok(ContentHandle {
        data: MappedData::Mapped { ptr, len },
        _file: file,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::hash_payload;

    #[test]
    fn add_then_remove_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let hash = hash_payload(b"hello");
        add_content(dir.path(), hash, b"hello").unwrap();

        let handle = open_content(dir.path(), hash).unwrap();
        assert_eq!(&handle[..], b"hello");
        drop(handle);

        remove_content(dir.path(), hash).unwrap();
        assert!(!entry_dir(dir.path(), hash).exists());
    }

    #[test]
    fn duplicate_add_increments_refcount() {
        let dir = tempfile::tempdir().unwrap();
        let hash = hash_payload(b"dup");
        add_content(dir.path(), hash, b"dup").unwrap();
        add_content(dir.path(), hash, b"dup").unwrap();

        let nlink = fs::metadata(entry_dir(dir.path(), hash).join("1"))
            .unwrap()
            .nlink();
        assert_eq!(nlink, 2);

        remove_content(dir.path(), hash).unwrap();
        assert!(entry_dir(dir.path(), hash).exists());
        remove_content(dir.path(), hash).unwrap();
        assert!(!entry_dir(dir.path(), hash).exists());
    }

    #[test]
    fn empty_payload_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let hash = hash_payload(b"");
        add_content(dir.path(), hash, b"").unwrap();
        let handle = open_content(dir.path(), hash).unwrap();
        assert_eq!(&handle[..], b"");
    }

    #[test]
    fn missing_entry_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        match open_content(dir.path(), 12345) {
            Err(StoreError::NotFound) => {}
            other => panic!("expected NotFound, got {other:?}"),
        }
    }
}
