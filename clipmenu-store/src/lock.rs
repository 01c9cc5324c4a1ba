//! Whole-file advisory locking for the snip index.
//!
//! A single `flock(2)` exclusive lock on the index file descriptor
//! serializes every mutating or consistency-dependent operation across
//! all processes that have the store open.

use std::os::unix::io::RawFd;

use nix::fcntl::{flock, FlockArg};

use crate::error::Result;

pub(crate) fn lock_exclusive(fd: RawFd) -> Result<()> {
    flock(fd, FlockArg::LockExclusive)?;
    Ok(())
}

pub(crate) fn unlock(fd: RawFd) -> Result<()> {
    flock(fd, FlockArg::Unlock)?;
    Ok(())
}
