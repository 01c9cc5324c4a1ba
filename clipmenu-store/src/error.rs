use thiserror::Error;

/// Errors surfaced by clip store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid store format: {0}")]
    InvalidFormat(String),

    #[error("index {0} out of range")]
    OutOfRange(u64),

    #[error("content entry not found")]
    NotFound,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("syscall failed: {0}")]
    Nix(#[from] nix::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;
