//! The clipboard history store: a memory-mapped fixed-record index plus a
//! content-addressed payload directory, safe for concurrent use by
//! cooperating, unrelated processes.

mod content;
mod error;
mod lock;
mod record;
mod store;

pub use content::ContentHandle;
pub use error::{Result, StoreError};
pub use record::{hash_payload, MAX_PREVIEW_LEN, RECORD_SIZE};
pub use store::{ClipStore, Direction, Iter, RemoveAction, SnipView};
