//! Coalesced persistence of dirty node items.
//!
//! Writes are matched over the item's [`crate::Persistence`] state:
//! pending items are inserted, persisted items updated, and items ready to
//! be deleted are written with their deleted timestamp once any platform
//! teardown succeeded.

mod batcher;

pub use batcher::*;
