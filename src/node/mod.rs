//! Node data model: the durable record, the runtime item wrapping it, and
//! the mode enums derived from it.

mod identity;
mod item;
mod mode;
mod record;

pub use identity::*;
pub use item::*;
pub use mode::*;
pub use record::*;
