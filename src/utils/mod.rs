pub(crate) mod async_task;
pub(crate) mod time;
mod timer;

pub use timer::*;
