//! Listing support for callers outside the monitor: predicate filtering with
//! pre-filter mode counts, sorting, pagination and storage/activity rollups.

mod aggregate;
mod filter;
mod sort;

pub use aggregate::*;
pub use filter::*;
pub use sort::*;

#[cfg(test)]
mod aggregate_test;
#[cfg(test)]
mod filter_test;
