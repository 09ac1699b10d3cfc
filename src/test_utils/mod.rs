//! Shared fakes and fixtures for unit tests
mod fake_agent;
mod fixtures;
mod harness;

pub(crate) use fake_agent::*;
pub(crate) use fixtures::*;
pub(crate) use harness::*;
