//! Shared integration test harness

pub mod helpers;

pub use context::TestContext;
