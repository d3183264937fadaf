//! Shared utilities.
//!
//! Small pure helpers for path strings and test fixtures.

pub mod path;
