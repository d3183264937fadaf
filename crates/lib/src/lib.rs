//! buildstack-lib: incremental build directories for Python stacks
//!
//! This crate provides the engine behind the `buildstack` command:
//! - `fs`: guarded deletion, hardlink mirroring and manifest discovery
//! - `deps`: per-manifest pip package cache keyed on file timestamps
//! - `runtime`: the isolated interpreter shared by every manifest
//! - `build`: the orchestrator tying the phases together
//! - `process`: the boundary every external command goes through
//! - `events`: structured progress reporting

pub mod build;
pub mod config;
pub mod consts;
pub mod deps;
pub mod events;
pub mod fs;
pub mod process;
pub mod runtime;
pub mod util;

pub use build::{BuildError, BuildSummary, Builder, buildstack};
pub use config::{BuildOptions, Toolchain};
