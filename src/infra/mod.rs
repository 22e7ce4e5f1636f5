//! Infrastructure layer
//!
//! Handles all I/O operations: external processes, git, archives, directory
//! mirroring and the filesystem. This module is the only place where side
//! effects occur.

pub mod dirs;
pub mod filesystem;
pub mod git;
pub mod mirror;
pub mod paths;
pub mod placement;
pub mod process;
pub mod reaper;
