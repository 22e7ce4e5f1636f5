//! localpack - deliver unpublished local packages into a consumer package
//!
//! Builds local dependency packages, packs them into deterministic
//! artifacts and places them into a target package's `node_modules`, or
//! keeps a dependency's source tree mirrored there.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`cli`] - Command-line interface parsing and output formatting
//! - [`core`] - Package model, resolver, build, inject and sync pipeline
//! - [`infra`] - Infrastructure layer (processes, git, filesystem, archives)
//! - [`config`] - Configuration constants
//! - [`error`] - Error types and handling

pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod infra;

#[cfg(test)]
pub mod test_utils;
