//! Core logic
//!
//! Package model, hierarchy resolution and the build, inject and sync
//! pipeline. Process spawning and filesystem work go through
//! [`crate::infra`].
//!
//! # Submodules
//!
//! - [`package`] - package.json model and version rewriting
//! - [`manager`] - Package manager detection and command shapes
//! - [`resolver`] - Dependency hierarchy resolution and cycle detection
//! - [`session`] - State shared by one application run
//! - [`step`] - Per-step outcomes reported to the user
//! - [`builder`] - Build orchestration
//! - [`inject`] - Artifact injection
//! - [`sync`] - Sync mode and teardown
//! - [`pipeline`] - The full build, inject and sync run
//! - [`manifest`] - Project manifest (localpack.toml)
//! - [`global_config`] - Global configuration management
//! - [`doctor`] - System checks

pub mod builder;
pub mod doctor;
pub mod global_config;
pub mod inject;
pub mod manager;
pub mod manifest;
pub mod package;
pub mod pipeline;
pub mod resolver;
pub mod session;
pub mod step;
pub mod sync;
