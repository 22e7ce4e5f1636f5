//! Configuration and constants
//!
//! - [`defaults`] - Fixed values shared by the engine and the pipeline

pub mod defaults;
