//! Configuration for the Lumen scanner.
//!
//! This crate loads [`ScannerConfig`] from the environment, a config file or
//! the built-in defaults, applies guard rails before anything starts, and
//! turns the result into the option types `lumen-core` consumes. The
//! `lumen-scan` binary is built on top of it.

pub mod models;
pub mod validation;

pub use models::{ScannerConfig, ScannerConfigSource};
pub use validation::{
    ConfigGuardRailError, ConfigWarning, ConfigWarnings, apply_guard_rails,
};
