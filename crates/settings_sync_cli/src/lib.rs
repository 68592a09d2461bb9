//! settings-sync CLI library exports for testing.
//!
//! This module exposes the command implementations used by the binary.

pub mod commands;
pub mod config;
pub mod errors;
