//! Command modules for the settings-sync CLI.
//!
//! - `sync_cmd`: the sync subcommands, one per triggering case

pub mod sync_cmd;
