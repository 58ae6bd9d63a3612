//! Live Config Library
//!
//! Hot-reloading configuration trees built from a root file, defaults,
//! includes and placeholders.

pub mod cli;
pub mod config;
pub mod error;
pub mod events;
pub mod format;
pub mod paths;
