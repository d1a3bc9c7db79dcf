//! Startup-program inventory, live-process correlation and resource sampling.

pub mod actions;
pub mod config;
pub mod entry;
pub mod inventory;
pub mod matcher;
pub mod monitor;
pub mod snapshot;
pub mod tracker;
