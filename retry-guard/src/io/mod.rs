//! I/O helpers for guard hosts and the CLI.

pub mod config;
pub mod directive;
pub mod trace;
