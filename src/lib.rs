//! dealsource library
//!
//! Cached, per-host rate-limited HTTP fetching shared by the company registry
//! and podcast pipelines. Modules are public so the binary and integration
//! tests can use them.

pub mod cache;
pub mod cli;
pub mod clock;
pub mod config;
pub mod fetch;
pub mod logging;
pub mod rate_limit;
