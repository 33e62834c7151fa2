//! Launcher for a model-serving node.
//!
//! Resolves the node's inference configuration (inline or from external
//! stores), switches on the log file sink when logging endpoints are
//! requested, deploys the serving unit and reports a single outcome.

pub mod cli;
pub mod config;
pub mod logs;
pub mod runtime;
pub mod server;
