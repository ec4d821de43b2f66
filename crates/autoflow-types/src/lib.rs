//! Shared domain types for Autoflow.
//!
//! Plain data: workflow definitions, executions and log entries, record/change
//! types, configuration, and error enums. No I/O lives here.

pub mod config;
pub mod error;
pub mod execution;
pub mod record;
pub mod workflow;
