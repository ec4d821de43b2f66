//! Infrastructure layer for Autoflow.
//!
//! Implements the ports defined in `autoflow-core`: SQLite stores for
//! workflows, executions and generic records, reqwest-backed HTTP
//! collaborators, notification channels, plus configuration and workflow
//! file loading.

pub mod api_auth;
pub mod config;
pub mod http;
pub mod notification;
pub mod sqlite;
pub mod workflow_file;
