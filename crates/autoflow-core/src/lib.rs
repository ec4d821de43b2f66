//! Execution engine, action library, and trigger scheduler for Autoflow.
//!
//! This crate defines the "ports" (store and collaborator traits) that the
//! infrastructure layer implements. It depends only on `autoflow-types` --
//! never on `autoflow-infra` or any database/IO crate.

pub mod action;
pub mod collaborator;
pub mod condition;
pub mod context;
pub mod engine;
pub mod repository;
pub mod template;
pub mod trigger;
pub mod validation;

#[cfg(test)]
pub(crate) mod testing;
