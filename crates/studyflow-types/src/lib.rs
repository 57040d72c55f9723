//! Shared domain types for studyflow.
//!
//! Workflows, step definitions, run records, scheduled tasks and the error
//! enums shared by every other crate in the workspace.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, thiserror.

pub mod config;
pub mod error;
pub mod llm;
pub mod schedule;
pub mod usage;
pub mod workflow;
