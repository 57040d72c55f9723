//! Infrastructure layer for studyflow.
//!
//! Contains implementations of the traits defined in `studyflow-core`:
//! SQLite repositories, the OpenAI-compatible completion gateway, and the
//! live step execution context. Also loads `config.toml`.

pub mod config;
pub mod llm;
pub mod sqlite;
pub mod workflow;
