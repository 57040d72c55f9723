//! Business logic and repository trait definitions for studyflow.
//!
//! This crate defines the "ports" (repository and LLM provider traits) that
//! the infrastructure layer implements, plus the step interpreter and the
//! scheduler trigger built on top of them. It depends only on
//! `studyflow-types` -- never on `studyflow-infra` or any database/IO crate.

pub mod llm;
pub mod repository;
pub mod service;
pub mod workflow;
