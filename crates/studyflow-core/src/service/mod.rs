//! Business logic services (use cases).
//!
//! Services orchestrate repository calls and business rules (ownership,
//! validation, linked schedules). They depend on traits (ports), never on
//! concrete infrastructure implementations.

pub mod schedule;
pub mod workflow;
