//! Workflow infrastructure: the live step execution context.

pub mod execution_context;
