//! LLM provider abstraction.
//!
//! - `provider` -- the `LlmProvider` trait (RPITIT)
//! - `box_provider` -- `BoxLlmProvider` for dynamic dispatch

pub mod box_provider;
pub mod provider;
