pub mod definition;
pub mod executor;
pub mod retry;
pub mod scheduler;
pub mod step_runner;

#[cfg(test)]
pub(crate) mod test_support;
