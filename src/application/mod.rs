//! Application layer - Pipeline services that use ports.

pub mod assembler;
pub mod lifecycle;
pub mod notifier;
pub mod orchestrator;
pub mod streaming;
pub mod worker;

#[cfg(test)]
pub(crate) mod testing;
