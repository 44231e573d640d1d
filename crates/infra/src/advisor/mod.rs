//! Advisor wiring: read-model bridge and the background runner.

pub mod readers;
pub mod runner;

pub use readers::ProjectionReadModels;
pub use runner::{
    AdvisorOutput, AdvisorRunner, AdvisorRunnerHandle, AdvisorSink, InMemoryAdvisorSink,
};
