//! Process-wide tracing setup.

mod tracing_setup;

pub use tracing_setup::init;
