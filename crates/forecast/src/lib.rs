//! `lotline-forecast`
//!
//! **Responsibility:** Advisory subsystem boundary (forecasting, reorder advice).
//!
//! This crate is intentionally **not** part of the domain model:
//! - It must not depend on stock aggregates.
//! - It must not mutate domain state.
//! - It emits **advisory insights**, not domain events.

pub mod demand;
pub mod forecast;
pub mod job;
pub mod reorder;
pub mod result;
pub mod scheduler;

pub use forecast::DemandForecastJob;
pub use job::AdvisorJob;
pub use reorder::{ReorderAdvisorJob, ReorderInput, advise_from_snapshots};
pub use result::{
    AdvisorError, DemandForecast, ForecastMethod, ForecastPoint, ReorderRecommendation,
};
pub use scheduler::{
    AdvisorScheduler, DemandSnapshot, LocalAdvisorScheduler, PositionSnapshot, ReadModelReader,
    TenantScope,
};
