//! Infrastructure layer: event store, dispatch pipeline, projections,
//! allocation/transfer orchestration and the advisor runner.

pub mod advisor;
pub mod allocation;
pub mod command_dispatcher;
pub mod config;
pub mod event_store;
pub mod projections;
pub mod read_model;
pub mod reconciliation;
pub mod transfer;
pub mod workers;

#[cfg(test)]
mod integration_tests;

pub use advisor::{
    AdvisorOutput, AdvisorRunner, AdvisorRunnerHandle, AdvisorSink, InMemoryAdvisorSink,
    ProjectionReadModels,
};
pub use allocation::{
    AllocateRequest, AllocationOutcome, AllocationService, STOCK_POSITION_AGGREGATE_TYPE,
};
pub use command_dispatcher::{CommandDispatcher, DispatchError};
pub use config::AllocationConfig;
pub use event_store::{EventStore, EventStoreError, InMemoryEventStore, StoredEvent, UncommittedEvent};
pub use projections::{
    DemandHistory, DemandHistoryProjection, LotSummary, MovementLog, MovementLogProjection,
    StockSummary, TransferReadModel, TransfersProjection, WarehouseStockProjection,
};
pub use read_model::{InMemoryTenantStore, TenantStore};
pub use reconciliation::{DriftField, DriftReport, PositionDrift, Reconciler};
pub use transfer::{TRANSFER_AGGREGATE_TYPE, TransferCoordinator};
pub use workers::{ProjectionWorker, WorkerHandle};
