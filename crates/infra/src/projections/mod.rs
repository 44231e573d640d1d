//! Projection implementations (read model builders).
//!
//! Projections consume domain events and build query-optimized read models.
//! All projections are:
//! - **Rebuildable**: Can be reconstructed from the event stream
//! - **Tenant-isolated**: Data is partitioned by tenant
//! - **Idempotent**: Safe for at-least-once delivery

pub mod demand_history;
pub mod movement_log;
pub mod transfers;
pub mod warehouse_stock;

pub use demand_history::{DemandHistory, DemandHistoryProjection, DemandProjectionError};
pub use movement_log::{MovementLog, MovementLogProjection, MovementProjectionError};
pub use transfers::{TransferProjectionError, TransferReadModel, TransfersProjection};
pub use warehouse_stock::{
    LotSummary, StockProjectionError, StockSummary, WarehouseStockProjection,
};
