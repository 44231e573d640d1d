use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use lotline_core::{SkuId, TenantId, WarehouseId};

use crate::job::AdvisorJob;
use crate::result::AdvisorError;

/// Tenant scope for execution.
///
/// - `Any`: run jobs for any tenant (shared workers).
/// - `Tenant`: only accept jobs for the specified tenant.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TenantScope {
    Any,
    Tenant(TenantId),
}

impl TenantScope {
    pub fn allows(&self, tenant_id: TenantId) -> bool {
        match self {
            TenantScope::Any => true,
            TenantScope::Tenant(t) => *t == tenant_id,
        }
    }
}

/// Daily shipped quantities for one SKU at one warehouse, as read from the
/// demand-history projection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DemandSnapshot {
    pub tenant_id: TenantId,
    pub sku: SkuId,
    pub warehouse: WarehouseId,
    pub daily_shipments: Vec<(NaiveDate, i64)>,
}

/// Current stock levels and replenishment settings for one SKU at one
/// warehouse, as read from the stock projection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionSnapshot {
    pub tenant_id: TenantId,
    pub sku: SkuId,
    pub warehouse: WarehouseId,
    pub available: i64,
    pub in_transit: i64,
    pub reorder_point: i64,
    pub reorder_quantity: i64,
    pub lead_time_days: u32,
    pub low_stock_threshold: i64,
}

/// Storage seam between the advisor and the read models.
///
/// Implemented by the infrastructure layer over its projections; jobs never
/// touch storage directly.
pub trait ReadModelReader: Send + Sync {
    fn demand_snapshots(&self, tenant_id: TenantId) -> Vec<DemandSnapshot>;
    fn position_snapshots(&self, tenant_id: TenantId) -> Vec<PositionSnapshot>;
}

/// Scheduler/executor for advisor jobs.
///
/// Intentionally minimal and storage/runtime agnostic.
pub trait AdvisorScheduler: Send + Sync + 'static {
    fn scope(&self) -> TenantScope;

    fn run<J: AdvisorJob>(&self, job: J) -> Result<J::Output, AdvisorError> {
        if !self.scope().allows(job.tenant_id()) {
            return Err(AdvisorError::InvalidInput(
                "tenant scope violation (job tenant not allowed by scheduler)".to_string(),
            ));
        }
        job.run()
    }
}

/// Simple synchronous scheduler that runs jobs immediately in-process.
#[derive(Debug, Copy, Clone)]
pub struct LocalAdvisorScheduler {
    scope: TenantScope,
}

impl LocalAdvisorScheduler {
    pub fn new(scope: TenantScope) -> Self {
        Self { scope }
    }

    pub fn for_tenant(tenant_id: TenantId) -> Self {
        Self::new(TenantScope::Tenant(tenant_id))
    }
}

impl AdvisorScheduler for LocalAdvisorScheduler {
    fn scope(&self) -> TenantScope {
        self.scope
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forecast::DemandForecastJob;

    #[test]
    fn scheduler_rejects_foreign_tenant_jobs() {
        let mine = TenantId::new();
        let theirs = TenantId::new();
        let scheduler = LocalAdvisorScheduler::for_tenant(mine);

        let job = DemandForecastJob::new(theirs, Vec::new());
        let err = scheduler.run(job).unwrap_err();
        assert!(matches!(err, AdvisorError::InvalidInput(_)));
    }

    #[test]
    fn any_scope_allows_all_tenants() {
        let scheduler = LocalAdvisorScheduler::new(TenantScope::Any);
        let job = DemandForecastJob::new(TenantId::new(), Vec::new());
        assert!(scheduler.run(job).is_ok());
    }
}
