use lotline_core::TenantId;

use crate::result::AdvisorError;

/// A tenant-scoped advisory computation unit.
///
/// Jobs consume **read-model snapshots** via their `Input` type. This crate
/// stays storage-agnostic: inputs are provided by callers (infra/workers).
pub trait AdvisorJob: Send + Sync + 'static {
    type Input: Send + Sync + 'static;
    type Output: Send + Sync + 'static;

    /// The tenant this job belongs to (tenant-safe execution model).
    fn tenant_id(&self) -> TenantId;

    /// The input snapshot the job will run on.
    fn input(&self) -> &Self::Input;

    /// Execute the computation and return its advice.
    ///
    /// Must not mutate domain state.
    fn run(&self) -> Result<Self::Output, AdvisorError>;
}
