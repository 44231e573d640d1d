use std::collections::HashMap;
use std::sync::{Arc, Mutex, mpsc};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use lotline_core::TenantId;
use lotline_forecast::{
    AdvisorScheduler, DemandForecast, DemandForecastJob, LocalAdvisorScheduler, ReadModelReader,
    ReorderAdvisorJob, ReorderInput, ReorderRecommendation, TenantScope,
};

/// One advisor pass over a tenant: demand forecasts plus the reorder
/// recommendations derived from them.
#[derive(Debug, Clone, PartialEq)]
pub struct AdvisorOutput {
    pub forecasts: Vec<DemandForecast>,
    pub recommendations: Vec<ReorderRecommendation>,
}

/// Sink for advisor output.
///
/// Intentionally separate from the domain event stream: recommendations are
/// advice, not domain events.
pub trait AdvisorSink: Send + Sync + 'static {
    fn emit(&self, tenant_id: TenantId, output: AdvisorOutput);
}

/// In-memory sink keeping the latest output per tenant (tests/dev and the
/// API's cached advisor endpoints).
#[derive(Debug, Default)]
pub struct InMemoryAdvisorSink {
    inner: Mutex<HashMap<TenantId, AdvisorOutput>>,
}

impl InMemoryAdvisorSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn latest(&self, tenant_id: TenantId) -> Option<AdvisorOutput> {
        let map = self.inner.lock().ok()?;
        map.get(&tenant_id).cloned()
    }
}

impl AdvisorSink for InMemoryAdvisorSink {
    fn emit(&self, tenant_id: TenantId, output: AdvisorOutput) {
        if let Ok(mut map) = self.inner.lock() {
            map.insert(tenant_id, output);
        }
    }
}

/// Config for the reorder advisor runner.
#[derive(Debug, Clone)]
pub struct AdvisorRunner {
    pub interval: Duration,
    pub max_retries: u32,
    pub base_backoff: Duration,
    pub horizon_days: u32,
}

impl Default for AdvisorRunner {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            max_retries: 5,
            base_backoff: Duration::from_millis(250),
            horizon_days: 30,
        }
    }
}

/// Handle for the running advisor (shutdown + trigger hook).
#[derive(Debug)]
pub struct AdvisorRunnerHandle {
    shutdown: mpsc::Sender<()>,
    trigger: mpsc::SyncSender<()>,
    join: Option<thread::JoinHandle<()>>,
}

impl AdvisorRunnerHandle {
    /// Event-trigger hook: call after a successful projection update.
    ///
    /// Backpressure: triggers are coalesced (bounded queue). If the runner is
    /// already pending, this becomes a no-op.
    pub fn trigger(&self) {
        // Coalesce: channel capacity=1; ignore if already full.
        let _ = self.trigger.try_send(());
    }

    /// Gracefully stop the runner thread.
    pub fn shutdown(mut self) {
        let _ = self.shutdown.send(());
        if let Some(j) = self.join.take() {
            let _ = j.join();
        }
    }
}

impl AdvisorRunner {
    /// Spawn a tenant-scoped runner.
    ///
    /// - Schedule: runs every `interval`
    /// - Event-trigger: call `handle.trigger()` after projection updates
    /// - Failures: logged + retried with bounded exponential backoff; never propagate
    pub fn spawn_for_tenant<R, K>(
        &self,
        name: &'static str,
        tenant_id: TenantId,
        reader: Arc<R>,
        sink: Arc<K>,
    ) -> AdvisorRunnerHandle
    where
        R: ReadModelReader + 'static,
        K: AdvisorSink + 'static,
    {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let (trigger_tx, trigger_rx) = mpsc::sync_channel::<()>(1);

        let cfg = self.clone();
        let join = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || runner_loop(name, tenant_id, cfg, shutdown_rx, trigger_rx, reader, sink))
            .expect("failed to spawn advisor runner thread");

        AdvisorRunnerHandle {
            shutdown: shutdown_tx,
            trigger: trigger_tx,
            join: Some(join),
        }
    }
}

fn runner_loop<R, K>(
    name: &'static str,
    tenant_id: TenantId,
    cfg: AdvisorRunner,
    shutdown_rx: mpsc::Receiver<()>,
    trigger_rx: mpsc::Receiver<()>,
    reader: Arc<R>,
    sink: Arc<K>,
) where
    R: ReadModelReader + 'static,
    K: AdvisorSink + 'static,
{
    info!(runner = name, tenant = %tenant_id, "advisor runner started");

    let scheduler = LocalAdvisorScheduler::new(TenantScope::Tenant(tenant_id));

    let mut next_tick = Instant::now() + cfg.interval;
    let mut pending = true; // run once on startup
    let mut failures: u32 = 0;
    let mut backoff_until: Option<Instant> = None;

    loop {
        // Shutdown has priority.
        if shutdown_rx.try_recv().is_ok() {
            break;
        }

        let now = Instant::now();
        if now >= next_tick {
            pending = true;
            // Keep a stable cadence even if we were delayed.
            while next_tick <= now {
                next_tick += cfg.interval;
            }
        }

        // Event-trigger: non-blocking drain to coalesce multiple triggers.
        while trigger_rx.try_recv().is_ok() {
            pending = true;
        }

        // Backoff gate.
        if let Some(until) = backoff_until {
            if Instant::now() < until {
                thread::sleep(Duration::from_millis(50));
                continue;
            }
            backoff_until = None;
        }

        if !pending {
            // Wait until next tick or trigger or shutdown.
            let sleep_for = next_tick
                .saturating_duration_since(Instant::now())
                .min(Duration::from_millis(250));
            thread::sleep(sleep_for);
            continue;
        }

        pending = false;

        // 1) Read tenant snapshots from the projections.
        let demand = reader.demand_snapshots(tenant_id);
        let positions = reader.position_snapshots(tenant_id);

        // 2) Run deterministic forecast + reorder jobs.
        let forecast_job =
            DemandForecastJob::new(tenant_id, demand).with_horizon_days(cfg.horizon_days);

        let forecasts = match scheduler.run(forecast_job) {
            Ok(f) => f,
            Err(e) => {
                warn!(runner = name, tenant = %tenant_id, error = ?e, "demand forecast job failed");
                failures += 1;
                if failures <= cfg.max_retries {
                    pending = true;
                    backoff_until = Some(Instant::now() + backoff(cfg.base_backoff, failures));
                } else {
                    failures = 0;
                }
                continue;
            }
        };

        let reorder_job = ReorderAdvisorJob::new(
            tenant_id,
            ReorderInput {
                positions,
                forecasts: forecasts.clone(),
            },
        );

        match scheduler.run(reorder_job) {
            Ok(recommendations) => {
                failures = 0;
                sink.emit(
                    tenant_id,
                    AdvisorOutput {
                        forecasts,
                        recommendations,
                    },
                );
            }
            Err(e) => {
                warn!(runner = name, tenant = %tenant_id, error = ?e, "reorder advisor job failed");
                failures += 1;
                if failures <= cfg.max_retries {
                    pending = true;
                    backoff_until = Some(Instant::now() + backoff(cfg.base_backoff, failures));
                } else {
                    failures = 0;
                }
            }
        }
    }

    info!(runner = name, tenant = %tenant_id, "advisor runner stopped");
}

fn backoff(base: Duration, attempt: u32) -> Duration {
    // Exponential backoff: base * 2^(attempt-1), capped.
    let pow = 1u32 << attempt.saturating_sub(1).min(10);
    let ms = base.as_millis().saturating_mul(pow as u128);
    Duration::from_millis(ms.min(10_000) as u64)
}
