use std::{
    collections::HashMap,
    convert::Infallible,
    sync::{Arc, Mutex},
    time::Duration,
};

use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use tokio::sync::broadcast;
use tokio_stream::{StreamExt, wrappers::BroadcastStream};

use lotline_core::{AggregateId, DomainError, SkuId, TenantId, WarehouseId};
use lotline_events::{EventEnvelope, InMemoryEventBus};
use lotline_infra::{
    advisor::{AdvisorOutput, AdvisorRunner, AdvisorRunnerHandle, AdvisorSink, ProjectionReadModels},
    allocation::{AllocationService, STOCK_POSITION_AGGREGATE_TYPE},
    command_dispatcher::{CommandDispatcher, DispatchError},
    config::AllocationConfig,
    event_store::{InMemoryEventStore, StoredEvent},
    projections::{
        demand_history::{DemandHistory, DemandHistoryProjection},
        movement_log::{MovementLog, MovementLogProjection},
        transfers::{TransferReadModel, TransfersProjection},
        warehouse_stock::{StockSummary, WarehouseStockProjection},
    },
    read_model::InMemoryTenantStore,
    reconciliation::{DriftReport, Reconciler},
    transfer::{TRANSFER_AGGREGATE_TYPE, TransferCoordinator},
    workers::{ProjectionWorker, WorkerHandle},
};
use lotline_stock::{StockPositionId, TransferId};

/// Realtime message broadcasted via SSE.
#[derive(Debug, Clone, serde::Serialize)]
pub struct RealtimeMessage {
    pub tenant_id: TenantId,
    pub topic: String,
    pub payload: serde_json::Value,
}

/// API-local advisor sink: keeps the latest output per tenant and broadcasts
/// "advice available" notifications.
#[derive(Debug)]
pub struct ApiAdvisorSink {
    inner: Mutex<HashMap<TenantId, AdvisorOutput>>,
    realtime_tx: broadcast::Sender<RealtimeMessage>,
}

impl ApiAdvisorSink {
    pub fn new(realtime_tx: broadcast::Sender<RealtimeMessage>) -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
            realtime_tx,
        }
    }

    pub fn latest(&self, tenant_id: TenantId) -> Option<AdvisorOutput> {
        let map = self.inner.lock().ok()?;
        map.get(&tenant_id).cloned()
    }
}

impl AdvisorSink for ApiAdvisorSink {
    fn emit(&self, tenant_id: TenantId, output: AdvisorOutput) {
        if let Ok(mut map) = self.inner.lock() {
            map.insert(tenant_id, output.clone());
        }

        // Broadcast that new advice is available (lossy; no backpressure on core).
        let _ = self.realtime_tx.send(RealtimeMessage {
            tenant_id,
            topic: "advisor.advice_available".to_string(),
            payload: serde_json::json!({
                "kind": "advisor_update",
                "recommendations": output.recommendations.len(),
                "forecasts": output.forecasts.len(),
            }),
        });
    }
}

type Bus = Arc<InMemoryEventBus<EventEnvelope<serde_json::Value>>>;
type Dispatcher = CommandDispatcher<Arc<InMemoryEventStore>, Bus>;
type StockProjection =
    Arc<WarehouseStockProjection<Arc<InMemoryTenantStore<StockPositionId, StockSummary>>>>;
type DemandProjection =
    Arc<DemandHistoryProjection<Arc<InMemoryTenantStore<StockPositionId, DemandHistory>>>>;
type TransfersProj =
    Arc<TransfersProjection<Arc<InMemoryTenantStore<TransferId, TransferReadModel>>>>;
type MovementProjection =
    Arc<MovementLogProjection<Arc<InMemoryTenantStore<StockPositionId, MovementLog>>>>;
type Readers = ProjectionReadModels<
    Arc<InMemoryTenantStore<StockPositionId, StockSummary>>,
    Arc<InMemoryTenantStore<StockPositionId, DemandHistory>>,
    Arc<InMemoryTenantStore<TransferId, TransferReadModel>>,
>;

/// Wired application services shared by all handlers.
pub struct AppServices {
    dispatcher: Arc<Dispatcher>,
    stock_projection: StockProjection,
    demand_projection: DemandProjection,
    transfers_projection: TransfersProj,
    movement_projection: MovementProjection,
    allocation: AllocationService<
        Arc<InMemoryEventStore>,
        Bus,
        Arc<InMemoryTenantStore<StockPositionId, StockSummary>>,
    >,
    transfers: TransferCoordinator<Arc<InMemoryEventStore>, Bus>,
    reconciler: Reconciler<
        Arc<InMemoryEventStore>,
        Bus,
        Arc<InMemoryTenantStore<StockPositionId, StockSummary>>,
    >,
    readers: Arc<Readers>,
    advisor_sink: Arc<ApiAdvisorSink>,
    advisor_runners: Arc<Mutex<HashMap<TenantId, AdvisorRunnerHandle>>>,
    advisor_cfg: AdvisorRunner,
    realtime_tx: broadcast::Sender<RealtimeMessage>,
    // Held so the bus-to-projection thread shuts down with the services.
    _projection_worker: WorkerHandle,
}

pub async fn build_services() -> AppServices {
    // In-memory infra wiring: store + bus + projections.
    let store = Arc::new(InMemoryEventStore::new());
    let bus: Bus = Arc::new(InMemoryEventBus::new());
    let dispatcher: Arc<Dispatcher> = Arc::new(CommandDispatcher::new(store.clone(), bus.clone()));

    let stock_projection: StockProjection = Arc::new(WarehouseStockProjection::new(Arc::new(
        InMemoryTenantStore::new(),
    )));
    let demand_projection: DemandProjection = Arc::new(DemandHistoryProjection::new(Arc::new(
        InMemoryTenantStore::new(),
    )));
    let transfers_projection: TransfersProj = Arc::new(TransfersProjection::new(Arc::new(
        InMemoryTenantStore::new(),
    )));
    let movement_projection: MovementProjection = Arc::new(MovementLogProjection::new(Arc::new(
        InMemoryTenantStore::new(),
    )));

    let readers: Arc<Readers> = Arc::new(ProjectionReadModels::new(
        stock_projection.clone(),
        demand_projection.clone(),
        transfers_projection.clone(),
    ));

    // Realtime channel (SSE): lossy broadcast, tenant-filtered in handlers.
    let (realtime_tx, _realtime_rx) = broadcast::channel::<RealtimeMessage>(256);

    // Advisor wiring: latest advice per tenant + per-tenant runners.
    let advisor_sink: Arc<ApiAdvisorSink> = Arc::new(ApiAdvisorSink::new(realtime_tx.clone()));
    let advisor_runners: Arc<Mutex<HashMap<TenantId, AdvisorRunnerHandle>>> =
        Arc::new(Mutex::new(HashMap::new()));
    let advisor_cfg = AdvisorRunner::default();

    // Background worker: bus -> projections -> realtime + advisor triggers.
    let projection_worker = {
        let stock_projection = stock_projection.clone();
        let demand_projection = demand_projection.clone();
        let transfers_projection = transfers_projection.clone();
        let movement_projection = movement_projection.clone();
        let readers = readers.clone();
        let advisor_sink = advisor_sink.clone();
        let advisor_runners = advisor_runners.clone();
        let advisor_cfg = advisor_cfg.clone();
        let realtime_tx = realtime_tx.clone();

        ProjectionWorker::spawn(
            "api.projections",
            bus.clone(),
            None,
            None,
            move |env: EventEnvelope<serde_json::Value>| -> Result<(), String> {
                let at = env.aggregate_type().to_string();

                match at.as_str() {
                    STOCK_POSITION_AGGREGATE_TYPE => {
                        stock_projection
                            .apply_envelope(&env)
                            .map_err(|e| e.to_string())?;
                        demand_projection
                            .apply_envelope(&env)
                            .map_err(|e| e.to_string())?;
                        movement_projection
                            .apply_envelope(&env)
                            .map_err(|e| e.to_string())?;
                    }
                    TRANSFER_AGGREGATE_TYPE => {
                        transfers_projection
                            .apply_envelope(&env)
                            .map_err(|e| e.to_string())?;
                    }
                    _ => return Ok(()),
                }

                // Broadcast projection update (lossy; no backpressure on core).
                let _ = realtime_tx.send(RealtimeMessage {
                    tenant_id: env.tenant_id(),
                    topic: format!("{at}.projection_updated"),
                    payload: serde_json::json!({
                        "kind": "projection_update",
                        "aggregate_type": at,
                        "aggregate_id": env.aggregate_id().to_string(),
                        "sequence_number": env.sequence_number(),
                    }),
                });

                // Event-triggered advisor execution on stock updates.
                if at == STOCK_POSITION_AGGREGATE_TYPE {
                    let tenant_id = env.tenant_id();
                    if let Ok(mut runners) = advisor_runners.lock() {
                        let handle = runners.entry(tenant_id).or_insert_with(|| {
                            advisor_cfg.spawn_for_tenant(
                                "advisor.reorder",
                                tenant_id,
                                readers.clone(),
                                advisor_sink.clone(),
                            )
                        });
                        handle.trigger();
                    }
                }

                Ok(())
            },
        )
    };

    let allocation = AllocationService::new(
        dispatcher.clone(),
        stock_projection.clone(),
        AllocationConfig::from_env(),
    );
    let transfers = TransferCoordinator::new(dispatcher.clone());
    let reconciler = Reconciler::new(dispatcher.clone(), stock_projection.clone());

    AppServices {
        dispatcher,
        stock_projection,
        demand_projection,
        transfers_projection,
        movement_projection,
        allocation,
        transfers,
        reconciler,
        readers,
        advisor_sink,
        advisor_runners,
        advisor_cfg,
        realtime_tx,
        _projection_worker: projection_worker,
    }
}

impl AppServices {
    pub fn realtime_tx(&self) -> &broadcast::Sender<RealtimeMessage> {
        &self.realtime_tx
    }

    pub fn advisor_sink(&self) -> &Arc<ApiAdvisorSink> {
        &self.advisor_sink
    }

    pub fn allocation(
        &self,
    ) -> &AllocationService<
        Arc<InMemoryEventStore>,
        Bus,
        Arc<InMemoryTenantStore<StockPositionId, StockSummary>>,
    > {
        &self.allocation
    }

    pub fn transfers(&self) -> &TransferCoordinator<Arc<InMemoryEventStore>, Bus> {
        &self.transfers
    }

    pub fn dispatch<A>(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        aggregate_type: &str,
        command: A::Command,
        make_aggregate: impl FnOnce(TenantId, AggregateId) -> A,
    ) -> Result<Vec<StoredEvent>, DispatchError>
    where
        A: lotline_core::Aggregate<Error = DomainError>,
        A::Event: lotline_events::Event + serde::Serialize + serde::de::DeserializeOwned,
    {
        self.dispatcher
            .dispatch::<A>(tenant_id, aggregate_id, aggregate_type, command, make_aggregate)
    }

    pub fn stock_get(
        &self,
        tenant_id: TenantId,
        sku: &SkuId,
        warehouse: &WarehouseId,
    ) -> Option<StockSummary> {
        self.stock_projection.get_by_sku(tenant_id, sku, warehouse)
    }

    pub fn stock_list(&self, tenant_id: TenantId) -> Vec<StockSummary> {
        self.stock_projection.list(tenant_id)
    }

    /// Eligible lots for a position in rotation order, straight from the
    /// stream (authoritative, not the read model).
    pub fn eligible_lots(
        &self,
        tenant_id: TenantId,
        sku: &SkuId,
        warehouse: &WarehouseId,
        policy: lotline_stock::RotationPolicy,
    ) -> Result<Vec<lotline_stock::Lot>, DispatchError> {
        let position_id = lotline_stock::StockPositionId::derive(tenant_id, sku, warehouse);
        let position = self
            .dispatcher
            .rehydrate(tenant_id, position_id.0, |_, _| {
                lotline_stock::StockPosition::empty(position_id)
            })?;
        Ok(
            lotline_stock::eligible_in_rotation_order(position.lots(), policy)
                .into_iter()
                .cloned()
                .collect(),
        )
    }

    pub fn movements_get(
        &self,
        tenant_id: TenantId,
        sku: &SkuId,
        warehouse: &WarehouseId,
    ) -> Option<MovementLog> {
        self.movement_projection.get_by_sku(tenant_id, sku, warehouse)
    }

    pub fn transfers_get(
        &self,
        tenant_id: TenantId,
        transfer_id: &TransferId,
    ) -> Option<TransferReadModel> {
        self.transfers_projection.get(tenant_id, transfer_id)
    }

    pub fn transfers_list(&self, tenant_id: TenantId) -> Vec<TransferReadModel> {
        self.transfers_projection.list(tenant_id)
    }

    pub fn demand_list(&self, tenant_id: TenantId) -> Vec<DemandHistory> {
        self.demand_projection.list(tenant_id)
    }

    pub fn reconcile(
        &self,
        tenant_id: TenantId,
        scope: Option<(&SkuId, &WarehouseId)>,
        repair: bool,
    ) -> Result<DriftReport, DispatchError> {
        match (scope, repair) {
            (Some((sku, warehouse)), repair) => {
                self.reconciler.run_for_position(tenant_id, sku, warehouse, repair)
            }
            (None, true) => self.reconciler.repair(tenant_id),
            (None, false) => self.reconciler.check(tenant_id),
        }
    }

    /// Latest cached advisor output, computing synchronously when no run has
    /// happened yet, and nudging the background runner either way.
    pub fn advisor_output(
        &self,
        tenant_id: TenantId,
    ) -> Result<AdvisorOutput, lotline_forecast::AdvisorError> {
        self.trigger_advisor(tenant_id);

        if let Some(output) = self.advisor_sink.latest(tenant_id) {
            return Ok(output);
        }

        use lotline_forecast::ReadModelReader;
        let (forecasts, recommendations) = lotline_forecast::advise_from_snapshots(
            tenant_id,
            self.readers.demand_snapshots(tenant_id),
            self.readers.position_snapshots(tenant_id),
            self.advisor_cfg.horizon_days,
        )?;
        Ok(AdvisorOutput {
            forecasts,
            recommendations,
        })
    }

    /// Forecasts for a tenant; a custom horizon or a caller-chosen method
    /// forces a fresh computation instead of the cached advisor output.
    pub fn forecasts(
        &self,
        tenant_id: TenantId,
        horizon_days: Option<u32>,
        method: Option<lotline_forecast::ForecastMethod>,
    ) -> Result<Vec<lotline_forecast::DemandForecast>, lotline_forecast::AdvisorError> {
        use lotline_forecast::{AdvisorJob, ReadModelReader};

        if horizon_days.is_none() && method.is_none() {
            return Ok(self.advisor_output(tenant_id)?.forecasts);
        }

        let mut job = lotline_forecast::DemandForecastJob::new(
            tenant_id,
            self.readers.demand_snapshots(tenant_id),
        );
        if let Some(horizon) = horizon_days {
            job = job.with_horizon_days(horizon);
        }
        if let Some(method) = method {
            job = job.with_method(method);
        }
        job.run()
    }

    fn trigger_advisor(&self, tenant_id: TenantId) {
        if let Ok(mut runners) = self.advisor_runners.lock() {
            let handle = runners.entry(tenant_id).or_insert_with(|| {
                self.advisor_cfg.spawn_for_tenant(
                    "advisor.reorder",
                    tenant_id,
                    self.readers.clone(),
                    self.advisor_sink.clone(),
                )
            });
            handle.trigger();
        }
    }
}

/// Build an SSE stream for a tenant (used by `/stream`).
pub fn tenant_sse_stream(
    services: Arc<AppServices>,
    tenant_id: TenantId,
) -> Sse<impl tokio_stream::Stream<Item = Result<SseEvent, Infallible>>> {
    let rx = services.realtime_tx().subscribe();
    let stream = BroadcastStream::new(rx).filter_map(move |msg| match msg {
        Ok(m) if m.tenant_id == tenant_id => {
            let data = serde_json::to_string(&m.payload).unwrap_or_else(|_| "{}".to_string());
            Some(Ok(SseEvent::default().event(m.topic).data(data)))
        }
        _ => None,
    });

    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}
