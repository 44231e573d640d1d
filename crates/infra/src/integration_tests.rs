//! Integration tests for the full event-sourced pipeline.
//!
//! Tests: Command → EventStore → EventBus → Projection → ReadModel
//!
//! Verifies:
//! - Allocation, fulfilment and transfer flows update read models correctly
//! - Tenant isolation is preserved end to end
//! - Optimistic concurrency races are absorbed by the allocation service
//! - The reconciler detects and repairs read model drift

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    use chrono::Utc;
    use serde_json::Value as JsonValue;

    use lotline_core::{SkuId, TenantId, WarehouseId};
    use lotline_events::{EventBus, EventEnvelope, InMemoryEventBus};
    use lotline_forecast::ReadModelReader;
    use lotline_stock::{
        AllocationState, LotId, QualityStatus, ReceiveLot, ReorderPolicy, RotationPolicy,
        SetReorderPolicy, StockCommand, StockPosition, StockPositionId, TransferStatus,
        UpdateLotQuality,
    };

    use crate::advisor::ProjectionReadModels;
    use crate::allocation::{
        AllocateRequest, AllocationService, STOCK_POSITION_AGGREGATE_TYPE,
    };
    use crate::command_dispatcher::{CommandDispatcher, DispatchError};
    use crate::config::AllocationConfig;
    use crate::event_store::InMemoryEventStore;
    use crate::projections::demand_history::{DemandHistory, DemandHistoryProjection};
    use crate::projections::movement_log::{MovementLog, MovementLogProjection};
    use crate::projections::transfers::{TransferReadModel, TransfersProjection};
    use crate::projections::warehouse_stock::{StockSummary, WarehouseStockProjection};
    use crate::read_model::InMemoryTenantStore;
    use crate::reconciliation::Reconciler;
    use crate::transfer::{TRANSFER_AGGREGATE_TYPE, TransferCoordinator};

    type Bus = Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>;
    type Dispatcher = Arc<CommandDispatcher<Arc<InMemoryEventStore>, Bus>>;
    type StockProj =
        Arc<WarehouseStockProjection<Arc<InMemoryTenantStore<StockPositionId, StockSummary>>>>;
    type DemandProj =
        Arc<DemandHistoryProjection<Arc<InMemoryTenantStore<StockPositionId, DemandHistory>>>>;
    type TransferProj = Arc<
        TransfersProjection<Arc<InMemoryTenantStore<lotline_stock::TransferId, TransferReadModel>>>,
    >;
    type MovementProj =
        Arc<MovementLogProjection<Arc<InMemoryTenantStore<StockPositionId, MovementLog>>>>;

    struct TestEnv {
        store: Arc<InMemoryEventStore>,
        dispatcher: Dispatcher,
        stock: StockProj,
        demand: DemandProj,
        transfers: TransferProj,
        movements: MovementProj,
    }

    impl TestEnv {
        fn allocation_service(
            &self,
            config: AllocationConfig,
        ) -> AllocationService<
            Arc<InMemoryEventStore>,
            Bus,
            Arc<InMemoryTenantStore<StockPositionId, StockSummary>>,
        > {
            AllocationService::new(self.dispatcher.clone(), self.stock.clone(), config)
        }

        fn coordinator(&self) -> TransferCoordinator<Arc<InMemoryEventStore>, Bus> {
            TransferCoordinator::new(self.dispatcher.clone())
        }

        fn reconciler(
            &self,
        ) -> Reconciler<
            Arc<InMemoryEventStore>,
            Bus,
            Arc<InMemoryTenantStore<StockPositionId, StockSummary>>,
        > {
            Reconciler::new(self.dispatcher.clone(), self.stock.clone())
        }
    }

    fn setup() -> TestEnv {
        let store = Arc::new(InMemoryEventStore::new());
        let bus: Bus = Arc::new(InMemoryEventBus::new());
        let dispatcher = Arc::new(CommandDispatcher::new(store.clone(), bus.clone()));

        let stock = Arc::new(WarehouseStockProjection::new(Arc::new(
            InMemoryTenantStore::new(),
        )));
        let demand = Arc::new(DemandHistoryProjection::new(Arc::new(
            InMemoryTenantStore::new(),
        )));
        let transfers = Arc::new(TransfersProjection::new(Arc::new(
            InMemoryTenantStore::new(),
        )));
        let movements = Arc::new(MovementLogProjection::new(Arc::new(
            InMemoryTenantStore::new(),
        )));

        // Subscribe to the bus BEFORE any events are published.
        let (ready_tx, ready_rx) = std::sync::mpsc::channel::<()>();
        {
            let bus = bus.clone();
            let stock = stock.clone();
            let demand = demand.clone();
            let transfers = transfers.clone();
            let movements = movements.clone();
            std::thread::spawn(move || {
                let sub = bus.subscribe();
                let _ = ready_tx.send(());
                while let Ok(env) = sub.recv() {
                    match env.aggregate_type() {
                        STOCK_POSITION_AGGREGATE_TYPE => {
                            if let Err(e) = stock.apply_envelope(&env) {
                                eprintln!("stock projection failed: {e:?}");
                            }
                            if let Err(e) = demand.apply_envelope(&env) {
                                eprintln!("demand projection failed: {e:?}");
                            }
                            if let Err(e) = movements.apply_envelope(&env) {
                                eprintln!("movement projection failed: {e:?}");
                            }
                        }
                        TRANSFER_AGGREGATE_TYPE => {
                            if let Err(e) = transfers.apply_envelope(&env) {
                                eprintln!("transfers projection failed: {e:?}");
                            }
                        }
                        other => eprintln!("unexpected aggregate type: {other}"),
                    }
                }
            });
        }
        let _ = ready_rx.recv_timeout(Duration::from_secs(1));

        TestEnv {
            store,
            dispatcher,
            stock,
            demand,
            transfers,
            movements,
        }
    }

    fn sku() -> SkuId {
        SkuId::new("SKU-100").unwrap()
    }

    fn wh(code: &str) -> WarehouseId {
        WarehouseId::new(code).unwrap()
    }

    /// Poll until the condition holds (bounded; the bus is asynchronous).
    fn wait_until(mut cond: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if cond() {
                return;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        assert!(cond(), "condition not reached before deadline");
    }

    fn receive_lot(env: &TestEnv, tenant_id: TenantId, warehouse: &WarehouseId, quantity: i64) -> LotId {
        let position_id = StockPositionId::derive(tenant_id, &sku(), warehouse);
        let lot_id = LotId::new();
        env.dispatcher
            .dispatch::<StockPosition>(
                tenant_id,
                position_id.0,
                STOCK_POSITION_AGGREGATE_TYPE,
                StockCommand::ReceiveLot(ReceiveLot {
                    tenant_id,
                    sku: sku(),
                    warehouse: warehouse.clone(),
                    lot_id,
                    quantity,
                    expiration: None,
                    best_before: None,
                    bin_location: Some("A-01-01".to_string()),
                    occurred_at: Utc::now(),
                }),
                |_, _| StockPosition::empty(position_id),
            )
            .unwrap();
        lot_id
    }

    fn pass_inspection(env: &TestEnv, tenant_id: TenantId, warehouse: &WarehouseId, lot_id: LotId) {
        let position_id = StockPositionId::derive(tenant_id, &sku(), warehouse);
        env.dispatcher
            .dispatch::<StockPosition>(
                tenant_id,
                position_id.0,
                STOCK_POSITION_AGGREGATE_TYPE,
                StockCommand::UpdateLotQuality(UpdateLotQuality {
                    tenant_id,
                    lot_id,
                    status: QualityStatus::Passed,
                    reason: None,
                    occurred_at: Utc::now(),
                }),
                |_, _| StockPosition::empty(position_id),
            )
            .unwrap();
    }

    #[test]
    fn receipt_flows_through_to_stock_read_model() {
        let env = setup();
        let tenant_id = TenantId::new();
        let warehouse = wh("WH-A");

        receive_lot(&env, tenant_id, &warehouse, 100);

        wait_until(|| env.stock.get_by_sku(tenant_id, &sku(), &warehouse).is_some());
        let summary = env.stock.get_by_sku(tenant_id, &sku(), &warehouse).unwrap();
        assert_eq!(summary.on_hand, 100);
        assert_eq!(summary.reserved, 0);
        // Pending lots are sellable until inspection says otherwise.
        assert_eq!(summary.available, 100);
        assert_eq!(summary.lots.len(), 1);
    }

    #[test]
    fn allocation_lifecycle_updates_counters_and_demand_history() {
        let env = setup();
        let tenant_id = TenantId::new();
        let warehouse = wh("WH-A");
        let lot_id = receive_lot(&env, tenant_id, &warehouse, 100);
        pass_inspection(&env, tenant_id, &warehouse, lot_id);

        let service = env.allocation_service(AllocationConfig::default());
        let outcome = service
            .allocate(
                tenant_id,
                AllocateRequest {
                    sku: sku(),
                    warehouse: Some(warehouse.clone()),
                    quantity: 30,
                    order_line_ref: "SO-77/1".to_string(),
                    rotation_policy: Some(RotationPolicy::Fefo),
                    allow_partial: false,
                },
            )
            .unwrap();
        assert!(!outcome.partial);
        assert_eq!(outcome.draws.iter().map(|d| d.quantity).sum::<i64>(), 30);

        wait_until(|| {
            env.stock
                .get_by_sku(tenant_id, &sku(), &warehouse)
                .is_some_and(|s| s.reserved == 30)
        });

        service.pick(tenant_id, outcome.allocation_id).unwrap();
        wait_until(|| {
            env.stock
                .get_by_sku(tenant_id, &sku(), &warehouse)
                .is_some_and(|s| s.committed == 30)
        });

        service.commit_shipment(tenant_id, outcome.allocation_id).unwrap();
        wait_until(|| {
            env.stock
                .get_by_sku(tenant_id, &sku(), &warehouse)
                .is_some_and(|s| s.on_hand == 70 && s.reserved == 0 && s.committed == 0)
        });

        // The shipment is now demand history.
        let position_id = StockPositionId::derive(tenant_id, &sku(), &warehouse);
        wait_until(|| {
            env.demand
                .get(tenant_id, &position_id)
                .is_some_and(|h| h.daily_shipments.values().sum::<i64>() == 30)
        });
    }

    #[test]
    fn released_allocation_returns_stock_to_available() {
        let env = setup();
        let tenant_id = TenantId::new();
        let warehouse = wh("WH-A");
        receive_lot(&env, tenant_id, &warehouse, 50);

        let service = env.allocation_service(AllocationConfig::default());
        let outcome = service
            .allocate(
                tenant_id,
                AllocateRequest {
                    sku: sku(),
                    warehouse: Some(warehouse.clone()),
                    quantity: 20,
                    order_line_ref: "SO-1/1".to_string(),
                    rotation_policy: None,
                    allow_partial: false,
                },
            )
            .unwrap();

        wait_until(|| {
            env.stock
                .get_by_sku(tenant_id, &sku(), &warehouse)
                .is_some_and(|s| s.reserved == 20)
        });

        service.release(tenant_id, outcome.allocation_id).unwrap();
        wait_until(|| {
            env.stock
                .get_by_sku(tenant_id, &sku(), &warehouse)
                .is_some_and(|s| s.reserved == 0 && s.available == 50)
        });
    }

    #[test]
    fn tenant_isolation_read_models_do_not_leak() {
        let env = setup();
        let tenant_a = TenantId::new();
        let tenant_b = TenantId::new();
        let warehouse = wh("WH-A");

        receive_lot(&env, tenant_a, &warehouse, 100);
        wait_until(|| env.stock.get_by_sku(tenant_a, &sku(), &warehouse).is_some());

        assert!(env.stock.get_by_sku(tenant_b, &sku(), &warehouse).is_none());
        assert!(env.stock.list(tenant_b).is_empty());
        assert!(env.demand.list(tenant_b).is_empty());
    }

    #[test]
    fn concurrent_allocations_are_absorbed_by_retry() {
        let env = setup();
        let tenant_id = TenantId::new();
        let warehouse = wh("WH-A");
        receive_lot(&env, tenant_id, &warehouse, 100);

        let service = Arc::new(env.allocation_service(AllocationConfig::default()));
        let mut handles = Vec::new();
        for i in 0..4 {
            let service = service.clone();
            let warehouse = warehouse.clone();
            handles.push(std::thread::spawn(move || {
                service.allocate(
                    tenant_id,
                    AllocateRequest {
                        sku: SkuId::new("SKU-100").unwrap(),
                        warehouse: Some(warehouse),
                        quantity: 20,
                        order_line_ref: format!("SO-9/{i}"),
                        rotation_policy: None,
                        allow_partial: false,
                    },
                )
            }));
        }

        for handle in handles {
            handle.join().unwrap().unwrap();
        }

        // All four won eventually; reservations never exceeded on-hand.
        wait_until(|| {
            env.stock
                .get_by_sku(tenant_id, &sku(), &warehouse)
                .is_some_and(|s| s.reserved == 80 && s.available == 20)
        });
    }

    #[test]
    fn oversubscribed_concurrent_allocations_fail_cleanly() {
        let env = setup();
        let tenant_id = TenantId::new();
        let warehouse = wh("WH-A");
        receive_lot(&env, tenant_id, &warehouse, 100);

        // 8 x 20 against 100: exactly five can win.
        let service = Arc::new(env.allocation_service(AllocationConfig::default()));
        let mut handles = Vec::new();
        for i in 0..8 {
            let service = service.clone();
            let warehouse = warehouse.clone();
            handles.push(std::thread::spawn(move || {
                service.allocate(
                    tenant_id,
                    AllocateRequest {
                        sku: SkuId::new("SKU-100").unwrap(),
                        warehouse: Some(warehouse),
                        quantity: 20,
                        order_line_ref: format!("SO-12/{i}"),
                        rotation_policy: None,
                        allow_partial: false,
                    },
                )
            }));
        }

        let mut won = 0;
        let mut lost = 0;
        for handle in handles {
            match handle.join().unwrap() {
                Ok(_) => won += 1,
                Err(DispatchError::InsufficientStock { requested, available }) => {
                    assert_eq!(requested, 20);
                    assert!(available < 20);
                    lost += 1;
                }
                Err(other) => panic!("unexpected allocation failure: {other:?}"),
            }
        }
        assert_eq!(won, 5);
        assert_eq!(lost, 3);

        // Losers left nothing behind: reservations add up to on-hand exactly.
        wait_until(|| {
            env.stock
                .get_by_sku(tenant_id, &sku(), &warehouse)
                .is_some_and(|s| s.reserved == 100 && s.available == 0)
        });
    }

    #[test]
    fn release_straight_after_allocate_finds_the_position() {
        // No projection feed here: the index written at allocate time alone
        // must let fulfilment resolve the owning position.
        let store = Arc::new(InMemoryEventStore::new());
        let bus: Bus = Arc::new(InMemoryEventBus::new());
        let dispatcher: Dispatcher = Arc::new(CommandDispatcher::new(store, bus));
        let stock: StockProj = Arc::new(WarehouseStockProjection::new(Arc::new(
            InMemoryTenantStore::new(),
        )));
        let service =
            AllocationService::new(dispatcher.clone(), stock, AllocationConfig::default());

        let tenant_id = TenantId::new();
        let warehouse = wh("WH-A");
        let position_id = StockPositionId::derive(tenant_id, &sku(), &warehouse);
        dispatcher
            .dispatch::<StockPosition>(
                tenant_id,
                position_id.0,
                STOCK_POSITION_AGGREGATE_TYPE,
                StockCommand::ReceiveLot(ReceiveLot {
                    tenant_id,
                    sku: sku(),
                    warehouse: warehouse.clone(),
                    lot_id: LotId::new(),
                    quantity: 30,
                    expiration: None,
                    best_before: None,
                    bin_location: None,
                    occurred_at: Utc::now(),
                }),
                |_, _| StockPosition::empty(position_id),
            )
            .unwrap();

        let outcome = service
            .allocate(
                tenant_id,
                AllocateRequest {
                    sku: sku(),
                    warehouse: Some(warehouse),
                    quantity: 10,
                    order_line_ref: "SO-13/1".to_string(),
                    rotation_policy: None,
                    allow_partial: false,
                },
            )
            .unwrap();

        service.release(tenant_id, outcome.allocation_id).unwrap();
        let allocation = service.allocation(tenant_id, outcome.allocation_id).unwrap();
        assert_eq!(allocation.state, AllocationState::Released);
    }

    #[test]
    fn transfer_moves_stock_between_warehouses() {
        let env = setup();
        let tenant_id = TenantId::new();
        let source = wh("WH-A");
        let destination = wh("WH-B");
        receive_lot(&env, tenant_id, &source, 60);

        let coordinator = env.coordinator();
        let transfer_id = coordinator
            .request(tenant_id, sku(), source.clone(), destination.clone(), 25)
            .unwrap();
        coordinator.approve(tenant_id, transfer_id).unwrap();
        coordinator.execute(tenant_id, transfer_id).unwrap();

        wait_until(|| {
            env.stock
                .get_by_sku(tenant_id, &sku(), &source)
                .is_some_and(|s| s.on_hand == 35)
        });
        wait_until(|| {
            env.stock
                .get_by_sku(tenant_id, &sku(), &destination)
                .is_some_and(|s| s.on_hand == 25 && s.available == 25)
        });
        wait_until(|| {
            env.transfers
                .get(tenant_id, &transfer_id)
                .is_some_and(|t| t.status == TransferStatus::Received)
        });
        // Nothing left travelling.
        assert_eq!(env.transfers.in_transit(tenant_id, &sku(), &destination), 0);

        // Executing again is a no-op resume.
        coordinator.execute(tenant_id, transfer_id).unwrap();
        let dest_summary = env.stock.get_by_sku(tenant_id, &sku(), &destination).unwrap();
        assert_eq!(dest_summary.on_hand, 25);
    }

    #[test]
    fn insufficient_stock_fails_the_transfer_and_marks_it_stuck() {
        let env = setup();
        let tenant_id = TenantId::new();
        let source = wh("WH-A");
        let destination = wh("WH-B");
        receive_lot(&env, tenant_id, &source, 10);

        let coordinator = env.coordinator();
        let transfer_id = coordinator
            .request(tenant_id, sku(), source, destination, 500)
            .unwrap();
        coordinator.approve(tenant_id, transfer_id).unwrap();

        assert!(coordinator.execute(tenant_id, transfer_id).is_err());
        wait_until(|| {
            env.transfers
                .get(tenant_id, &transfer_id)
                .is_some_and(|t| t.status == TransferStatus::Stuck)
        });
    }

    #[test]
    fn stuck_transfer_completes_once_the_source_is_restocked() {
        let env = setup();
        let tenant_id = TenantId::new();
        let source = wh("WH-A");
        let destination = wh("WH-B");
        receive_lot(&env, tenant_id, &source, 10);

        let coordinator = env.coordinator();
        let transfer_id = coordinator
            .request(tenant_id, sku(), source.clone(), destination.clone(), 500)
            .unwrap();
        coordinator.approve(tenant_id, transfer_id).unwrap();
        assert!(coordinator.execute(tenant_id, transfer_id).is_err());
        wait_until(|| {
            env.transfers
                .get(tenant_id, &transfer_id)
                .is_some_and(|t| t.status == TransferStatus::Stuck)
        });

        // Top up the source and resume: the dispatch leg runs exactly once.
        receive_lot(&env, tenant_id, &source, 600);
        coordinator.execute(tenant_id, transfer_id).unwrap();

        wait_until(|| {
            env.transfers
                .get(tenant_id, &transfer_id)
                .is_some_and(|t| t.status == TransferStatus::Received)
        });
        wait_until(|| {
            env.stock
                .get_by_sku(tenant_id, &sku(), &destination)
                .is_some_and(|s| s.on_hand == 500)
        });
        wait_until(|| {
            env.stock
                .get_by_sku(tenant_id, &sku(), &source)
                .is_some_and(|s| s.on_hand == 110)
        });

        // Resuming a completed transfer stays a no-op.
        coordinator.execute(tenant_id, transfer_id).unwrap();
        let dest_summary = env.stock.get_by_sku(tenant_id, &sku(), &destination).unwrap();
        assert_eq!(dest_summary.on_hand, 500);
    }

    #[test]
    fn movement_log_deltas_reproduce_counters() {
        let env = setup();
        let tenant_id = TenantId::new();
        let warehouse = wh("WH-A");
        let lot_id = receive_lot(&env, tenant_id, &warehouse, 100);
        pass_inspection(&env, tenant_id, &warehouse, lot_id);

        let service = env.allocation_service(AllocationConfig::default());
        let outcome = service
            .allocate(
                tenant_id,
                AllocateRequest {
                    sku: sku(),
                    warehouse: Some(warehouse.clone()),
                    quantity: 40,
                    order_line_ref: "SO-5/1".to_string(),
                    rotation_policy: None,
                    allow_partial: false,
                },
            )
            .unwrap();
        service.commit_shipment(tenant_id, outcome.allocation_id).unwrap();

        let position_id = StockPositionId::derive(tenant_id, &sku(), &warehouse);
        wait_until(|| {
            env.movements
                .get(tenant_id, &position_id)
                .is_some_and(|log| log.entries.len() == 3)
        });

        let log = env.movements.get(tenant_id, &position_id).unwrap();
        let on_hand: i64 = log.entries.iter().map(|m| m.on_hand_delta).sum();
        let reserved: i64 = log.entries.iter().map(|m| m.reserved_delta).sum();
        assert_eq!(on_hand, 60);
        assert_eq!(reserved, 0);
    }

    #[test]
    fn reconciler_is_clean_after_normal_operation_and_repairs_tampering() {
        let env = setup();
        let tenant_id = TenantId::new();
        let warehouse = wh("WH-A");
        receive_lot(&env, tenant_id, &warehouse, 80);

        wait_until(|| env.stock.get_by_sku(tenant_id, &sku(), &warehouse).is_some());

        let reconciler = env.reconciler();
        let report = reconciler.check(tenant_id).unwrap();
        assert!(report.is_clean());
        assert_eq!(report.positions_checked, 1);

        // Corrupt the read model behind the projection's back.
        let mut summary = env.stock.get_by_sku(tenant_id, &sku(), &warehouse).unwrap();
        summary.on_hand = 9_999;
        summary.available = 9_999;
        env.stock.replace_summary(tenant_id, summary);

        let report = reconciler.check(tenant_id).unwrap();
        assert_eq!(report.drifted.len(), 1);
        assert!(!report.drifted[0].repaired);

        let report = reconciler.repair(tenant_id).unwrap();
        assert!(report.drifted[0].repaired);
        let repaired = env.stock.get_by_sku(tenant_id, &sku(), &warehouse).unwrap();
        assert_eq!(repaired.on_hand, 80);

        // Scoped run only touches the named position.
        let report = reconciler
            .run_for_position(tenant_id, &sku(), &wh("WH-B"), false)
            .unwrap();
        assert_eq!(report.positions_checked, 0);
        let report = reconciler
            .run_for_position(tenant_id, &sku(), &warehouse, false)
            .unwrap();
        assert_eq!(report.positions_checked, 1);
        assert!(report.is_clean());
    }

    #[test]
    fn projection_rebuild_reproduces_state_from_the_store() {
        let env = setup();
        let tenant_id = TenantId::new();
        let warehouse = wh("WH-A");
        let lot_id = receive_lot(&env, tenant_id, &warehouse, 100);
        pass_inspection(&env, tenant_id, &warehouse, lot_id);

        wait_until(|| {
            env.stock
                .get_by_sku(tenant_id, &sku(), &warehouse)
                .is_some_and(|s| s.lots[0].quality == QualityStatus::Passed)
        });
        let before = env.stock.get_by_sku(tenant_id, &sku(), &warehouse).unwrap();

        let rebuilt = WarehouseStockProjection::new(Arc::new(InMemoryTenantStore::new()));
        rebuilt.rebuild_from_scratch(env.store.all_envelopes()).unwrap();

        let after = rebuilt.get_by_sku(tenant_id, &sku(), &warehouse).unwrap();
        assert_eq!(after, before);
    }

    #[test]
    fn advisor_reads_projections_and_recommends_reorder() {
        let env = setup();
        let tenant_id = TenantId::new();
        let warehouse = wh("WH-A");
        let position_id = StockPositionId::derive(tenant_id, &sku(), &warehouse);
        let lot_id = receive_lot(&env, tenant_id, &warehouse, 100);
        pass_inspection(&env, tenant_id, &warehouse, lot_id);

        env.dispatcher
            .dispatch::<StockPosition>(
                tenant_id,
                position_id.0,
                STOCK_POSITION_AGGREGATE_TYPE,
                StockCommand::SetReorderPolicy(SetReorderPolicy {
                    tenant_id,
                    sku: sku(),
                    warehouse: warehouse.clone(),
                    policy: ReorderPolicy {
                        reorder_point: 500,
                        reorder_quantity: 200,
                        lead_time_days: 7,
                        low_stock_threshold: 10,
                        rotation_policy: RotationPolicy::Fefo,
                    },
                    occurred_at: Utc::now(),
                }),
                |_, _| StockPosition::empty(position_id),
            )
            .unwrap();

        wait_until(|| {
            env.stock
                .get_by_sku(tenant_id, &sku(), &warehouse)
                .is_some_and(|s| s.reorder_policy.is_some())
        });

        let readers = ProjectionReadModels::new(
            env.stock.clone(),
            env.demand.clone(),
            env.transfers.clone(),
        );
        let positions = readers.position_snapshots(tenant_id);
        assert_eq!(positions.len(), 1);
        assert_eq!(positions[0].available, 100);

        let (_forecasts, recommendations) = lotline_forecast::advise_from_snapshots(
            tenant_id,
            readers.demand_snapshots(tenant_id),
            positions,
            30,
        )
        .unwrap();

        // 100 available, nothing in transit, reorder point 500.
        assert_eq!(recommendations.len(), 1);
        assert!(recommendations[0].recommended_quantity >= 200);
    }
}
