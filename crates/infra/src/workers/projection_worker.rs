use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use serde_json::Value as JsonValue;
use tracing::warn;

use lotline_core::TenantId;
use lotline_events::{EventBus, EventEnvelope, Subscription};

/// Handle to control and join a background worker.
#[derive(Debug)]
pub struct WorkerHandle {
    shutdown: mpsc::Sender<()>,
    join: Option<thread::JoinHandle<()>>,
}

impl WorkerHandle {
    /// Request graceful shutdown and wait for the worker to stop.
    pub fn shutdown(mut self) {
        let _ = self.shutdown.send(());
        if let Some(j) = self.join.take() {
            let _ = j.join();
        }
    }
}

/// Envelope-driven projection worker loop.
///
/// - Subscribes to the event bus
/// - Routes envelopes by aggregate type (stock position vs transfer streams)
/// - Applies an idempotent handler for each envelope
/// - Supports graceful shutdown and optional tenant filtering
#[derive(Debug)]
pub struct ProjectionWorker;

impl ProjectionWorker {
    /// Spawn a worker thread that feeds envelopes to the handler.
    ///
    /// - `tenant_id`: when provided, envelopes for other tenants are ignored
    /// - `aggregate_type`: when provided, only matching streams are delivered
    /// - `handler`: must be idempotent (at-least-once delivery safe)
    pub fn spawn<B, H, E>(
        name: &'static str,
        bus: B,
        tenant_id: Option<TenantId>,
        aggregate_type: Option<&'static str>,
        mut handler: H,
    ) -> WorkerHandle
    where
        B: EventBus<EventEnvelope<JsonValue>> + Send + Sync + 'static,
        H: FnMut(EventEnvelope<JsonValue>) -> Result<(), E> + Send + 'static,
        E: core::fmt::Debug + Send + 'static,
    {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let sub: Subscription<EventEnvelope<JsonValue>> = bus.subscribe();

        let join = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                worker_loop(name, sub, shutdown_rx, tenant_id, aggregate_type, &mut handler)
            })
            .expect("failed to spawn projection worker thread");

        WorkerHandle {
            shutdown: shutdown_tx,
            join: Some(join),
        }
    }
}

fn worker_loop<H, E>(
    name: &'static str,
    sub: Subscription<EventEnvelope<JsonValue>>,
    shutdown_rx: mpsc::Receiver<()>,
    tenant_id: Option<TenantId>,
    aggregate_type: Option<&'static str>,
    handler: &mut H,
) where
    H: FnMut(EventEnvelope<JsonValue>) -> Result<(), E>,
    E: core::fmt::Debug,
{
    let tick = Duration::from_millis(250);

    loop {
        // Shutdown check (non-blocking)
        if shutdown_rx.try_recv().is_ok() {
            break;
        }

        match sub.recv_timeout(tick) {
            Ok(envelope) => {
                if let Some(t) = tenant_id {
                    if envelope.tenant_id() != t {
                        // Tenant-safe: ignore other tenants.
                        continue;
                    }
                }
                if let Some(at) = aggregate_type {
                    if envelope.aggregate_type() != at {
                        continue;
                    }
                }

                if let Err(err) = handler(envelope) {
                    warn!(worker = name, error = ?err, "projection worker handler failed");
                }
            }
            Err(std::sync::mpsc::RecvTimeoutError::Timeout) => continue,
            Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }
}
