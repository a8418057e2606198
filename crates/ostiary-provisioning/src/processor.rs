//! Event processors.
//!
//! An [`EventProcessor`] owns the runtime that drives deliveries to their
//! terminal states. The configuration selects one concrete implementation;
//! this build ships [`ScheduledProcessor`], which subscribes to the
//! in-process bus for intake and polls the delivery store on a fixed
//! interval. Broker-driven variants are configuration-valid but not
//! constructible here.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;
use tokio::sync::{broadcast, Mutex, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use ostiary_events::{EventBus, LocalEvent};
use ostiary_scim_client::{DbTokenSigner, ScimClient, TokenMinter};

use crate::config::{ProcessorKind, ScimConfig};
use crate::error::{ProvisioningError, ProvisioningResult};
use crate::fanout::EventIntake;
use crate::store::DeliveryStore;
use crate::worker::DeliveryWorker;

/// A pluggable runtime that turns observed events into terminal delivery
/// states.
#[async_trait]
pub trait EventProcessor: Send + Sync {
    /// Start background processing.
    async fn start(&self) -> ProvisioningResult<()>;

    /// Stop cooperatively: no new work is accepted, in-flight deliveries
    /// get a bounded drain window, and anything still running is abandoned
    /// for reclaim on the next startup.
    async fn stop(&self);

    /// Handle one event directly (bypassing the bus).
    async fn on_event(&self, event: &LocalEvent);
}

/// Build the configured processor.
pub fn build_processor(
    config: &ScimConfig,
    pool: PgPool,
    bus: EventBus,
) -> ProvisioningResult<Arc<dyn EventProcessor>> {
    match config.processor {
        ProcessorKind::Scheduled => {
            let client = ScimClient::new(config.http_timeout)?;
            let signer = Arc::new(DbTokenSigner::new(pool.clone()));
            let minter = TokenMinter::new(signer).with_lifetime(config.token_lifetime);
            let worker = DeliveryWorker::new(pool.clone(), client, minter);
            Ok(Arc::new(ScheduledProcessor::new(
                pool,
                bus,
                worker,
                config.clone(),
            )))
        }
        other => Err(ProvisioningError::UnsupportedProcessor {
            kind: other.to_string(),
        }),
    }
}

/// The interval-driven processor.
///
/// Runs two loops: a bus listener that fans incoming events out into
/// pending deliveries, and a poller that claims due deliveries each tick
/// and dispatches them, grouped by event, to a bounded worker pool.
pub struct ScheduledProcessor {
    intake: EventIntake,
    store: DeliveryStore,
    worker: DeliveryWorker,
    bus: EventBus,
    config: ScimConfig,
    cancel: CancellationToken,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl ScheduledProcessor {
    /// Create a processor. Call [`EventProcessor::start`] to begin work.
    #[must_use]
    pub fn new(pool: PgPool, bus: EventBus, worker: DeliveryWorker, config: ScimConfig) -> Self {
        Self {
            intake: EventIntake::new(pool.clone()),
            store: DeliveryStore::new(pool),
            worker,
            bus,
            config,
            cancel: CancellationToken::new(),
            handles: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl EventProcessor for ScheduledProcessor {
    async fn start(&self) -> ProvisioningResult<()> {
        if !self.config.enabled {
            info!(target: "scim_delivery", "SCIM provisioning is disabled; processor not started");
            return Ok(());
        }

        info!(
            target: "scim_delivery",
            poll_interval_secs = self.config.poll_interval.as_secs(),
            batch_size = self.config.batch_size,
            "Starting scheduled SCIM processor"
        );

        let mut handles = self.handles.lock().await;

        let listener_token = self.cancel.clone();
        let intake = self.intake.clone();
        let rx = self.bus.subscribe();
        handles.push(tokio::spawn(async move {
            run_listener(intake, rx, listener_token).await;
        }));

        let poller_token = self.cancel.clone();
        let store = self.store.clone();
        let worker = self.worker.clone();
        let config = self.config.clone();
        handles.push(tokio::spawn(async move {
            run_poller(store, worker, config, poller_token).await;
        }));

        Ok(())
    }

    async fn stop(&self) {
        info!(target: "scim_delivery", "Stopping scheduled SCIM processor");
        self.cancel.cancel();

        let mut handles = self.handles.lock().await;
        for handle in handles.drain(..) {
            match tokio::time::timeout(self.config.drain_timeout, handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    error!(
                        target: "scim_delivery",
                        error = %e,
                        "Processor task panicked during shutdown"
                    );
                }
                Err(_) => {
                    warn!(
                        target: "scim_delivery",
                        "Drain timeout elapsed; abandoning in-flight deliveries for reclaim"
                    );
                }
            }
        }

        info!(target: "scim_delivery", "Scheduled SCIM processor stopped");
    }

    async fn on_event(&self, event: &LocalEvent) {
        self.intake.on_event(event).await;
    }
}

/// Bus listener loop: fans incoming events out into pending deliveries.
async fn run_listener(
    intake: EventIntake,
    mut rx: broadcast::Receiver<LocalEvent>,
    token: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = token.cancelled() => {
                info!(target: "scim_delivery", "Event listener shutting down");
                break;
            }
            result = rx.recv() => {
                match result {
                    Ok(event) => intake.on_event(&event).await,
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(
                            target: "scim_delivery",
                            skipped = n,
                            "Event listener lagged; skipped {n} events"
                        );
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        info!(
                            target: "scim_delivery",
                            "Event bus closed; listener shutting down"
                        );
                        break;
                    }
                }
            }
        }
    }
}

/// Poll loop: each tick reclaims stale work and drains due deliveries.
async fn run_poller(
    store: DeliveryStore,
    worker: DeliveryWorker,
    config: ScimConfig,
    token: CancellationToken,
) {
    let mut interval = tokio::time::interval(config.poll_interval);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = token.cancelled() => {
                info!(target: "scim_delivery", "Poller shutting down");
                break;
            }
            _ = interval.tick() => {
                run_tick(&store, &worker, &config).await;
            }
        }
    }
}

/// One poll tick: release stale claims, claim a batch, dispatch it grouped
/// by event with bounded concurrency, and wait for the batch to settle.
async fn run_tick(store: &DeliveryStore, worker: &DeliveryWorker, config: &ScimConfig) {
    let now = Utc::now();

    let stale_before = now
        - chrono::Duration::from_std(config.stale_after)
            .unwrap_or_else(|_| chrono::Duration::seconds(300));
    if let Err(e) = store.release_stale(stale_before).await {
        error!(
            target: "scim_delivery",
            error = %e,
            "Failed to release stale deliveries"
        );
    }

    let batch = match store.claim_due(now, config.batch_size).await {
        Ok(batch) => batch,
        Err(e) => {
            error!(
                target: "scim_delivery",
                error = %e,
                "Failed to claim due deliveries"
            );
            return;
        }
    };

    if batch.is_empty() {
        return;
    }

    let mut groups: HashMap<Uuid, Vec<ostiary_db::models::Delivery>> = HashMap::new();
    for delivery in batch {
        groups.entry(delivery.event_id).or_default().push(delivery);
    }

    debug!(
        target: "scim_delivery",
        groups = groups.len(),
        total = groups.values().map(Vec::len).sum::<usize>(),
        "Dispatching claimed deliveries"
    );

    let semaphore = Arc::new(Semaphore::new(config.max_concurrency));
    let mut handles = Vec::new();

    for (_event_id, group) in groups {
        for delivery in group {
            let sem = semaphore.clone();
            let worker = worker.clone();
            handles.push(tokio::spawn(async move {
                let Ok(_permit) = sem.acquire().await else {
                    return;
                };
                worker.process(&delivery).await;
            }));
        }
    }

    // A panicking worker must not take its siblings or the poll loop down;
    // its delivery stays in progress and is reclaimed as stale later.
    for handle in handles {
        if let Err(e) = handle.await {
            error!(
                target: "scim_delivery",
                error = %e,
                "Delivery task panicked"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unsupported_processors_fail_construction() {
        let bus = EventBus::new(8);
        let config = ScimConfig {
            processor: ProcessorKind::Kafka,
            ..Default::default()
        };
        let pool = sqlx::postgres::PgPoolOptions::new().connect_lazy("postgres://localhost/ostiary");
        let result = build_processor(&config, pool.unwrap(), bus);
        assert!(matches!(
            result,
            Err(ProvisioningError::UnsupportedProcessor { .. })
        ));
    }
}
