//! Realtime dispatcher: turns inbound events into registry updates, store
//! writes and topic publishes.
//!
//! Within one event, a position is always persisted before it is published.
//! Store calls are synchronous and run on the blocking pool. Across events no
//! ordering is imposed.

use std::sync::Arc;
use std::time::Instant;

use geocast_core::PositionReport;
use geocast_core::constants::LOCATIONS_TOPIC;
use geocast_store::{LocationStore, StoreError};
use metrics::{counter, histogram};
use serde::Serialize;
use serde_json::{Value, json};
use tracing::{debug, info, instrument, warn};

use super::events::InboundEvent;
use super::publisher::Publisher;
use super::registry::SessionRegistry;
use crate::metrics::{DISPATCH_DURATION_SECONDS, DISPATCH_EVENTS_TOTAL, DISPATCH_STORE_ERRORS_TOTAL};

/// Error text published for ids with no stored position.
pub const NOT_FOUND_MARKER: &str = "Data not found";
/// Error text published for ids whose lookup failed.
pub const UNAVAILABLE_MARKER: &str = "Storage unavailable";

/// Dispatcher behaviour switches.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DispatcherOptions {
    /// Publish an error marker instead of skipping ids that cannot be looked
    /// up during a fan-out.
    pub publish_error_markers: bool,
}

/// What handling one event did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DispatchOutcome {
    /// Payloads published to the topic, error markers included.
    pub published: usize,
    /// Fan-out ids with no stored position.
    pub skipped: usize,
    /// Saves or lookups that failed.
    pub failed: usize,
}

/// Routes inbound events to the registry, the store and the publisher.
pub struct Dispatcher {
    registry: Arc<SessionRegistry>,
    store: Arc<dyn LocationStore>,
    publisher: Arc<dyn Publisher>,
    options: DispatcherOptions,
}

impl Dispatcher {
    /// Create a dispatcher over shared collaborators.
    pub fn new(
        registry: Arc<SessionRegistry>,
        store: Arc<dyn LocationStore>,
        publisher: Arc<dyn Publisher>,
        options: DispatcherOptions,
    ) -> Self {
        Self {
            registry,
            store,
            publisher,
            options,
        }
    }

    /// The session registry this dispatcher updates.
    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// The store this dispatcher writes to.
    pub fn store(&self) -> &Arc<dyn LocationStore> {
        &self.store
    }

    /// Handle one event to completion.
    #[instrument(skip_all, fields(event = event.name()))]
    pub async fn dispatch(&self, event: InboundEvent) -> DispatchOutcome {
        let name = event.name();
        let start = Instant::now();
        counter!(DISPATCH_EVENTS_TOTAL, "event" => name).increment(1);

        let outcome = match event {
            InboundEvent::ReportLocation(report) => self.report_location(report).await,
            InboundEvent::SyncAll(report) => self.sync_all(report).await,
            InboundEvent::RegisterClient => self.register_client().await,
            InboundEvent::DebugMessage(text) => {
                Self::debug_message(&text);
                DispatchOutcome::default()
            }
        };

        histogram!(DISPATCH_DURATION_SECONDS, "event" => name)
            .record(start.elapsed().as_secs_f64());
        debug!(
            published = outcome.published,
            skipped = outcome.skipped,
            failed = outcome.failed,
            "event handled"
        );
        outcome
    }

    /// Register the sender, persist the report, then publish it verbatim.
    /// Nothing is published if the save fails.
    pub async fn report_location(&self, report: PositionReport) -> DispatchOutcome {
        info!(
            client_id = %report.client_id,
            latitude = %report.latitude,
            longitude = %report.longitude,
            "location received"
        );
        let _ = self.registry.register(&report.client_id);

        let Some(payload) = to_payload(&report) else {
            return DispatchOutcome { failed: 1, ..Default::default() };
        };

        match self.save(report).await {
            Ok(()) => {
                let _ = self.publisher.publish(LOCATIONS_TOPIC, &payload).await;
                DispatchOutcome { published: 1, ..Default::default() }
            }
            Err(e) => {
                warn!(error = %e, "location not persisted, skipping publish");
                DispatchOutcome { failed: 1, ..Default::default() }
            }
        }
    }

    /// Register and persist the report, then publish every known client's
    /// latest stored position. A failed save does not stop the fan-out.
    pub async fn sync_all(&self, report: PositionReport) -> DispatchOutcome {
        debug!(client_id = %report.client_id, "sync requested");
        let _ = self.registry.register(&report.client_id);

        let save_failed = match self.save(report).await {
            Ok(()) => false,
            Err(e) => {
                warn!(error = %e, "sync report not persisted, fanning out anyway");
                true
            }
        };

        let mut outcome = self.fan_out().await;
        if save_failed {
            outcome.failed += 1;
        }
        outcome
    }

    /// Publish every known client's latest stored position.
    pub async fn register_client(&self) -> DispatchOutcome {
        debug!("client registration fan-out");
        self.fan_out().await
    }

    /// Log free text from a client. No other effect.
    pub fn debug_message(text: &str) {
        info!(text = %text, "client message");
    }

    async fn fan_out(&self) -> DispatchOutcome {
        let client_ids = self.registry.list_active(Instant::now());
        let mut outcome = DispatchOutcome::default();

        for client_id in client_ids {
            let lookup = {
                let id = client_id.clone();
                with_store(&self.store, move |store| store.find_latest_by_client(&id)).await
            };
            match lookup {
                Ok(Some(stored)) => {
                    if let Some(payload) = to_payload(&stored) {
                        let _ = self.publisher.publish(LOCATIONS_TOPIC, &payload).await;
                        outcome.published += 1;
                    } else {
                        outcome.failed += 1;
                    }
                }
                Ok(None) => {
                    debug!(client_id = %client_id, "no stored position");
                    outcome.skipped += 1;
                    self.publish_marker(&client_id, NOT_FOUND_MARKER, &mut outcome)
                        .await;
                }
                Err(e) => {
                    counter!(DISPATCH_STORE_ERRORS_TOTAL).increment(1);
                    warn!(client_id = %client_id, error = %e, "lookup failed, skipping client");
                    outcome.failed += 1;
                    self.publish_marker(&client_id, UNAVAILABLE_MARKER, &mut outcome)
                        .await;
                }
            }
        }
        outcome
    }

    async fn publish_marker(&self, client_id: &str, error: &str, outcome: &mut DispatchOutcome) {
        if !self.options.publish_error_markers {
            return;
        }
        let marker = json!({ "error": error, "clientId": client_id });
        let _ = self.publisher.publish(LOCATIONS_TOPIC, &marker).await;
        outcome.published += 1;
    }

    async fn save(&self, report: PositionReport) -> Result<(), StoreError> {
        let result = with_store(&self.store, move |store| store.save(&report)).await;
        match result {
            Ok(stored) => {
                debug!(id = %stored.id, client_id = %stored.client_id, "location persisted");
                Ok(())
            }
            Err(e) => {
                counter!(DISPATCH_STORE_ERRORS_TOTAL).increment(1);
                Err(e)
            }
        }
    }
}

/// Run a synchronous store call on the blocking pool.
pub(crate) async fn with_store<T, F>(store: &Arc<dyn LocationStore>, f: F) -> Result<T, StoreError>
where
    F: FnOnce(&dyn LocationStore) -> Result<T, StoreError> + Send + 'static,
    T: Send + 'static,
{
    let store = Arc::clone(store);
    tokio::task::spawn_blocking(move || f(store.as_ref()))
        .await
        .map_err(|e| StoreError::Unavailable(format!("store task failed: {e}")))?
}

fn to_payload<T: Serialize>(value: &T) -> Option<Value> {
    match serde_json::to_value(value) {
        Ok(payload) => Some(payload),
        Err(e) => {
            warn!(error = %e, "failed to serialize payload");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use geocast_core::{RecordId, StoredPosition};
    use geocast_core::logging::capture_logs;
    use geocast_store::SqliteLocationStore;
    use mockall::mock;
    use mockall::predicate::eq;
    use tracing::Level;

    use super::*;

    #[derive(Clone, Debug, PartialEq)]
    enum Step {
        Saved(String),
        Published(Value),
    }

    type Journal = Arc<Mutex<Vec<Step>>>;

    struct RecordingPublisher {
        journal: Journal,
    }

    #[async_trait]
    impl Publisher for RecordingPublisher {
        async fn publish(&self, topic: &str, payload: &Value) -> usize {
            assert_eq!(topic, LOCATIONS_TOPIC);
            self.journal
                .lock()
                .unwrap()
                .push(Step::Published(payload.clone()));
            1
        }
    }

    struct RecordingStore {
        inner: SqliteLocationStore,
        journal: Journal,
    }

    impl LocationStore for RecordingStore {
        fn save(&self, report: &PositionReport) -> geocast_store::Result<StoredPosition> {
            let stored = self.inner.save(report)?;
            self.journal
                .lock()
                .unwrap()
                .push(Step::Saved(report.client_id.clone()));
            Ok(stored)
        }

        fn find_latest_by_client(
            &self,
            client_id: &str,
        ) -> geocast_store::Result<Option<StoredPosition>> {
            self.inner.find_latest_by_client(client_id)
        }

        fn count(&self) -> geocast_store::Result<u64> {
            self.inner.count()
        }

        fn clear(&self) -> geocast_store::Result<usize> {
            self.inner.clear()
        }
    }

    mock! {
        Store {}
        impl LocationStore for Store {
            fn save(&self, report: &PositionReport) -> geocast_store::Result<StoredPosition>;
            fn find_latest_by_client(&self, client_id: &str) -> geocast_store::Result<Option<StoredPosition>>;
            fn count(&self) -> geocast_store::Result<u64>;
            fn clear(&self) -> geocast_store::Result<usize>;
        }
    }

    struct Harness {
        dispatcher: Dispatcher,
        store: Arc<RecordingStore>,
        journal: Journal,
    }

    fn harness(options: DispatcherOptions) -> Harness {
        let journal: Journal = Arc::default();
        let store = Arc::new(RecordingStore {
            inner: SqliteLocationStore::open_in_memory().unwrap(),
            journal: Arc::clone(&journal),
        });
        let publisher = Arc::new(RecordingPublisher {
            journal: Arc::clone(&journal),
        });
        let dispatcher = Dispatcher::new(
            Arc::new(SessionRegistry::new()),
            store.clone(),
            publisher,
            options,
        );
        Harness {
            dispatcher,
            store,
            journal,
        }
    }

    fn with_mock_store(store: MockStore, options: DispatcherOptions) -> (Dispatcher, Journal) {
        let journal: Journal = Arc::default();
        let publisher = Arc::new(RecordingPublisher {
            journal: Arc::clone(&journal),
        });
        let dispatcher = Dispatcher::new(
            Arc::new(SessionRegistry::new()),
            Arc::new(store),
            publisher,
            options,
        );
        (dispatcher, journal)
    }

    fn published(journal: &Journal) -> Vec<Value> {
        journal
            .lock()
            .unwrap()
            .iter()
            .filter_map(|step| match step {
                Step::Published(v) => Some(v.clone()),
                Step::Saved(_) => None,
            })
            .collect()
    }

    fn stored(client_id: &str, latitude: &str) -> StoredPosition {
        StoredPosition {
            id: RecordId::new(),
            sequence: 1,
            client_id: client_id.into(),
            latitude: latitude.into(),
            longitude: "0".into(),
            received_at: chrono::Utc::now(),
        }
    }

    fn unavailable() -> StoreError {
        StoreError::Unavailable("database offline".into())
    }

    #[tokio::test]
    async fn report_registers_persists_and_publishes_verbatim() {
        let h = harness(DispatcherOptions::default());
        let report = PositionReport::new("dev-1", "37.77", "-122.41");

        let outcome = h
            .dispatcher
            .dispatch(InboundEvent::ReportLocation(report.clone()))
            .await;

        assert_eq!(outcome, DispatchOutcome { published: 1, skipped: 0, failed: 0 });
        assert_eq!(h.dispatcher.registry().list_all(), vec!["dev-1"]);
        assert_eq!(h.store.count().unwrap(), 1);
        assert_eq!(
            published(&h.journal),
            vec![json!({"clientId": "dev-1", "latitude": "37.77", "longitude": "-122.41"})]
        );
    }

    #[tokio::test]
    async fn every_publish_follows_its_save() {
        let h = harness(DispatcherOptions::default());
        for i in 0..5 {
            let report = PositionReport::new(format!("dev-{}", i % 2), i.to_string(), "0");
            let _ = h.dispatcher.report_location(report).await;
        }

        let journal = h.journal.lock().unwrap().clone();
        assert_eq!(journal.len(), 10);
        for pair in journal.chunks(2) {
            match pair {
                [Step::Saved(saved), Step::Published(payload)] => {
                    assert_eq!(payload["clientId"], json!(saved));
                }
                other => panic!("publish not preceded by save: {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn repeated_reports_keep_single_registry_entry() {
        let h = harness(DispatcherOptions::default());
        for _ in 0..3 {
            let _ = h
                .dispatcher
                .report_location(PositionReport::new("dev-1", "1", "1"))
                .await;
        }
        assert_eq!(h.dispatcher.registry().list_all(), vec!["dev-1"]);
        assert_eq!(h.store.count().unwrap(), 3);
    }

    #[tokio::test]
    async fn failed_save_skips_publish_but_registers() {
        let mut store = MockStore::new();
        let _ = store.expect_save().times(1).returning(|_| Err(unavailable()));
        let (dispatcher, journal) = with_mock_store(store, DispatcherOptions::default());

        let outcome = dispatcher
            .report_location(PositionReport::new("dev-1", "1", "1"))
            .await;

        assert_eq!(outcome, DispatchOutcome { published: 0, skipped: 0, failed: 1 });
        assert!(published(&journal).is_empty());
        assert!(dispatcher.registry().contains("dev-1"));
    }

    #[tokio::test]
    async fn sync_all_publishes_latest_for_each_known_client() {
        let h = harness(DispatcherOptions::default());
        for (id, lat) in [("A", "1"), ("B", "2"), ("C", "3"), ("A", "4")] {
            let _ = h
                .dispatcher
                .report_location(PositionReport::new(id, lat, "0"))
                .await;
        }
        h.journal.lock().unwrap().clear();

        let outcome = h
            .dispatcher
            .sync_all(PositionReport::new("B", "5", "0"))
            .await;

        assert_eq!(outcome, DispatchOutcome { published: 3, skipped: 0, failed: 0 });
        let payloads = published(&h.journal);
        let summary: Vec<(String, String)> = payloads
            .iter()
            .map(|p| {
                (
                    p["clientId"].as_str().unwrap().to_string(),
                    p["latitude"].as_str().unwrap().to_string(),
                )
            })
            .collect();
        assert_eq!(
            summary,
            vec![
                ("A".to_string(), "4".to_string()),
                ("B".to_string(), "5".to_string()),
                ("C".to_string(), "3".to_string()),
            ]
        );
        assert!(payloads.iter().all(|p| p["id"].is_string() && p["receivedAt"].is_string()));
    }

    #[tokio::test]
    async fn sync_all_saves_before_fanning_out() {
        let h = harness(DispatcherOptions::default());
        let _ = h
            .dispatcher
            .sync_all(PositionReport::new("solo", "9", "9"))
            .await;

        let journal = h.journal.lock().unwrap().clone();
        assert_eq!(journal.len(), 2);
        assert_eq!(journal[0], Step::Saved("solo".into()));
        assert!(matches!(&journal[1], Step::Published(p) if p["latitude"] == "9"));
    }

    #[tokio::test]
    async fn fan_out_skips_clients_without_records() {
        let h = harness(DispatcherOptions::default());
        let _ = h
            .dispatcher
            .report_location(PositionReport::new("A", "1", "1"))
            .await;
        let _ = h.dispatcher.registry().register("ghost");
        h.journal.lock().unwrap().clear();

        let outcome = h.dispatcher.register_client().await;

        assert_eq!(outcome, DispatchOutcome { published: 1, skipped: 1, failed: 0 });
        let payloads = published(&h.journal);
        assert_eq!(payloads.len(), 1);
        assert_eq!(payloads[0]["clientId"], "A");
    }

    #[tokio::test]
    async fn sync_all_skips_clients_without_records() {
        let h = harness(DispatcherOptions::default());
        let _ = h
            .dispatcher
            .report_location(PositionReport::new("A", "1", "1"))
            .await;
        let _ = h.dispatcher.registry().register("ghost");
        h.journal.lock().unwrap().clear();

        let outcome = h.dispatcher.sync_all(PositionReport::new("B", "2", "2")).await;

        assert_eq!(h.dispatcher.registry().len(), 3);
        assert_eq!(outcome, DispatchOutcome { published: 2, skipped: 1, failed: 0 });
        let payloads = published(&h.journal);
        assert!(payloads.len() < h.dispatcher.registry().len());
        let mut ids: Vec<&str> = payloads.iter().filter_map(|p| p["clientId"].as_str()).collect();
        ids.sort_unstable();
        assert_eq!(ids, ["A", "B"]);
    }

    #[tokio::test]
    async fn register_client_on_empty_registry_publishes_nothing() {
        let h = harness(DispatcherOptions::default());
        let outcome = h.dispatcher.dispatch(InboundEvent::RegisterClient).await;
        assert_eq!(outcome, DispatchOutcome::default());
        assert!(h.journal.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn register_client_does_not_persist() {
        let h = harness(DispatcherOptions::default());
        let _ = h
            .dispatcher
            .report_location(PositionReport::new("A", "1", "1"))
            .await;
        let _ = h.dispatcher.register_client().await;
        assert_eq!(h.store.count().unwrap(), 1);
    }

    #[tokio::test]
    async fn sync_all_fans_out_even_when_save_fails() {
        let mut store = MockStore::new();
        let _ = store.expect_save().returning(|_| Err(unavailable()));
        let _ = store
            .expect_find_latest_by_client()
            .with(eq("dev-1"))
            .returning(|id| Ok(Some(stored(id, "1"))));
        let (dispatcher, journal) = with_mock_store(store, DispatcherOptions::default());

        let outcome = dispatcher
            .sync_all(PositionReport::new("dev-1", "2", "2"))
            .await;

        assert_eq!(outcome, DispatchOutcome { published: 1, skipped: 0, failed: 1 });
        assert_eq!(published(&journal)[0]["latitude"], "1");
    }

    #[tokio::test]
    async fn lookup_failure_skips_only_that_client() {
        let mut store = MockStore::new();
        let _ = store
            .expect_find_latest_by_client()
            .returning(|id| match id {
                "bad" => Err(unavailable()),
                other => Ok(Some(stored(other, "7"))),
            });
        let (dispatcher, journal) = with_mock_store(store, DispatcherOptions::default());
        for id in ["a", "bad", "c"] {
            let _ = dispatcher.registry().register(id);
        }

        let outcome = dispatcher.register_client().await;

        assert_eq!(outcome, DispatchOutcome { published: 2, skipped: 0, failed: 1 });
        let ids: Vec<Value> = published(&journal).iter().map(|p| p["clientId"].clone()).collect();
        assert_eq!(ids, vec![json!("a"), json!("c")]);
    }

    #[tokio::test]
    async fn error_markers_replace_silence_when_enabled() {
        let mut store = MockStore::new();
        let _ = store
            .expect_find_latest_by_client()
            .returning(|id| match id {
                "missing" => Ok(None),
                "broken" => Err(unavailable()),
                other => Ok(Some(stored(other, "1"))),
            });
        let options = DispatcherOptions { publish_error_markers: true };
        let (dispatcher, journal) = with_mock_store(store, options);
        for id in ["ok", "missing", "broken"] {
            let _ = dispatcher.registry().register(id);
        }

        let outcome = dispatcher.register_client().await;

        assert_eq!(outcome, DispatchOutcome { published: 3, skipped: 1, failed: 1 });
        let payloads = published(&journal);
        assert_eq!(payloads[1], json!({"error": NOT_FOUND_MARKER, "clientId": "missing"}));
        assert_eq!(payloads[2], json!({"error": UNAVAILABLE_MARKER, "clientId": "broken"}));
    }

    #[tokio::test]
    async fn idle_clients_are_left_out_of_fan_out() {
        let journal: Journal = Arc::default();
        let registry = Arc::new(SessionRegistry::with_max_idle(Some(
            std::time::Duration::from_millis(200),
        )));
        let mut store = MockStore::new();
        let _ = store
            .expect_find_latest_by_client()
            .with(eq("fresh"))
            .times(1)
            .returning(|id| Ok(Some(stored(id, "1"))));
        let dispatcher = Dispatcher::new(
            Arc::clone(&registry),
            Arc::new(store),
            Arc::new(RecordingPublisher {
                journal: Arc::clone(&journal),
            }),
            DispatcherOptions::default(),
        );
        let _ = registry.register("stale");
        std::thread::sleep(std::time::Duration::from_millis(300));
        let _ = registry.register("fresh");

        let outcome = dispatcher.register_client().await;
        assert_eq!(outcome.published, 1);
    }

    #[tokio::test]
    async fn debug_message_is_logged_without_side_effects() {
        let (logs, _guard) = capture_logs();
        let h = harness(DispatcherOptions::default());

        let outcome = h
            .dispatcher
            .dispatch(InboundEvent::DebugMessage("hello from dev-1".into()))
            .await;

        assert_eq!(outcome, DispatchOutcome::default());
        assert!(logs.has_event(Level::INFO, "client message"));
        assert!(logs.has_field("text", "hello from dev-1"));
        assert!(h.dispatcher.registry().is_empty());
        assert!(h.journal.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn example_scenario_report_then_register() {
        let h = harness(DispatcherOptions::default());
        let report = PositionReport::new("dev-1", "37.77", "-122.41");

        let _ = h
            .dispatcher
            .dispatch(InboundEvent::ReportLocation(report.clone()))
            .await;
        assert_eq!(h.dispatcher.registry().list_all(), vec!["dev-1"]);
        assert_eq!(h.store.count().unwrap(), 1);
        assert_eq!(published(&h.journal).len(), 1);

        h.journal.lock().unwrap().clear();
        let _ = h.dispatcher.dispatch(InboundEvent::RegisterClient).await;
        let payloads = published(&h.journal);
        assert_eq!(payloads.len(), 1);
        let stored: StoredPosition = serde_json::from_value(payloads[0].clone()).unwrap();
        assert_eq!(stored.report(), report);
    }
}
