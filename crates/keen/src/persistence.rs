//! Persistence strategies: how events reach the API.

use crate::api::ApiTransport;
use crate::config::Config;
use crate::event::{validate_collection, Event, EventBatch};
use crate::queue::EventQueue;
use crate::Error;
use async_trait::async_trait;
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

/// Default number of queued events that triggers a batched flush.
pub const DEFAULT_MAX_EVENTS: usize = 100;

/// Default age of the oldest queued event that triggers a batched flush.
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(10);

/// A policy for delivering events.
///
/// Implement this to plug a custom transport into
/// [`KeenClient`](crate::KeenClient) via [`Persistence::Custom`]. The client
/// validates collection names and event bodies before calling in.
#[async_trait]
pub trait PersistenceStrategy: Send + Sync {
    /// Persist one event into a collection.
    async fn persist(&self, collection: &str, event: Event) -> Result<(), Error>;

    /// Persist events for several collections at once.
    async fn persist_batch(&self, events: EventBatch) -> Result<(), Error>;

    /// Deliver anything still held back. Strategies that never buffer keep
    /// the default.
    async fn flush(&self) -> Result<(), Error> {
        Ok(())
    }

    /// Number of events accepted but not yet sent.
    async fn pending_event_count(&self) -> usize {
        0
    }
}

/// Thresholds for [`BatchedPersistence`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchSettings {
    pub max_events: usize,
    pub max_age: Duration,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            max_events: DEFAULT_MAX_EVENTS,
            max_age: DEFAULT_MAX_AGE,
        }
    }
}

impl BatchSettings {
    fn validate(&self) -> Result<(), Error> {
        if self.max_events == 0 {
            return Err(Error::InvalidPersistenceStrategy(
                "max_events must be at least 1".into(),
            ));
        }
        if self.max_age.is_zero() {
            return Err(Error::InvalidPersistenceStrategy(
                "max_age must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

/// Which persistence strategy a client should use.
#[derive(Clone, Default)]
pub enum Persistence {
    /// One HTTP write per call.
    #[default]
    Direct,
    /// Buffer in memory and write in batches.
    Batched(BatchSettings),
    /// A caller-supplied strategy.
    Custom(Arc<dyn PersistenceStrategy>),
}

impl Persistence {
    /// Wrap a custom strategy.
    pub fn custom(strategy: impl PersistenceStrategy + 'static) -> Self {
        Persistence::Custom(Arc::new(strategy))
    }

    /// Resolve into a strategy instance sending through `api`.
    pub(crate) fn resolve(
        self,
        config: &Config,
        api: &Arc<dyn ApiTransport>,
    ) -> Result<Arc<dyn PersistenceStrategy>, Error> {
        let strategy: Arc<dyn PersistenceStrategy> = match self {
            Persistence::Direct => Arc::new(DirectPersistence::new(config.clone(), api.clone())),
            Persistence::Batched(settings) => Arc::new(BatchedPersistence::new(
                config.clone(),
                api.clone(),
                settings,
            )?),
            Persistence::Custom(strategy) => strategy,
        };
        Ok(strategy)
    }
}

impl fmt::Debug for Persistence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Persistence::Direct => f.write_str("Direct"),
            Persistence::Batched(settings) => f.debug_tuple("Batched").field(settings).finish(),
            Persistence::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

impl FromStr for Persistence {
    type Err = Error;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name.trim().to_ascii_lowercase().as_str() {
            "direct" => Ok(Persistence::Direct),
            "batched" => Ok(Persistence::Batched(BatchSettings::default())),
            _ => Err(Error::InvalidPersistenceStrategy(format!(
                "unknown persistence strategy {:?}, expected \"direct\" or \"batched\"",
                name
            ))),
        }
    }
}

/// Writes every call straight through to the API. Never retries.
pub struct DirectPersistence {
    config: Config,
    api: Arc<dyn ApiTransport>,
}

impl DirectPersistence {
    pub fn new(config: Config, api: Arc<dyn ApiTransport>) -> Self {
        Self { config, api }
    }
}

#[async_trait]
impl PersistenceStrategy for DirectPersistence {
    async fn persist(&self, collection: &str, event: Event) -> Result<(), Error> {
        validate_collection(collection)?;
        let key = self.config.require_write_key()?;

        let path = format!("events/{}", urlencoding::encode(collection));
        let body = serde_json::to_value(&event)?;
        self.api.post(&path, &body, key).await?;

        debug!(collection, "event added");
        Ok(())
    }

    async fn persist_batch(&self, events: EventBatch) -> Result<(), Error> {
        send_batch(&self.config, self.api.as_ref(), &events).await
    }
}

/// Issue one batched write and log any per-event failures the API reports.
async fn send_batch(
    config: &Config,
    api: &dyn ApiTransport,
    events: &EventBatch,
) -> Result<(), Error> {
    for collection in events.keys() {
        validate_collection(collection)?;
    }
    let key = config.require_write_key()?;

    let event_count: usize = events.values().map(Vec::len).sum();
    debug!(
        collections = events.len(),
        event_count, "sending event batch"
    );

    let body = serde_json::to_value(events)?;
    let response = api.post("events", &body, key).await?;

    log_batch_failures(&response);
    debug!(event_count, "event batch sent");
    Ok(())
}

/// The batch endpoint answers `{collection: [{"success": bool, ...}, ...]}`.
fn log_batch_failures(response: &Value) {
    let Some(collections) = response.as_object() else {
        return;
    };
    for (collection, statuses) in collections {
        let Some(statuses) = statuses.as_array() else {
            continue;
        };
        for (index, status) in statuses.iter().enumerate() {
            if status.get("success").and_then(Value::as_bool) == Some(false) {
                let error = status.get("error").unwrap_or(&serde_json::Value::Null);
                warn!(
                    collection = %collection,
                    index,
                    error = %error,
                    "event processing error"
                );
            }
        }
    }
}

/// Buffers events and writes them as one batch once a threshold is hit or
/// on [`flush`](PersistenceStrategy::flush).
///
/// An event is recorded once it is queued. If the flush it triggers fails,
/// `persist` still succeeds and the event stays queued for the next flush;
/// only an explicit `flush` reports the send error.
pub struct BatchedPersistence {
    config: Config,
    api: Arc<dyn ApiTransport>,
    queue: EventQueue,
    settings: BatchSettings,
}

impl BatchedPersistence {
    pub fn new(
        config: Config,
        api: Arc<dyn ApiTransport>,
        settings: BatchSettings,
    ) -> Result<Self, Error> {
        settings.validate()?;
        Ok(Self {
            config,
            api,
            queue: EventQueue::new(),
            settings,
        })
    }

    pub fn settings(&self) -> BatchSettings {
        self.settings
    }

    #[instrument(skip(self))]
    async fn flush_pending(&self) -> Result<(), Error> {
        let snapshot = self.queue.drain().await;
        if snapshot.is_empty() {
            return Ok(());
        }

        info!(event_count = snapshot.event_count(), "flushing events");

        if let Err(e) = send_batch(&self.config, self.api.as_ref(), &snapshot.events).await {
            error!(error = %e, "flush failed, requeuing events");
            self.queue.requeue(snapshot).await;
            return Err(e);
        }

        Ok(())
    }

    /// Flush when a threshold is reached. A failed send leaves the events
    /// queued and is not reported to the caller that queued them.
    async fn flush_if_due(&self) {
        let due = self
            .queue
            .should_flush(self.settings.max_events, self.settings.max_age)
            .await;
        if due && self.flush_pending().await.is_err() {
            let pending = self.queue.len().await;
            debug!(pending, "events kept for the next flush");
        }
    }
}

#[async_trait]
impl PersistenceStrategy for BatchedPersistence {
    async fn persist(&self, collection: &str, event: Event) -> Result<(), Error> {
        validate_collection(collection)?;
        self.config.require_write_key()?;

        self.queue.enqueue(collection, event).await;
        self.flush_if_due().await;
        Ok(())
    }

    async fn persist_batch(&self, events: EventBatch) -> Result<(), Error> {
        for collection in events.keys() {
            validate_collection(collection)?;
        }
        self.config.require_write_key()?;

        for (collection, list) in events {
            for event in list {
                self.queue.enqueue(&collection, event).await;
            }
        }
        self.flush_if_due().await;
        Ok(())
    }

    async fn flush(&self) -> Result<(), Error> {
        self.flush_pending().await
    }

    async fn pending_event_count(&self) -> usize {
        self.queue.len().await
    }
}
