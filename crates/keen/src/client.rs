//! Keen client implementation.

use crate::api::{ApiRequestor, ApiTransport, ResponseShape};
use crate::beacon::image_beacon_url;
use crate::config::{Config, KeenClientBuilder};
use crate::event::{validate_collection, Event, EventBatch};
use crate::persistence::PersistenceStrategy;
use crate::query::{QueryKind, QueryParams};
use crate::scoped_keys::{self, ScopedKeyPermissions};
use crate::Error;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, error, info, instrument};

/// Keen analytics client.
///
/// Writes go through the configured [`PersistenceStrategy`]; queries go
/// straight to the API. Keys are checked when an operation needs them, so a
/// client holding only a read key can still be built and used for queries.
/// Every write needs a write key, whichever strategy delivers it.
///
/// # Example
///
/// ```rust,no_run
/// use keen::{KeenClient, QueryParams};
/// use serde_json::json;
///
/// #[tokio::main]
/// async fn main() -> Result<(), keen::Error> {
///     let client = KeenClient::builder("5004ded1163d66114f000000")
///         .write_key("write_key")
///         .read_key("read_key")
///         .build()?;
///
///     client.add_event("purchases", json!({"price": 5})).await?;
///
///     let total = client
///         .sum("purchases", "price", QueryParams::new().timeframe("this_7_days"))
///         .await?;
///     println!("{total}");
///
///     client.flush().await?;
///     Ok(())
/// }
/// ```
pub struct KeenClient {
    config: Config,
    api: Arc<dyn ApiTransport>,
    persistence: Arc<dyn PersistenceStrategy>,
}

impl KeenClient {
    /// Create a new builder for the given project.
    pub fn builder(project_id: impl Into<String>) -> KeenClientBuilder {
        KeenClientBuilder::new(project_id)
    }

    /// Create a builder from `KEEN_*` environment variables.
    pub fn builder_from_env() -> Result<KeenClientBuilder, Error> {
        KeenClientBuilder::from_env()
    }

    /// Get the client configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get the persistence strategy in use.
    pub fn persistence_strategy(&self) -> &Arc<dyn PersistenceStrategy> {
        &self.persistence
    }

    /// Get the number of events the persistence strategy has not sent yet.
    pub async fn pending_event_count(&self) -> usize {
        self.persistence.pending_event_count().await
    }

    // ============================================
    // WRITES
    // ============================================

    /// Add one event to a collection.
    ///
    /// `properties` must serialize to a JSON object.
    pub async fn add_event(
        &self,
        collection: &str,
        properties: impl Serialize,
    ) -> Result<(), Error> {
        let event = Event::from_serialize(properties)?;
        self.persist(collection, event).await
    }

    /// Add one event with an explicit timestamp.
    pub async fn add_event_at(
        &self,
        collection: &str,
        properties: impl Serialize,
        timestamp: DateTime<Utc>,
    ) -> Result<(), Error> {
        let event = Event::from_serialize(properties)?.with_timestamp(timestamp);
        self.persist(collection, event).await
    }

    /// Add a prepared [`Event`].
    pub async fn persist(&self, collection: &str, event: Event) -> Result<(), Error> {
        validate_collection(collection)?;
        self.config.require_write_key()?;
        self.persistence.persist(collection, event).await
    }

    /// Add events to several collections in one request.
    ///
    /// Every event must serialize to a JSON object.
    pub async fn add_events<E: Serialize>(
        &self,
        events: BTreeMap<String, Vec<E>>,
    ) -> Result<(), Error> {
        let mut batch = EventBatch::new();
        for (collection, list) in events {
            validate_collection(&collection)?;
            let list = list
                .into_iter()
                .map(Event::from_serialize)
                .collect::<Result<Vec<_>, _>>()?;
            batch.insert(collection, list);
        }
        self.config.require_write_key()?;
        self.persistence.persist_batch(batch).await
    }

    /// Deliver any events the persistence strategy is holding back.
    #[instrument(skip(self))]
    pub async fn flush(&self) -> Result<(), Error> {
        self.persistence.flush().await
    }

    /// Flush on a background task every `every` until the handle is aborted.
    ///
    /// Nothing is flushed in the background unless this is called.
    pub fn spawn_flush_timer(&self, every: Duration) -> JoinHandle<()> {
        let persistence = Arc::clone(&self.persistence);

        tokio::spawn(async move {
            let mut timer = interval(every);

            loop {
                timer.tick().await;

                debug!("periodic flush");
                if let Err(e) = persistence.flush().await {
                    error!(error = %e, "periodic flush failed");
                }
            }
        })
    }

    // ============================================
    // IMAGE BEACONS
    // ============================================

    /// Build a URL that records an event when fetched. Issues no request.
    pub fn generate_image_beacon(
        &self,
        collection: &str,
        properties: impl Serialize,
        timestamp: Option<DateTime<Utc>>,
    ) -> Result<String, Error> {
        let write_key = self.config.require_write_key()?;

        let mut event = Event::from_serialize(properties)?;
        if let Some(ts) = timestamp {
            event = event.with_timestamp(ts);
        }

        image_beacon_url(&self.config, write_key, collection, &event)
    }

    // ============================================
    // QUERIES
    // ============================================

    /// Run a query of any kind.
    ///
    /// The named methods (`count`, `sum`, ...) are shorthands for this.
    #[instrument(skip(self, params))]
    pub async fn query(&self, kind: QueryKind, params: QueryParams) -> Result<Value, Error> {
        let key = self.config.require_read_key()?;
        params.validate(kind)?;

        let pairs = params.to_query_pairs()?;
        let shape = if kind.returns_raw() {
            ResponseShape::ResultOrBody
        } else {
            ResponseShape::ResultField
        };

        let path = format!("queries/{}", kind.endpoint());
        let body = self.api.get(&path, &pairs, key).await?;
        let result = shape.extract(body)?;
        debug!("query complete");
        Ok(result)
    }

    // ============================================
    // SCOPED KEYS
    // ============================================

    /// Derive a scoped key from the configured master key.
    pub fn scoped_key(&self, permissions: &ScopedKeyPermissions) -> Result<String, Error> {
        let master_key = self.master_key()?;
        scoped_keys::encrypt(master_key, permissions)
    }

    /// Read the permissions carried by a scoped key issued under the configured master key.
    pub fn decrypt_scoped_key(&self, token: &str) -> Result<ScopedKeyPermissions, Error> {
        let master_key = self.master_key()?;
        scoped_keys::decrypt(master_key, token)
    }

    fn master_key(&self) -> Result<&str, Error> {
        self.config.master_key().ok_or_else(|| {
            Error::InvalidEnvironment("a master key is required for scoped keys".into())
        })
    }
}

impl KeenClientBuilder {
    /// Build the Keen client.
    pub fn build(mut self) -> Result<KeenClient, Error> {
        let custom_api = self.take_api();
        let (config, persistence) = self.into_parts()?;
        let api: Arc<dyn ApiTransport> = match custom_api {
            Some(api) => api,
            None => Arc::new(ApiRequestor::new(&config)?),
        };
        let persistence = persistence.resolve(&config, &api)?;

        info!(project_id = %config.project_id(), "keen client created");

        Ok(KeenClient {
            config,
            api,
            persistence,
        })
    }
}
