//! Keen event analytics SDK for Rust.
//!
//! Record events into collections and run analyses over them. Events reach
//! the API through a pluggable [`PersistenceStrategy`]: written directly,
//! batched in memory, or handed to your own transport.
//!
//! # Example
//!
//! ```rust,ignore
//! use keen::{BatchSettings, KeenClient, Persistence, QueryParams};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), keen::Error> {
//!     let client = KeenClient::builder("5004ded1163d66114f000000")
//!         .write_key("write_key")
//!         .read_key("read_key")
//!         .persistence(Persistence::Batched(BatchSettings::default()))
//!         .build()?;
//!
//!     client.add_event("sign_ups", json!({"username": "timmy"})).await?;
//!     client.flush().await?;
//!
//!     let count = client
//!         .count("sign_ups", QueryParams::new().timeframe("today"))
//!         .await?;
//!     println!("{count}");
//!     Ok(())
//! }
//! ```

mod api;
mod beacon;
mod client;
mod config;
mod error;
mod event;
mod persistence;
mod query;
mod queue;
pub mod scoped_keys;

pub use api::{ApiRequestor, ApiTransport, ResponseShape};
pub use beacon::image_beacon_url;
pub use client::KeenClient;
pub use config::{Config, KeenClientBuilder};
pub use error::Error;
pub use event::{validate_collection, Event, EventBatch};
pub use persistence::{
    BatchSettings, BatchedPersistence, DirectPersistence, Persistence, PersistenceStrategy,
};
pub use query::{Filter, GroupBy, QueryKind, QueryParams, Timeframe};
pub use scoped_keys::{Operation, ScopedKeyPermissions};
