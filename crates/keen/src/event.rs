//! Events and event batches.

use crate::Error;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Events to write in one request, keyed by collection name.
pub type EventBatch = BTreeMap<String, Vec<Event>>;

/// Reject empty collection names.
pub fn validate_collection(collection: &str) -> Result<(), Error> {
    if collection.is_empty() {
        return Err(Error::InvalidEvent("collection name cannot be empty".into()));
    }
    Ok(())
}

/// A single event: a property map plus an optional timestamp.
///
/// The timestamp is written into the body as `keen.timestamp`.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    properties: Map<String, Value>,
    timestamp: Option<DateTime<Utc>>,
}

impl Event {
    /// Create an event from a property map.
    pub fn new(properties: Map<String, Value>) -> Self {
        Self {
            properties,
            timestamp: None,
        }
    }

    /// Create an event from anything that serializes to a JSON object.
    pub fn from_serialize(properties: impl Serialize) -> Result<Self, Error> {
        match serde_json::to_value(properties)? {
            Value::Object(map) => Ok(Self::new(map)),
            other => Err(Error::InvalidEvent(format!(
                "event must be a JSON object, got {}",
                json_kind(&other)
            ))),
        }
    }

    /// Set the event timestamp.
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn properties(&self) -> &Map<String, Value> {
        &self.properties
    }

    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.timestamp
    }

    /// The JSON body sent to the API.
    pub fn to_body(&self) -> Map<String, Value> {
        let mut body = self.properties.clone();
        if let Some(ts) = self.timestamp {
            let stamp = Value::String(ts.to_rfc3339_opts(SecondsFormat::Millis, true));
            match body.get_mut("keen") {
                Some(Value::Object(keen)) => {
                    keen.insert("timestamp".into(), stamp);
                }
                _ => {
                    let mut keen = Map::new();
                    keen.insert("timestamp".into(), stamp);
                    body.insert("keen".into(), Value::Object(keen));
                }
            }
        }
        body
    }
}

impl Serialize for Event {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_body().serialize(serializer)
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
