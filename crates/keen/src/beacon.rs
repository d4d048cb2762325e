//! Image beacon URLs.
//!
//! A beacon records an event when something (usually an `<img>` tag) fetches
//! it. Since no auth header can be attached to such a fetch, the write key
//! travels in the query string.

use crate::config::Config;
use crate::event::{validate_collection, Event};
use crate::Error;
use base64::{engine::general_purpose::STANDARD, Engine};

/// Build `{project_url}/events/{collection}?api_key={write_key}&data={base64 json}`.
pub fn image_beacon_url(
    config: &Config,
    write_key: &str,
    collection: &str,
    event: &Event,
) -> Result<String, Error> {
    validate_collection(collection)?;

    let json = serde_json::to_string(event)?;
    let data = STANDARD.encode(json.as_bytes());

    Ok(format!(
        "{}/events/{}?api_key={}&data={}",
        config.project_url(),
        urlencoding::encode(collection),
        write_key,
        data
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::KeenClientBuilder;
    use serde_json::json;

    #[test]
    fn test_beacon_escapes_collection_only() {
        let (config, _) = KeenClientBuilder::new("pid").into_parts().unwrap();
        let event = Event::from_serialize(json!({"a": "b"})).unwrap();

        let url = image_beacon_url(&config, "wk", "python_test hello!?", &event).unwrap();

        assert_eq!(
            url,
            format!(
                "https://api.keen.io/3.0/projects/pid/events/python_test%20hello%21%3F?api_key=wk&data={}",
                STANDARD.encode(r#"{"a":"b"}"#)
            )
        );
    }

    #[test]
    fn test_beacon_rejects_empty_collection() {
        let (config, _) = KeenClientBuilder::new("pid").into_parts().unwrap();
        let event = Event::from_serialize(json!({})).unwrap();

        assert!(matches!(
            image_beacon_url(&config, "wk", "", &event),
            Err(Error::InvalidEvent(_))
        ));
    }
}
