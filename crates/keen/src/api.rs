//! HTTP requests against the Keen API.

use crate::config::Config;
use crate::Error;
use async_trait::async_trait;
use reqwest::{RequestBuilder, StatusCode};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

/// Which part of a successful response body the caller wants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseShape {
    /// The whole JSON body.
    Body,
    /// The `result` field; a missing field is an error.
    ResultField,
    /// The `result` field when the body is an object carrying one,
    /// otherwise the whole body.
    ResultOrBody,
}

impl ResponseShape {
    /// Pick the wanted part out of a decoded success body.
    pub fn extract(self, body: Value) -> Result<Value, Error> {
        match (self, body) {
            (ResponseShape::Body, body) => Ok(body),
            (ResponseShape::ResultField, Value::Object(mut map)) => {
                map.remove("result").ok_or_else(|| missing_result(&Value::Object(map)))
            }
            (ResponseShape::ResultField, other) => Err(missing_result(&other)),
            (ResponseShape::ResultOrBody, Value::Object(mut map)) if map.contains_key("result") => {
                Ok(map.remove("result").unwrap_or(Value::Null))
            }
            (ResponseShape::ResultOrBody, other) => Ok(other),
        }
    }
}

fn missing_result(body: &Value) -> Error {
    Error::InvalidResponse(format!("response has no result field: {}", body))
}

/// Sends requests to the Keen API on behalf of a client.
///
/// [`ApiRequestor`] is the HTTP implementation. Supply another one through
/// [`KeenClientBuilder::api`](crate::KeenClientBuilder::api) to route reads
/// and writes elsewhere. Paths are relative to the project, e.g.
/// `events/purchases` or `queries/count`, and both methods return the decoded
/// response body.
#[async_trait]
pub trait ApiTransport: Send + Sync {
    /// POST a JSON body authorized with `key`.
    async fn post(&self, path: &str, body: &Value, key: &str) -> Result<Value, Error>;

    /// GET with query parameters authorized with `key`.
    async fn get(&self, path: &str, params: &[(&str, String)], key: &str)
        -> Result<Value, Error>;
}

/// Issues authenticated requests to `{base_url}/{api_version}/projects/{project_id}`.
#[derive(Debug)]
pub struct ApiRequestor {
    client: reqwest::Client,
    config: Config,
    project_url: String,
}

impl ApiRequestor {
    /// Create a new requestor.
    pub fn new(config: &Config) -> Result<Self, Error> {
        let client = reqwest::Client::builder().build()?;

        Ok(Self {
            client,
            project_url: config.project_url(),
            config: config.clone(),
        })
    }

    /// Full URL for a project-relative path.
    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.project_url, path.trim_start_matches('/'))
    }

    async fn execute(
        &self,
        request: RequestBuilder,
        key: &str,
        timeout: Duration,
    ) -> Result<Value, Error> {
        // Transport errors (timeouts included) pass through untouched.
        let response = request
            .header(reqwest::header::AUTHORIZATION, key)
            .timeout(timeout)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            let err = api_error(status, &text);
            warn!(status = %status, error = %err, "API request failed");
            return Err(err);
        }

        if text.trim().is_empty() {
            return Ok(Value::Null);
        }

        Ok(serde_json::from_str(&text)?)
    }
}

#[async_trait]
impl ApiTransport for ApiRequestor {
    /// Uses the write timeout.
    async fn post(&self, path: &str, body: &Value, key: &str) -> Result<Value, Error> {
        let url = self.url(path);
        debug!(url = %url, "POST");

        let request = self.client.post(&url).json(body);
        self.execute(request, key, self.config.post_timeout()).await
    }

    /// Uses the query timeout.
    async fn get(
        &self,
        path: &str,
        params: &[(&str, String)],
        key: &str,
    ) -> Result<Value, Error> {
        let url = self.url(path);
        debug!(url = %url, params = params.len(), "GET");

        let request = self.client.get(&url).query(params);
        self.execute(request, key, self.config.get_timeout()).await
    }
}

/// Build the error for a non-success response.
///
/// Uses the API's `message` and `error_code` when the body carries them and
/// falls back to the raw body (or the status reason when it is empty).
pub(crate) fn api_error(status: StatusCode, text: &str) -> Error {
    let parsed = serde_json::from_str::<Value>(text).ok();
    let message = parsed
        .as_ref()
        .and_then(|v| v.get("message"))
        .and_then(Value::as_str)
        .map(str::to_string);
    let error_code = parsed
        .as_ref()
        .and_then(|v| v.get("error_code"))
        .filter(|v| !v.is_null())
        .cloned();

    Error::Api {
        status: status.as_u16(),
        error_code,
        message: message.unwrap_or_else(|| fallback_message(status, text)),
    }
}

fn fallback_message(status: StatusCode, text: &str) -> String {
    let text = text.trim();
    if text.is_empty() {
        status.canonical_reason().unwrap_or("no response body").to_string()
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::KeenClientBuilder;
    use serde_json::json;

    fn requestor() -> ApiRequestor {
        let (config, _) = KeenClientBuilder::new("5004ded1163d66114f000000")
            .base_url("https://example.com")
            .into_parts()
            .unwrap();
        ApiRequestor::new(&config).unwrap()
    }

    #[test]
    fn test_url_construction() {
        let api = requestor();

        assert_eq!(
            api.url("events/purchases"),
            "https://example.com/3.0/projects/5004ded1163d66114f000000/events/purchases"
        );
        assert_eq!(
            api.url("/queries/count"),
            "https://example.com/3.0/projects/5004ded1163d66114f000000/queries/count"
        );
    }

    #[test]
    fn test_api_error_uses_body_fields() {
        let err = api_error(
            StatusCode::UNAUTHORIZED,
            r#"{"message": "authorization error", "error_code": 401}"#,
        );

        match err {
            Error::Api {
                status,
                error_code,
                message,
            } => {
                assert_eq!(status, 401);
                assert_eq!(error_code, Some(json!(401)));
                assert_eq!(message, "authorization error");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_api_error_degrades_on_unparseable_body() {
        let err = api_error(StatusCode::BAD_GATEWAY, "<html>bad gateway</html>");

        match err {
            Error::Api {
                status,
                error_code,
                message,
            } => {
                assert_eq!(status, 502);
                assert!(error_code.is_none());
                assert_eq!(message, "<html>bad gateway</html>");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_api_error_display_names_status_once() {
        let err = api_error(StatusCode::INTERNAL_SERVER_ERROR, "upstream exploded");
        assert_eq!(
            err.to_string(),
            "Keen API error (HTTP 500): upstream exploded"
        );

        let empty = api_error(StatusCode::SERVICE_UNAVAILABLE, "");
        assert_eq!(
            empty.to_string(),
            "Keen API error (HTTP 503): Service Unavailable"
        );
    }

    #[test]
    fn test_response_shapes() {
        let body = json!({"result": 2});
        assert_eq!(ResponseShape::Body.extract(body.clone()).unwrap(), body);
        assert_eq!(
            ResponseShape::ResultField.extract(body.clone()).unwrap(),
            json!(2)
        );
        assert_eq!(
            ResponseShape::ResultOrBody.extract(body).unwrap(),
            json!(2)
        );

        let raw = json!([{"value": 1}]);
        assert_eq!(
            ResponseShape::ResultOrBody.extract(raw.clone()).unwrap(),
            raw
        );
        assert!(matches!(
            ResponseShape::ResultField.extract(raw),
            Err(Error::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_success_without_result_is_not_an_api_error() {
        let err = ResponseShape::ResultField
            .extract(json!({"message": "ok"}))
            .unwrap_err();

        assert!(matches!(err, Error::InvalidResponse(_)));
        assert!(err.error_code().is_none());
    }
}
