//! Client configuration.

use crate::api::ApiTransport;
use crate::persistence::Persistence;
use crate::Error;
use std::sync::Arc;
use std::time::Duration;

/// Default API base URL.
pub const DEFAULT_BASE_URL: &str = "https://api.keen.io";

/// Default API version.
pub const DEFAULT_API_VERSION: &str = "3.0";

/// Default timeout for write requests.
pub const DEFAULT_POST_TIMEOUT: Duration = Duration::from_secs(305);

/// Default timeout for query requests.
pub const DEFAULT_GET_TIMEOUT: Duration = Duration::from_secs(305);

/// Environment variable names read by [`KeenClientBuilder::from_env`].
pub const ENV_PROJECT_ID: &str = "KEEN_PROJECT_ID";
pub const ENV_WRITE_KEY: &str = "KEEN_WRITE_KEY";
pub const ENV_READ_KEY: &str = "KEEN_READ_KEY";
pub const ENV_MASTER_KEY: &str = "KEEN_MASTER_KEY";
pub const ENV_BASE_URL: &str = "KEEN_BASE_URL";
pub const ENV_API_VERSION: &str = "KEEN_API_VERSION";
pub const ENV_PERSISTENCE_STRATEGY: &str = "KEEN_PERSISTENCE_STRATEGY";

/// Keen client configuration. Immutable once built.
#[derive(Clone)]
pub struct Config {
    pub(crate) project_id: String,
    pub(crate) write_key: Option<String>,
    pub(crate) read_key: Option<String>,
    pub(crate) master_key: Option<String>,
    pub(crate) base_url: String,
    pub(crate) api_version: String,
    pub(crate) post_timeout: Duration,
    pub(crate) get_timeout: Duration,
}

impl Config {
    /// Get the project id.
    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    /// Get the write key, if configured.
    pub fn write_key(&self) -> Option<&str> {
        self.write_key.as_deref()
    }

    /// Get the read key, if configured.
    pub fn read_key(&self) -> Option<&str> {
        self.read_key.as_deref()
    }

    /// Get the master key, if configured.
    pub fn master_key(&self) -> Option<&str> {
        self.master_key.as_deref()
    }

    /// The write key, or `InvalidEnvironment` when none is configured.
    pub(crate) fn require_write_key(&self) -> Result<&str, Error> {
        self.write_key().ok_or_else(|| {
            Error::InvalidEnvironment(
                "a write key is required to add events; set one on the client".into(),
            )
        })
    }

    /// The read key, or `InvalidEnvironment` when none is configured.
    pub(crate) fn require_read_key(&self) -> Result<&str, Error> {
        self.read_key().ok_or_else(|| {
            Error::InvalidEnvironment(
                "a read key is required to run queries; set one on the client".into(),
            )
        })
    }

    /// Get the API base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Get the API version.
    pub fn api_version(&self) -> &str {
        &self.api_version
    }

    /// Get the write request timeout.
    pub fn post_timeout(&self) -> Duration {
        self.post_timeout
    }

    /// Get the query request timeout.
    pub fn get_timeout(&self) -> Duration {
        self.get_timeout
    }

    /// `{base_url}/{api_version}/projects/{project_id}`
    pub fn project_url(&self) -> String {
        format!(
            "{}/{}/projects/{}",
            self.base_url, self.api_version, self.project_id
        )
    }
}

// Keys stay out of logs and panics.
impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("project_id", &self.project_id)
            .field("write_key", &self.write_key.as_ref().map(|_| "<redacted>"))
            .field("read_key", &self.read_key.as_ref().map(|_| "<redacted>"))
            .field("master_key", &self.master_key.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .field("api_version", &self.api_version)
            .field("post_timeout", &self.post_timeout)
            .field("get_timeout", &self.get_timeout)
            .finish()
    }
}

/// Builder for [`KeenClient`](crate::KeenClient).
pub struct KeenClientBuilder {
    project_id: String,
    write_key: Option<String>,
    read_key: Option<String>,
    master_key: Option<String>,
    base_url: Option<String>,
    api_version: Option<String>,
    post_timeout: Option<Duration>,
    get_timeout: Option<Duration>,
    persistence: Persistence,
    api: Option<Arc<dyn ApiTransport>>,
}

impl KeenClientBuilder {
    /// Create a new builder for the given project.
    pub fn new(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            write_key: None,
            read_key: None,
            master_key: None,
            base_url: None,
            api_version: None,
            post_timeout: None,
            get_timeout: None,
            persistence: Persistence::Direct,
            api: None,
        }
    }

    /// Create a builder from the process environment.
    ///
    /// `KEEN_PROJECT_ID` is required; every other variable is optional and
    /// can still be overridden through the setters afterwards.
    pub fn from_env() -> Result<Self, Error> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Create a builder from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.is_empty());

        let project_id = var(ENV_PROJECT_ID).ok_or_else(|| {
            Error::InvalidEnvironment(format!(
                "please set the {} environment variable",
                ENV_PROJECT_ID
            ))
        })?;

        let mut builder = Self::new(project_id);
        builder.write_key = var(ENV_WRITE_KEY);
        builder.read_key = var(ENV_READ_KEY);
        builder.master_key = var(ENV_MASTER_KEY);
        builder.base_url = var(ENV_BASE_URL);
        builder.api_version = var(ENV_API_VERSION);
        if let Some(name) = var(ENV_PERSISTENCE_STRATEGY) {
            builder.persistence = name.parse()?;
        }

        Ok(builder)
    }

    /// Set the write key.
    pub fn write_key(mut self, key: impl Into<String>) -> Self {
        self.write_key = Some(key.into());
        self
    }

    /// Set the read key.
    pub fn read_key(mut self, key: impl Into<String>) -> Self {
        self.read_key = Some(key.into());
        self
    }

    /// Set the master key, used to derive scoped keys.
    pub fn master_key(mut self, key: impl Into<String>) -> Self {
        self.master_key = Some(key.into());
        self
    }

    /// Set the API base URL.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Set the API version.
    pub fn api_version(mut self, version: impl Into<String>) -> Self {
        self.api_version = Some(version.into());
        self
    }

    /// Set the timeout for event writes.
    pub fn post_timeout(mut self, timeout: Duration) -> Self {
        self.post_timeout = Some(timeout);
        self
    }

    /// Set the timeout for queries.
    pub fn get_timeout(mut self, timeout: Duration) -> Self {
        self.get_timeout = Some(timeout);
        self
    }

    /// Choose how events reach the API. Defaults to [`Persistence::Direct`].
    pub fn persistence(mut self, persistence: Persistence) -> Self {
        self.persistence = persistence;
        self
    }

    /// Send requests through `api` instead of the built-in HTTP requestor.
    ///
    /// Keys are still checked by the client and passed to the transport on
    /// every call.
    pub fn api(mut self, api: Arc<dyn ApiTransport>) -> Self {
        self.api = Some(api);
        self
    }

    pub(crate) fn take_api(&mut self) -> Option<Arc<dyn ApiTransport>> {
        self.api.take()
    }

    /// Validate and split into configuration and persistence choice.
    pub(crate) fn into_parts(self) -> Result<(Config, Persistence), Error> {
        if self.project_id.trim().is_empty() {
            return Err(Error::InvalidProjectId {
                project_id: self.project_id,
            });
        }

        let base_url = self
            .base_url
            .unwrap_or_else(|| DEFAULT_BASE_URL.into())
            .trim_end_matches('/')
            .to_string();

        let config = Config {
            project_id: self.project_id,
            write_key: self.write_key,
            read_key: self.read_key,
            master_key: self.master_key,
            base_url,
            api_version: self.api_version.unwrap_or_else(|| DEFAULT_API_VERSION.into()),
            post_timeout: self.post_timeout.unwrap_or(DEFAULT_POST_TIMEOUT),
            get_timeout: self.get_timeout.unwrap_or(DEFAULT_GET_TIMEOUT),
        };

        Ok((config, self.persistence))
    }
}

impl std::fmt::Debug for KeenClientBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeenClientBuilder")
            .field("project_id", &self.project_id)
            .field("write_key", &self.write_key.as_ref().map(|_| "<redacted>"))
            .field("read_key", &self.read_key.as_ref().map(|_| "<redacted>"))
            .field("master_key", &self.master_key.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .field("persistence", &self.persistence)
            .field("api", &self.api.as_ref().map(|_| "custom"))
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| map.get(name).cloned()
    }

    #[test]
    fn test_builder_defaults() {
        let (config, persistence) = KeenClientBuilder::new("project_id").into_parts().unwrap();

        assert_eq!(config.project_id(), "project_id");
        assert_eq!(config.base_url(), DEFAULT_BASE_URL);
        assert_eq!(config.api_version(), DEFAULT_API_VERSION);
        assert_eq!(config.post_timeout(), DEFAULT_POST_TIMEOUT);
        assert_eq!(config.get_timeout(), DEFAULT_GET_TIMEOUT);
        assert!(config.write_key().is_none());
        assert!(config.read_key().is_none());
        assert!(matches!(persistence, Persistence::Direct));
    }

    #[test]
    fn test_builder_custom_values() {
        let (config, _) = KeenClientBuilder::new("project_id")
            .write_key("wk")
            .read_key("rk")
            .base_url("https://custom.example.com/")
            .api_version("4.0")
            .post_timeout(Duration::from_secs(5))
            .get_timeout(Duration::from_millis(100))
            .into_parts()
            .unwrap();

        assert_eq!(config.write_key(), Some("wk"));
        assert_eq!(config.read_key(), Some("rk"));
        assert_eq!(config.base_url(), "https://custom.example.com");
        assert_eq!(config.post_timeout(), Duration::from_secs(5));
        assert_eq!(config.get_timeout(), Duration::from_millis(100));
        assert_eq!(
            config.project_url(),
            "https://custom.example.com/4.0/projects/project_id"
        );
    }

    #[test]
    fn test_empty_project_id_carries_value() {
        for bad in ["", "   "] {
            match KeenClientBuilder::new(bad).into_parts() {
                Err(Error::InvalidProjectId { project_id }) => assert_eq!(project_id, bad),
                other => panic!("expected InvalidProjectId, got {:?}", other.map(|_| ())),
            }
        }
    }

    #[test]
    fn test_debug_redacts_keys() {
        let (config, _) = KeenClientBuilder::new("p")
            .write_key("secret_write")
            .into_parts()
            .unwrap();

        let debug = format!("{:?}", config);
        assert!(!debug.contains("secret_write"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn test_required_keys_are_environment_errors() {
        let (config, _) = KeenClientBuilder::new("p").into_parts().unwrap();
        assert!(matches!(
            config.require_write_key(),
            Err(Error::InvalidEnvironment(_))
        ));
        assert!(matches!(
            config.require_read_key(),
            Err(Error::InvalidEnvironment(_))
        ));

        let (config, _) = KeenClientBuilder::new("p")
            .write_key("wk")
            .read_key("rk")
            .into_parts()
            .unwrap();
        assert_eq!(config.require_write_key().unwrap(), "wk");
        assert_eq!(config.require_read_key().unwrap(), "rk");
    }

    #[test]
    fn test_from_lookup_reads_all_variables() {
        let builder = KeenClientBuilder::from_lookup(lookup(&[
            (ENV_PROJECT_ID, "12345"),
            (ENV_WRITE_KEY, "abcde"),
            (ENV_BASE_URL, "http://localhost:9000"),
            (ENV_PERSISTENCE_STRATEGY, "batched"),
        ]))
        .unwrap();

        let (config, persistence) = builder.into_parts().unwrap();
        assert_eq!(config.project_id(), "12345");
        assert_eq!(config.write_key(), Some("abcde"));
        assert!(config.read_key().is_none());
        assert_eq!(config.base_url(), "http://localhost:9000");
        assert!(matches!(persistence, Persistence::Batched(_)));
    }

    #[test]
    fn test_from_lookup_requires_project_id() {
        let result = KeenClientBuilder::from_lookup(lookup(&[(ENV_WRITE_KEY, "abcde")]));
        assert!(matches!(result, Err(Error::InvalidEnvironment(_))));

        let result = KeenClientBuilder::from_lookup(lookup(&[(ENV_PROJECT_ID, "")]));
        assert!(matches!(result, Err(Error::InvalidEnvironment(_))));
    }

    #[test]
    fn test_from_lookup_rejects_unknown_strategy() {
        let result = KeenClientBuilder::from_lookup(lookup(&[
            (ENV_PROJECT_ID, "12345"),
            (ENV_PERSISTENCE_STRATEGY, "abc"),
        ]));
        assert!(matches!(result, Err(Error::InvalidPersistenceStrategy(_))));
    }
}
