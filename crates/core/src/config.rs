use std::sync::RwLock;

use serde::Deserialize;
use uuid::Uuid;

use crate::error::{OmniError, OmniResult};

/// SDK initialization record. Deserialized from the host's init call
/// (camelCase keys on the wire, matching the ingestion contract).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SdkConfig {
    /// Tenant identifier. Required.
    #[serde(default)]
    pub project_id: String,
    /// Absolute URL of the ingestion endpoint. Required.
    #[serde(default)]
    pub endpoint: String,
    /// Overrides the generated anonymous client id.
    #[serde(default)]
    pub client_id: Option<String>,
    /// Authenticated user, if any.
    #[serde(default)]
    pub user_id: Option<String>,
    /// Auto-flush count threshold.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Auto-flush time threshold in milliseconds.
    #[serde(default = "default_batch_timeout")]
    pub batch_timeout: u64,
    /// Verbose per-event logging.
    #[serde(default)]
    pub debug: bool,
    #[serde(default = "default_session_storage_key")]
    pub session_storage_key: String,
    /// Reserved for error capture.
    #[serde(default)]
    pub capture_errors: bool,
    /// Inactivity window in milliseconds after which a stored session rotates.
    #[serde(default = "default_session_timeout")]
    pub session_timeout: u64,
    /// Consent hook: when set, events are accepted and dropped without error.
    #[serde(default)]
    pub disabled: bool,
    #[serde(default)]
    pub snapshot: SnapshotConfig,
    #[serde(default)]
    pub privacy: PrivacyConfig,
    #[serde(default)]
    pub transport: TransportConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_true")]
    pub capture_initial: bool,
    #[serde(default = "default_true")]
    pub capture_mutations: bool,
    #[serde(default = "default_mutation_throttle_ms")]
    pub mutation_throttle_ms: u64,
    #[serde(default)]
    pub capture_periodic: bool,
    #[serde(default = "default_periodic_interval_ms")]
    pub periodic_interval_ms: u64,
    #[serde(default = "default_max_snapshot_size_bytes")]
    pub max_snapshot_size_bytes: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrivacyConfig {
    /// Elements matching these selectors are removed from snapshots entirely.
    #[serde(default)]
    pub block_selectors: Vec<String>,
    /// Elements matching these selectors have values and text masked.
    #[serde(default)]
    pub mask_selectors: Vec<String>,
    #[serde(default)]
    pub disable_snapshots: bool,
    #[serde(default = "default_max_node_text_length")]
    pub max_node_text_length: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransportConfig {
    /// Per-request timeout; the in-flight request is aborted when it elapses.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default)]
    pub retry: RetryPolicy,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryPolicy {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
}

// Default functions
fn default_batch_size() -> usize {
    50
}
fn default_batch_timeout() -> u64 {
    10_000
}
fn default_session_storage_key() -> String {
    "omni_session_id".to_string()
}
fn default_session_timeout() -> u64 {
    30 * 60 * 1000
}
fn default_true() -> bool {
    true
}
fn default_mutation_throttle_ms() -> u64 {
    3_000
}
fn default_periodic_interval_ms() -> u64 {
    60_000
}
fn default_max_snapshot_size_bytes() -> usize {
    512 * 1024
}
fn default_max_node_text_length() -> usize {
    200
}
fn default_request_timeout_ms() -> u64 {
    30_000
}
fn default_max_retries() -> u32 {
    3
}
fn default_initial_delay_ms() -> u64 {
    1_000
}
fn default_max_delay_ms() -> u64 {
    30_000
}
fn default_backoff_multiplier() -> f64 {
    2.0
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            capture_initial: default_true(),
            capture_mutations: default_true(),
            mutation_throttle_ms: default_mutation_throttle_ms(),
            capture_periodic: false,
            periodic_interval_ms: default_periodic_interval_ms(),
            max_snapshot_size_bytes: default_max_snapshot_size_bytes(),
        }
    }
}

impl Default for PrivacyConfig {
    fn default() -> Self {
        Self {
            block_selectors: Vec::new(),
            mask_selectors: Vec::new(),
            disable_snapshots: false,
            max_node_text_length: default_max_node_text_length(),
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: default_request_timeout_ms(),
            retry: RetryPolicy::default(),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
        }
    }
}

impl SdkConfig {
    /// Minimal config with defaults for everything beyond the required fields.
    pub fn new(project_id: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            endpoint: endpoint.into(),
            client_id: None,
            user_id: None,
            batch_size: default_batch_size(),
            batch_timeout: default_batch_timeout(),
            debug: false,
            session_storage_key: default_session_storage_key(),
            capture_errors: false,
            session_timeout: default_session_timeout(),
            disabled: false,
            snapshot: SnapshotConfig::default(),
            privacy: PrivacyConfig::default(),
            transport: TransportConfig::default(),
        }
    }
}

/// Generate an anonymous client id for hosts that did not supply one.
pub fn generate_anonymous_id() -> String {
    format!("anon-{}", Uuid::new_v4())
}

/// Validated configuration. Immutable apart from the client and user id,
/// which the tracker may rewrite after authentication changes.
pub struct Configuration {
    config: SdkConfig,
    client_id: RwLock<String>,
    user_id: RwLock<Option<String>>,
}

impl Configuration {
    pub fn new(config: SdkConfig) -> OmniResult<Self> {
        if config.project_id.trim().is_empty() {
            return Err(OmniError::Config("projectId is required".into()));
        }
        if config.endpoint.trim().is_empty() {
            return Err(OmniError::Config("endpoint is required".into()));
        }
        let client_id = config
            .client_id
            .clone()
            .unwrap_or_else(generate_anonymous_id);
        let user_id = config.user_id.clone();
        Ok(Self {
            config,
            client_id: RwLock::new(client_id),
            user_id: RwLock::new(user_id),
        })
    }

    pub fn project_id(&self) -> &str {
        &self.config.project_id
    }

    pub fn endpoint(&self) -> &str {
        &self.config.endpoint
    }

    pub fn batch_size(&self) -> usize {
        self.config.batch_size
    }

    pub fn batch_timeout_ms(&self) -> u64 {
        self.config.batch_timeout
    }

    pub fn debug(&self) -> bool {
        self.config.debug
    }

    pub fn session_storage_key(&self) -> &str {
        &self.config.session_storage_key
    }

    pub fn capture_errors(&self) -> bool {
        self.config.capture_errors
    }

    pub fn session_timeout_ms(&self) -> u64 {
        self.config.session_timeout
    }

    pub fn disabled(&self) -> bool {
        self.config.disabled
    }

    pub fn snapshot(&self) -> &SnapshotConfig {
        &self.config.snapshot
    }

    pub fn privacy(&self) -> &PrivacyConfig {
        &self.config.privacy
    }

    pub fn transport(&self) -> &TransportConfig {
        &self.config.transport
    }

    pub fn client_id(&self) -> String {
        self.client_id
            .read()
            .expect("client id lock poisoned")
            .clone()
    }

    pub fn set_client_id(&self, id: impl Into<String>) {
        *self.client_id.write().expect("client id lock poisoned") = id.into();
    }

    pub fn user_id(&self) -> Option<String> {
        self.user_id.read().expect("user id lock poisoned").clone()
    }

    pub fn set_user_id(&self, id: Option<String>) {
        *self.user_id.write().expect("user id lock poisoned") = id;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_project_id_rejected() {
        let err = Configuration::new(SdkConfig::new("", "https://ingest.example.com/v1"));
        assert!(matches!(err, Err(OmniError::Config(_))));
    }

    #[test]
    fn test_missing_endpoint_rejected() {
        let err = Configuration::new(SdkConfig::new("p1", "  "));
        assert!(matches!(err, Err(OmniError::Config(_))));
    }

    #[test]
    fn test_anonymous_client_id_generated() {
        let config = Configuration::new(SdkConfig::new("p1", "https://e/")).unwrap();
        assert!(config.client_id().starts_with("anon-"));
    }

    #[test]
    fn test_identity_setters() {
        let config = Configuration::new(SdkConfig::new("p1", "https://e/")).unwrap();
        config.set_client_id("client-7");
        config.set_user_id(Some("u-1".into()));
        assert_eq!(config.client_id(), "client-7");
        assert_eq!(config.user_id(), Some("u-1".into()));
        config.set_user_id(None);
        assert_eq!(config.user_id(), None);
    }

    #[test]
    fn test_deserialize_camel_case_with_defaults() {
        let json = r#"{
            "projectId": "p1",
            "endpoint": "https://ingest.example.com/v1",
            "batchSize": 3,
            "snapshot": { "enabled": true, "mutationThrottleMs": 500 },
            "privacy": { "maskSelectors": [".secret"] }
        }"#;
        let config: SdkConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.batch_size, 3);
        assert_eq!(config.batch_timeout, 10_000);
        assert_eq!(config.session_storage_key, "omni_session_id");
        assert!(config.snapshot.enabled);
        assert!(config.snapshot.capture_initial);
        assert_eq!(config.snapshot.mutation_throttle_ms, 500);
        assert_eq!(config.privacy.mask_selectors, vec![".secret".to_string()]);
        assert_eq!(config.privacy.max_node_text_length, 200);
        assert_eq!(config.transport.retry.max_retries, 3);
    }
}
