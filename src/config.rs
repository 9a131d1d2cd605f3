use serde::Deserialize;
use std::env;
use std::sync::OnceLock;
use thiserror::Error;

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variable was not provided.
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

/// Concrete backend selected for a capability interface.
///
/// Business logic never inspects this value; each capability factory resolves it
/// once at startup and hands back a trait object.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Process-local backend: filesystem storage, in-memory queue or registry.
    Local,
    /// Managed remote backend reached over HTTP.
    Remote,
}

impl std::str::FromStr for BackendKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "local" | "memory" => Ok(Self::Local),
            "remote" | "cloud" => Ok(Self::Remote),
            _ => Err(()),
        }
    }
}

/// Runtime configuration for the docpipe server.
#[derive(Debug)]
pub struct Config {
    /// Backend used by the storage gateway.
    pub storage_backend: BackendKind,
    /// Backend used by the stage queues.
    pub queue_backend: BackendKind,
    /// Backend used by the job registry.
    pub registry_backend: BackendKind,
    /// Root directory for artifacts written by the local storage backend.
    pub data_dir: String,
    /// Directory for scratch copies fetched by `materialize_local`.
    pub scratch_dir: Option<String>,
    /// Base URL of the object store (required for remote storage).
    pub object_store_url: Option<String>,
    /// Bucket holding all pipeline artifacts in the object store.
    pub object_store_bucket: String,
    /// Optional API key sent to the object store.
    pub object_store_api_key: Option<String>,
    /// Base URL of the queue service (required for remote queues).
    pub queue_service_url: Option<String>,
    /// Optional API key sent to the queue service.
    pub queue_api_key: Option<String>,
    /// Visibility window for messages received from the remote queue.
    pub queue_visibility_timeout_secs: u64,
    /// Bounded capacity of the local in-memory queues.
    pub queue_capacity: usize,
    /// Name of the extraction stage queue.
    pub extraction_queue_name: String,
    /// Name of the summarization stage queue.
    pub summary_queue_name: String,
    /// Base URL of the table service (required for a remote registry).
    pub table_service_url: Option<String>,
    /// Table holding job records in the table service.
    pub table_name: String,
    /// Optional API key sent to the table service.
    pub table_api_key: Option<String>,
    /// Number of worker tasks dedicated to each stage queue.
    pub workers_per_stage: usize,
    /// Fallback polling interval for idle workers, in milliseconds.
    pub worker_poll_interval_ms: u64,
    /// Maximum accepted document size in bytes.
    pub max_upload_bytes: usize,
    /// Chat-completions endpoint used by the default summarizer.
    pub summary_api_url: String,
    /// Optional API key for the summarization provider.
    pub summary_api_key: Option<String>,
    /// Model identifier passed to the summarization provider.
    pub summary_model: String,
    /// Character budget applied to summarizer input.
    pub summary_max_input_chars: usize,
    /// Optional override for the HTTP server port.
    pub server_port: Option<u16>,
}

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        let storage_backend = load_backend("STORAGE_BACKEND")?;
        let queue_backend = load_backend("QUEUE_BACKEND")?;
        let registry_backend = load_backend("REGISTRY_BACKEND")?;

        // Remote backends cannot operate without their service endpoints.
        let object_store_url = load_required_for("OBJECT_STORE_URL", storage_backend)?;
        let queue_service_url = load_required_for("QUEUE_SERVICE_URL", queue_backend)?;
        let table_service_url = load_required_for("TABLE_SERVICE_URL", registry_backend)?;

        Ok(Self {
            storage_backend,
            queue_backend,
            registry_backend,
            data_dir: load_env_optional("DATA_DIR").unwrap_or_else(|| "data".to_string()),
            scratch_dir: load_env_optional("SCRATCH_DIR"),
            object_store_url,
            object_store_bucket: load_env_optional("OBJECT_STORE_BUCKET")
                .unwrap_or_else(|| "docpipe-artifacts".to_string()),
            object_store_api_key: load_env_optional("OBJECT_STORE_API_KEY"),
            queue_service_url,
            queue_api_key: load_env_optional("QUEUE_API_KEY"),
            queue_visibility_timeout_secs: load_env_parsed("QUEUE_VISIBILITY_TIMEOUT_SECS")?
                .unwrap_or(300),
            queue_capacity: load_env_parsed("QUEUE_CAPACITY")?.unwrap_or(100),
            extraction_queue_name: load_env_optional("EXTRACTION_QUEUE_NAME")
                .unwrap_or_else(|| "docpipe-extraction".to_string()),
            summary_queue_name: load_env_optional("SUMMARY_QUEUE_NAME")
                .unwrap_or_else(|| "docpipe-summary".to_string()),
            table_service_url,
            table_name: load_env_optional("TABLE_NAME")
                .unwrap_or_else(|| "docpipe-jobs".to_string()),
            table_api_key: load_env_optional("TABLE_API_KEY"),
            workers_per_stage: load_env_parsed("WORKERS_PER_STAGE")?.unwrap_or(2),
            worker_poll_interval_ms: load_env_parsed("WORKER_POLL_INTERVAL_MS")?.unwrap_or(250),
            max_upload_bytes: load_env_parsed("MAX_UPLOAD_BYTES")?.unwrap_or(16 * 1024 * 1024),
            summary_api_url: load_env_optional("SUMMARY_API_URL")
                .unwrap_or_else(|| "https://api.x.ai/v1/chat/completions".to_string()),
            summary_api_key: load_env_optional("SUMMARY_API_KEY"),
            summary_model: load_env_optional("SUMMARY_MODEL")
                .unwrap_or_else(|| "grok-2-latest".to_string()),
            summary_max_input_chars: load_env_parsed("SUMMARY_MAX_INPUT_CHARS")?.unwrap_or(15_000),
            server_port: load_env_parsed("SERVER_PORT")?,
        })
    }
}

fn load_backend(key: &str) -> Result<BackendKind, ConfigError> {
    match load_env_optional(key) {
        Some(value) => value
            .parse()
            .map_err(|()| ConfigError::InvalidValue(key.to_string())),
        None => Ok(BackendKind::Local),
    }
}

/// Require `key` when the owning capability runs against a remote backend.
fn load_required_for(key: &str, backend: BackendKind) -> Result<Option<String>, ConfigError> {
    match backend {
        BackendKind::Remote => load_env(key).map(Some),
        BackendKind::Local => Ok(load_env_optional(key)),
    }
}

fn load_env(key: &str) -> Result<String, ConfigError> {
    env::var(key).map_err(|_| ConfigError::MissingVariable(key.to_string()))
}

fn load_env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn load_env_parsed<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    load_env_optional(key)
        .map(|value| {
            value
                .parse()
                .map_err(|_| ConfigError::InvalidValue(key.to_string()))
        })
        .transpose()
}

/// Global configuration cache populated during process start.
pub static CONFIG: OnceLock<Config> = OnceLock::new();

/// Retrieve the loaded configuration, panicking if initialization has not occurred.
pub fn get_config() -> &'static Config {
    CONFIG.get().expect("Config not initialized")
}

/// Load configuration from the environment and install it in the global cache.
pub fn init_config() {
    dotenvy::dotenv().ok();
    let config = Config::from_env().expect("Failed to load config from environment");
    tracing::debug!(
        storage_backend = ?config.storage_backend,
        queue_backend = ?config.queue_backend,
        registry_backend = ?config.registry_backend,
        data_dir = %config.data_dir,
        server_port = ?config.server_port,
        "Loaded configuration"
    );
    CONFIG.set(config).expect("Failed to set config");
}

#[cfg(test)]
mod tests {
    use super::BackendKind;

    #[test]
    fn backend_kind_parses_aliases() {
        assert_eq!("local".parse::<BackendKind>(), Ok(BackendKind::Local));
        assert_eq!("memory".parse::<BackendKind>(), Ok(BackendKind::Local));
        assert_eq!("Remote".parse::<BackendKind>(), Ok(BackendKind::Remote));
        assert_eq!("cloud".parse::<BackendKind>(), Ok(BackendKind::Remote));
        assert!("sqlite".parse::<BackendKind>().is_err());
    }
}
