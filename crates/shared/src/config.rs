//! Application configuration management.

use serde::Deserialize;

/// Application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Database configuration.
    pub database: DatabaseConfig,
    /// Outbox dispatcher configuration.
    #[serde(default)]
    pub outbox: OutboxConfig,
    /// Direct/backup processor configuration.
    #[serde(default)]
    pub processor: ProcessorConfig,
    /// Tenant posting lock configuration.
    #[serde(default)]
    pub lock: LockConfig,
    /// Delivery channel configuration.
    #[serde(default)]
    pub channel: ChannelConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Identity used as the lock holder and claim owner for this instance.
    #[serde(default)]
    pub instance_id: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            instance_id: None,
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Database connection URL.
    pub url: String,
    /// Maximum number of connections in the pool.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Minimum number of connections in the pool.
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    1
}

/// Outbox dispatcher configuration (publish lifecycle).
#[derive(Debug, Clone, Deserialize)]
pub struct OutboxConfig {
    /// Whether the dispatcher loop runs on this instance.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Delay between polling cycles in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Maximum rows claimed per cycle.
    #[serde(default = "default_batch_size")]
    pub batch_size: u64,
    /// How long a publish claim stays valid before another worker may take it.
    #[serde(default = "default_claim_ttl_secs")]
    pub lock_ttl_secs: u64,
    /// First retry delay in seconds.
    #[serde(default = "default_base_backoff_secs")]
    pub base_backoff_secs: u64,
    /// Upper bound on the retry delay in seconds.
    #[serde(default = "default_max_backoff_secs")]
    pub max_backoff_secs: u64,
    /// Publish attempts before a row is abandoned by the dispatcher.
    #[serde(default = "default_max_publish_attempts")]
    pub max_publish_attempts: u32,
}

impl Default for OutboxConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval_ms: default_poll_interval_ms(),
            batch_size: default_batch_size(),
            lock_ttl_secs: default_claim_ttl_secs(),
            base_backoff_secs: default_base_backoff_secs(),
            max_backoff_secs: default_max_backoff_secs(),
            max_publish_attempts: default_max_publish_attempts(),
        }
    }
}

/// Direct/backup processor configuration (processing lifecycle).
#[derive(Debug, Clone, Deserialize)]
pub struct ProcessorConfig {
    /// Whether the direct processor loop runs on this instance.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Delay between polling cycles in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Maximum rows claimed per cycle.
    #[serde(default = "default_batch_size")]
    pub batch_size: u64,
    /// How long a processing claim stays valid before another worker may take it.
    #[serde(default = "default_claim_ttl_secs")]
    pub claim_ttl_secs: u64,
    /// Attempts before a record becomes DEAD.
    #[serde(default = "default_max_process_attempts")]
    pub max_attempts: u32,
    /// First retry delay in seconds.
    #[serde(default = "default_base_backoff_secs")]
    pub base_backoff_secs: u64,
    /// Upper bound on the retry delay in seconds.
    #[serde(default = "default_max_backoff_secs")]
    pub max_backoff_secs: u64,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval_ms: default_poll_interval_ms(),
            batch_size: default_batch_size(),
            claim_ttl_secs: default_claim_ttl_secs(),
            max_attempts: default_max_process_attempts(),
            base_backoff_secs: default_base_backoff_secs(),
            max_backoff_secs: default_max_backoff_secs(),
        }
    }
}

/// Tenant posting lock configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LockConfig {
    /// Whether the best-effort distributed lease is attempted at all.
    #[serde(default = "default_true")]
    pub lease_enabled: bool,
    /// Lease time-to-live in seconds.
    #[serde(default = "default_lease_ttl_secs")]
    pub lease_ttl_secs: u64,
    /// Upper bound on waiting for the transactional tenant lock.
    #[serde(default = "default_db_lock_timeout_ms")]
    pub db_lock_timeout_ms: u64,
    /// Upper bound on waiting for the in-process tenant lock.
    #[serde(default = "default_local_lock_wait_ms")]
    pub local_lock_wait_ms: u64,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            lease_enabled: true,
            lease_ttl_secs: default_lease_ttl_secs(),
            db_lock_timeout_ms: default_db_lock_timeout_ms(),
            local_lock_wait_ms: default_local_lock_wait_ms(),
        }
    }
}

/// Delivery channel configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChannelConfig {
    /// Push endpoint the dispatcher publishes to. `None` disables publishing.
    #[serde(default)]
    pub push_url: Option<String>,
    /// Bearer token sent with each publish.
    #[serde(default)]
    pub auth_token: Option<String>,
    /// Subscription name stamped on published envelopes.
    #[serde(default)]
    pub subscription: Option<String>,
    /// Time to wait for a publish acknowledgment in milliseconds.
    #[serde(default = "default_publish_timeout_ms")]
    pub publish_timeout_ms: u64,
}

fn default_true() -> bool {
    true
}

fn default_poll_interval_ms() -> u64 {
    1_000
}

fn default_batch_size() -> u64 {
    50
}

fn default_claim_ttl_secs() -> u64 {
    120
}

fn default_base_backoff_secs() -> u64 {
    5
}

fn default_max_backoff_secs() -> u64 {
    600 // 10 minutes
}

fn default_max_publish_attempts() -> u32 {
    20
}

fn default_max_process_attempts() -> u32 {
    10
}

fn default_lease_ttl_secs() -> u64 {
    30
}

fn default_db_lock_timeout_ms() -> u64 {
    30_000
}

fn default_local_lock_wait_ms() -> u64 {
    5_000
}

fn default_publish_timeout_ms() -> u64 {
    10_000
}

impl AppConfig {
    /// Loads configuration from environment and config files.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration cannot be loaded.
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".to_string());

        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{run_mode}")).required(false))
            .add_source(config::Environment::with_prefix("LEDGERLINE").separator("__"))
            .build()?;

        config.try_deserialize()
    }

    /// Returns the instance identity, falling back to host name and pid.
    #[must_use]
    pub fn instance_id(&self) -> String {
        self.server.instance_id.clone().unwrap_or_else(|| {
            let host = std::env::var("HOSTNAME").unwrap_or_else(|_| "ledgerline".to_string());
            format!("{host}-{}", std::process::id())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_from_env_uses_defaults() {
        temp_env::with_vars(
            [
                ("LEDGERLINE__DATABASE__URL", Some("postgres://localhost/ledger")),
                ("RUN_MODE", Some("test-nonexistent")),
            ],
            || {
                let config = AppConfig::load().unwrap();
                assert_eq!(config.database.url, "postgres://localhost/ledger");
                assert_eq!(config.server.port, 8080);
                assert!(config.processor.enabled);
                assert_eq!(config.processor.max_attempts, 10);
                assert_eq!(config.processor.base_backoff_secs, 5);
                assert_eq!(config.processor.max_backoff_secs, 600);
                assert_eq!(config.lock.lease_ttl_secs, 30);
                assert!(config.channel.push_url.is_none());
            },
        );
    }

    #[test]
    fn test_load_overrides_nested_values() {
        temp_env::with_vars(
            [
                ("LEDGERLINE__DATABASE__URL", Some("postgres://localhost/ledger")),
                ("LEDGERLINE__PROCESSOR__MAX_ATTEMPTS", Some("3")),
                ("LEDGERLINE__PROCESSOR__ENABLED", Some("false")),
                ("RUN_MODE", Some("test-nonexistent")),
            ],
            || {
                let config = AppConfig::load().unwrap();
                assert_eq!(config.processor.max_attempts, 3);
                assert!(!config.processor.enabled);
            },
        );
    }

    #[test]
    fn test_load_requires_database_url() {
        temp_env::with_vars(
            [
                ("LEDGERLINE__DATABASE__URL", None::<&str>),
                ("RUN_MODE", Some("test-nonexistent")),
            ],
            || {
                assert!(AppConfig::load().is_err());
            },
        );
    }

    #[test]
    fn test_instance_id_prefers_configured_value() {
        let config = ServerConfig {
            instance_id: Some("worker-a".to_string()),
            ..ServerConfig::default()
        };
        let app = AppConfig {
            server: config,
            database: DatabaseConfig {
                url: String::new(),
                max_connections: 1,
                min_connections: 1,
            },
            outbox: OutboxConfig::default(),
            processor: ProcessorConfig::default(),
            lock: LockConfig::default(),
            channel: ChannelConfig::default(),
        };
        assert_eq!(app.instance_id(), "worker-a");
    }
}
