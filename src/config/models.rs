use crate::humanize::HumanDuration;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub stream: StreamConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub consumer: ConsumerConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Ops endpoint configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_health_addr")]
    pub health_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            health_addr: default_health_addr(),
        }
    }
}

fn default_health_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8081))
}

/// Durable record store location
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default = "default_storage_path")]
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: default_storage_path(),
        }
    }
}

fn default_storage_path() -> PathBuf {
    PathBuf::from("data/records")
}

/// Durable event stream settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StreamConfig {
    #[serde(default = "default_stream_path")]
    pub path: PathBuf,
    #[serde(default = "default_subject")]
    pub subject: String,
    #[serde(default = "default_durable")]
    pub durable: String,
    /// Redelivery deadline for unacknowledged deliveries
    #[serde(default = "default_ack_wait")]
    pub ack_wait: HumanDuration,
    /// Deliveries before a message is dead-lettered
    #[serde(default = "default_max_deliver")]
    pub max_deliver: u32,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            path: default_stream_path(),
            subject: default_subject(),
            durable: default_durable(),
            ack_wait: default_ack_wait(),
            max_deliver: default_max_deliver(),
        }
    }
}

fn default_stream_path() -> PathBuf {
    PathBuf::from("data/stream")
}

fn default_subject() -> String {
    "activity.log.created".to_string()
}

fn default_durable() -> String {
    "activity-log-consumer".to_string()
}

fn default_ack_wait() -> HumanDuration {
    HumanDuration::from_secs(60)
}

fn default_max_deliver() -> u32 {
    3
}

/// Worker pool sizing
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WorkerConfig {
    #[serde(default = "default_worker_count")]
    pub count: usize,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default = "default_job_timeout")]
    pub job_timeout: HumanDuration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            count: default_worker_count(),
            queue_capacity: default_queue_capacity(),
            job_timeout: default_job_timeout(),
        }
    }
}

fn default_worker_count() -> usize {
    4
}

fn default_queue_capacity() -> usize {
    100
}

fn default_job_timeout() -> HumanDuration {
    HumanDuration::from_secs(30)
}

/// Ephemeral cache sizing and entry lifetimes
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheConfig {
    #[serde(default = "default_max_capacity")]
    pub max_capacity: u64,
    #[serde(default = "default_item_ttl")]
    pub item_ttl: HumanDuration,
    #[serde(default = "default_list_ttl")]
    pub list_ttl: HumanDuration,
    #[serde(default = "default_count_ttl")]
    pub count_ttl: HumanDuration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_capacity: default_max_capacity(),
            item_ttl: default_item_ttl(),
            list_ttl: default_list_ttl(),
            count_ttl: default_count_ttl(),
        }
    }
}

fn default_max_capacity() -> u64 {
    100_000
}

fn default_item_ttl() -> HumanDuration {
    HumanDuration::from_secs(3_600)
}

fn default_list_ttl() -> HumanDuration {
    HumanDuration::from_secs(1_800)
}

fn default_count_ttl() -> HumanDuration {
    HumanDuration::from_secs(300)
}

/// Acknowledgement policy of the event consumer
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConsumerConfig {
    /// Dead-letter malformed or invalid events instead of redelivering them
    #[serde(default = "default_true")]
    pub ack_terminal_failures: bool,
    /// Nak a message whose job the pool refused
    #[serde(default = "default_true")]
    pub nak_on_rejection: bool,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            ack_terminal_failures: true,
            nak_on_rejection: true,
        }
    }
}

fn default_true() -> bool {
    true
}

/// Outbound notification outbox
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NotifyConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_notify_capacity")]
    pub queue_capacity: usize,
    #[serde(default = "default_notify_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_retry_backoff")]
    pub retry_backoff: HumanDuration,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            queue_capacity: default_notify_capacity(),
            max_attempts: default_notify_attempts(),
            retry_backoff: default_retry_backoff(),
        }
    }
}

fn default_notify_capacity() -> usize {
    256
}

fn default_notify_attempts() -> u32 {
    3
}

fn default_retry_backoff() -> HumanDuration {
    HumanDuration::from_millis(500)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::Text,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.worker.count, 4);
        assert_eq!(config.worker.queue_capacity, 100);
        assert_eq!(config.worker.job_timeout.as_duration(), Duration::from_secs(30));
        assert_eq!(config.stream.subject, "activity.log.created");
        assert_eq!(config.stream.durable, "activity-log-consumer");
        assert_eq!(config.stream.max_deliver, 3);
        assert_eq!(config.stream.ack_wait.as_duration(), Duration::from_secs(60));
        assert_eq!(config.cache.item_ttl.as_duration(), Duration::from_secs(3600));
        assert_eq!(config.cache.list_ttl.as_duration(), Duration::from_secs(1800));
        assert_eq!(config.cache.count_ttl.as_duration(), Duration::from_secs(300));
        assert!(config.consumer.ack_terminal_failures);
        assert!(!config.notify.enabled);
    }

    #[test]
    fn test_partial_section_keeps_defaults() {
        let config: Config = toml::from_str(
            r#"
[worker]
count = 8

[logging]
format = "json"
"#,
        )
        .unwrap();

        assert_eq!(config.worker.count, 8);
        assert_eq!(config.worker.queue_capacity, 100);
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.logging.level, "info");
    }
}
