use super::models::Config;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("{field} must be positive")]
    NotPositive { field: &'static str },

    #[error("{field} ({actual}) must not exceed cache.item_ttl ({limit})")]
    TtlExceedsItemTtl {
        field: &'static str,
        actual: String,
        limit: String,
    },

    #[error("stream.ack_wait ({ack_wait}) must be longer than worker.job_timeout ({job_timeout})")]
    AckWaitNotAboveJobTimeout {
        ack_wait: String,
        job_timeout: String,
    },

    #[error("Stream subject must not be empty")]
    EmptySubject,

    #[error("Invalid durable name '{0}': must be non-empty without whitespace or '.'")]
    InvalidDurableName(String),

    #[error("Invalid log level '{0}'")]
    InvalidLogLevel(String),
}

/// Validate the entire configuration
pub fn validate(config: &Config) -> Result<(), ValidationError> {
    validate_worker(config)?;
    validate_stream(config)?;
    validate_cache(config)?;
    validate_notify(config)?;
    validate_logging(config)?;
    Ok(())
}

fn validate_worker(config: &Config) -> Result<(), ValidationError> {
    if config.worker.count == 0 {
        return Err(ValidationError::NotPositive { field: "worker.count" });
    }
    if config.worker.queue_capacity == 0 {
        return Err(ValidationError::NotPositive {
            field: "worker.queue_capacity",
        });
    }
    if config.worker.job_timeout.is_zero() {
        return Err(ValidationError::NotPositive {
            field: "worker.job_timeout",
        });
    }
    Ok(())
}

fn validate_stream(config: &Config) -> Result<(), ValidationError> {
    let stream = &config.stream;

    if stream.subject.trim().is_empty() {
        return Err(ValidationError::EmptySubject);
    }

    let durable = &stream.durable;
    if durable.is_empty() || durable.contains('.') || durable.chars().any(char::is_whitespace) {
        return Err(ValidationError::InvalidDurableName(durable.clone()));
    }

    if stream.ack_wait.is_zero() {
        return Err(ValidationError::NotPositive {
            field: "stream.ack_wait",
        });
    }
    if stream.max_deliver == 0 {
        return Err(ValidationError::NotPositive {
            field: "stream.max_deliver",
        });
    }

    // A job that runs to its timeout must still settle before redelivery
    if stream.ack_wait <= config.worker.job_timeout {
        return Err(ValidationError::AckWaitNotAboveJobTimeout {
            ack_wait: stream.ack_wait.to_string(),
            job_timeout: config.worker.job_timeout.to_string(),
        });
    }
    Ok(())
}

fn validate_cache(config: &Config) -> Result<(), ValidationError> {
    let cache = &config.cache;

    if cache.max_capacity == 0 {
        return Err(ValidationError::NotPositive {
            field: "cache.max_capacity",
        });
    }

    for (field, ttl) in [
        ("cache.item_ttl", cache.item_ttl),
        ("cache.list_ttl", cache.list_ttl),
        ("cache.count_ttl", cache.count_ttl),
    ] {
        if ttl.is_zero() {
            return Err(ValidationError::NotPositive { field });
        }
    }

    for (field, ttl) in [
        ("cache.list_ttl", cache.list_ttl),
        ("cache.count_ttl", cache.count_ttl),
    ] {
        if ttl > cache.item_ttl {
            return Err(ValidationError::TtlExceedsItemTtl {
                field,
                actual: ttl.to_string(),
                limit: cache.item_ttl.to_string(),
            });
        }
    }
    Ok(())
}

fn validate_notify(config: &Config) -> Result<(), ValidationError> {
    if !config.notify.enabled {
        return Ok(());
    }
    if config.notify.queue_capacity == 0 {
        return Err(ValidationError::NotPositive {
            field: "notify.queue_capacity",
        });
    }
    if config.notify.max_attempts == 0 {
        return Err(ValidationError::NotPositive {
            field: "notify.max_attempts",
        });
    }
    Ok(())
}

fn validate_logging(config: &Config) -> Result<(), ValidationError> {
    tracing_subscriber::EnvFilter::try_new(&config.logging.level)
        .map(|_| ())
        .map_err(|_| ValidationError::InvalidLogLevel(config.logging.level.clone()))
}
