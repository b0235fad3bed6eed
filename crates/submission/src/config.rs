//! Submission and worker configuration.
//!
//! Defaults are usable as-is; `from_env` overrides individual fields and
//! ignores (with a warning) anything it cannot parse.

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::task::RetryPolicy;

/// Longest backoff accepted from the environment.
pub const MAX_BACKOFF: Duration = Duration::from_secs(30 * 24 * 60 * 60);

fn env_value<T: FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(key, value = %raw, "ignoring invalid configuration value");
            None
        }
    }
}

fn env_list<T: FromStr>(key: &str) -> Option<Vec<T>> {
    let raw = std::env::var(key).ok()?;
    let parsed: Result<Vec<T>, _> = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::parse::<T>)
        .collect();
    match parsed {
        Ok(values) if !values.is_empty() => Some(values),
        _ => {
            warn!(key, value = %raw, "ignoring invalid configuration value");
            None
        }
    }
}

/// Submission policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionConfig {
    /// Total attempts, first one included.
    pub max_attempts: u32,
    /// Delay after attempt `n` is entry `n - 1`, clamped to the last entry.
    pub backoff_schedule: Vec<Duration>,
    /// Gateway statuses that count as acceptance (case-insensitive).
    pub accepted_statuses: Vec<String>,
    /// Enqueue the submission task as soon as an invoice is validated.
    pub enqueue_on_validation: bool,
}

impl Default for SubmissionConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_schedule: vec![
                Duration::from_secs(30),
                Duration::from_secs(120),
                Duration::from_secs(300),
            ],
            accepted_statuses: vec!["accepted".to_string()],
            enqueue_on_validation: true,
        }
    }
}

impl SubmissionConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(n) = env_value::<u32>("FATOORA_SUBMISSION_MAX_ATTEMPTS") {
            if n == 0 {
                warn!("ignoring FATOORA_SUBMISSION_MAX_ATTEMPTS=0");
            } else {
                config.max_attempts = n;
            }
        }
        if let Some(secs) = env_list::<u64>("FATOORA_SUBMISSION_BACKOFF_SECS") {
            let schedule: Vec<Duration> = secs.into_iter().map(Duration::from_secs).collect();
            if schedule.iter().any(|delay| *delay > MAX_BACKOFF) {
                warn!(
                    key = "FATOORA_SUBMISSION_BACKOFF_SECS",
                    max_secs = MAX_BACKOFF.as_secs(),
                    "ignoring backoff schedule with an out-of-range delay"
                );
            } else {
                config.backoff_schedule = schedule;
            }
        }
        if let Some(statuses) = env_list::<String>("FATOORA_ACCEPTED_STATUSES") {
            config.accepted_statuses = statuses;
        }
        if let Some(flag) = env_value::<bool>("FATOORA_ENQUEUE_ON_VALIDATION") {
            config.enqueue_on_validation = flag;
        }
        config
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_backoff_schedule(mut self, schedule: Vec<Duration>) -> Self {
        self.backoff_schedule = schedule;
        self
    }

    pub fn with_accepted_statuses<I, S>(mut self, statuses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.accepted_statuses = statuses.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_enqueue_on_validation(mut self, enabled: bool) -> Self {
        self.enqueue_on_validation = enabled;
        self
    }

    pub fn is_accepted(&self, gateway_status: &str) -> bool {
        let status = gateway_status.trim();
        self.accepted_statuses
            .iter()
            .any(|s| s.eq_ignore_ascii_case(status))
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts, self.backoff_schedule.clone())
    }
}

/// Worker pool configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerPoolConfig {
    /// Name for logging; workers are `{name}-{n}`.
    pub name: String,
    pub workers: usize,
    /// How long an idle worker waits before polling the queue again.
    pub poll_interval: Duration,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            name: "submission".to_string(),
            workers: 4,
            poll_interval: Duration::from_millis(250),
        }
    }
}

impl WorkerPoolConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(n) = env_value::<usize>("FATOORA_WORKERS") {
            if n == 0 {
                warn!("ignoring FATOORA_WORKERS=0");
            } else {
                config.workers = n;
            }
        }
        if let Some(ms) = env_value::<u64>("FATOORA_POLL_INTERVAL_MS") {
            config.poll_interval = Duration::from_millis(ms);
        }
        config
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}
