use crate::error::{AppError, AppResult};
use crate::model::partition::RunPartition;
use once_cell::sync::Lazy;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, USER_AGENT};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_OUT_DIR: &str = "data/submissions";
pub const DEFAULT_WORKERS: usize = 10;
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
pub const DEFAULT_DELAY_SECS: f64 = 2.0;
pub const DEFAULT_BACKOFF_MULTIPLIER: f64 = 1.0;
pub const DEFAULT_MAX_ROUNDS: u32 = 5;
pub const DEFAULT_ROUND_PAUSE_SECS: f64 = 5.0;
pub const MAX_RETRY_DELAY: Duration = Duration::from_secs(24 * 60 * 60);

pub const HTTP_TIMEOUT_SECONDS: u64 = 30;
pub const HTTP_CONNECT_TIMEOUT: u64 = 10;

pub const DEFAULT_URL_TEMPLATE: &str = "https://data.sec.gov/submissions/CIK{id}.json";
pub const URL_ID_PLACEHOLDER: &str = "{id}";
pub const DEFAULT_USER_AGENT: &str = "Edgar Insights Tool admin@example.com";

pub const ENTITY_DIR: &str = "CIK";
pub const PAYLOAD_FILE: &str = "submissions.json";
pub const SUMMARY_FILE: &str = "summary.json";
pub const RESULTS_FILE: &str = "download_results.json";
pub const ERROR_SNIPPET_LEN: usize = 100;

pub static BASE_HEADERS: Lazy<HeaderMap> = Lazy::new(|| {
    let mut h = HeaderMap::new();
    h.insert(USER_AGENT, HeaderValue::from_static(DEFAULT_USER_AGENT));
    h.insert(ACCEPT, HeaderValue::from_static("application/json"));
    h
});

/// Builds the header set sent with every request. The identifying agent is mandatory.
pub fn request_headers(user_agent: &str) -> AppResult<HeaderMap> {
    let mut headers = BASE_HEADERS.clone();
    let trimmed = user_agent.trim();
    if trimmed.is_empty() {
        return Err(AppError::Argument(
            "User agent must not be empty; the API rejects anonymous clients.".into(),
        ));
    }
    headers.insert(
        USER_AGENT,
        HeaderValue::from_str(trimmed).map_err(|_| {
            AppError::Argument(format!("User agent is not a valid header value: {}", trimmed))
        })?,
    );
    Ok(headers)
}

#[derive(Debug, Clone, Serialize)]
pub struct RetryPolicy {
    #[serde(rename = "retry_attempts")]
    pub max_attempts: u32,
    #[serde(rename = "delay_seconds", serialize_with = "serialize_secs")]
    pub base_delay: Duration,
    pub backoff_multiplier: f64,
    #[serde(rename = "polite_delay_seconds", serialize_with = "serialize_secs")]
    pub polite_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: DEFAULT_RETRY_ATTEMPTS,
            base_delay: Duration::from_secs_f64(DEFAULT_DELAY_SECS),
            backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
            polite_delay: Duration::from_secs_f64(DEFAULT_DELAY_SECS),
        }
    }
}

impl RetryPolicy {
    /// Wait after failed attempt `attempt` (1-based): linear in the attempt number,
    /// saturating at `MAX_RETRY_DELAY`.
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        let secs =
            self.base_delay.as_secs_f64() * f64::from(attempt.max(1)) * self.backoff_multiplier;
        Duration::try_from_secs_f64(secs)
            .unwrap_or(MAX_RETRY_DELAY)
            .min(MAX_RETRY_DELAY)
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.max_attempts == 0 {
            return Err(AppError::Argument("--retry-attempts must be at least 1".into()));
        }
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 0.0 {
            return Err(AppError::Argument(format!(
                "--backoff must be a non-negative number, got {}",
                self.backoff_multiplier
            )));
        }
        Ok(())
    }
}

fn serialize_secs<S>(d: &Duration, s: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    s.serialize_f64(d.as_secs_f64())
}

pub fn secs_to_duration(secs: f64, flag: &str) -> AppResult<Duration> {
    if !secs.is_finite() || secs < 0.0 {
        return Err(AppError::Argument(format!(
            "{} must be a non-negative number of seconds, got {}",
            flag, secs
        )));
    }
    Duration::try_from_secs_f64(secs).map_err(|e| {
        AppError::Argument(format!("{} is out of range ({}): {}", flag, secs, e))
    })
}

#[derive(Debug, Clone)]
pub struct RunSettings {
    pub workers: usize,
    pub retry: RetryPolicy,
    pub max_rounds: u32,
    pub max_elapsed: Option<Duration>,
    pub round_pause: Duration,
    pub output_root: PathBuf,
    pub url_template: String,
    pub user_agent: String,
    pub partition: RunPartition,
}

impl Default for RunSettings {
    fn default() -> Self {
        RunSettings {
            workers: DEFAULT_WORKERS,
            retry: RetryPolicy::default(),
            max_rounds: DEFAULT_MAX_ROUNDS,
            max_elapsed: None,
            round_pause: Duration::from_secs_f64(DEFAULT_ROUND_PAUSE_SECS),
            output_root: PathBuf::from(DEFAULT_OUT_DIR),
            url_template: DEFAULT_URL_TEMPLATE.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            partition: RunPartition::today(),
        }
    }
}

impl RunSettings {
    pub fn validate(&self) -> AppResult<()> {
        if self.workers == 0 {
            return Err(AppError::Argument("--workers must be at least 1".into()));
        }
        if self.max_rounds == 0 {
            return Err(AppError::Argument("--max-rounds must be at least 1".into()));
        }
        if !self.url_template.contains(URL_ID_PLACEHOLDER) {
            return Err(AppError::Argument(format!(
                "--url-template must contain '{}': {}",
                URL_ID_PLACEHOLDER, self.url_template
            )));
        }
        self.retry.validate()?;
        request_headers(&self.user_agent)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SettingsRecord {
    pub workers: usize,
    #[serde(flatten)]
    pub retry: RetryPolicy,
    pub max_rounds: u32,
    pub max_elapsed_seconds: Option<f64>,
    pub url_template: String,
}

impl From<&RunSettings> for SettingsRecord {
    fn from(s: &RunSettings) -> Self {
        SettingsRecord {
            workers: s.workers,
            retry: s.retry.clone(),
            max_rounds: s.max_rounds,
            max_elapsed_seconds: s.max_elapsed.map(|d| d.as_secs_f64()),
            url_template: s.url_template.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_delay_is_linear_in_attempt() {
        let policy = RetryPolicy {
            base_delay: Duration::from_secs(2),
            ..RetryPolicy::default()
        };
        assert_eq!(policy.retry_delay(1), Duration::from_secs(2));
        assert_eq!(policy.retry_delay(3), Duration::from_secs(6));

        let doubled = RetryPolicy {
            backoff_multiplier: 2.0,
            ..policy
        };
        assert_eq!(doubled.retry_delay(2), Duration::from_secs(8));
    }

    #[test]
    fn huge_values_never_panic() {
        let policy = RetryPolicy {
            base_delay: Duration::from_secs(2),
            backoff_multiplier: 1e300,
            ..RetryPolicy::default()
        };
        assert!(policy.validate().is_ok());
        assert_eq!(policy.retry_delay(1), MAX_RETRY_DELAY);
        assert_eq!(policy.retry_delay(u32::MAX), MAX_RETRY_DELAY);

        let zero = RetryPolicy {
            backoff_multiplier: 0.0,
            ..RetryPolicy::default()
        };
        assert_eq!(zero.retry_delay(3), Duration::ZERO);

        assert!(matches!(
            secs_to_duration(1e30, "--delay"),
            Err(AppError::Argument(_))
        ));
        assert!(secs_to_duration(f64::INFINITY, "--delay").is_err());
        assert_eq!(secs_to_duration(0.25, "--delay").unwrap(), Duration::from_millis(250));
    }

    #[test]
    fn validation_rejects_degenerate_settings() {
        let mut settings = RunSettings::default();
        assert!(settings.validate().is_ok());

        settings.workers = 0;
        assert!(matches!(settings.validate(), Err(AppError::Argument(_))));

        settings.workers = 2;
        settings.url_template = "https://example.com/static.json".into();
        assert!(settings.validate().is_err());

        settings.url_template = DEFAULT_URL_TEMPLATE.into();
        settings.user_agent = "   ".into();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn headers_always_carry_agent_and_accept() {
        let headers = request_headers("Acme Research ops@acme.test").unwrap();
        assert_eq!(headers[USER_AGENT], "Acme Research ops@acme.test");
        assert_eq!(headers[ACCEPT], "application/json");
    }
}
