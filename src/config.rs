//! Environment-variable configuration loading (C1). Reads the environment
//! once at startup into a validated, immutable `Config`. Unknown variables
//! are ignored; invalid values fail startup with a descriptive message.

use std::env;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};

#[derive(Debug, Clone)]
pub struct Config {
    pub ai_api_endpoint: String,
    pub ai_api_key: Option<String>,
    pub ai_model: String,
    pub listen_addr: String,
    pub max_batch_size: usize,
    pub max_concurrent_requests: usize,
    pub rate_limit_capacity: f64,
    pub rate_limit_window: Duration,
    pub rate_limit_wait: Duration,
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub backoff_multiplier: f64,
    pub max_backoff: Duration,
    pub per_attempt_timeout: Duration,
    pub request_deadline: Duration,
    pub circuit_failure_threshold: u32,
    pub circuit_reset: Duration,
    pub shutdown_grace: Duration,
    pub log_level: String,
    pub strict_auth_key: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let ai_api_endpoint = env::var("AI_API_ENDPOINT")
            .map_err(|_| anyhow!("AI_API_ENDPOINT is required"))?;
        if ai_api_endpoint.trim().is_empty() {
            return Err(anyhow!("AI_API_ENDPOINT must not be empty"));
        }

        let ai_api_key = non_empty_env("AI_API_KEY");
        let ai_model = env::var("AI_MODEL").unwrap_or_else(|_| "grok-beta".to_string());
        let listen_addr = env::var("LISTEN_ADDR").unwrap_or_else(|_| "0.0.0.0:8000".to_string());

        let max_batch_size = parse_positive_usize("MAX_BATCH_SIZE", 100)?;
        let max_concurrent_requests = parse_positive_usize("MAX_CONCURRENT_REQUESTS", 10)?;
        let rate_limit_capacity = parse_positive_f64("RATE_LIMIT_CAPACITY", 60.0)?;
        let rate_limit_window = Duration::from_secs(parse_positive_u64("RATE_LIMIT_WINDOW_SECONDS", 60)?);
        let rate_limit_wait = Duration::from_millis(parse_positive_u64("RATE_LIMIT_WAIT_MS", 5000)?);

        let max_retries = parse_positive_u64("MAX_RETRIES", 3)? as u32;
        let initial_backoff = Duration::from_millis(parse_positive_u64("INITIAL_BACKOFF_MS", 1000)?);
        let backoff_multiplier = parse_positive_f64("BACKOFF_MULTIPLIER", 2.0)?;
        let max_backoff = Duration::from_millis(parse_positive_u64("MAX_BACKOFF_MS", 30000)?);
        let per_attempt_timeout = Duration::from_millis(parse_positive_u64("PER_ATTEMPT_TIMEOUT_MS", 30000)?);
        let request_deadline = Duration::from_millis(parse_positive_u64("REQUEST_DEADLINE_MS", 45000)?);

        let circuit_failure_threshold = parse_positive_u64("CIRCUIT_FAILURE_THRESHOLD", 5)? as u32;
        let circuit_reset = Duration::from_millis(parse_positive_u64("CIRCUIT_RESET_MS", 60000)?);
        let shutdown_grace = Duration::from_millis(parse_positive_u64("SHUTDOWN_GRACE_MS", 30000)?);

        let log_level = env::var("RUST_LOG")
            .ok()
            .or_else(|| env::var("LOG_LEVEL").ok())
            .unwrap_or_else(|| "info".to_string());

        let strict_auth_key = non_empty_env("STRICT_AUTH_API_KEY");

        Ok(Self {
            ai_api_endpoint,
            ai_api_key,
            ai_model,
            listen_addr,
            max_batch_size,
            max_concurrent_requests,
            rate_limit_capacity,
            rate_limit_window,
            rate_limit_wait,
            max_retries,
            initial_backoff,
            backoff_multiplier,
            max_backoff,
            per_attempt_timeout,
            request_deadline,
            circuit_failure_threshold,
            circuit_reset,
            shutdown_grace,
            log_level,
            strict_auth_key,
        })
    }

    /// `/readyz` consults this: the upstream key must be present for `/sort`
    /// to be callable, even though `/healthz` stays OK without it.
    pub fn has_api_key(&self) -> bool {
        self.ai_api_key.is_some()
    }
}

fn non_empty_env(var: &str) -> Option<String> {
    env::var(var).ok().filter(|v| !v.trim().is_empty())
}

fn parse_positive_usize(var: &str, default: usize) -> Result<usize> {
    Ok(parse_optional_u64(var)?.map(|v| v as usize).unwrap_or(default))
}

fn parse_positive_u64(var: &str, default: u64) -> Result<u64> {
    Ok(parse_optional_u64(var)?.unwrap_or(default))
}

fn parse_optional_u64(var: &str) -> Result<Option<u64>> {
    match env::var(var) {
        Ok(value) if !value.trim().is_empty() => value
            .trim()
            .parse::<u64>()
            .map(Some)
            .with_context(|| format!("{var} must be a positive integer")),
        Ok(_) => Ok(None),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(err) => Err(err.into()),
    }
}

fn parse_positive_f64(var: &str, default: f64) -> Result<f64> {
    match env::var(var) {
        Ok(value) if !value.trim().is_empty() => {
            let parsed: f64 = value
                .trim()
                .parse()
                .with_context(|| format!("{var} must be a number"))?;
            if parsed <= 0.0 {
                return Err(anyhow!("{var} must be positive"));
            }
            Ok(parsed)
        }
        Ok(_) => Ok(default),
        Err(env::VarError::NotPresent) => Ok(default),
        Err(err) => Err(err.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use once_cell::sync::Lazy;
    use std::sync::Mutex;

    static ENV_MUTEX: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

    const ALL_VARS: &[&str] = &[
        "AI_API_ENDPOINT",
        "AI_API_KEY",
        "AI_MODEL",
        "LISTEN_ADDR",
        "MAX_BATCH_SIZE",
        "MAX_CONCURRENT_REQUESTS",
        "RATE_LIMIT_CAPACITY",
        "RATE_LIMIT_WINDOW_SECONDS",
        "RATE_LIMIT_WAIT_MS",
        "MAX_RETRIES",
        "INITIAL_BACKOFF_MS",
        "BACKOFF_MULTIPLIER",
        "MAX_BACKOFF_MS",
        "PER_ATTEMPT_TIMEOUT_MS",
        "REQUEST_DEADLINE_MS",
        "CIRCUIT_FAILURE_THRESHOLD",
        "CIRCUIT_RESET_MS",
        "SHUTDOWN_GRACE_MS",
        "LOG_LEVEL",
        "RUST_LOG",
        "STRICT_AUTH_API_KEY",
    ];

    fn clear_env() {
        for var in ALL_VARS {
            env::remove_var(var);
        }
    }

    #[test]
    fn missing_endpoint_fails_startup() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env();
        let err = Config::from_env().unwrap_err();
        assert!(err.to_string().contains("AI_API_ENDPOINT"));
    }

    #[test]
    fn defaults_applied_when_only_endpoint_set() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env();
        env::set_var("AI_API_ENDPOINT", "https://upstream.example/classify");
        let cfg = Config::from_env().unwrap();
        assert_eq!(cfg.ai_model, "grok-beta");
        assert_eq!(cfg.listen_addr, "0.0.0.0:8000");
        assert_eq!(cfg.max_batch_size, 100);
        assert_eq!(cfg.max_concurrent_requests, 10);
        assert_eq!(cfg.rate_limit_capacity, 60.0);
        assert_eq!(cfg.max_retries, 3);
        assert!(!cfg.has_api_key());
        clear_env();
    }

    #[test]
    fn invalid_integer_fails_startup() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env();
        env::set_var("AI_API_ENDPOINT", "https://upstream.example/classify");
        env::set_var("MAX_BATCH_SIZE", "not-a-number");
        let err = Config::from_env().unwrap_err();
        assert!(err.to_string().contains("MAX_BATCH_SIZE"));
        clear_env();
    }

    #[test]
    fn api_key_presence_detected() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env();
        env::set_var("AI_API_ENDPOINT", "https://upstream.example/classify");
        env::set_var("AI_API_KEY", "secret-token");
        let cfg = Config::from_env().unwrap();
        assert!(cfg.has_api_key());
        clear_env();
    }
}
