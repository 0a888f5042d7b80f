use std::str::FromStr;
use std::time::Duration;

use crate::{BackoffKind, BackoffPolicy, RestCallError, Result};

/// Configures HTTP timeout, connection reuse and retry behavior.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ClientOptions {
    /// Whole-request timeout enforced by the transport, in milliseconds.
    pub timeout_ms: u64,
    /// Total attempts per call, the first one included.
    pub max_attempts: usize,
    /// Backoff strategy between attempts.
    pub backoff: BackoffKind,
    /// Backoff floor in milliseconds.
    pub backoff_base_ms: u64,
    /// Backoff ceiling in milliseconds.
    pub backoff_cap_ms: u64,
    /// Optional time window for a single attempt, in milliseconds.
    pub attempt_timeout_ms: Option<u64>,
    /// Idle connections kept per host.
    pub pool_max_idle_per_host: usize,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            timeout_ms: 10_000,
            max_attempts: 1,
            backoff: BackoffKind::Exponential,
            backoff_base_ms: 250,
            backoff_cap_ms: 10_000,
            attempt_timeout_ms: None,
            pool_max_idle_per_host: 30,
        }
    }
}

impl ClientOptions {
    /// Backoff policy described by these options.
    pub fn retry_policy(&self) -> BackoffPolicy {
        BackoffPolicy::new(
            self.backoff,
            Duration::from_millis(self.backoff_base_ms),
            Duration::from_millis(self.backoff_cap_ms),
            self.max_attempts,
        )
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn attempt_timeout(&self) -> Option<Duration> {
        self.attempt_timeout_ms.map(Duration::from_millis)
    }

    /// Reads overrides from environment variables on top of the defaults.
    ///
    /// Recognized variables:
    /// - `RESTCALL_TIMEOUT_MS`
    /// - `RESTCALL_MAX_ATTEMPTS`
    /// - `RESTCALL_BACKOFF` (`NoBackOff`, `ExpoBackOff`, `ExpoEqualJitter`,
    ///   `ExpoFullyJitter`, `ExpoDecorrJitter`)
    /// - `RESTCALL_BACKOFF_BASE_MS`
    /// - `RESTCALL_BACKOFF_CAP_MS`
    /// - `RESTCALL_ATTEMPT_TIMEOUT_MS`
    /// - `RESTCALL_POOL_MAX_IDLE_PER_HOST`
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`from_env`](Self::from_env) with a custom variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut options = Self::default();
        if let Some(value) = parse_var(&lookup, "RESTCALL_TIMEOUT_MS")? {
            options.timeout_ms = value;
        }
        if let Some(value) = parse_var(&lookup, "RESTCALL_MAX_ATTEMPTS")? {
            options.max_attempts = value;
        }
        if let Some(value) = parse_var(&lookup, "RESTCALL_BACKOFF")? {
            options.backoff = value;
        }
        if let Some(value) = parse_var(&lookup, "RESTCALL_BACKOFF_BASE_MS")? {
            options.backoff_base_ms = value;
        }
        if let Some(value) = parse_var(&lookup, "RESTCALL_BACKOFF_CAP_MS")? {
            options.backoff_cap_ms = value;
        }
        if let Some(value) = parse_var(&lookup, "RESTCALL_ATTEMPT_TIMEOUT_MS")? {
            options.attempt_timeout_ms = Some(value);
        }
        if let Some(value) = parse_var(&lookup, "RESTCALL_POOL_MAX_IDLE_PER_HOST")? {
            options.pool_max_idle_per_host = value;
        }

        if options.max_attempts == 0 {
            return Err(RestCallError::Config(
                "RESTCALL_MAX_ATTEMPTS must be at least 1".to_owned(),
            ));
        }
        if options.backoff_cap_ms < options.backoff_base_ms {
            return Err(RestCallError::Config(format!(
                "RESTCALL_BACKOFF_CAP_MS ({}) is below RESTCALL_BACKOFF_BASE_MS ({})",
                options.backoff_cap_ms, options.backoff_base_ms
            )));
        }
        Ok(options)
    }
}

fn parse_var<F, T>(lookup: &F, name: &str) -> Result<Option<T>>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let Some(raw) = lookup(name) else {
        return Ok(None);
    };
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    raw.parse()
        .map(Some)
        .map_err(|err| RestCallError::Config(format!("{name}='{raw}' is invalid: {err}")))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::time::Duration;

    use super::ClientOptions;
    use crate::{BackoffKind, RestCallError};

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |name: &str| vars.get(name).cloned()
    }

    #[test]
    fn defaults_make_a_single_attempt() {
        let options = ClientOptions::default();
        assert_eq!(options.retry_policy().max_attempts(), 1);
        assert_eq!(options.timeout(), Duration::from_secs(10));
        assert_eq!(options.attempt_timeout(), None);
    }

    #[test]
    fn lookup_overrides_defaults() {
        let options = ClientOptions::from_lookup(lookup(&[
            ("RESTCALL_MAX_ATTEMPTS", "4"),
            ("RESTCALL_BACKOFF", "ExpoFullyJitter"),
            ("RESTCALL_BACKOFF_BASE_MS", "50"),
            ("RESTCALL_BACKOFF_CAP_MS", "800"),
            ("RESTCALL_ATTEMPT_TIMEOUT_MS", " 1500 "),
            ("RESTCALL_TIMEOUT_MS", ""),
        ]))
        .expect("options must parse");

        assert_eq!(options.max_attempts, 4);
        assert_eq!(options.backoff, BackoffKind::FullJitter);
        assert_eq!(options.attempt_timeout(), Some(Duration::from_millis(1_500)));
        assert_eq!(options.timeout_ms, ClientOptions::default().timeout_ms);

        let policy = options.retry_policy();
        assert_eq!(policy.base, Duration::from_millis(50));
        assert_eq!(policy.cap, Duration::from_millis(800));
    }

    #[test]
    fn invalid_numbers_are_config_errors() {
        let err = ClientOptions::from_lookup(lookup(&[("RESTCALL_MAX_ATTEMPTS", "many")]))
            .expect_err("must reject");
        match err {
            RestCallError::Config(message) => assert!(message.contains("RESTCALL_MAX_ATTEMPTS")),
            other => panic!("expected config error, got {other:?}"),
        }
    }

    #[test]
    fn cap_below_base_is_rejected() {
        let result = ClientOptions::from_lookup(lookup(&[
            ("RESTCALL_BACKOFF_BASE_MS", "500"),
            ("RESTCALL_BACKOFF_CAP_MS", "100"),
        ]));
        assert!(matches!(result, Err(RestCallError::Config(_))));
    }

    #[test]
    fn zero_attempts_is_rejected() {
        let result = ClientOptions::from_lookup(lookup(&[("RESTCALL_MAX_ATTEMPTS", "0")]));
        assert!(matches!(result, Err(RestCallError::Config(_))));
    }
}
