//! Service configuration.
//!
//! [`ServiceConfig`] is plain data handed to [`Server::new`](crate::Server::new).
//! Where the values come from is the binary's business; [`ServiceConfig::from_env`]
//! covers the common case of environment variables:
//!
//! | Variable | Default |
//! |---|---|
//! | `<PREFIX>_WEB_ADDRESS` | `0.0.0.0:8000` |
//! | `<PREFIX>_WEB_READ_TIMEOUT` | `5s` |
//! | `<PREFIX>_WEB_WRITE_TIMEOUT` | `5s` |
//! | `<PREFIX>_WEB_SHUTDOWN_TIMEOUT` | `5s` |
//!
//! Durations accept `250ms`, `5s`, `2m`, `1h`, or a bare number of seconds.

use std::env;
use std::time::Duration;

use crate::error::Error;

/// Listener address and transport timeouts.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ServiceConfig {
    /// `host:port` to bind. Host names are resolved at bind time.
    pub address: String,
    /// Bounds reading request headers and body.
    pub read_timeout: Duration,
    /// Bounds producing the response once the request has been read.
    pub write_timeout: Duration,
    /// Bounds the graceful drain before connections are force-closed.
    pub shutdown_timeout: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            address: "0.0.0.0:8000".to_owned(),
            read_timeout: Duration::from_secs(5),
            write_timeout: Duration::from_secs(5),
            shutdown_timeout: Duration::from_secs(5),
        }
    }
}

impl ServiceConfig {
    /// Loads the configuration from `<prefix>_WEB_*` environment variables,
    /// falling back to the defaults for unset ones.
    pub fn from_env(prefix: &str) -> Result<Self, Error> {
        Self::from_lookup(prefix, |key| env::var(key).ok())
    }

    fn from_lookup(prefix: &str, lookup: impl Fn(&str) -> Option<String>) -> Result<Self, Error> {
        let mut cfg = Self::default();
        let key = |name: &str| format!("{prefix}_WEB_{name}");

        if let Some(addr) = lookup(&key("ADDRESS")) {
            cfg.address = addr;
        }

        for (name, slot) in [
            ("READ_TIMEOUT", &mut cfg.read_timeout),
            ("WRITE_TIMEOUT", &mut cfg.write_timeout),
            ("SHUTDOWN_TIMEOUT", &mut cfg.shutdown_timeout),
        ] {
            let var = key(name);
            if let Some(raw) = lookup(&var) {
                *slot = parse_duration(&raw).ok_or_else(|| Error::Config {
                    reason: format!("invalid duration `{raw}`"),
                    key: var,
                })?;
            }
        }

        Ok(cfg)
    }
}

fn parse_duration(raw: &str) -> Option<Duration> {
    let raw = raw.trim();
    let split = raw.find(|c: char| !c.is_ascii_digit()).unwrap_or(raw.len());
    let (digits, unit) = raw.split_at(split);
    let n: u64 = digits.parse().ok()?;
    match unit {
        "ms"     => Some(Duration::from_millis(n)),
        "" | "s" => Some(Duration::from_secs(n)),
        "m"      => Some(Duration::from_secs(n.checked_mul(60)?)),
        "h"      => Some(Duration::from_secs(n.checked_mul(3600)?)),
        _        => None,
    }
}
