// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! Settings are read from the environment once at startup.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `IMAS_URL` | Identity service base URL; keys are fetched from `<IMAS_URL>/v1/jwks` | Unset (no authentication) |
//! | `JWKS_TTL_SECS` | Key-set refresh interval in seconds | `600` |
//! | `JWKS_TIMEOUT_SECS` | HTTP timeout for the key-set fetch | `10` |
//! | `TOKEN_LEEWAY_SECS` | Clock-skew tolerance for `exp`, `iat` and `nbf` | `60` |
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Public listener port | `8081` |
//! | `INTERNAL_PORT` | Internal listener port (`/metrics`, `/health`) | `8090` |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use thiserror::Error;
use url::Url;

use crate::observability::LogFormat;

/// Environment variable name for the identity service base URL.
pub const IMAS_URL_ENV: &str = "IMAS_URL";
pub const JWKS_TTL_ENV: &str = "JWKS_TTL_SECS";
pub const JWKS_TIMEOUT_ENV: &str = "JWKS_TIMEOUT_SECS";
pub const TOKEN_LEEWAY_ENV: &str = "TOKEN_LEEWAY_SECS";
pub const HOST_ENV: &str = "HOST";
pub const PORT_ENV: &str = "PORT";
pub const INTERNAL_PORT_ENV: &str = "INTERNAL_PORT";
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

pub const DEFAULT_JWKS_TTL_SECS: u64 = 600;
pub const DEFAULT_JWKS_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_TOKEN_LEEWAY_SECS: u64 = 60;
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8081;
pub const DEFAULT_INTERNAL_PORT: u16 = 8090;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var}: invalid value {value:?}: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

impl ConfigError {
    fn invalid(var: &'static str, value: &str, reason: impl ToString) -> Self {
        ConfigError::Invalid {
            var,
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    /// Identity service base URL; `None` disables authentication
    pub imas_url: Option<Url>,
    pub jwks_ttl: Duration,
    pub jwks_timeout: Duration,
    pub token_leeway: Duration,
    pub host: IpAddr,
    pub port: u16,
    pub internal_port: u16,
    pub log_format: LogFormat,
}

impl Settings {
    /// Read settings from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read settings through `lookup`, which returns the value of a variable
    /// if it is set.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let imas_url = var(IMAS_URL_ENV)
            .map(|raw| Url::parse(raw.trim()).map_err(|e| ConfigError::invalid(IMAS_URL_ENV, &raw, e)))
            .transpose()?;

        let host = match var(HOST_ENV) {
            Some(raw) => raw
                .trim()
                .parse()
                .map_err(|e| ConfigError::invalid(HOST_ENV, &raw, e))?,
            None => DEFAULT_HOST
                .parse()
                .map_err(|e| ConfigError::invalid(HOST_ENV, DEFAULT_HOST, e))?,
        };

        let log_format = match var(LOG_FORMAT_ENV) {
            Some(raw) => raw
                .parse()
                .map_err(|e: String| ConfigError::invalid(LOG_FORMAT_ENV, &raw, e))?,
            None => LogFormat::default(),
        };

        Ok(Self {
            imas_url,
            jwks_ttl: seconds(&var, JWKS_TTL_ENV, DEFAULT_JWKS_TTL_SECS)?,
            jwks_timeout: seconds(&var, JWKS_TIMEOUT_ENV, DEFAULT_JWKS_TIMEOUT_SECS)?,
            token_leeway: seconds(&var, TOKEN_LEEWAY_ENV, DEFAULT_TOKEN_LEEWAY_SECS)?,
            host,
            port: number(&var, PORT_ENV, DEFAULT_PORT)?,
            internal_port: number(&var, INTERNAL_PORT_ENV, DEFAULT_INTERNAL_PORT)?,
            log_format,
        })
    }

    pub fn public_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    pub fn internal_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.internal_port)
    }
}

fn number<T>(
    var: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match var(name) {
        Some(raw) => raw.trim().parse().map_err(|e| ConfigError::invalid(name, &raw, e)),
        None => Ok(default),
    }
}

fn seconds(
    var: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: u64,
) -> Result<Duration, ConfigError> {
    number(var, name, default).map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings(vars: &[(&str, &str)]) -> Result<Settings, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let s = settings(&[]).unwrap();
        assert_eq!(s.imas_url, None);
        assert_eq!(s.jwks_ttl, Duration::from_secs(600));
        assert_eq!(s.jwks_timeout, Duration::from_secs(10));
        assert_eq!(s.token_leeway, Duration::from_secs(60));
        assert_eq!(s.public_addr(), "0.0.0.0:8081".parse().unwrap());
        assert_eq!(s.internal_addr(), "0.0.0.0:8090".parse().unwrap());
        assert_eq!(s.log_format, LogFormat::Pretty);
    }

    #[test]
    fn values_are_read() {
        let s = settings(&[
            ("IMAS_URL", "https://imas.example.com/"),
            ("JWKS_TTL_SECS", "30"),
            ("TOKEN_LEEWAY_SECS", "0"),
            ("HOST", "127.0.0.1"),
            ("PORT", "9000"),
            ("LOG_FORMAT", "json"),
        ])
        .unwrap();

        assert_eq!(s.imas_url.as_ref().unwrap().as_str(), "https://imas.example.com/");
        assert_eq!(s.jwks_ttl, Duration::from_secs(30));
        assert_eq!(s.token_leeway, Duration::ZERO);
        assert_eq!(s.public_addr(), "127.0.0.1:9000".parse().unwrap());
        assert_eq!(s.log_format, LogFormat::Json);
    }

    #[test]
    fn blank_values_count_as_unset() {
        let s = settings(&[("IMAS_URL", "  "), ("PORT", "")]).unwrap();
        assert_eq!(s.imas_url, None);
        assert_eq!(s.port, DEFAULT_PORT);
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(matches!(
            settings(&[("JWKS_TTL_SECS", "ten")]),
            Err(ConfigError::Invalid { var: "JWKS_TTL_SECS", .. })
        ));
        assert!(matches!(
            settings(&[("IMAS_URL", "not a url")]),
            Err(ConfigError::Invalid { var: "IMAS_URL", .. })
        ));
        assert!(settings(&[("PORT", "70000")]).is_err());
        assert!(settings(&[("LOG_FORMAT", "xml")]).is_err());
    }
}
