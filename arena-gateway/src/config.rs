//! Gateway configuration resolved from CLI arguments and the environment.

use anyhow::{bail, Result};
use std::time::Duration;

pub const DEFAULT_MINIMUM_LISTEN_TIME: f64 = 5.0;
pub const DEFAULT_GENERATE_DEADLINE_SECS: u64 = 180;

/// Environment overrides recognized by the gateway.
pub mod env_vars {
    pub const MINIMUM_LISTEN_TIME: &str = "MINIMUM_LISTEN_TIME";
    pub const FLAKINESS: &str = "FLAKINESS";
    pub const GATEWAY_URL: &str = "GATEWAY_URL";
    pub const SYSTEMS_BASE_URL: &str = "SYSTEMS_BASE_URL";
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub port: u16,
    /// Base URL clients can reach this gateway at; audio URLs start with it.
    pub public_base_url: String,
    /// Base URL (scheme + host, no port) where system servers live.
    pub systems_base_url: String,
    /// Minimum seconds of playback per side before a vote counts.
    pub minimum_listen_time: f64,
    /// Probability of injecting a transient 500 on /generate_battle.
    pub flakiness: f64,
    /// Total deadline for one generate call to a system server.
    pub generate_deadline: Duration,
    /// Tag naming the chat prompt templates in use, part of cache keys.
    pub route_config: String,
}

/// CLI-sourced inputs; `None` falls back to env, then to defaults.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub port: Option<u16>,
    pub public_base_url: Option<String>,
    pub systems_base_url: Option<String>,
    pub minimum_listen_time: Option<f64>,
    pub flakiness: Option<f64>,
    pub generate_deadline_secs: Option<u64>,
    pub route_config: Option<String>,
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Result<Option<T>> {
    match std::env::var(name) {
        Ok(raw) => match raw.parse() {
            Ok(value) => Ok(Some(value)),
            Err(_) => bail!("env var {} has invalid value {:?}", name, raw),
        },
        Err(_) => Ok(None),
    }
}

impl GatewayConfig {
    pub fn resolve(overrides: &ConfigOverrides) -> Result<Self> {
        let port = overrides.port.unwrap_or(8080);

        let public_base_url = overrides
            .public_base_url
            .clone()
            .or_else(|| std::env::var(env_vars::GATEWAY_URL).ok())
            .unwrap_or_else(|| format!("http://localhost:{}", port))
            .trim_end_matches('/')
            .to_string();

        let systems_base_url = overrides
            .systems_base_url
            .clone()
            .or_else(|| std::env::var(env_vars::SYSTEMS_BASE_URL).ok())
            .unwrap_or_else(|| "http://localhost".to_string())
            .trim_end_matches('/')
            .to_string();

        let minimum_listen_time = match overrides.minimum_listen_time {
            Some(value) => value,
            None => env_parse::<f64>(env_vars::MINIMUM_LISTEN_TIME)?
                .unwrap_or(DEFAULT_MINIMUM_LISTEN_TIME),
        };
        if minimum_listen_time < 0.0 || !minimum_listen_time.is_finite() {
            bail!(
                "minimum listen time must be non-negative, got {}",
                minimum_listen_time
            );
        }

        let flakiness = match overrides.flakiness {
            Some(value) => value,
            None => env_parse::<f64>(env_vars::FLAKINESS)?.unwrap_or(0.0),
        };
        if !(0.0..=1.0).contains(&flakiness) {
            bail!("flakiness must be in [0, 1], got {}", flakiness);
        }

        Ok(Self {
            port,
            public_base_url,
            systems_base_url,
            minimum_listen_time,
            flakiness,
            generate_deadline: Duration::from_secs(
                overrides
                    .generate_deadline_secs
                    .unwrap_or(DEFAULT_GENERATE_DEADLINE_SECS),
            ),
            route_config: overrides
                .route_config
                .clone()
                .unwrap_or_else(|| "4o-v00".to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = GatewayConfig::resolve(&ConfigOverrides {
            port: Some(9999),
            // Pin everything env-sourced so the test ignores ambient vars.
            public_base_url: Some("http://gw.example.com/".to_string()),
            systems_base_url: Some("http://systems.example.com".to_string()),
            minimum_listen_time: Some(5.0),
            flakiness: Some(0.0),
            ..ConfigOverrides::default()
        })
        .unwrap();
        assert_eq!(config.port, 9999);
        assert_eq!(config.public_base_url, "http://gw.example.com");
        assert_eq!(config.minimum_listen_time, 5.0);
        assert_eq!(config.flakiness, 0.0);
        assert_eq!(config.generate_deadline, Duration::from_secs(180));
        assert_eq!(config.route_config, "4o-v00");
    }

    #[test]
    fn test_flakiness_range_checked() {
        let result = GatewayConfig::resolve(&ConfigOverrides {
            flakiness: Some(1.5),
            minimum_listen_time: Some(5.0),
            ..ConfigOverrides::default()
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_negative_listen_time_rejected() {
        let result = GatewayConfig::resolve(&ConfigOverrides {
            minimum_listen_time: Some(-1.0),
            flakiness: Some(0.0),
            ..ConfigOverrides::default()
        });
        assert!(result.is_err());
    }
}
