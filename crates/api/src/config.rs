//! Process configuration read from the environment.

use std::time::Duration;

use jobrelay_infra::{OrchestratorConfig, SweepConfig};

const DEV_JWT_SECRET: &str = "dev-secret";
const DEFAULT_TASK_STREAM_KEY: &str = "jobrelay:tasks";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}

/// Everything `main` needs to wire the service.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    pub jwt_secret: String,
    /// Postgres URL; in-memory store when absent.
    pub database_url: Option<String>,
    /// Redis URL; in-memory dispatcher when absent.
    pub redis_url: Option<String>,
    pub task_stream_key: String,
    /// Base URL the external queue calls back into.
    pub callback_base_url: String,
    pub orchestrator: OrchestratorConfig,
    /// `None` when the sweep is disabled.
    pub sweep: Option<SweepConfig>,
}

impl AppConfig {
    /// In-memory wiring with defaults; used by tests and local runs.
    pub fn in_memory(jwt_secret: impl Into<String>) -> Self {
        Self {
            bind_addr: "127.0.0.1:0".to_string(),
            jwt_secret: jwt_secret.into(),
            database_url: None,
            redis_url: None,
            task_stream_key: DEFAULT_TASK_STREAM_KEY.to_string(),
            callback_base_url: "http://localhost:8080".to_string(),
            orchestrator: OrchestratorConfig::default(),
            sweep: None,
        }
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let jwt_secret = get("JWT_SECRET").unwrap_or_else(|| {
            tracing::warn!("JWT_SECRET not set; using insecure dev default");
            DEV_JWT_SECRET.to_string()
        });

        let defaults = OrchestratorConfig::default();
        let orchestrator = OrchestratorConfig {
            max_attempts: parse(&get, "JOB_MAX_ATTEMPTS")?.unwrap_or(defaults.max_attempts),
            max_payload_bytes: parse(&get, "JOB_MAX_PAYLOAD_BYTES")?
                .unwrap_or(defaults.max_payload_bytes),
        };
        if orchestrator.max_attempts == 0 {
            return Err(ConfigError::Invalid {
                key: "JOB_MAX_ATTEMPTS",
                value: "0".to_string(),
            });
        }

        let sweep_enabled: bool = parse(&get, "SWEEP_ENABLED")?.unwrap_or(true);
        let sweep = if sweep_enabled {
            let mut sweep = SweepConfig::default();
            if let Some(secs) = parse_secs(&get, "SWEEP_INTERVAL_SECS")? {
                if secs.is_zero() {
                    return Err(ConfigError::Invalid {
                        key: "SWEEP_INTERVAL_SECS",
                        value: "0".to_string(),
                    });
                }
                sweep = sweep.with_interval(secs);
            }
            if let Some(secs) = parse_secs(&get, "SWEEP_PENDING_AFTER_SECS")? {
                sweep = sweep.with_pending_after(secs);
            }
            if let Some(secs) = parse_secs(&get, "SWEEP_QUEUED_AFTER_SECS")? {
                sweep = sweep.with_queued_after(secs);
            }
            if let Some(secs) = parse_secs(&get, "SWEEP_PROCESSING_AFTER_SECS")? {
                sweep = sweep.with_processing_after(secs);
            }
            Some(sweep)
        } else {
            None
        };

        Ok(Self {
            bind_addr: get("BIND_ADDR").unwrap_or_else(|| "0.0.0.0:8080".to_string()),
            jwt_secret,
            database_url: get("DATABASE_URL"),
            redis_url: get("REDIS_URL"),
            task_stream_key: get("TASK_STREAM_KEY")
                .unwrap_or_else(|| DEFAULT_TASK_STREAM_KEY.to_string()),
            callback_base_url: get("CALLBACK_BASE_URL")
                .unwrap_or_else(|| "http://localhost:8080".to_string()),
            orchestrator,
            sweep,
        })
    }
}

fn parse<T, G>(get: &G, key: &'static str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { key, value: raw }),
    }
}

fn parse_secs<G>(get: &G, key: &'static str) -> Result<Option<Duration>, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    Ok(parse::<u64, _>(get, key)?.map(Duration::from_secs))
}
