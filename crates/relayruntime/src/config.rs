//! Process-wide runtime configuration, read once at startup.

use relaycore::ConfigError;
use std::collections::HashMap;
use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

pub const ENV_PLUGIN_HOST_URL: &str = "RELAY_PLUGIN_HOST_URL";
pub const ENV_PLUGIN_TIMEOUT_MS: &str = "RELAY_PLUGIN_TIMEOUT_MS";
pub const ENV_PLUGIN_MAX_RETRIES: &str = "RELAY_PLUGIN_MAX_RETRIES";
pub const ENV_PLUGIN_RETRY_DELAY_MS: &str = "RELAY_PLUGIN_RETRY_DELAY_MS";
pub const ENV_PLUGIN_RETRY_OVERRIDES: &str = "RELAY_PLUGIN_RETRY_OVERRIDES";
pub const ENV_MAX_PARALLEL_NODES: &str = "RELAY_MAX_PARALLEL_NODES";
pub const ENV_EVENT_BUFFER: &str = "RELAY_EVENT_BUFFER";
pub const ENV_CATALOG_TTL_SECS: &str = "RELAY_CATALOG_TTL_SECS";

/// Configuration for the runtime
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub max_parallel_nodes: usize,
    pub event_buffer_size: usize,
    pub plugin_host: PluginHostConfig,
    pub catalog_ttl: Duration,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_parallel_nodes: 8,
            event_buffer_size: 1000,
            plugin_host: PluginHostConfig::default(),
            catalog_ttl: Duration::from_secs(60),
        }
    }
}

/// How business nodes are reached on the plugin host
#[derive(Debug, Clone)]
pub struct PluginHostConfig {
    pub base_url: String,
    /// Deadline of a single attempt
    pub timeout: Duration,
    /// Extra attempts after a timeout; 0 means one attempt only
    pub max_retries: u32,
    /// Fixed pause between timed-out attempts
    pub retry_delay: Duration,
    /// Retry budget per remote node id, for nodes not safe to re-invoke
    pub retry_overrides: HashMap<String, u32>,
}

impl Default for PluginHostConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3001".to_string(),
            timeout: Duration::from_secs(30),
            max_retries: 2,
            retry_delay: Duration::from_millis(250),
            retry_overrides: HashMap::new(),
        }
    }
}

impl PluginHostConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    pub fn with_retry_override(mut self, remote_node_id: impl Into<String>, max_retries: u32) -> Self {
        self.retry_overrides.insert(remote_node_id.into(), max_retries);
        self
    }
}

impl RuntimeConfig {
    /// Read configuration from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through an arbitrary variable lookup.
    ///
    /// Unset variables take their default; set but malformed ones are errors.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = RuntimeConfig::default();
        let host_defaults = defaults.plugin_host;

        let base_url = match lookup(ENV_PLUGIN_HOST_URL) {
            Some(url) => {
                let url = url.trim().trim_end_matches('/').to_string();
                if !(url.starts_with("http://") || url.starts_with("https://")) {
                    return Err(invalid(ENV_PLUGIN_HOST_URL, &url, "expected an http(s) URL"));
                }
                url
            }
            None => host_defaults.base_url,
        };

        let timeout_ms: u64 = parse_var(
            &lookup,
            ENV_PLUGIN_TIMEOUT_MS,
            host_defaults.timeout.as_millis() as u64,
        )?;
        if timeout_ms == 0 {
            return Err(invalid(ENV_PLUGIN_TIMEOUT_MS, "0", "timeout must be positive"));
        }

        let max_parallel_nodes: usize =
            parse_var(&lookup, ENV_MAX_PARALLEL_NODES, defaults.max_parallel_nodes)?;
        if max_parallel_nodes == 0 {
            return Err(invalid(ENV_MAX_PARALLEL_NODES, "0", "at least one worker is required"));
        }

        let retry_overrides = match lookup(ENV_PLUGIN_RETRY_OVERRIDES) {
            Some(raw) => parse_overrides(&raw)?,
            None => HashMap::new(),
        };

        Ok(Self {
            max_parallel_nodes,
            event_buffer_size: parse_var(&lookup, ENV_EVENT_BUFFER, defaults.event_buffer_size)?,
            plugin_host: PluginHostConfig {
                base_url,
                timeout: Duration::from_millis(timeout_ms),
                max_retries: parse_var(&lookup, ENV_PLUGIN_MAX_RETRIES, host_defaults.max_retries)?,
                retry_delay: Duration::from_millis(parse_var(
                    &lookup,
                    ENV_PLUGIN_RETRY_DELAY_MS,
                    host_defaults.retry_delay.as_millis() as u64,
                )?),
                retry_overrides,
            },
            catalog_ttl: Duration::from_secs(parse_var(
                &lookup,
                ENV_CATALOG_TTL_SECS,
                defaults.catalog_ttl.as_secs(),
            )?),
        })
    }
}

fn parse_var<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e: T::Err| invalid(key, &raw, &e.to_string())),
        None => Ok(default),
    }
}

/// Parse `node_a=0,node_b=1`
fn parse_overrides(raw: &str) -> Result<HashMap<String, u32>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let (node, retries) = entry.split_once('=').ok_or_else(|| {
                invalid(ENV_PLUGIN_RETRY_OVERRIDES, entry, "expected <remote_node_id>=<retries>")
            })?;
            let retries = retries
                .trim()
                .parse()
                .map_err(|e: std::num::ParseIntError| {
                    invalid(ENV_PLUGIN_RETRY_OVERRIDES, entry, &e.to_string())
                })?;
            Ok((node.trim().to_string(), retries))
        })
        .collect()
}

fn invalid(key: &str, value: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        let config = RuntimeConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.plugin_host.base_url, "http://localhost:3001");
        assert_eq!(config.plugin_host.max_retries, 2);
        assert_eq!(config.plugin_host.timeout, Duration::from_secs(30));
        assert_eq!(config.max_parallel_nodes, 8);
    }

    #[test]
    fn reads_plugin_host_settings() {
        let config = RuntimeConfig::from_lookup(lookup(&[
            (ENV_PLUGIN_HOST_URL, "http://pdk.internal:3001/"),
            (ENV_PLUGIN_TIMEOUT_MS, "1500"),
            (ENV_PLUGIN_MAX_RETRIES, "0"),
            (ENV_PLUGIN_RETRY_OVERRIDES, "vector_store_operations=0, event_logger=1"),
        ]))
        .unwrap();

        assert_eq!(config.plugin_host.base_url, "http://pdk.internal:3001");
        assert_eq!(config.plugin_host.timeout, Duration::from_millis(1500));
        assert_eq!(config.plugin_host.max_retries, 0);
        assert_eq!(config.plugin_host.retry_overrides["vector_store_operations"], 0);
        assert_eq!(config.plugin_host.retry_overrides["event_logger"], 1);
    }

    #[test]
    fn malformed_values_are_errors() {
        let err = RuntimeConfig::from_lookup(lookup(&[(ENV_PLUGIN_MAX_RETRIES, "lots")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { ref key, .. } if key == ENV_PLUGIN_MAX_RETRIES));

        assert!(RuntimeConfig::from_lookup(lookup(&[(ENV_PLUGIN_HOST_URL, "pdk:3001")])).is_err());
        assert!(RuntimeConfig::from_lookup(lookup(&[(ENV_MAX_PARALLEL_NODES, "0")])).is_err());
        assert!(RuntimeConfig::from_lookup(lookup(&[(ENV_PLUGIN_RETRY_OVERRIDES, "node")])).is_err());
    }
}
