//! Client side of the remote plugin protocol.
//!
//! Every business node call is a `POST` to
//! `{base_url}/api/plugins/{plugin_id}/nodes/{remote_node_id}/execute`
//! carrying an [`InvokeRequest`]. The host answers `{"success": true,
//! "output": ...}` or a structured error.

use crate::config::PluginHostConfig;
use async_trait::async_trait;
use relaycore::{Config, ExecutionId, NodeError, NodeId, Payload, PluginBinding};
use reqwest::StatusCode;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Request body sent to the plugin host
#[derive(Debug, Clone, Serialize)]
pub struct InvokeRequest {
    pub node_id: NodeId,
    pub node_name: String,
    pub execution_id: ExecutionId,
    pub inputs: Payload,
    pub config: Config,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProxyError {
    #[error("plugin host unreachable at {url}: {message}")]
    Connection { url: String, message: String },

    #[error("{0}")]
    RemoteExecution(String),

    #[error("plugin host gave no response within {timeout_ms}ms after {attempts} attempt(s)")]
    Timeout { attempts: u32, timeout_ms: u64 },

    #[error("Cancelled")]
    Cancelled,
}

impl From<ProxyError> for NodeError {
    fn from(err: ProxyError) -> Self {
        match err {
            ProxyError::Connection { url, message } => NodeError::Connection { url, message },
            ProxyError::RemoteExecution(message) => NodeError::RemoteExecution(message),
            ProxyError::Timeout {
                attempts,
                timeout_ms,
            } => NodeError::Timeout {
                attempts,
                timeout_ms,
            },
            ProxyError::Cancelled => NodeError::Cancelled,
        }
    }
}

/// Deadline and retry budget of one remote call
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CallPolicy {
    pub timeout: Duration,
    pub max_retries: u32,
    pub retry_delay: Duration,
}

/// Invokes business nodes. Implemented by [`PdkProxyClient`]; the executor
/// only sees this trait.
#[async_trait]
pub trait PluginInvoker: Send + Sync {
    async fn invoke(
        &self,
        binding: &PluginBinding,
        request: &InvokeRequest,
        cancel: &CancellationToken,
    ) -> Result<Payload, ProxyError>;
}

/// HTTP proxy to the plugin host. The underlying connection pool is shared by
/// all runs; no state is kept between calls.
pub struct PdkProxyClient {
    client: reqwest::Client,
    config: PluginHostConfig,
}

impl PdkProxyClient {
    pub fn new(config: PluginHostConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    pub fn config(&self) -> &PluginHostConfig {
        &self.config
    }

    pub fn endpoint(&self, binding: &PluginBinding) -> String {
        format!(
            "{}/api/plugins/{}/nodes/{}/execute",
            self.config.base_url.trim_end_matches('/'),
            binding.plugin_id,
            binding.node_id
        )
    }

    /// Retry budget precedence: the node's own binding, then the override
    /// for its remote node id, then the global budget.
    pub fn policy_for(&self, binding: &PluginBinding) -> CallPolicy {
        let max_retries = binding
            .max_retries
            .or_else(|| self.config.retry_overrides.get(&binding.node_id).copied())
            .unwrap_or(self.config.max_retries);

        CallPolicy {
            timeout: self.config.timeout,
            max_retries,
            retry_delay: self.config.retry_delay,
        }
    }

    /// Invoke a remote node with an explicit policy.
    ///
    /// Only timeouts are retried, each attempt with the full deadline. The
    /// first connection or remote error ends the call.
    pub async fn invoke_with_policy(
        &self,
        binding: &PluginBinding,
        request: &InvokeRequest,
        policy: CallPolicy,
        cancel: &CancellationToken,
    ) -> Result<Payload, ProxyError> {
        let url = self.endpoint(binding);
        let attempts = policy.max_retries.saturating_add(1);

        for attempt in 1..=attempts {
            tracing::debug!(
                plugin_id = %binding.plugin_id,
                remote_node_id = %binding.node_id,
                attempt,
                "Invoking business node"
            );

            let call = tokio::time::timeout(policy.timeout, self.send_once(&url, request));
            let result = tokio::select! {
                _ = cancel.cancelled() => return Err(ProxyError::Cancelled),
                result = call => result,
            };

            match result {
                Ok(Ok((status, body))) => return decode_response(status, &body),
                Ok(Err(SendError::TimedOut)) | Err(_) => {
                    tracing::warn!(
                        plugin_id = %binding.plugin_id,
                        remote_node_id = %binding.node_id,
                        "Attempt {}/{} timed out after {}ms",
                        attempt,
                        attempts,
                        policy.timeout.as_millis()
                    );
                }
                Ok(Err(SendError::Connection(message))) => {
                    tracing::error!(url = %url, "Plugin host unreachable: {}", message);
                    return Err(ProxyError::Connection { url, message });
                }
            }

            if attempt < attempts && !policy.retry_delay.is_zero() {
                tokio::select! {
                    _ = cancel.cancelled() => return Err(ProxyError::Cancelled),
                    _ = tokio::time::sleep(policy.retry_delay) => {}
                }
            }
        }

        Err(ProxyError::Timeout {
            attempts,
            timeout_ms: policy.timeout.as_millis() as u64,
        })
    }

    async fn send_once(
        &self,
        url: &str,
        request: &InvokeRequest,
    ) -> Result<(StatusCode, String), SendError> {
        let response = self
            .client
            .post(url)
            .json(request)
            .send()
            .await
            .map_err(SendError::from)?;

        let status = response.status();
        let body = response.text().await.map_err(SendError::from)?;
        Ok((status, body))
    }
}

#[async_trait]
impl PluginInvoker for PdkProxyClient {
    async fn invoke(
        &self,
        binding: &PluginBinding,
        request: &InvokeRequest,
        cancel: &CancellationToken,
    ) -> Result<Payload, ProxyError> {
        let policy = self.policy_for(binding);
        self.invoke_with_policy(binding, request, policy, cancel).await
    }
}

enum SendError {
    TimedOut,
    Connection(String),
}

impl From<reqwest::Error> for SendError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return SendError::TimedOut;
        }
        SendError::Connection(error_chain(&err))
    }
}

/// Render an error with its sources; reqwest keeps the useful part
/// ("connection refused") in the source chain.
fn error_chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

fn decode_response(status: StatusCode, body: &str) -> Result<Payload, ProxyError> {
    let parsed: Option<Payload> = serde_json::from_str(body).ok();

    if !status.is_success() {
        let message = parsed
            .as_ref()
            .and_then(remote_error_message)
            .unwrap_or_else(|| {
                if body.trim().is_empty() {
                    format!("plugin host returned HTTP {}", status.as_u16())
                } else {
                    body.to_string()
                }
            });
        return Err(ProxyError::RemoteExecution(message));
    }

    match parsed {
        Some(Payload::Object(mut map)) if map.contains_key("success") => {
            if map.get("success").and_then(Payload::as_bool) == Some(true) {
                Ok(map.remove("output").unwrap_or(Payload::Null))
            } else {
                let message = remote_error_message(&Payload::Object(map))
                    .unwrap_or_else(|| "remote node reported failure without a message".to_string());
                Err(ProxyError::RemoteExecution(message))
            }
        }
        Some(payload) => Ok(payload),
        None if body.trim().is_empty() => Ok(Payload::Null),
        None => Err(ProxyError::RemoteExecution(format!(
            "plugin host returned a body that is not JSON: {}",
            body
        ))),
    }
}

/// Error text of a structured error body: `error` (string or `{message}`),
/// then `detail`, then `message`.
fn remote_error_message(body: &Payload) -> Option<String> {
    let map = body.as_object()?;
    match map.get("error") {
        Some(Payload::String(s)) => return Some(s.clone()),
        Some(Payload::Object(inner)) => {
            if let Some(Payload::String(s)) = inner.get("message") {
                return Some(s.clone());
            }
        }
        _ => {}
    }
    ["detail", "message"]
        .iter()
        .find_map(|key| map.get(*key).and_then(Payload::as_str).map(str::to_string))
}
