use async_trait::async_trait;
use relaycore::{
    Config, ConfigSchema, FieldKind, NodeError, Payload, Processor, ProcessorContext,
};
use relayruntime::{ProcessorFactory, ProcessorMetadata};
use serde_json::{json, Map};
use std::time::Duration;

/// HTTP request processor.
///
/// The URL comes from config, or from the `url` field of the input when not
/// configured. A `body` input field is sent as JSON for POST/PUT/PATCH.
pub struct HttpRequestProcessor {
    client: reqwest::Client,
}

impl HttpRequestProcessor {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for HttpRequestProcessor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Processor for HttpRequestProcessor {
    fn name(&self) -> &str {
        "http_request"
    }

    fn schema(&self) -> ConfigSchema {
        ConfigSchema::new()
            .optional("url", FieldKind::String)
            .optional(
                "method",
                FieldKind::OneOf(&["GET", "POST", "PUT", "PATCH", "DELETE"]),
            )
            .optional("headers", FieldKind::Object)
            .optional("timeout_ms", FieldKind::Integer)
    }

    async fn execute(&self, ctx: ProcessorContext) -> Result<Payload, NodeError> {
        let url = match ctx.config.get("url").and_then(Payload::as_str) {
            Some(url) => url.to_string(),
            None => ctx.require_input_str("url")?.to_string(),
        };
        let method = ctx.config_str("method", "GET");

        ctx.events.info(format!("{} {}", method, url));

        let mut request = match method {
            "GET" => self.client.get(&url),
            "POST" => self.client.post(&url),
            "PUT" => self.client.put(&url),
            "PATCH" => self.client.patch(&url),
            "DELETE" => self.client.delete(&url),
            other => {
                return Err(NodeError::Validation(format!(
                    "unsupported method '{}'",
                    other
                )))
            }
        };

        if matches!(method, "POST" | "PUT" | "PATCH") {
            if let Some(body) = ctx.input.get("body") {
                request = match body {
                    Payload::String(text) => request.body(text.clone()),
                    other => request.json(other),
                };
            }
        }

        // Add headers if provided
        if let Some(Payload::Object(headers)) = ctx.config.get("headers") {
            for (key, value) in headers {
                if let Some(val_str) = value.as_str() {
                    request = request.header(key, val_str);
                }
            }
        }

        if let Some(timeout_ms) = ctx.config.get("timeout_ms").and_then(Payload::as_u64) {
            request = request.timeout(Duration::from_millis(timeout_ms));
        }

        let response = tokio::select! {
            _ = ctx.cancellation.cancelled() => return Err(NodeError::Cancelled),
            response = request.send() => response
                .map_err(|e| NodeError::ExecutionFailed(format!("HTTP request failed: {}", e)))?,
        };

        let status = response.status().as_u16();
        let headers: Map<String, Payload> = response
            .headers()
            .iter()
            .map(|(k, v)| (k.to_string(), json!(v.to_str().unwrap_or(""))))
            .collect();

        let body = response
            .text()
            .await
            .map_err(|e| NodeError::ExecutionFailed(format!("Failed to read response: {}", e)))?;

        ctx.events.info(format!("Response status: {}", status));

        let mut output = json!({
            "status": status,
            "body": body,
            "headers": headers,
        });
        if let Ok(parsed) = serde_json::from_str::<Payload>(&body) {
            output["json"] = parsed;
        }
        Ok(output)
    }
}

pub struct HttpRequestFactory;

impl ProcessorFactory for HttpRequestFactory {
    fn create(&self, _config: &Config) -> Result<Box<dyn Processor>, NodeError> {
        Ok(Box::new(HttpRequestProcessor::new()))
    }

    fn metadata(&self) -> ProcessorMetadata {
        ProcessorMetadata {
            description: "Make HTTP requests".to_string(),
            category: "http".to_string(),
        }
    }
}
