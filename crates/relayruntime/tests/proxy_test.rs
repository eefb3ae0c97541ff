// crates/relayruntime/tests/proxy_test.rs

use mockito::{Matcher, Server};
use relaycore::PluginBinding;
use relayruntime::{
    CallPolicy, InvokeRequest, PdkProxyClient, PluginHostConfig, PluginInvoker, ProxyError,
};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

fn binding(remote_node_id: &str) -> PluginBinding {
    PluginBinding {
        plugin_id: "core-plugin".to_string(),
        node_id: remote_node_id.to_string(),
        max_retries: None,
    }
}

fn request() -> InvokeRequest {
    let mut config = relaycore::Config::new();
    config.insert("collection".to_string(), json!("docs"));
    InvokeRequest {
        node_id: "search".to_string(),
        node_name: "Vector search".to_string(),
        execution_id: Uuid::new_v4(),
        inputs: json!({"query": "invoices"}),
        config,
    }
}

// Accepts connections and never answers; counts accepted sockets
async fn silent_host() -> (String, Arc<AtomicUsize>) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());
    let accepted = Arc::new(AtomicUsize::new(0));
    let counter = accepted.clone();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            counter.fetch_add(1, Ordering::SeqCst);
            held.push(socket);
        }
    });
    (url, accepted)
}

// Holds the first connection open without answering, then replies to every
// later request with the given status and JSON body
async fn recovering_host(status: &'static str, body: &'static str) -> (String, Arc<AtomicUsize>) {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());
    let accepted = Arc::new(AtomicUsize::new(0));
    let counter = accepted.clone();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((mut socket, _)) = listener.accept().await {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                held.push(socket);
                continue;
            }
            tokio::spawn(async move {
                let mut request = Vec::new();
                let mut buf = [0u8; 4096];
                loop {
                    let n = socket.read(&mut buf).await.unwrap_or(0);
                    if n == 0 {
                        return;
                    }
                    request.extend_from_slice(&buf[..n]);
                    let text = String::from_utf8_lossy(&request).to_string();
                    if let Some(end) = text.find("\r\n\r\n") {
                        let length = text[..end]
                            .lines()
                            .find_map(|l| {
                                let (name, value) = l.split_once(':')?;
                                name.eq_ignore_ascii_case("content-length")
                                    .then(|| value.trim().parse::<usize>().ok())
                                    .flatten()
                            })
                            .unwrap_or(0);
                        if request.len() >= end + 4 + length {
                            break;
                        }
                    }
                }
                let response = format!(
                    "HTTP/1.1 {}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });
    (url, accepted)
}

fn short_policy() -> CallPolicy {
    CallPolicy {
        timeout: Duration::from_millis(150),
        max_retries: 2,
        retry_delay: Duration::from_millis(10),
    }
}

#[tokio::test]
async fn test_success_envelope_returns_output() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/api/plugins/core-plugin/nodes/vector_search/execute")
        .match_body(Matcher::PartialJson(json!({
            "node_id": "search",
            "node_name": "Vector search",
            "inputs": {"query": "invoices"},
            "config": {"collection": "docs"}
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"success": true, "output": {"hits": [1, 2]}}"#)
        .create_async()
        .await;

    let client = PdkProxyClient::new(PluginHostConfig::new(server.url()));
    let output = client
        .invoke(&binding("vector_search"), &request(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(output, json!({"hits": [1, 2]}));
    mock.assert_async().await;
}

#[tokio::test]
async fn test_remote_failure_is_passed_through_without_retry() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/api/plugins/core-plugin/nodes/vector_search/execute")
        .with_status(500)
        .with_header("content-type", "application/json")
        .with_body(r#"{"success": false, "error": "embedding model not loaded"}"#)
        .expect(1)
        .create_async()
        .await;

    let client = PdkProxyClient::new(PluginHostConfig::new(server.url()).with_max_retries(3));
    let err = client
        .invoke(&binding("vector_search"), &request(), &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(
        err,
        ProxyError::RemoteExecution("embedding model not loaded".to_string())
    );
    mock.assert_async().await;
}

#[tokio::test]
async fn test_unknown_remote_node_reports_host_detail() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("POST", "/api/plugins/core-plugin/nodes/missing/execute")
        .with_status(404)
        .with_body(r#"{"detail": "Node 'missing' not found in plugin 'core-plugin'"}"#)
        .create_async()
        .await;

    let client = PdkProxyClient::new(PluginHostConfig::new(server.url()));
    let err = client
        .invoke(&binding("missing"), &request(), &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(
        err,
        ProxyError::RemoteExecution("Node 'missing' not found in plugin 'core-plugin'".into())
    );
}

#[tokio::test]
async fn test_connection_refused_is_not_retried() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);

    let client = PdkProxyClient::new(
        PluginHostConfig::new(url.clone())
            .with_max_retries(5)
            .with_retry_delay(Duration::from_secs(1)),
    );
    let started = Instant::now();
    let err = client
        .invoke(&binding("event_input_node"), &request(), &CancellationToken::new())
        .await
        .unwrap_err();

    match err {
        ProxyError::Connection { url: reported, .. } => assert!(reported.starts_with(&url)),
        other => panic!("expected connection error, got {:?}", other),
    }
    assert!(
        started.elapsed() < Duration::from_secs(1),
        "a retry delay was spent on a connection error"
    );
}

#[tokio::test]
async fn test_timeouts_are_retried_up_to_budget() {
    let (url, accepted) = silent_host().await;
    let client = PdkProxyClient::new(PluginHostConfig::new(url));
    let policy = CallPolicy {
        timeout: Duration::from_millis(100),
        max_retries: 2,
        retry_delay: Duration::from_millis(10),
    };

    let err = client
        .invoke_with_policy(&binding("slow_node"), &request(), policy, &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(
        err,
        ProxyError::Timeout {
            attempts: 3,
            timeout_ms: 100
        }
    );
    assert_eq!(accepted.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_zero_retries_means_single_attempt() {
    let (url, accepted) = silent_host().await;
    let client = PdkProxyClient::new(
        PluginHostConfig::new(url)
            .with_timeout(Duration::from_millis(100))
            .with_max_retries(4),
    );
    let mut no_retry = binding("event_logger");
    no_retry.max_retries = Some(0);

    let err = client
        .invoke(&no_retry, &request(), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, ProxyError::Timeout { attempts: 1, .. }));
    assert_eq!(accepted.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_cancellation_interrupts_call() {
    let (url, _accepted) = silent_host().await;
    let client = PdkProxyClient::new(
        PluginHostConfig::new(url).with_timeout(Duration::from_secs(30)),
    );
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let started = Instant::now();
    let err = client
        .invoke(&binding("pdf_parser"), &request(), &cancel)
        .await
        .unwrap_err();

    assert_eq!(err, ProxyError::Cancelled);
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn test_retry_after_timeout_returns_later_success() {
    let (url, accepted) =
        recovering_host("200 OK", r#"{"success": true, "output": {"ok": 1}}"#).await;
    let client = PdkProxyClient::new(PluginHostConfig::new(url));

    let output = client
        .invoke_with_policy(&binding("pdf_parser"), &request(), short_policy(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(output, json!({"ok": 1}));
    assert_eq!(accepted.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_retry_stops_at_remote_error_after_timeout() {
    let (url, accepted) = recovering_host(
        "500 Internal Server Error",
        r#"{"success": false, "error": "corrupt pdf"}"#,
    )
    .await;
    let client = PdkProxyClient::new(PluginHostConfig::new(url));

    let err = client
        .invoke_with_policy(&binding("pdf_parser"), &request(), short_policy(), &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(err, ProxyError::RemoteExecution("corrupt pdf".to_string()));
    assert_eq!(accepted.load(Ordering::SeqCst), 2);
}
