//! Listener lifecycle integration tests.
//!
//! Tests verify:
//! - Signed requests are served over a real TCP socket
//! - Stopping waits for in-flight executions to complete
//! - Unix socket listeners serve requests and clean up after themselves

use std::time::Duration;

use serde_json::json;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;

use herald_runner::{BindTarget, BoundAddress, LifecycleState, Server};

use super::test_utils::{raw_signed_request, test_router, RecordingExecutor};

fn loopback() -> BindTarget {
    BindTarget::Tcp {
        host: "127.0.0.1".to_string(),
        port: 0,
    }
}

async fn send_raw<S>(mut stream: S, request: &[u8]) -> String
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    stream.write_all(request).await.unwrap();
    let mut response = Vec::new();
    stream.read_to_end(&mut response).await.unwrap();
    String::from_utf8_lossy(&response).into_owned()
}

#[tokio::test]
async fn test_tcp_request() {
    let executor = RecordingExecutor::new(json!({"status": "ok"}), "/tmp");
    let running = Server::new(loopback(), test_router(&executor))
        .start()
        .await
        .unwrap();

    let addr = match running.local_addr() {
        BoundAddress::Tcp(addr) => *addr,
        other => panic!("unexpected address {:?}", other),
    };

    let stream = TcpStream::connect(addr).await.unwrap();
    let response = send_raw(stream, &raw_signed_request(br#"{"action":"build"}"#)).await;

    assert!(response.starts_with("HTTP/1.1 200"), "got: {}", response);
    assert!(response.ends_with(r#"{"status":"ok"}"#), "got: {}", response);
    assert_eq!(executor.call_count(), 1);

    running.stop().await.unwrap();
}

#[tokio::test]
async fn test_stop_waits_for_in_flight_execution() {
    let executor = RecordingExecutor::new(json!({"status": "ok"}), "/tmp")
        .with_delay(Duration::from_millis(500));
    let running = Server::new(loopback(), test_router(&executor))
        .start()
        .await
        .unwrap();
    let mut states = running.subscribe();

    let addr = match running.local_addr() {
        BoundAddress::Tcp(addr) => *addr,
        other => panic!("unexpected address {:?}", other),
    };

    let client = tokio::spawn(async move {
        let stream = TcpStream::connect(addr).await.unwrap();
        send_raw(stream, &raw_signed_request(b"{}")).await
    });

    while !executor.has_started() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(executor.finished_count(), 0);

    let stop = tokio::spawn(running.stop());
    states
        .wait_for(|s| *s != LifecycleState::Running)
        .await
        .unwrap();

    let response = client.await.unwrap();
    assert!(response.starts_with("HTTP/1.1 200"), "got: {}", response);
    assert!(response.ends_with(r#"{"status":"ok"}"#), "got: {}", response);

    stop.await.unwrap().unwrap();
    assert_eq!(executor.finished_count(), 1);
    assert_eq!(*states.borrow(), LifecycleState::Stopped);
}

#[tokio::test]
async fn test_new_connections_refused_after_stop() {
    let executor = RecordingExecutor::new(json!({}), "/tmp");
    let running = Server::new(loopback(), test_router(&executor))
        .start()
        .await
        .unwrap();
    let addr = match running.local_addr() {
        BoundAddress::Tcp(addr) => *addr,
        other => panic!("unexpected address {:?}", other),
    };
    running.stop().await.unwrap();

    assert!(TcpStream::connect(addr).await.is_err());
    assert_eq!(executor.call_count(), 0);
}

#[cfg(unix)]
#[tokio::test]
async fn test_unix_socket_request() {
    use tokio::net::UnixStream;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("runner.sock");

    let executor = RecordingExecutor::new(json!({"status": "ok"}), "/tmp");
    let running = Server::new(BindTarget::Unix(path.clone()), test_router(&executor))
        .start()
        .await
        .unwrap();

    let stream = UnixStream::connect(&path).await.unwrap();
    let response = send_raw(stream, &raw_signed_request(b"{}")).await;

    assert!(response.starts_with("HTTP/1.1 200"), "got: {}", response);
    assert_eq!(executor.call_count(), 1);

    running.stop().await.unwrap();
    assert!(!path.exists());
}
