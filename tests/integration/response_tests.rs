//! Response encoding integration tests.
//!
//! Tests verify:
//! - Results without files are returned as plain JSON without a `file` key
//! - Results with files are returned as multipart with checksummed parts
//! - Missing or invalid files are skipped without failing the response
//! - Invalid payloads are rejected before execution

use axum::http::StatusCode;
use axum::response::Response;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use tower::ServiceExt;

use herald_runner::{create_router, RouterConfig, SignatureAuth, WebhookPipeline};

use super::test_utils::{
    boundary_of, parse_multipart, signed_request, test_router, Part, RecordingExecutor,
    TEST_SECRET,
};

async fn body_bytes(response: Response) -> Vec<u8> {
    response.into_body().collect().await.unwrap().to_bytes().to_vec()
}

async fn multipart_parts(response: Response) -> Vec<Part> {
    let content_type = response
        .headers()
        .get("content-type")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(content_type.starts_with("multipart/form-data; boundary="));

    let body = body_bytes(response).await;
    parse_multipart(&body, &boundary_of(&content_type))
}

fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

// =============================================================================
// Single Mode
// =============================================================================

#[tokio::test]
async fn test_build_scenario_returns_json() {
    let executor = RecordingExecutor::new(json!({"status": "ok"}), "/tmp");
    let router = test_router(&executor);

    let response = router
        .oneshot(signed_request(br#"{"action":"build"}"#))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("content-type").unwrap(),
        "application/json"
    );
    let result: Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(result, json!({"status": "ok"}));

    let calls = executor.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(Value::Object(calls[0].clone()), json!({"action": "build"}));
}

#[tokio::test]
async fn test_empty_file_map_is_single_mode() {
    let executor = RecordingExecutor::new(json!({"status": "ok", "file": {}}), "/tmp");
    let router = test_router(&executor);

    let response = router.oneshot(signed_request(b"{}")).await.unwrap();

    assert_eq!(
        response.headers().get("content-type").unwrap(),
        "application/json"
    );
    let result: Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(result, json!({"status": "ok"}));
}

// =============================================================================
// Multipart Mode
// =============================================================================

#[tokio::test]
async fn test_single_file_yields_two_parts() {
    let dir = tempfile::tempdir().unwrap();
    let content = b"line one\nline two\n\x00\xff binary tail";
    std::fs::write(dir.path().join("a.txt"), content).unwrap();

    let executor = RecordingExecutor::new(
        json!({"status": "ok", "file": {"log": "a.txt"}}),
        dir.path(),
    );
    let router = test_router(&executor);

    let response = router.oneshot(signed_request(b"{}")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let parts = multipart_parts(response).await;
    assert_eq!(parts.len(), 2);

    let result = &parts[0];
    assert_eq!(result.name().as_deref(), Some("result"));
    assert_eq!(result.header("Content-Type"), Some("application/json"));
    let result_json: Value = serde_json::from_slice(&result.body).unwrap();
    assert_eq!(result_json, json!({"status": "ok"}));

    let log = &parts[1];
    assert_eq!(log.name().as_deref(), Some("log"));
    assert_eq!(log.disposition_param("filename").as_deref(), Some("a.txt"));
    assert_eq!(
        log.disposition_param("sha256sum"),
        Some(sha256_hex(content))
    );
    assert_eq!(log.header("Content-Type"), Some("application/octet-stream"));
    assert_eq!(log.body, content);
}

#[tokio::test]
async fn test_missing_file_is_omitted() {
    let dir = tempfile::tempdir().unwrap();
    let executor = RecordingExecutor::new(
        json!({"status": "ok", "file": {"log": "does-not-exist.txt"}}),
        dir.path(),
    );
    let router = test_router(&executor);

    let response = router.oneshot(signed_request(b"{}")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let parts = multipart_parts(response).await;
    assert_eq!(parts.len(), 1);
    assert_eq!(parts[0].name().as_deref(), Some("result"));
    let result_json: Value = serde_json::from_slice(&parts[0].body).unwrap();
    assert_eq!(result_json, json!({"status": "ok"}));
}

#[tokio::test]
async fn test_partial_failure_keeps_other_files() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("good.txt"), b"good").unwrap();

    let executor = RecordingExecutor::new(
        json!({
            "file": {
                "missing": "missing.txt",
                "bad": ["not", "a", "path"],
                "good": "good.txt"
            }
        }),
        dir.path(),
    );
    let router = test_router(&executor);

    let response = router.oneshot(signed_request(b"{}")).await.unwrap();
    let parts = multipart_parts(response).await;

    let names: Vec<String> = parts.iter().filter_map(Part::name).collect();
    assert_eq!(names, vec!["result", "good"]);
    assert_eq!(parts[1].body, b"good");

    let result_json: Value = serde_json::from_slice(&parts[0].body).unwrap();
    assert_eq!(result_json, json!({}));
}

#[tokio::test]
async fn test_two_file_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let absolute_dir = tempfile::tempdir().unwrap();

    let relative_content = b"relative file content".to_vec();
    let absolute_content: Vec<u8> = (0..=255u8).cycle().take(64 * 1024).collect();

    std::fs::create_dir_all(dir.path().join("out")).unwrap();
    std::fs::write(dir.path().join("out/report.txt"), &relative_content).unwrap();
    let absolute_path = absolute_dir.path().join("artifact.bin");
    std::fs::write(&absolute_path, &absolute_content).unwrap();

    let executor = RecordingExecutor::new(
        json!({
            "exit_code": 0,
            "output": "done",
            "nested": {"list": [1, 2.5, true, null]},
            "file": {
                "report": "out/report.txt",
                "artifact": absolute_path.to_str().unwrap()
            }
        }),
        dir.path(),
    );
    let router = test_router(&executor);

    let response = router.oneshot(signed_request(b"{}")).await.unwrap();
    let parts = multipart_parts(response).await;
    assert_eq!(parts.len(), 3);

    let result_json: Value = serde_json::from_slice(&parts[0].body).unwrap();
    assert_eq!(
        result_json,
        json!({
            "exit_code": 0,
            "output": "done",
            "nested": {"list": [1, 2.5, true, null]}
        })
    );

    assert_eq!(parts[1].name().as_deref(), Some("report"));
    assert_eq!(parts[1].disposition_param("filename").as_deref(), Some("report.txt"));
    assert_eq!(parts[1].body, relative_content);
    assert_eq!(
        parts[1].disposition_param("sha256sum"),
        Some(sha256_hex(&relative_content))
    );

    assert_eq!(parts[2].name().as_deref(), Some("artifact"));
    assert_eq!(parts[2].disposition_param("filename").as_deref(), Some("artifact.bin"));
    assert_eq!(parts[2].body, absolute_content);
    assert_eq!(
        parts[2].disposition_param("sha256sum"),
        Some(sha256_hex(&absolute_content))
    );
}

#[tokio::test]
async fn test_checksum_recomputed_per_response() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("a.txt");
    std::fs::write(&path, b"first").unwrap();

    let executor = RecordingExecutor::new(json!({"file": {"log": "a.txt"}}), dir.path());

    let response = test_router(&executor)
        .oneshot(signed_request(b"{}"))
        .await
        .unwrap();
    let first = multipart_parts(response).await;

    std::fs::write(&path, b"second").unwrap();
    let response = test_router(&executor)
        .oneshot(signed_request(b"{}"))
        .await
        .unwrap();
    let second = multipart_parts(response).await;

    assert_eq!(first[1].disposition_param("sha256sum"), Some(sha256_hex(b"first")));
    assert_eq!(second[1].disposition_param("sha256sum"), Some(sha256_hex(b"second")));
}

// =============================================================================
// Payload Errors
// =============================================================================

#[tokio::test]
async fn test_invalid_json_rejected_before_execution() {
    let executor = RecordingExecutor::new(json!({"status": "ok"}), "/tmp");

    for body in [&b"not json"[..], b"[1,2]", b"\"string\"", b""] {
        let response = test_router(&executor)
            .oneshot(signed_request(body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let error: Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert_eq!(error["error"], "invalid_payload");
        assert!(error["message"]
            .as_str()
            .unwrap()
            .starts_with("Request body error"));
    }

    assert_eq!(executor.call_count(), 0);
}

#[tokio::test]
async fn test_oversized_body_rejected() {
    let executor = RecordingExecutor::new(json!({"status": "ok"}), "/tmp");
    let pipeline = WebhookPipeline::new(SignatureAuth::new(TEST_SECRET), executor.clone());
    let router = create_router(
        pipeline,
        RouterConfig::default()
            .with_max_body_size(16)
            .with_tracing(false),
    );

    let body = format!(r#"{{"padding":"{}"}}"#, "x".repeat(64));
    let response = router
        .oneshot(signed_request(body.as_bytes()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(executor.call_count(), 0);
}

#[tokio::test]
async fn test_large_attachments_streamed_intact() {
    let dir = tempfile::tempdir().unwrap();
    let first: Vec<u8> = (0..=255u8).cycle().take(3 * 1024 * 1024 + 11).collect();
    let second: Vec<u8> = (0..=255u8).rev().cycle().take(1024 * 1024 + 5).collect();
    std::fs::write(dir.path().join("first.bin"), &first).unwrap();
    std::fs::write(dir.path().join("second.bin"), &second).unwrap();

    let executor = RecordingExecutor::new(
        json!({"file": {"first": "first.bin", "second": "second.bin"}}),
        dir.path(),
    );

    let response = test_router(&executor)
        .oneshot(signed_request(b"{}"))
        .await
        .unwrap();
    let parts = multipart_parts(response).await;
    assert_eq!(parts.len(), 3);

    for (part, expected) in parts[1..].iter().zip([&first, &second]) {
        assert_eq!(part.body.len(), expected.len());
        assert_eq!(&part.body, expected);
        assert_eq!(part.disposition_param("sha256sum"), Some(sha256_hex(&part.body)));
    }
}
