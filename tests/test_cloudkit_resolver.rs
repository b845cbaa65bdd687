//! Tests for the CloudKit lookup client against a mocked lookup service

use cloud_streamer::{CloudKitResolver, ObjectKey, ResolveError, Resolver};
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn resolver_for(server: &MockServer) -> CloudKitResolver {
    CloudKitResolver::new(format!("{}/records/resolve", server.uri()), Duration::from_secs(2))
        .unwrap()
}

fn key() -> ObjectKey {
    ObjectKey::new("0abcKEY").unwrap()
}

#[tokio::test]
async fn test_resolve_reads_download_url_and_size() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/records/resolve"))
        .and(body_json(json!({ "shortGUIDs": [{ "value": "0abcKEY" }] })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [{
                "rootRecord": {
                    "fields": {
                        "fileContent": { "value": { "downloadURL": "https://cvws.example/B/abc" } },
                        "size": { "value": 734003200u64 }
                    }
                }
            }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let resolution = resolver_for(&server).await.resolve(&key()).await.unwrap();
    assert_eq!(resolution.direct_url, "https://cvws.example/B/abc");
    assert_eq!(resolution.total_length, 734003200);
}

#[tokio::test]
async fn test_resolve_accepts_string_size() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [{
                "rootRecord": {
                    "fields": {
                        "fileContent": { "value": { "downloadURL": "https://cvws.example/B/x" } },
                        "size": { "value": "1024" }
                    }
                }
            }]
        })))
        .mount(&server)
        .await;

    let resolution = resolver_for(&server).await.resolve(&key()).await.unwrap();
    assert_eq!(resolution.total_length, 1024);
}

#[tokio::test]
async fn test_describe_reads_title_and_extension() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [{
                "rootRecord": { "fields": { "extension": { "value": "mov" } } },
                "share": { "fields": { "cloudkit.title": { "value": "Summer 2024" } } }
            }]
        })))
        .mount(&server)
        .await;

    let info = resolver_for(&server).await.describe(&key()).await.unwrap();
    assert_eq!(info.title.as_deref(), Some("Summer 2024"));
    assert_eq!(info.extension.as_deref(), Some("mov"));
    assert_eq!(info.file_name("https://x/0abcKEY"), "Summer_2024.mov");
}

#[tokio::test]
async fn test_server_error_codes() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [{ "serverErrorCode": "NOT_FOUND", "reason": "no such share" }]
        })))
        .mount(&server)
        .await;

    let result = resolver_for(&server).await.resolve(&key()).await;
    assert!(matches!(result, Err(ResolveError::NotFound(_))));

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [{ "serverErrorCode": "THROTTLED", "reason": "slow down" }]
        })))
        .mount(&server)
        .await;

    let result = resolver_for(&server).await.resolve(&key()).await;
    assert!(matches!(result, Err(ResolveError::Upstream(_))));
}

#[tokio::test]
async fn test_malformed_payloads() {
    let payloads = [
        json!({ "results": [] }),
        json!({ "results": [{ "rootRecord": { "fields": {} } }] }),
        json!({ "results": [{ "rootRecord": { "fields": {
            "fileContent": { "value": { "downloadURL": "https://cvws.example/B/x" } },
            "size": { "value": "huge" }
        } } }] }),
    ];

    for payload in payloads {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(payload.clone()))
            .mount(&server)
            .await;

        let result = resolver_for(&server).await.resolve(&key()).await;
        assert!(
            matches!(result, Err(ResolveError::Malformed(_))),
            "{} gave {:?}",
            payload,
            result
        );
    }
}

#[tokio::test]
async fn test_http_failure_is_upstream_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let result = resolver_for(&server).await.resolve(&key()).await;
    assert!(matches!(result, Err(ResolveError::Upstream(_))));
}
