//! HTTP classifier behavior against a mock classification service.

use std::time::Duration;

use pocket_core::{ClassificationService, ClassifiedType, Confidence, Error};
use pocket_inference::{HttpClassifier, HttpClassifierConfig};
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn classifier_for(server: &MockServer) -> HttpClassifier {
    HttpClassifier::new(HttpClassifierConfig {
        base_url: server.uri(),
        api_key: Some("test-key".to_string()),
        device_id: "device-1".to_string(),
        timeout_seconds: 2,
    })
    .expect("Failed to create classifier")
}

#[tokio::test]
async fn test_classify_parses_schedule_response() {
    let server = MockServer::start().await;

    let body = serde_json::json!({
        "classified_type": "schedule",
        "confidence": "high",
        "ai_title": "Team sync",
        "tags": ["work"],
        "entities": [{"type": "time", "value": "3pm", "normalized_value": "15:00"}],
        "schedule_info": {
            "start_time": "2026-10-18T15:00:00Z",
            "end_time": "2026-10-18T16:00:00Z",
            "location": null,
            "is_all_day": false
        }
    });

    Mock::given(method("POST"))
        .and(path("/classify"))
        .and(header("Authorization", "Bearer test-key"))
        .and(body_partial_json(serde_json::json!({
            "text": "Team sync tomorrow 3pm",
            "device_id": "device-1"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(&body))
        .expect(1)
        .mount(&server)
        .await;

    let result = classifier_for(&server)
        .classify("Team sync tomorrow 3pm")
        .await
        .expect("classify should succeed");

    assert_eq!(result.classified_type, ClassifiedType::Schedule);
    assert_eq!(result.confidence, Confidence::High);
    assert_eq!(result.ai_title.as_deref(), Some("Team sync"));
    assert_eq!(result.entities.len(), 1);
    let info = result.schedule_info.expect("schedule info");
    assert_eq!(
        info.start_time.map(|t| t.to_rfc3339()),
        Some("2026-10-18T15:00:00+00:00".to_string())
    );
}

#[tokio::test]
async fn test_status_codes_map_to_error_classes() {
    let cases: [(u16, fn(&Error) -> bool); 6] = [
        (400, |e| matches!(e, Error::InvalidInput(_))),
        (401, |e| matches!(e, Error::AuthRequired(_))),
        (429, |e| matches!(e, Error::RateLimited(_))),
        (500, |e| matches!(e, Error::ServerFault(_))),
        (503, |e| matches!(e, Error::ServiceUnavailable(_))),
        (504, |e| matches!(e, Error::NetworkTransient(_))),
    ];

    for (status, check) in cases {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/classify"))
            .respond_with(
                ResponseTemplate::new(status)
                    .set_body_json(serde_json::json!({"message": "nope"})),
            )
            .mount(&server)
            .await;

        let err = classifier_for(&server).classify("x").await.unwrap_err();
        assert!(check(&err), "status {status} mapped to {err:?}");
        assert!(err.to_string().contains("nope"), "{err}");
    }
}

#[tokio::test]
async fn test_timeout_is_retryable() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/classify"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
        .mount(&server)
        .await;

    let classifier = HttpClassifier::new(HttpClassifierConfig {
        base_url: server.uri(),
        api_key: None,
        device_id: "d".to_string(),
        timeout_seconds: 1,
    })
    .unwrap();

    let err = classifier.classify("x").await.unwrap_err();
    assert!(matches!(err, Error::NetworkTransient(_)), "{err:?}");
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_connection_refused_is_retryable() {
    let classifier = HttpClassifier::new(HttpClassifierConfig {
        base_url: "http://127.0.0.1:9".to_string(),
        api_key: None,
        device_id: "d".to_string(),
        timeout_seconds: 2,
    })
    .unwrap();

    let err = classifier.classify("x").await.unwrap_err();
    assert!(err.is_retryable(), "{err:?}");
}

#[tokio::test]
async fn test_malformed_body_is_serialization_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/classify"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    let err = classifier_for(&server).classify("x").await.unwrap_err();
    assert!(matches!(err, Error::Serialization(_)));
    assert!(!err.is_retryable());
}
