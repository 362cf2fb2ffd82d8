//! Video repository tests against a mocked Firestore REST endpoint.

use lectern_firestore::{
    FirestoreClient, FirestoreConfig, FirestoreError, RetryConfig, TokenSource, VideoRepository,
};
use lectern_models::{ProcessingStage, ProcessingStatus, VideoField, VideoId, VideoPatch};
use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const DOC_PATH: &str = "/v1/projects/demo/databases/(default)/documents/videos/v1";
const UPDATE_TIME: &str = "2024-01-01T00:00:01.000001Z";

fn repo(server: &MockServer) -> VideoRepository {
    let mut config = FirestoreConfig::new("demo");
    config.endpoint = server.uri();
    config.retry = RetryConfig::none();
    let client = FirestoreClient::with_token_source(config, TokenSource::Fixed("test-token".into()))
        .unwrap();
    VideoRepository::new(client)
}

fn video_doc(status: &str) -> serde_json::Value {
    json!({
        "name": "projects/demo/databases/(default)/documents/videos/v1",
        "fields": {
            "title": {"stringValue": "Thermodynamics"},
            "createdAt": {"stringValue": "2024-01-01T00:00:00Z"},
            "updatedAt": {"stringValue": "2024-01-01T00:00:00Z"},
            "status": {"stringValue": status},
            "duration": {"doubleValue": 694.0},
            "concepts": {"arrayValue": {}}
        },
        "updateTime": UPDATE_TIME
    })
}

#[tokio::test]
async fn get_decodes_document() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(DOC_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(video_doc("ready")))
        .mount(&server)
        .await;

    let video = repo(&server).get(&VideoId::from("v1")).await.unwrap().unwrap();
    assert_eq!(video.id.as_str(), "v1");
    assert_eq!(video.status, ProcessingStatus::Ready);
    assert_eq!(video.duration, 694.0);
}

#[tokio::test]
async fn get_missing_document_is_none() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(DOC_PATH))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    assert!(repo(&server).get(&VideoId::from("v1")).await.unwrap().is_none());
}

#[tokio::test]
async fn update_if_rejected_by_guard_writes_nothing() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(DOC_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(video_doc("processing")))
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path(DOC_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(video_doc("processing")))
        .expect(0)
        .mount(&server)
        .await;

    let patch = VideoPatch::new().set(VideoField::Status(ProcessingStatus::Processing));
    let outcome = repo(&server)
        .update_if(
            &VideoId::from("v1"),
            |v| v.status.begin().map(|_| ()),
            &patch,
        )
        .await
        .unwrap();

    assert!(outcome.is_err());
}

#[tokio::test]
async fn update_if_retries_after_lost_race() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(DOC_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(video_doc("ready")))
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path(DOC_PATH))
        .and(query_param("currentDocument.updateTime", UPDATE_TIME))
        .respond_with(ResponseTemplate::new(412).set_body_string("FAILED_PRECONDITION"))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path(DOC_PATH))
        .and(query_param("currentDocument.updateTime", UPDATE_TIME))
        .respond_with(ResponseTemplate::new(200).set_body_json(video_doc("processing")))
        .expect(1)
        .mount(&server)
        .await;

    let patch = VideoPatch::new()
        .set(VideoField::Status(ProcessingStatus::Processing))
        .set(VideoField::ProcessingStage(Some(ProcessingStage::Initializing)));
    let video = repo(&server)
        .update_if(&VideoId::from("v1"), |v| v.status.begin().map(|_| ()), &patch)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(video.status, ProcessingStatus::Processing);
    assert_eq!(video.processing_stage, Some(ProcessingStage::Initializing));
}

#[tokio::test]
async fn update_if_missing_document_is_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(DOC_PATH))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let result = repo(&server)
        .update_if(
            &VideoId::from("v1"),
            |_| Ok::<(), ()>(()),
            &VideoPatch::new().set(VideoField::Summary("s".into())),
        )
        .await;

    assert!(matches!(result, Err(FirestoreError::NotFound(_))));
}

#[tokio::test]
async fn update_sends_field_mask() {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .and(path(DOC_PATH))
        .and(query_param("currentDocument.exists", "true"))
        .respond_with(ResponseTemplate::new(200).set_body_json(video_doc("ready")))
        .expect(1)
        .mount(&server)
        .await;

    let patch = VideoPatch::new().set(VideoField::Summary("Heat flows downhill".into()));
    repo(&server).update(&VideoId::from("v1"), &patch).await.unwrap();

    let requests = server.received_requests().await.unwrap();
    let query = requests[0].url.query().unwrap_or_default().to_string();
    assert!(query.contains("updateMask.fieldPaths=summary"));
    assert!(query.contains("updateMask.fieldPaths=updatedAt"));

    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(body["fields"]["summary"]["stringValue"], "Heat flows downhill");
}
