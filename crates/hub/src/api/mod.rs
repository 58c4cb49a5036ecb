// HTTP surface for file content and version history.
//
// This is the write path that owns persistence: saves go through the
// snapshot policy, and reverts snapshot the current content before
// replacing it. The WebSocket channel never writes anything.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use coedit_common::protocol::ws::GUEST_USERNAME;
use coedit_common::types::FileId;
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::error::{ErrorCode, HubError};
use crate::storage::{FileRecord, VersionRecord};
use crate::versioning::{Versioning, VersioningError};

#[derive(Clone)]
pub struct ApiState {
    versioning: Versioning,
}

pub fn router(versioning: Versioning) -> Router {
    Router::new()
        .route("/v1/files/{file_id}", get(get_file).put(save_file))
        .route("/v1/files/{file_id}/versions", get(list_versions))
        .route("/v1/versions/{version_id}", get(get_version))
        .route("/v1/versions/{version_id}/revert", post(revert_version))
        .with_state(ApiState { versioning })
}

impl From<VersioningError> for HubError {
    fn from(error: VersioningError) -> Self {
        match error {
            VersioningError::FileNotFound(file_id) => HubError::from_code(ErrorCode::NotFound)
                .with_details(json!({ "file_id": file_id })),
            VersioningError::VersionNotFound(version_id) => {
                HubError::from_code(ErrorCode::NotFound)
                    .with_details(json!({ "version_id": version_id }))
            }
            VersioningError::SnapshotWriteFailed(_) => {
                HubError::from_code(ErrorCode::SnapshotWriteFailed)
            }
            VersioningError::WriteFailed(_) => HubError::from_code(ErrorCode::WriteFailed),
            VersioningError::RevertFailed(_) => HubError::from_code(ErrorCode::RevertFailed),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SaveFileRequest {
    pub content: String,
    #[serde(default)]
    pub author: Option<String>,
}

#[derive(Debug, Serialize)]
struct SaveFileResponse {
    file: FileRecord,
    snapshot_taken: bool,
    created: bool,
}

async fn get_file(
    State(state): State<ApiState>,
    Path(file_id): Path<String>,
) -> Result<Json<FileRecord>, HubError> {
    let file_id = FileId::from(file_id);
    let record = state.versioning.files().read(&file_id).await.map_err(|_| {
        HubError::from_code(ErrorCode::NotFound).with_details(json!({ "file_id": &file_id }))
    })?;
    Ok(Json(record))
}

async fn save_file(
    State(state): State<ApiState>,
    Path(file_id): Path<String>,
    Json(request): Json<SaveFileRequest>,
) -> Result<impl IntoResponse, HubError> {
    let file_id = FileId::from(file_id);
    let author = request.author.unwrap_or_else(|| GUEST_USERNAME.to_owned());
    let outcome = state.versioning.save_file(&file_id, &request.content, &author).await?;

    let status = if outcome.created { StatusCode::CREATED } else { StatusCode::OK };
    let response = SaveFileResponse {
        file: outcome.record,
        snapshot_taken: outcome.snapshot.is_some(),
        created: outcome.created,
    };
    Ok((status, Json(response)))
}

async fn list_versions(
    State(state): State<ApiState>,
    Path(file_id): Path<String>,
) -> Result<Json<Vec<VersionRecord>>, HubError> {
    let file_id = FileId::from(file_id);
    if !state.versioning.files().exists(&file_id).await {
        return Err(HubError::from_code(ErrorCode::NotFound)
            .with_details(json!({ "file_id": file_id })));
    }
    Ok(Json(state.versioning.versions().list_snapshots(&file_id).await))
}

async fn get_version(
    State(state): State<ApiState>,
    Path(version_id): Path<Uuid>,
) -> Result<Json<VersionRecord>, HubError> {
    let record = state.versioning.versions().get(version_id).await.map_err(|_| {
        HubError::from_code(ErrorCode::NotFound).with_details(json!({ "version_id": version_id }))
    })?;
    Ok(Json(record))
}

async fn revert_version(
    State(state): State<ApiState>,
    Path(version_id): Path<Uuid>,
) -> Result<impl IntoResponse, HubError> {
    let outcome = state.versioning.revert_file(version_id, GUEST_USERNAME).await?;
    Ok(Json(json!({
        "status": "reverted",
        "content": outcome.record.content,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{FileStore, VersionStore};
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use serde_json::Value;
    use tower::ServiceExt;

    fn memory_app() -> Router {
        router(Versioning::new(FileStore::memory(), VersionStore::memory()))
    }

    async fn response_json(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("response body should be readable");
        serde_json::from_slice(&bytes).expect("response body should be valid json")
    }

    fn put_file(file_id: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("PUT")
            .uri(format!("/v1/files/{file_id}"))
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn first_save_returns_created_without_snapshot() {
        let app = memory_app();
        let response = app
            .oneshot(put_file("42", json!({ "content": "hello", "author": "alice" })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::CREATED);
        let body = response_json(response).await;
        assert_eq!(body["created"], true);
        assert_eq!(body["snapshot_taken"], false);
        assert_eq!(body["file"]["content"], "hello");
        assert_eq!(body["file"]["updated_by"], "alice");
    }

    #[tokio::test]
    async fn overwrite_reports_snapshot_and_history_lists_it_newest_first() {
        let app = memory_app();
        app.clone()
            .oneshot(put_file("42", json!({ "content": "v1" })))
            .await
            .unwrap();
        app.clone()
            .oneshot(put_file("42", json!({ "content": "v2" })))
            .await
            .unwrap();
        let response = app
            .clone()
            .oneshot(put_file("42", json!({ "content": "v3" })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = response_json(response).await;
        assert_eq!(body["snapshot_taken"], true);
        assert_eq!(body["created"], false);

        let response = app.oneshot(get_request("/v1/files/42/versions")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let versions = response_json(response).await;
        let versions = versions.as_array().expect("versions listing should be an array");
        assert_eq!(versions.len(), 2);
        assert_eq!(versions[0]["content"], "v2");
        assert_eq!(versions[1]["content"], "v1");
        assert_eq!(versions[0]["description"], "Auto-snapshot before save");
    }

    #[tokio::test]
    async fn identical_save_takes_no_snapshot() {
        let app = memory_app();
        app.clone()
            .oneshot(put_file("42", json!({ "content": "same" })))
            .await
            .unwrap();
        let response = app
            .clone()
            .oneshot(put_file("42", json!({ "content": "same" })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = response_json(response).await;
        assert_eq!(body["snapshot_taken"], false);

        let response = app.oneshot(get_request("/v1/files/42/versions")).await.unwrap();
        let versions = response_json(response).await;
        assert_eq!(versions.as_array().map(Vec::len), Some(0));
    }

    #[tokio::test]
    async fn get_of_unknown_file_returns_error_envelope() {
        let app = memory_app();
        let response = app.oneshot(get_request("/v1/files/missing")).await.unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = response_json(response).await;
        assert_eq!(body["error"]["code"], "NOT_FOUND");
        assert_eq!(body["error"]["retryable"], false);
    }

    #[tokio::test]
    async fn revert_restores_content_and_reports_status() {
        let app = memory_app();
        app.clone()
            .oneshot(put_file("42", json!({ "content": "old" })))
            .await
            .unwrap();
        app.clone()
            .oneshot(put_file("42", json!({ "content": "new" })))
            .await
            .unwrap();

        let response = app.clone().oneshot(get_request("/v1/files/42/versions")).await.unwrap();
        let versions = response_json(response).await;
        let version_id = versions[0]["version_id"].as_str().expect("version id").to_owned();

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(format!("/v1/versions/{version_id}/revert"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = response_json(response).await;
        assert_eq!(body["status"], "reverted");
        assert_eq!(body["content"], "old");

        let response = app.clone().oneshot(get_request("/v1/files/42")).await.unwrap();
        let body = response_json(response).await;
        assert_eq!(body["content"], "old");

        // The revert itself left a safety snapshot of the replaced content.
        let response = app.oneshot(get_request("/v1/files/42/versions")).await.unwrap();
        let versions = response_json(response).await;
        let descriptions = versions
            .as_array()
            .expect("versions listing should be an array")
            .iter()
            .map(|v| v["description"].as_str().unwrap_or_default().to_owned())
            .collect::<Vec<_>>();
        assert!(descriptions[0].starts_with("Auto-save before revert to "));
    }

    #[tokio::test]
    async fn revert_of_unknown_version_is_not_found() {
        let app = memory_app();
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(format!("/v1/versions/{}/revert", Uuid::new_v4()))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn snapshot_failure_fails_the_save_with_507() {
        let app = router(Versioning::new(FileStore::memory(), VersionStore::failing_for_tests()));
        app.clone()
            .oneshot(put_file("42", json!({ "content": "v1" })))
            .await
            .unwrap();
        let response = app
            .clone()
            .oneshot(put_file("42", json!({ "content": "v2" })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INSUFFICIENT_STORAGE);
        let body = response_json(response).await;
        assert_eq!(body["error"]["code"], "SNAPSHOT_WRITE_FAILED");
        assert_eq!(body["error"]["retryable"], true);

        let response = app.oneshot(get_request("/v1/files/42")).await.unwrap();
        let body = response_json(response).await;
        assert_eq!(body["content"], "v1", "failed save must leave the file untouched");
    }

    #[tokio::test]
    async fn get_version_returns_the_snapshot() {
        let app = memory_app();
        app.clone()
            .oneshot(put_file("42", json!({ "content": "old", "author": "alice" })))
            .await
            .unwrap();
        app.clone()
            .oneshot(put_file("42", json!({ "content": "new", "author": "alice" })))
            .await
            .unwrap();

        let response = app.clone().oneshot(get_request("/v1/files/42/versions")).await.unwrap();
        let versions = response_json(response).await;
        let version_id = versions[0]["version_id"].as_str().expect("version id").to_owned();

        let response =
            app.oneshot(get_request(&format!("/v1/versions/{version_id}"))).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = response_json(response).await;
        assert_eq!(body["content"], "old");
        assert_eq!(body["created_by"], "alice");
        assert_eq!(body["file_id"], "42");
    }

    #[tokio::test]
    async fn versions_of_unknown_file_are_not_found() {
        let app = memory_app();
        let response = app.oneshot(get_request("/v1/files/missing/versions")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
