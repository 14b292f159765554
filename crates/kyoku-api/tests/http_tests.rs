//! HTTP surface tests, exercising the router with an in-memory pipeline.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use tower::ServiceExt;

use kyoku_api::{create_router, ApiConfig, AppState};
use kyoku_jobs::{JobManager, JobsConfig};
use kyoku_media::{frame_file_name, FrameCodec, MediaResult, OverlayRenderer, VideoInfo};
use kyoku_models::RenderSettings;

struct InstantCodec;

#[async_trait]
impl FrameCodec for InstantCodec {
    async fn probe(&self, _input: &Path) -> MediaResult<VideoInfo> {
        Ok(VideoInfo {
            duration: 0.2,
            width: 1280,
            height: 720,
            fps: 25.0,
            frame_count: 5,
            codec: "h264".to_string(),
        })
    }

    async fn extract_frames(
        &self,
        _input: &Path,
        dest_dir: &Path,
        start: u64,
        end: u64,
    ) -> MediaResult<Vec<PathBuf>> {
        tokio::fs::create_dir_all(dest_dir).await?;
        let mut frames = Vec::new();
        for i in start..end {
            let path = dest_dir.join(frame_file_name(i));
            tokio::fs::write(&path, b"").await?;
            frames.push(path);
        }
        Ok(frames)
    }

    async fn assemble(
        &self,
        _frames_dir: &Path,
        _audio_source: &Path,
        output: &Path,
        _fps: f64,
        _settings: &RenderSettings,
    ) -> MediaResult<()> {
        tokio::fs::write(output, b"encoded").await?;
        Ok(())
    }
}

struct PassRenderer;

#[async_trait]
impl OverlayRenderer for PassRenderer {
    async fn render_frame(
        &self,
        frame: &Path,
        _time_offset: f64,
        _subtitle_spec: &serde_json::Value,
        _effects_spec: &serde_json::Value,
        output: &Path,
    ) -> MediaResult<()> {
        tokio::fs::copy(frame, output).await?;
        Ok(())
    }
}

fn app(root: &Path) -> Router {
    let manager = JobManager::new(
        JobsConfig {
            max_concurrent_jobs: 3,
            batch_size: 100,
            work_dir: root.join("work"),
            output_dir: root.join("outputs"),
            state_dir: root.join("jobs"),
        },
        Arc::new(InstantCodec),
        Arc::new(PassRenderer),
    );
    create_router(AppState::with_manager(
        ApiConfig::default(),
        Arc::new(manager),
    ))
}

fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn empty_request(method: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn response_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn render_body() -> serde_json::Value {
    serde_json::json!({
        "input_path": "/videos/song.mp4",
        "subtitle_spec": {"lines": []}
    })
}

#[tokio::test]
async fn test_health_endpoint() {
    let root = tempfile::tempdir().unwrap();
    let app = app(root.path());

    let response = app.oneshot(empty_request("GET", "/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = response_json(response).await;
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_submit_invalid_request_is_400() {
    let root = tempfile::tempdir().unwrap();
    let app = app(root.path());

    let body = serde_json::json!({
        "input_path": "",
        "subtitle_spec": {"lines": []}
    });
    let response = app
        .oneshot(json_request("POST", "/api/render", body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unknown_job_is_404() {
    let root = tempfile::tempdir().unwrap();
    let app = app(root.path());

    let response = app
        .oneshot(empty_request("GET", "/api/jobs/nope"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_submit_and_poll_to_completion() {
    let root = tempfile::tempdir().unwrap();
    let app = app(root.path());

    let response = app
        .clone()
        .oneshot(json_request("POST", "/api/render", render_body()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let body = response_json(response).await;
    assert_eq!(body["status"], "queued");
    let job_id = body["job_id"].as_str().unwrap().to_string();

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let response = app
            .clone()
            .oneshot(empty_request("GET", &format!("/api/jobs/{}", job_id)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let job = response_json(response).await;
        if job["status"] == "completed" {
            assert_eq!(job["progress"], 100);
            assert!(job["output_path"].as_str().unwrap().ends_with(".mp4"));
            break;
        }
        assert!(tokio::time::Instant::now() < deadline, "job never completed");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let response = app
        .oneshot(empty_request("GET", "/api/jobs"))
        .await
        .unwrap();
    let body = response_json(response).await;
    assert_eq!(body["jobs"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_cancel_terminal_job_is_409() {
    let root = tempfile::tempdir().unwrap();
    let app = app(root.path());

    let response = app
        .clone()
        .oneshot(json_request("POST", "/api/render", render_body()))
        .await
        .unwrap();
    let body = response_json(response).await;
    let job_id = body["job_id"].as_str().unwrap().to_string();

    // Wait for completion, then cancellation must be refused.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let response = app
            .clone()
            .oneshot(empty_request("GET", &format!("/api/jobs/{}", job_id)))
            .await
            .unwrap();
        let job = response_json(response).await;
        if job["status"] == "completed" {
            break;
        }
        assert!(tokio::time::Instant::now() < deadline, "job never completed");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let response = app
        .oneshot(empty_request(
            "POST",
            &format!("/api/jobs/{}/cancel", job_id),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
}
