use axum::{
    body::Body,
    extract::{rejection::JsonRejection, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;
use tokio_util::io::ReaderStream;

use super::{BatchResponse, DeleteResponse, HealthResponse, ServiceInfo, SERVICE_NAME};
use crate::api::routes::AppState;
use crate::error::AppError;
use crate::service::{SynthesisRequest, SynthesisResult};
use crate::store::AUDIO_RETENTION;
use crate::tts::EngineKind;

pub async fn root(State(state): State<Arc<AppState>>) -> Json<ServiceInfo> {
    Json(ServiceInfo {
        service: SERVICE_NAME.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        device: state.service.registry().device().to_string(),
        status: "running".to_string(),
    })
}

pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let registry = state.service.registry();
    Json(HealthResponse {
        status: "healthy".to_string(),
        device: registry.device().to_string(),
        english_model_loaded: registry.is_loaded(EngineKind::English),
        multilingual_model_loaded: registry.is_loaded(EngineKind::Multilingual),
        voice_prompts_supported: registry.supports_voice_prompts(),
    })
}

pub async fn generate(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<SynthesisRequest>, JsonRejection>,
) -> Result<Json<SynthesisResult>, AppError> {
    let Json(request) = payload?;
    let result = state.service.generate(&request).await?;
    Ok(Json(result))
}

pub async fn batch_generate(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<Vec<SynthesisRequest>>, JsonRejection>,
) -> Result<Json<BatchResponse>, AppError> {
    let Json(requests) = payload?;
    let results = state.service.generate_batch(&requests).await;
    Ok(Json(BatchResponse { results }))
}

pub async fn get_audio(
    State(state): State<Arc<AppState>>,
    Path(filename): Path<String>,
) -> Result<Response, AppError> {
    let file = state.service.store().read(&filename).await?;
    let body = Body::from_stream(ReaderStream::new(file));

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "audio/wav".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("inline; filename={}", filename),
            ),
            (
                header::CACHE_CONTROL,
                format!("public, max-age={}", AUDIO_RETENTION.as_secs()),
            ),
        ],
        body,
    )
        .into_response())
}

pub async fn delete_audio(
    State(state): State<Arc<AppState>>,
    Path(filename): Path<String>,
) -> Result<Json<DeleteResponse>, AppError> {
    state.service.store().delete(&filename).await?;
    Ok(Json(DeleteResponse {
        success: true,
        message: format!("Deleted {}", filename),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::routes::create_router;
    use crate::service::SpeechService;
    use crate::store::FileStore;
    use crate::test_utils::FakeLoader;
    use crate::tts::ModelRegistry;
    use axum::{http::Request, Router};
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn app() -> (tempfile::TempDir, Router) {
        app_with(FakeLoader::new())
    }

    fn app_with(loader: FakeLoader) -> (tempfile::TempDir, Router) {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileStore::open(dir.path()).expect("store");
        let registry = ModelRegistry::new(Arc::new(loader));
        let state = Arc::new(AppState {
            service: SpeechService::new(registry, store),
        });
        (dir, create_router(state))
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, body.to_vec())
    }

    async fn send_json(app: &Router, method: &str, uri: &str, body: Value) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let (status, bytes) = send(app, request).await;
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn empty(method: &str, uri: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn test_root_and_health() {
        let (_dir, app) = app();

        let (status, body) = send(&app, empty("GET", "/")).await;
        assert_eq!(status, StatusCode::OK);
        let info: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(info["status"], "running");
        assert_eq!(info["device"], "cpu");

        let (_, body) = send(&app, empty("GET", "/health")).await;
        let health: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(health["status"], "healthy");
        assert_eq!(health["english_model_loaded"], false);
        assert_eq!(health["multilingual_model_loaded"], false);
        assert_eq!(health["voice_prompts_supported"], true);

        send_json(&app, "POST", "/generate", json!({"text": "Hello"})).await;
        let (_, body) = send(&app, empty("GET", "/health")).await;
        let health: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(health["english_model_loaded"], true);
        assert_eq!(health["multilingual_model_loaded"], false);
    }

    #[tokio::test]
    async fn test_generate_then_fetch_twice() {
        let (_dir, app) = app();
        let (status, result) = send_json(
            &app,
            "POST",
            "/generate",
            json!({"text": "Hello world", "language": "en"}),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(result["success"], true);
        assert!(result["duration_seconds"].as_f64().unwrap() > 0.0);
        assert!(result.get("message").is_none());
        let audio_url = result["audio_url"].as_str().unwrap().to_string();
        assert!(audio_url.starts_with("/audio/tts_"));

        let response = app.clone().oneshot(empty("GET", &audio_url)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "audio/wav");
        assert_eq!(
            response.headers()[header::CACHE_CONTROL],
            "public, max-age=3600"
        );
        assert!(response.headers()[header::CONTENT_DISPOSITION]
            .to_str()
            .unwrap()
            .starts_with("inline; filename=tts_"));
        let first = response.into_body().collect().await.unwrap().to_bytes();
        assert!(first.starts_with(b"RIFF"));

        let (_, second) = send(&app, empty("GET", &audio_url)).await;
        assert_eq!(first.to_vec(), second);
    }

    #[tokio::test]
    async fn test_delete_is_terminal() {
        let (_dir, app) = app();
        let (_, result) = send_json(&app, "POST", "/generate", json!({"text": "Bye"})).await;
        let audio_url = result["audio_url"].as_str().unwrap().to_string();

        let (status, body) = send(&app, empty("DELETE", &audio_url)).await;
        assert_eq!(status, StatusCode::OK);
        let body: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["success"], true);

        let (status, _) = send(&app, empty("GET", &audio_url)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, body) = send(&app, empty("DELETE", &audio_url)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let body: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_generate_errors() {
        let (_dir, app) = app();

        let (status, body) = send_json(&app, "POST", "/generate", json!({"text": ""})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "VALIDATION_ERROR");

        let (status, body) = send_json(
            &app,
            "POST",
            "/generate",
            json!({"text": "Hola", "language": "xx"}),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["code"], "TTS_ERROR");
        assert!(body["error"].as_str().unwrap().contains("xx"));
    }

    #[tokio::test]
    async fn test_batch_generate() {
        let (_dir, app) = app();
        let (status, body) = send_json(
            &app,
            "POST",
            "/batch-generate",
            json!([
                {"text": "One", "scene_number": 1},
                {"text": "", "scene_number": 2},
                {"text": "Drei", "language": "de", "scene_number": 3}
            ]),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        let results = body["results"].as_array().unwrap();
        assert_eq!(results.len(), 3);

        assert_eq!(results[0]["success"], true);
        assert_eq!(results[0]["scene_number"], 1);
        assert_eq!(
            results[0]["data"]["message"],
            "Generated 0.03s audio for scene 1"
        );

        assert_eq!(results[1]["success"], false);
        assert_eq!(results[1]["scene_number"], 2);
        assert!(results[1]["error"].is_string());
        assert!(results[1].get("data").is_none());

        assert_eq!(results[2]["success"], true);
        assert_eq!(results[2]["scene_number"], 3);
    }

    #[tokio::test]
    async fn test_missing_and_invalid_audio_names() {
        let (_dir, app) = app();
        let (status, _) = send(&app, empty("GET", "/audio/tts_nope.wav")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        for uri in ["/audio/..", "/audio/a%20b.wav"] {
            let (status, body) = send(&app, empty("GET", uri)).await;
            assert_eq!(status, StatusCode::NOT_FOUND, "{uri}");
            let body: Value = serde_json::from_slice(&body).unwrap();
            assert_eq!(body["code"], "NOT_FOUND");
        }
    }

    #[tokio::test]
    async fn test_malformed_bodies_are_validation_errors() {
        let (_dir, app) = app();
        let cases = [
            ("/generate", json!({})),
            ("/generate", json!({"text": null})),
            ("/batch-generate", json!([{"text": "ok"}, {"language": "fr"}])),
        ];

        for (uri, body) in cases {
            let (status, response) = send_json(&app, "POST", uri, body.clone()).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{uri} {body}");
            assert_eq!(response["code"], "VALIDATION_ERROR");
            assert!(response["error"].is_string());
        }
    }

    #[tokio::test]
    async fn test_model_load_failure_is_server_error() {
        let (_dir, app) = app_with(FakeLoader::new().failing_first(EngineKind::English, 1));

        let (status, body) = send_json(&app, "POST", "/generate", json!({"text": "Hi"})).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["code"], "MODEL_LOAD_ERROR");

        let (status, _) = send_json(&app, "POST", "/generate", json!({"text": "Hi"})).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_health_reports_voice_prompt_support() {
        let (_dir, app) = app_with(FakeLoader::new().without_voice_prompts());
        let (_, body) = send(&app, empty("GET", "/health")).await;
        let health: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(health["voice_prompts_supported"], false);
    }
}
