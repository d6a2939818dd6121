use super::*;
use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use shared::domain::{ImageRef, MediaType, Prediction};
use tokio::{net::TcpListener, sync::Mutex};

use crate::intake::{validate, UploadCandidate};

fn staged_png() -> StagedImage {
    validate(UploadCandidate::new("image/png", b"pixel-data".to_vec())).unwrap()
}

async fn spawn_service(app: Router) -> String {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    format!("http://{addr}")
}

#[tokio::test]
async fn posts_the_staged_payload_and_decodes_the_outcome() {
    #[derive(Clone)]
    struct Captured {
        request: Arc<Mutex<Option<AnalyzeRequest>>>,
    }

    async fn handle(
        State(state): State<Captured>,
        Json(request): Json<AnalyzeRequest>,
    ) -> Json<AnalyzeResponse> {
        *state.request.lock().await = Some(request);
        Json(AnalyzeResponse {
            prediction: Prediction::Malignant,
            confidence: 0.87,
            roi_image: ImageRef("roi".into()),
            heatmap_image: ImageRef("heatmap".into()),
        })
    }

    let captured = Arc::new(Mutex::new(None));
    let app = Router::new().route("/analyze", post(handle)).with_state(Captured {
        request: Arc::clone(&captured),
    });
    let service = HttpAnalysisService::new(spawn_service(app).await);

    let image = staged_png();
    let outcome = service.analyze(&image).await.unwrap();
    assert_eq!(outcome.prediction, Prediction::Malignant);
    assert_eq!(outcome.roi.as_str(), "roi");
    assert_eq!(outcome.heatmap.as_str(), "heatmap");

    let request = captured.lock().await.take().unwrap();
    assert_eq!(request.media_type, MediaType::Png);
    assert_eq!(request.image_b64, image.payload_b64());
}

#[tokio::test]
async fn non_2xx_with_envelope_surfaces_the_service_message() {
    async fn handle() -> (StatusCode, Json<ApiError>) {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ApiError::new(
                shared::error::ErrorCode::Unavailable,
                "model is warming up",
            )),
        )
    }

    let url = spawn_service(Router::new().route("/analyze", post(handle))).await;
    let err = HttpAnalysisService::new(url)
        .analyze(&staged_png())
        .await
        .unwrap_err();
    match err {
        AnalysisError::Service(message) => assert_eq!(message, "model is warming up"),
        other => panic!("expected service error, got {other}"),
    }
}

#[tokio::test]
async fn non_2xx_without_envelope_falls_back_to_the_status() {
    async fn handle() -> (StatusCode, &'static str) {
        (StatusCode::INTERNAL_SERVER_ERROR, "boom")
    }

    let url = spawn_service(Router::new().route("/analyze", post(handle))).await;
    let err = HttpAnalysisService::new(url)
        .analyze(&staged_png())
        .await
        .unwrap_err();
    match err {
        AnalysisError::Service(message) => assert!(message.contains("500")),
        other => panic!("expected service error, got {other}"),
    }
}

#[tokio::test]
async fn truncated_success_body_is_malformed() {
    async fn handle() -> Json<serde_json::Value> {
        Json(serde_json::json!({
            "prediction": "Benign",
            "confidence": 0.9,
            "roi_image": "roi"
        }))
    }

    let url = spawn_service(Router::new().route("/analyze", post(handle))).await;
    let err = HttpAnalysisService::new(url)
        .analyze(&staged_png())
        .await
        .unwrap_err();
    assert!(matches!(err, AnalysisError::MalformedResponse(_)));
}

#[tokio::test]
async fn out_of_range_confidence_is_malformed() {
    async fn handle() -> Json<AnalyzeResponse> {
        Json(AnalyzeResponse {
            prediction: Prediction::Benign,
            confidence: 1.3,
            roi_image: ImageRef("roi".into()),
            heatmap_image: ImageRef("heatmap".into()),
        })
    }

    let url = spawn_service(Router::new().route("/analyze", post(handle))).await;
    let err = HttpAnalysisService::new(url)
        .analyze(&staged_png())
        .await
        .unwrap_err();
    match err {
        AnalysisError::MalformedResponse(message) => assert!(message.contains("1.3")),
        other => panic!("expected malformed response, got {other}"),
    }
}

#[tokio::test]
async fn slow_service_times_out_when_a_cap_is_set() {
    async fn handle() -> Json<AnalyzeResponse> {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Json(AnalyzeResponse {
            prediction: Prediction::Benign,
            confidence: 0.9,
            roi_image: ImageRef("roi".into()),
            heatmap_image: ImageRef("heatmap".into()),
        })
    }

    let url = spawn_service(Router::new().route("/analyze", post(handle))).await;
    let service = HttpAnalysisService::new(url).with_timeout(Duration::from_millis(100));
    let err = service.analyze(&staged_png()).await.unwrap_err();
    assert!(matches!(err, AnalysisError::Timeout));
}

#[tokio::test]
async fn unreachable_service_is_a_transport_failure() {
    // Bind to learn a free port, then close it before the request.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = HttpAnalysisService::new(format!("http://{addr}"))
        .analyze(&staged_png())
        .await
        .unwrap_err();
    assert!(matches!(err, AnalysisError::Transport(_)));
}

#[tokio::test]
async fn missing_service_always_reports_unavailable() {
    let err = MissingAnalysisService
        .analyze(&staged_png())
        .await
        .unwrap_err();
    match err {
        AnalysisError::Service(message) => assert!(message.contains("unavailable")),
        other => panic!("expected service error, got {other}"),
    }
}
