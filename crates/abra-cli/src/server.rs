use std::sync::Arc;

use abra_engine::{ServiceError, TextExtractionService};
use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<TextExtractionService>,
}

#[derive(Debug, Deserialize)]
pub struct RetrieveTextRequest {
    pub image: String,
    #[serde(default)]
    pub refine: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RetrieveTextResponse {
    pub result: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Service(#[from] ServiceError),
    #[error("Failed to process image {0}")]
    Worker(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Service(ServiceError::ImageRetrieval(_)) => StatusCode::BAD_REQUEST,
            ApiError::Service(ServiceError::Processing(_)) | ApiError::Worker(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, Json(ErrorResponse { detail: self.to_string() })).into_response()
    }
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    detail: String,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/retrieve-text", post(retrieve_text))
        .with_state(state)
        .layer(CorsLayer::permissive())
}

pub async fn retrieve_text(
    State(state): State<AppState>,
    Json(request): Json<RetrieveTextRequest>,
) -> Result<Json<RetrieveTextResponse>, ApiError> {
    let service = Arc::clone(&state.service);
    let image = request.image.clone();
    let outcome =
        tokio::task::spawn_blocking(move || service.retrieve_text(&image, request.refine))
            .await
            .map_err(|err| ApiError::Worker(err.to_string()))?;
    match outcome {
        Ok(result) => Ok(Json(RetrieveTextResponse { result })),
        Err(err) => {
            warn!(image = %request.image, error = %err, "text retrieval failed");
            Err(err.into())
        }
    }
}

pub async fn serve(host: &str, port: u16, state: AppState) -> Result<()> {
    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("text retrieval service listening on {addr}");
    axum::serve(listener, router(state))
        .await
        .context("HTTP server failed")
}

#[cfg(test)]
mod tests {
    use abra_contracts::{AbraError, Result as AbraResult};
    use abra_engine::{FormRequest, HttpReply, LineStream, TextRecognizer, Transport};
    use image::GrayImage;

    use super::*;

    struct NoDownloads;

    impl Transport for NoDownloads {
        fn get_text(&self, _url: &str, _headers: &[(String, String)]) -> AbraResult<HttpReply> {
            unreachable!()
        }

        fn get_bytes(&self, url: &str) -> AbraResult<Vec<u8>> {
            Err(AbraError::transport(format!("GET {url} failed (404)"), "not found"))
        }

        fn post_form(&self, _request: &FormRequest) -> AbraResult<HttpReply> {
            unreachable!()
        }

        fn post_form_lines(&self, _request: &FormRequest) -> AbraResult<LineStream> {
            unreachable!()
        }
    }

    struct Silent;

    impl TextRecognizer for Silent {
        fn recognize(&self, _image: &GrayImage) -> Result<String> {
            Ok(String::new())
        }
    }

    fn state() -> AppState {
        AppState {
            service: Arc::new(TextExtractionService::new(
                Box::new(NoDownloads),
                Box::new(Silent),
            )),
        }
    }

    #[tokio::test]
    async fn download_failure_maps_to_bad_request() {
        let request = RetrieveTextRequest {
            image: "https://img.test/missing.png".to_string(),
            refine: None,
        };
        let err = retrieve_text(State(state()), Json(request)).await.unwrap_err();
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn processing_failure_maps_to_server_error() {
        let err = ApiError::from(ServiceError::Processing("bad bytes".to_string()));
        assert_eq!(err.to_string(), "Failed to process image bad bytes");
        assert_eq!(
            err.into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn refine_flag_is_optional() {
        let request: RetrieveTextRequest =
            serde_json::from_str(r#"{"image":"https://img.test/a.png"}"#).unwrap();
        assert_eq!(request.refine, None);
        let request: RetrieveTextRequest =
            serde_json::from_str(r#"{"image":"x","refine":true}"#).unwrap();
        assert_eq!(request.refine, Some(true));
    }
}
