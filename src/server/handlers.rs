use anyhow::{Context, Result};
use axum::body::Body;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::{HeaderMap, HeaderValue, Method, Request, Response, StatusCode};
use axum::middleware::Next;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use image::RgbaImage;
use std::sync::Arc;
use tracing::info;

use super::models::{ErrorResponse, RecognizeResponse, SegmentBody};
use super::state::ServerState;
use crate::recognition::{self, HttpRecognizer, TranscribeOptions};
use crate::segment::{
    self, SegmentError, SegmentationConfig, SegmentationOutput, SegmentationRequest,
};
use crate::settings;
use crate::worker::SegmentWorker;

const MAX_BODY_BYTES: usize = 64 * 1024 * 1024;

type ApiError = (StatusCode, Json<ErrorResponse>);

pub async fn run_server(settings: settings::Settings, addr: String) -> Result<()> {
    let worker = Arc::new(SegmentWorker::spawn(settings.downscale_width)?);
    let recognizer = Arc::new(HttpRecognizer::from_settings(&settings)?);
    info!("recognition endpoint: {}", recognizer.endpoint());
    let state = Arc::new(ServerState::new(settings, worker, recognizer));
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind server address {}", addr))?;
    info!("listening on {}", addr);
    axum::serve(listener, router(state)).await?;
    Ok(())
}

pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/settings", get(settings_info))
        .route("/segment", post(segment_page))
        .route("/recognize", post(recognize_page))
        .with_state(state)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(axum::middleware::from_fn(cors_middleware))
}

async fn health() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

async fn cors_middleware(req: Request<Body>, next: Next) -> Result<Response<Body>, StatusCode> {
    if req.method() == Method::OPTIONS {
        let mut response = Response::new(Body::empty());
        *response.status_mut() = StatusCode::NO_CONTENT;
        apply_cors_headers(response.headers_mut());
        return Ok(response);
    }
    let mut response = next.run(req).await;
    apply_cors_headers(response.headers_mut());
    Ok(response)
}

fn apply_cors_headers(headers: &mut HeaderMap) {
    headers.insert("access-control-allow-origin", HeaderValue::from_static("*"));
    headers.insert(
        "access-control-allow-methods",
        HeaderValue::from_static("GET,POST,OPTIONS"),
    );
    headers.insert(
        "access-control-allow-headers",
        HeaderValue::from_static("content-type"),
    );
}

async fn settings_info(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    let settings = &state.settings;
    Json(serde_json::json!({
        "config": settings.segmentation,
        "downscaleWidth": settings.downscale_width,
        "recognition": {
            "maxPixels": settings.recognition_max_pixels,
            "concurrency": settings.recognition_concurrency,
        },
    }))
}

async fn segment_page(
    State(state): State<Arc<ServerState>>,
    Json(body): Json<SegmentBody>,
) -> Result<Json<SegmentationOutput>, ApiError> {
    let output = run_segmentation(&state, body).await?;
    Ok(Json(output))
}

async fn recognize_page(
    State(state): State<Arc<ServerState>>,
    Json(body): Json<SegmentBody>,
) -> Result<Json<RecognizeResponse>, ApiError> {
    let output = run_segmentation(&state, body).await?;
    let regions = recognition::transcribe_regions(
        state.recognizer.as_ref(),
        &output.regions,
        TranscribeOptions::from_settings(&state.settings),
    )
    .await;
    let text = recognition::join_texts(&regions);
    Ok(Json(RecognizeResponse { regions, text }))
}

async fn run_segmentation(
    state: &ServerState,
    body: SegmentBody,
) -> Result<SegmentationOutput, ApiError> {
    let scaled = body.scaled.unwrap_or(true);
    let keyed = body
        .page_id
        .as_deref()
        .is_some_and(|page_id| !page_id.trim().is_empty());
    let defaults = state.settings.segmentation;
    let (page, request) = blocking(move || build_job(defaults, body)).await?;
    let page = Arc::new(page);
    if !scaled {
        return blocking(move || segment::segment_inline(&page, &request)).await;
    }
    if keyed {
        return latest_for_page(state, page, request).await;
    }
    state
        .worker
        .run(page, request)
        .await
        .map_err(|err| segment_error(&err))
}

/// Debounced run for a named page. Requests for the same page that arrive
/// within the debounce window all resolve with the newest one's result.
async fn latest_for_page(
    state: &ServerState,
    page: Arc<RgbaImage>,
    request: SegmentationRequest,
) -> Result<SegmentationOutput, ApiError> {
    let page_id = request.page_id.clone();
    let (scheduler, generation) = state.trigger_for_page(page, request);
    let published = scheduler.wait_for(generation).await;
    state.release_page(&page_id, generation);
    match published.map(|published| published.outcome) {
        Some(Ok(output)) => Ok(output.as_ref().clone()),
        Some(Err(err)) => Err(segment_error(&err)),
        None => Err(segment_error(&SegmentError::EngineNotReady)),
    }
}

async fn blocking<T, F>(work: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, SegmentError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|err| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: format!("server task failed: {}", err),
                }),
            )
        })?
        .map_err(|err| segment_error(&err))
}

fn build_job(
    defaults: SegmentationConfig,
    body: SegmentBody,
) -> Result<(RgbaImage, SegmentationRequest), SegmentError> {
    if body.image.trim().is_empty() {
        return Err(SegmentError::InvalidPayload("no image data".to_string()));
    }
    let (_, bytes) = segment::decode_payload(&body.image)?;
    let page = segment::decode_page(&bytes)?;
    let mut request = SegmentationRequest::new(body.config.unwrap_or(defaults));
    request.masks = body.masks;
    request.paragraph_cuts = body.paragraph_cuts;
    request.column_cuts = body.column_cuts;
    if let Some(page_id) = body.page_id
        && !page_id.trim().is_empty()
    {
        request.page_id = page_id.trim().to_string();
    }
    Ok((page, request))
}

fn segment_error(err: &SegmentError) -> ApiError {
    let status = if err.is_input_error() {
        StatusCode::BAD_REQUEST
    } else if matches!(err, SegmentError::EngineNotReady) {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    let error = match std::error::Error::source(err) {
        Some(source) => format!("{}: {}", err, source),
        None => err.to_string(),
    };
    (status, Json(ErrorResponse { error }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recognition::{RecognizeFuture, Recognizer};
    use image::{DynamicImage, Rgba};
    use serde_json::{Value, json};

    struct Echo;

    impl Recognizer for Echo {
        fn recognize<'a>(&'a self, _image_data: &'a str, _mime: &'a str) -> RecognizeFuture<'a> {
            Box::pin(async { Ok::<_, anyhow::Error>("\\textbf{line}".to_string()) })
        }
    }

    fn page_uri() -> String {
        page_uri_with(&[(20, 20), (20, 120), (250, 20)])
    }

    fn page_uri_with(blocks: &[(u32, u32)]) -> String {
        let mut page = RgbaImage::from_pixel(400, 200, Rgba([255, 255, 255, 255]));
        for &(x0, y0) in blocks {
            for y in y0..y0 + 20 {
                for x in x0..x0 + 100 {
                    page.put_pixel(x, y, Rgba([0, 0, 0, 255]));
                }
            }
        }
        let bytes = segment::png_bytes(&DynamicImage::ImageRgba8(page)).unwrap();
        segment::to_data_uri(segment::PNG_MIME, &bytes)
    }

    async fn spawn_app() -> String {
        spawn_app_with(settings::Settings::default()).await.0
    }

    async fn spawn_app_with(settings: settings::Settings) -> (String, Arc<ServerState>) {
        let worker = Arc::new(SegmentWorker::spawn(settings.downscale_width).unwrap());
        let state = Arc::new(ServerState::new(settings, worker, Arc::new(Echo)));
        let app_state = state.clone();
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router(app_state)).await.unwrap();
        });
        (format!("http://{}", addr), state)
    }

    #[test]
    fn errors_map_to_statuses() {
        assert_eq!(
            segment_error(&SegmentError::InvalidPayload("x".into())).0,
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            segment_error(&SegmentError::EngineNotReady).0,
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            segment_error(&SegmentError::Worker("boom".into())).0,
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn segment_returns_ordered_regions() {
        let base = spawn_app().await;
        let client = reqwest::Client::new();
        for scaled in [true, false] {
            let response = client
                .post(format!("{}/segment", base))
                .json(&json!({ "image": page_uri(), "pageId": "doc", "scaled": scaled }))
                .send()
                .await
                .unwrap();
            assert_eq!(response.status(), 200);
            assert_eq!(
                response.headers()["access-control-allow-origin"],
                HeaderValue::from_static("*")
            );
            let body: Value = response.json().await.unwrap();
            let regions = body["regions"].as_array().unwrap();
            let ids: Vec<_> = regions.iter().map(|r| r["id"].as_str().unwrap()).collect();
            assert_eq!(ids, vec!["doc-0000", "doc-0001", "doc-0002"]);
            // Row of two boxes first, then the lower left box.
            assert_eq!(regions[1]["x"], 238);
            assert_eq!(regions[2]["y"], 118);
            assert_eq!(body["rawBoxes"].as_array().unwrap().len(), 3);
        }
    }

    #[tokio::test]
    async fn rapid_requests_for_one_page_share_the_latest_result() {
        let settings = settings::Settings {
            debounce_ms: 300,
            ..settings::Settings::default()
        };
        let (base, state) = spawn_app_with(settings).await;
        let client = reqwest::Client::new();
        let post = |image: String| {
            client
                .post(format!("{}/segment", base))
                .json(&json!({ "image": image, "pageId": "draft" }))
                .send()
        };

        let first = tokio::spawn(post(page_uri_with(&[(20, 20)])));
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        let second = post(page_uri()).await.unwrap();
        let first = first.await.unwrap().unwrap();

        for response in [first, second] {
            assert_eq!(response.status(), 200);
            let body: Value = response.json().await.unwrap();
            assert_eq!(body["regions"].as_array().unwrap().len(), 3);
        }
        assert_eq!(state.tracked_pages(), 0);
    }

    #[tokio::test]
    async fn bad_images_are_client_errors() {
        let base = spawn_app().await;
        let response = reqwest::Client::new()
            .post(format!("{}/segment", base))
            .json(&json!({ "image": "" }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 400);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["error"], "invalid image payload: no image data");
    }

    #[tokio::test]
    async fn recognize_returns_cleaned_texts() {
        let base = spawn_app().await;
        let response = reqwest::Client::new()
            .post(format!("{}/recognize", base))
            .json(&json!({ "image": page_uri() }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["regions"].as_array().unwrap().len(), 3);
        assert_eq!(body["regions"][0]["text"], "line");
        assert_eq!(body["text"], "line\n\nline\n\nline");
    }
}
