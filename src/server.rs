//! HTTP front end: upload page images, get per-page text back.
//!
//! `PUT /process` accepts either a raw image body (one page) or a
//! `multipart/form-data` body where every file field is a page, in order.
//! Pages go through the same bounded pool and retry policy as batch runs.

use crate::config::ServerConfig;
use crate::document::{Document, PageResult};
use crate::pool::PageWorkerPool;
use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, FromRequest, Multipart, Request, State},
    http::{header, HeaderMap, StatusCode},
    response::Json,
    routing::{get, put},
    Router,
};
use serde::Serialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// State shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub pool: PageWorkerPool,
    pub max_upload_bytes: usize,
    pub max_pages: usize,
}

impl AppState {
    pub fn new(pool: PageWorkerPool, config: &ServerConfig) -> Self {
        Self {
            pool,
            max_upload_bytes: config.max_upload_bytes,
            max_pages: config.max_pages,
        }
    }
}

pub fn router(state: AppState) -> Router {
    let body_limit = state.max_upload_bytes;
    Router::new()
        .route("/", get(health))
        .route("/process", put(process_file))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bind and serve until the process is stopped.
pub async fn serve(state: AppState, bind_addr: &str) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    info!("Server listening on http://{}", bind_addr);
    axum::serve(listener, router(state)).await?;
    Ok(())
}

// ============================================================================
// Response types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct PageDocument {
    pub page_content: String,
    pub metadata: PageMetadata,
}

#[derive(Debug, Serialize)]
pub struct PageMetadata {
    /// 1-based page number.
    pub page: usize,
    pub filename: String,
    pub total_pages: usize,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub detail: String,
}

type ApiError = (StatusCode, Json<ErrorBody>);

fn api_error(status: StatusCode, detail: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorBody {
            detail: detail.into(),
        }),
    )
}

// ============================================================================
// Handlers
// ============================================================================

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "message": "Page OCR server is running"
    }))
}

async fn process_file(
    State(state): State<AppState>,
    request: Request,
) -> Result<Json<Vec<PageDocument>>, ApiError> {
    let headers = request.headers().clone();
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_lowercase();

    let (upload, filename, images) = if content_type.starts_with("multipart/form-data") {
        let multipart = Multipart::from_request(request, &state)
            .await
            .map_err(|e| api_error(e.status(), e.body_text()))?;
        let (filename, images) = read_multipart(&state, &headers, multipart).await?;
        (Upload::Pages, filename, images)
    } else {
        let body = Bytes::from_request(request, &state)
            .await
            .map_err(|e| api_error(e.status(), e.body_text()))?;
        validate_size(&state, body.len())?;
        if !is_image_type(&content_type) {
            return Err(api_error(
                StatusCode::BAD_REQUEST,
                "Unsupported file type. Please upload image files (PNG, JPG, JPEG).",
            ));
        }
        (
            Upload::Image,
            filename_from(&headers, &content_type),
            vec![body.to_vec()],
        )
    };

    info!("Processing {} ({} pages)", filename, images.len());
    let documents = ocr_pages(&state, upload, &filename, images).await?;
    info!("Successfully processed {} with {} pages", filename, documents.len());
    Ok(Json(documents))
}

async fn read_multipart(
    state: &AppState,
    headers: &HeaderMap,
    mut multipart: Multipart,
) -> Result<(String, Vec<Vec<u8>>), ApiError> {
    let mut filename = headers
        .get("x-filename")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let mut images = Vec::new();
    let mut total = 0;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| api_error(e.status(), e.body_text()))?
    {
        let Some(field_filename) = field.file_name().map(str::to_string) else {
            continue;
        };
        let data = field
            .bytes()
            .await
            .map_err(|e| api_error(e.status(), e.body_text()))?;
        if data.is_empty() {
            return Err(api_error(
                StatusCode::BAD_REQUEST,
                format!("Empty page: {}", field_filename),
            ));
        }
        total += data.len();
        validate_size(state, total)?;
        filename.get_or_insert(field_filename);
        images.push(data.to_vec());
    }

    if images.is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "No pages uploaded"));
    }
    Ok((filename.unwrap_or_else(|| "document".to_string()), images))
}

/// How the pages arrived; decides how an OCR failure is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Upload {
    /// Raw image body, one page.
    Image,
    /// Multipart body, one page per file field.
    Pages,
}

impl Upload {
    /// Raw images report 422 with the cause; multipart pages report 500 with the page number.
    fn page_failed(self, page: usize, reason: &str) -> ApiError {
        match self {
            Self::Image => api_error(
                StatusCode::UNPROCESSABLE_ENTITY,
                format!("Failed to process image: {}", reason),
            ),
            Self::Pages => api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to process page {}", page),
            ),
        }
    }
}

/// OCR every page; any page that exhausts its retries fails the request.
async fn ocr_pages(
    state: &AppState,
    upload: Upload,
    filename: &str,
    images: Vec<Vec<u8>>,
) -> Result<Vec<PageDocument>, ApiError> {
    let total_pages = images.len();
    if total_pages > state.max_pages {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            format!(
                "Upload has {} pages, maximum allowed is {}",
                total_pages, state.max_pages
            ),
        ));
    }

    let document = Document::from_images(filename, images);
    let results = state.pool.process_document(filename, document.pages).await;

    let mut documents = Vec::with_capacity(total_pages);
    for (index, result) in results {
        match result {
            PageResult::Text(text) => documents.push(PageDocument {
                page_content: text,
                metadata: PageMetadata {
                    page: index + 1,
                    filename: filename.to_string(),
                    total_pages,
                },
            }),
            PageResult::Failed(failure) => {
                error!(
                    "Failed to process page {} of {}: {}",
                    index + 1,
                    filename,
                    failure.reason
                );
                return Err(upload.page_failed(index + 1, &failure.reason));
            }
        }
    }
    Ok(documents)
}

// ============================================================================
// Helper functions
// ============================================================================

fn validate_size(state: &AppState, len: usize) -> Result<(), ApiError> {
    if len == 0 {
        return Err(api_error(StatusCode::BAD_REQUEST, "Empty file content"));
    }
    if len > state.max_upload_bytes {
        return Err(api_error(
            StatusCode::PAYLOAD_TOO_LARGE,
            format!(
                "File too large. Maximum size is {}MB",
                state.max_upload_bytes / (1024 * 1024)
            ),
        ));
    }
    Ok(())
}

fn is_image_type(content_type: &str) -> bool {
    ["png", "jpeg", "jpg"]
        .iter()
        .any(|t| content_type.contains(t))
}

/// `X-Filename` if present, otherwise a name derived from the content type.
fn filename_from(headers: &HeaderMap, content_type: &str) -> String {
    if let Some(name) = headers.get("x-filename").and_then(|v| v.to_str().ok()) {
        return name.to_string();
    }
    if content_type.contains("png") {
        "image.png".to_string()
    } else if content_type.contains("jpeg") || content_type.contains("jpg") {
        "image.jpg".to_string()
    } else {
        "file".to_string()
    }
}
