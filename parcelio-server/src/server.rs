use crate::auth::require_basic_auth;
use crate::config::Config;
use crate::error::{ApiError, ApiResponse};
use crate::page::{FAVICON_SVG, encode_component, render_index};
use axum::{
    Router,
    body::Body,
    extract::{Path, State},
    http::{HeaderValue, Method, Request, StatusCode, header},
    middleware::{self, Next},
    response::{Html, IntoResponse, Redirect, Response},
    routing::get,
};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use futures_util::StreamExt;
use parcelio_core::{
    ByteStream, ChunkBackend, Coordinator, DeleteObjectOperationOutcome, DownloadObjectOperationOutcome,
    LockCounts, StorageChannel, UploadObjectOperationOutcome,
};
use serde::Serialize;
use std::any::Any;
use std::sync::Arc;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;

/// Chunks buffered between a download task and the response body.
const DOWNLOAD_BUFFER: usize = 4;

const ALLOWED_METHODS: &str = "GET, HEAD, POST, OPTIONS, DELETE";

pub struct ServerState {
    pub coordinator: Coordinator,
    pub channel: StorageChannel,
    pub config: Config,
}

impl ServerState {
    pub fn new(config: Config) -> parcelio_core::Result<Self> {
        let backend = config.build_backend()?;
        Ok(Self::with_backend(config, backend))
    }

    pub fn with_backend(config: Config, backend: Arc<dyn ChunkBackend>) -> Self {
        Self {
            coordinator: Coordinator::new(backend),
            channel: StorageChannel::new(config.channel.clone()),
            config,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    status: &'static str,
    backend: &'static str,
    objects: usize,
    total_size: u64,
    total_chunks: u64,
    #[serde(flatten)]
    locks: LockCounts,
}

#[derive(Debug, Serialize)]
struct DeleteResponse {
    deleted: bool,
    name: String,
    size: u64,
    chunks: usize,
}

pub async fn run_server(config: Config) -> anyhow::Result<()> {
    let bind_addr = config.bind_addr.clone();
    let state = Arc::new(ServerState::new(config)?);

    tracing::info!(
        backend = state.coordinator.backend_kind(),
        channel = state.channel.id(),
        auth = state.config.active_auth().is_some(),
        cdn = state.config.cdn_enabled,
        "storage ready"
    );

    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("Server listening on {}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for shutdown signal: {}", error);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

pub fn build_router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/favicon.ico", get(favicon_handler))
        .route("/healthz", get(health_handler))
        .route("/uri/*name", get(chunk_uri_handler))
        .route("/cdn/", get(cdn_handler))
        .route("/cdn/*rest", get(cdn_handler))
        .route(
            "/*name",
            get(download_object)
                .post(upload_object)
                .delete(delete_object),
        )
        .layer(middleware::from_fn(cors_preflight))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            require_basic_auth,
        ))
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Wildcard captures may carry the separating slash depending on the router
/// version; object names never start with it.
fn object_name(raw: String) -> String {
    match raw.strip_prefix('/') {
        Some(stripped) => stripped.to_string(),
        None => raw,
    }
}

async fn cors_preflight(req: Request<Body>, next: Next) -> Response {
    if req.method() != Method::OPTIONS {
        return next.run(req).await;
    }

    (
        StatusCode::OK,
        [
            (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
            (header::ACCESS_CONTROL_ALLOW_METHODS, ALLOWED_METHODS),
            (header::ACCESS_CONTROL_ALLOW_HEADERS, "*"),
        ],
    )
        .into_response()
}

fn handle_panic(payload: Box<dyn Any + Send + 'static>) -> Response {
    let detail = payload
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| payload.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    tracing::error!(detail, "request handler panicked");

    ApiError::Internal("internal server error".to_string()).into_response()
}

async fn index_handler(State(state): State<Arc<ServerState>>) -> Html<String> {
    Html(render_index(&state.coordinator.snapshot()))
}

async fn favicon_handler() -> impl IntoResponse {
    (
        [
            (header::CONTENT_TYPE, "image/svg+xml"),
            (header::CACHE_CONTROL, "public, max-age=86400"),
        ],
        FAVICON_SVG,
    )
}

async fn health_handler(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    let snapshot_meta = state.coordinator.meta();
    let response = HealthResponse {
        status: "ok",
        backend: state.coordinator.backend_kind(),
        objects: state.coordinator.len(),
        total_size: snapshot_meta.total_size,
        total_chunks: snapshot_meta.total_chunks,
        locks: state.coordinator.lock_counts(),
    };

    (StatusCode::OK, axum::Json(response))
}

async fn chunk_uri_handler(
    State(state): State<Arc<ServerState>>,
    Path(name): Path<String>,
) -> Result<Response, ApiError> {
    let name = object_name(name);
    let descriptor = state
        .coordinator
        .chunk_descriptor(&name)
        .ok_or_else(|| ApiError::NotFound(format!("object not found: {}", name)))?;

    let payload = serde_json::to_vec(&descriptor)
        .map_err(|error| ApiError::Internal(error.to_string()))?;

    Ok((
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        STANDARD.encode(payload),
    )
        .into_response())
}

async fn cdn_handler(State(state): State<Arc<ServerState>>) -> Result<Response, ApiError> {
    if !state.config.cdn_enabled {
        return Err(ApiError::NotFound("not found".to_string()));
    }

    Ok(axum::Json(state.coordinator.snapshot()).into_response())
}

async fn upload_object(
    State(state): State<Arc<ServerState>>,
    Path(name): Path<String>,
    body: Body,
) -> Result<Response, ApiError> {
    let name = object_name(name);
    let stream: ByteStream = body
        .into_data_stream()
        .map(|item| item.map_err(std::io::Error::other))
        .boxed();

    match state
        .coordinator
        .upload(&name, stream, &state.channel)
        .await?
    {
        UploadObjectOperationOutcome::Committed(_) => Ok(Redirect::to("/").into_response()),
        UploadObjectOperationOutcome::Conflict { name } => Err(ApiError::Conflict(format!(
            "object already exists or is being uploaded: {}",
            name
        ))),
    }
}

async fn download_object(
    State(state): State<Arc<ServerState>>,
    Path(name): Path<String>,
) -> Result<Response, ApiError> {
    let name = object_name(name);
    let download = match state.coordinator.begin_download(&name) {
        DownloadObjectOperationOutcome::Ready(download) => download,
        DownloadObjectOperationOutcome::NotFound => {
            return Err(ApiError::NotFound(format!("object not found: {}", name)));
        }
    };

    let content_length = download.content_length();
    let disposition = format!(
        "attachment; filename*=UTF-8''{}",
        encode_component(download.name())
    );
    let disposition = HeaderValue::from_str(&disposition)
        .map_err(|error| ApiError::Internal(error.to_string()))?;

    // Headers go out before the first chunk; a failure after this point
    // can only abort the body.
    let (tx, rx) = tokio::sync::mpsc::channel(DOWNLOAD_BUFFER);
    tokio::spawn(async move {
        let _ = download.stream_to(tx).await;
    });

    let stream = futures_util::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|item| (item, rx))
    });

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/octet-stream")
        .header(header::CONTENT_LENGTH, content_length)
        .header(header::CONTENT_DISPOSITION, disposition)
        .body(Body::from_stream(stream))
        .map_err(|error| ApiError::Internal(error.to_string()))
}

async fn delete_object(
    State(state): State<Arc<ServerState>>,
    Path(name): Path<String>,
) -> Result<Response, ApiError> {
    let name = object_name(name);

    match state.coordinator.delete(&name, &state.channel).await? {
        DeleteObjectOperationOutcome::Deleted(result) => {
            let resp = ApiResponse::ok(DeleteResponse {
                deleted: true,
                name: result.name,
                size: result.size,
                chunks: result.chunk_count,
            });
            Ok((StatusCode::OK, axum::Json(resp)).into_response())
        }
        DeleteObjectOperationOutcome::NotFound => {
            Err(ApiError::NotFound(format!("object not found: {}", name)))
        }
        DeleteObjectOperationOutcome::Conflict => Err(ApiError::Conflict(format!(
            "object is busy: {}",
            name
        ))),
    }
}
