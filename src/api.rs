use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::{error, info};

use crate::error::RegistryError;
use crate::service::{RegistryHandle, RegistryStats};
use crate::verifier::Verdict;

// ==========================================
// 1. 应用状态 (Shared State)
// ==========================================
// 指纹库句柄本身负责读写隔离，这里不需要再包一层 Mutex。
pub struct AppState {
    pub registry: Arc<RegistryHandle>,
    pub max_upload_bytes: usize,
}

// ==========================================
// 2. 数据传输对象 (DTOs)
// ==========================================

#[derive(Debug, Deserialize)]
pub struct VerifyParams {
    /// 原始文件名，只用于回显
    pub filename: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct VerifyResponse {
    pub success: bool,
    pub result: Verdict,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub registry_loaded: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, msg: impl Into<String>) -> ApiError {
    (status, Json(ErrorResponse { error: msg.into() }))
}

// ==========================================
// 3. 路由
// ==========================================
pub fn app(state: Arc<AppState>) -> Router {
    let limit = state.max_upload_bytes;
    Router::new()
        .route("/verify", post(verify_upload))
        .route("/stats", get(get_stats))
        .route("/health", get(health_check))
        .route("/reload", post(reload_registry))
        .layer(DefaultBodyLimit::max(limit))
        .layer(CorsLayer::permissive()) // ⚠️ 开发模式：允许所有跨域
        .with_state(state)
}

// ==========================================
// 4. 处理函数 (Handlers)
// ==========================================

/// 接口：上传发票图片，返回真伪判决
async fn verify_upload(
    State(state): State<Arc<AppState>>,
    Query(params): Query<VerifyParams>,
    body: Bytes,
) -> Result<Json<VerifyResponse>, ApiError> {
    if body.is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "No file uploaded"));
    }
    info!(bytes = body.len(), filename = ?params.filename, "📥 收到验证请求");

    // 解码 + PNG 编码 + SHA-256 都是 CPU 密集型，放到阻塞线程池
    let handle = Arc::clone(&state.registry);
    let verdict = tokio::task::spawn_blocking(move || handle.verify_encoded(&body))
        .await
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, format!("Task join error: {e}")))?;

    info!(authentic = verdict.is_authentic, reason = ?verdict.reason, "判决完成");
    Ok(Json(VerifyResponse {
        success: true,
        result: verdict,
        filename: params.filename,
    }))
}

async fn get_stats(State(state): State<Arc<AppState>>) -> Json<RegistryStats> {
    Json(state.registry.get_stats())
}

async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        registry_loaded: !state.registry.snapshot().is_empty(),
    })
}

/// 接口：从磁盘重新加载指纹库 (整体替换)
async fn reload_registry(State(state): State<Arc<AppState>>) -> Result<Json<RegistryStats>, ApiError> {
    let handle = Arc::clone(&state.registry);
    let stats = tokio::task::spawn_blocking(move || handle.reload())
        .await
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, format!("Task join error: {e}")))?
        .map_err(|e| {
            error!(error = %e, "reload failed");
            let status = match e {
                RegistryError::NotFound(_) => StatusCode::NOT_FOUND,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            };
            api_error(status, e.to_string())
        })?;
    Ok(Json(stats))
}
