//! HTTP 请求处理器

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use purchase_shared::observability::metrics;
use serde_json::{Value, json};
use tracing::info;

use crate::consumer::ConsumerStats;
use crate::error::{ManagementError, Result};
use crate::history::PurchaseHistory;
use crate::state::AppState;

const SERVICE_NAME: &str = "customer-management-service";

/// 查询用户购买历史
///
/// GET /purchases/{user_id}
pub async fn get_user_purchases(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<PurchaseHistory>> {
    let records = state.store.query_by_user(&user_id).await.map_err(|e| {
        metrics::record_history_request("error");
        ManagementError::from(e)
    })?;

    let Some(history) = PurchaseHistory::from_records(&user_id, &records) else {
        metrics::record_history_request("not_found");
        return Err(ManagementError::NotFound { user_id });
    };

    metrics::record_history_request("found");
    info!(
        user_id = %user_id,
        total_purchases = history.total_purchases,
        "返回购买历史"
    );
    Ok(Json(history))
}

/// 健康检查：消费者运行且存储可达时返回 200，否则 503
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let consumer_running = state.consumer.is_running();
    let storage_ok = state.store.ping().await.is_ok();
    let healthy = consumer_running && storage_ok;

    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(json!({
            "status": if healthy { "healthy" } else { "unhealthy" },
            "service": SERVICE_NAME,
            "kafka_consumer": consumer_running,
            "storage": if storage_ok { "connected" } else { "disconnected" },
        })),
    )
}

/// 消费者统计
pub async fn stats(State(state): State<AppState>) -> Json<ConsumerStats> {
    Json(state.consumer.stats())
}

/// Prometheus 指标
pub async fn metrics_endpoint(State(state): State<AppState>) -> String {
    state
        .metrics
        .as_ref()
        .map(|handle| handle.render())
        .unwrap_or_default()
}

pub async fn root() -> Json<Value> {
    Json(json!({
        "service": SERVICE_NAME,
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "purchases": "/purchases/{user_id}",
            "health": "/health",
            "stats": "/stats",
            "metrics": "/metrics",
        }
    }))
}
