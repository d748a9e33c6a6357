//! HTTP 请求处理器

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use chrono::{SecondsFormat, Utc};
use purchase_shared::error::PipelineError;
use purchase_shared::events::PurchaseEvent;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::info;

use crate::catalog::{self, RANDOM_ITEMS};
use crate::error::Result;
use crate::gateway::UserHistory;
use crate::producer::ProducerStats;
use crate::state::AppState;

const SERVICE_NAME: &str = "customer-facing-service";

/// 购买请求
#[derive(Debug, Deserialize)]
pub struct BuyRequest {
    pub username: String,
    pub user_id: String,
}

/// 购买响应
#[derive(Debug, Serialize)]
pub struct BuyResponse {
    pub success: bool,
    pub message: String,
    pub purchase: PurchaseEvent,
    pub kafka_partition: i32,
    pub kafka_offset: i64,
}

/// 模拟一次购买：随机挑选商品，构造事件并发送到 Kafka
///
/// POST /buy
pub async fn buy(
    State(state): State<AppState>,
    Json(request): Json<BuyRequest>,
) -> Result<(StatusCode, Json<BuyResponse>)> {
    if !state.producer.is_ready() {
        return Err(PipelineError::NotConnected.into());
    }

    let item = catalog::random_item();
    let event = PurchaseEvent::new(&request.username, &request.user_id, item.name, item.price)?;

    info!(
        user_id = %event.user_id(),
        item_name = %event.item_name(),
        price = event.price(),
        "处理购买请求"
    );

    let receipt = state.producer.publish_event(&event).await?;

    let response = BuyResponse {
        success: true,
        message: format!(
            "Successfully purchased {} for ${}",
            event.item_name(),
            event.price()
        ),
        kafka_partition: receipt.partition,
        kafka_offset: receipt.offset,
        purchase: event,
    };
    Ok((StatusCode::CREATED, Json(response)))
}

/// 查询用户全部购买记录（经网关转发到客户管理服务）
///
/// GET /getAllUserBuys/{user_id}
pub async fn get_all_user_buys(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<UserHistory>> {
    let history = state.gateway.get_history(&user_id).await?;
    Ok(Json(history))
}

/// 商品目录
pub async fn list_items() -> Json<Value> {
    Json(json!({
        "items": RANDOM_ITEMS,
        "total": RANDOM_ITEMS.len(),
    }))
}

/// 健康检查：Kafka 已连接且历史服务可达时返回 200，否则 503
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let kafka_connected = state.producer.is_ready();
    let upstream_reachable = state.gateway.ping().await;
    let healthy = kafka_connected && upstream_reachable;

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
            "kafka_connected": kafka_connected,
            "customer_management_api_reachable": upstream_reachable,
            "timestamp": Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
        })),
    )
}

/// 生产者统计
pub async fn stats(State(state): State<AppState>) -> Json<ProducerStats> {
    Json(state.producer.stats())
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
            "buy": "POST /buy",
            "get_purchases": "GET /getAllUserBuys/{user_id}",
            "items": "GET /items",
            "health": "GET /health",
            "stats": "GET /stats",
            "metrics": "GET /metrics",
        }
    }))
}
