//! 路由配置模块

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::{handlers, state::AppState};

/// 构建完整的应用路由
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::root))
        .route("/buy", post(handlers::buy))
        .route("/getAllUserBuys/{user_id}", get(handlers::get_all_user_buys))
        .route("/items", get(handlers::list_items))
        .route("/health", get(handlers::health))
        .route("/stats", get(handlers::stats))
        .route("/metrics", get(handlers::metrics_endpoint))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::HistoryGateway;
    use crate::producer::EventProducer;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use purchase_shared::config::{KafkaConfig, UpstreamConfig};
    use purchase_shared::events;
    use purchase_shared::test_utils::InMemoryBroker;
    use serde_json::{Value, json};
    use std::sync::Arc;
    use tower::ServiceExt;

    async fn test_state(broker: &InMemoryBroker, connect: bool) -> AppState {
        let producer = Arc::new(EventProducer::new(
            Arc::new(broker.clone()),
            &KafkaConfig::default(),
        ));
        if connect {
            producer.connect().await.unwrap();
        }
        // 指向一个不会被监听的端口
        let gateway = HistoryGateway::new(&UpstreamConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            timeout_secs: 1,
            health_timeout_secs: 1,
        })
        .unwrap();
        AppState::new(producer, gateway)
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&body).unwrap_or(Value::Null))
    }

    fn buy_request(body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/buy")
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_buy_publishes_event() {
        let broker = InMemoryBroker::new();
        let state = test_state(&broker, true).await;

        let (status, body) = send(
            app(state),
            buy_request(json!({"username": "  john_doe ", "user_id": "user_123"})),
        )
        .await;

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["success"], true);
        assert_eq!(body["purchase"]["username"], "john_doe");
        assert_eq!(body["purchase"]["user_id"], "user_123");
        assert_eq!(body["kafka_partition"], broker.partition_for("user_123"));

        let records = broker.records("purchases");
        assert_eq!(records.len(), 1);
        let published = events::validate(&records[0].payload).unwrap();
        assert_eq!(published.username(), "john_doe");
        assert!(
            body["message"]
                .as_str()
                .unwrap()
                .starts_with("Successfully purchased ")
        );
    }

    #[tokio::test]
    async fn test_buy_blank_user_id_rejected() {
        let broker = InMemoryBroker::new();
        let state = test_state(&broker, true).await;

        let (status, body) = send(
            app(state),
            buy_request(json!({"username": "john_doe", "user_id": "   "})),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "VALIDATION_ERROR");
        assert!(broker.records("purchases").is_empty());
    }

    #[tokio::test]
    async fn test_buy_without_kafka_is_503() {
        let broker = InMemoryBroker::new();
        let state = test_state(&broker, false).await;

        let (status, body) = send(
            app(state),
            buy_request(json!({"username": "john_doe", "user_id": "user_123"})),
        )
        .await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["code"], "NOT_CONNECTED");
    }

    #[tokio::test]
    async fn test_items_lists_catalog() {
        let state = test_state(&InMemoryBroker::new(), false).await;
        let (status, body) = send(
            app(state),
            Request::builder().uri("/items").body(Body::empty()).unwrap(),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"], 15);
        assert_eq!(body["items"][0]["name"], "Laptop");
    }

    #[tokio::test]
    async fn test_history_upstream_down_is_503() {
        let state = test_state(&InMemoryBroker::new(), true).await;
        let (status, _) = send(
            app(state),
            Request::builder()
                .uri("/getAllUserBuys/user_123")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_health_unhealthy_without_upstream() {
        let state = test_state(&InMemoryBroker::new(), true).await;
        let (status, body) = send(
            app(state),
            Request::builder().uri("/health").body(Body::empty()).unwrap(),
        )
        .await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["kafka_connected"], true);
        assert_eq!(body["customer_management_api_reachable"], false);
    }
}
