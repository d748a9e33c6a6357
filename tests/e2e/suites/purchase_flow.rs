//! 购买与历史查询全链路测试

#[cfg(test)]
mod purchase_flow_tests {
    use crate::setup::TestEnvironment;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use customer_facing_service::GatewayError;
    use purchase_shared::events::PurchaseEvent;
    use serde_json::{Value, json};
    use tower::ServiceExt;

    async fn send(env: &TestEnvironment, request: Request<Body>) -> (StatusCode, Value) {
        let response = env.facing.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    /// 生产者发出的事件经消费者落库后，通过网关查询字段完全一致
    #[tokio::test]
    async fn test_single_purchase_end_to_end() {
        let env = TestEnvironment::setup().await.unwrap();

        let event = PurchaseEvent::new("john_doe", "user_123", "Laptop", 999.99).unwrap();
        let receipt = env.producer.publish_event(&event).await.unwrap();
        assert_eq!(receipt.partition, env.broker.partition_for("user_123"));

        env.wait_for_handled(1).await.unwrap();

        let history = env.gateway.get_history("user_123").await.unwrap();
        assert_eq!(history.user_id, "user_123");
        assert_eq!(history.username, "john_doe");
        assert_eq!(history.total_purchases, 1);
        assert_eq!(history.total_spent, 999.99);

        let record = &history.purchases[0];
        assert!(!record.id.is_empty());
        assert_eq!(record.item_name, "Laptop");
        assert_eq!(record.price, 999.99);
        assert_eq!(record.timestamp, event.timestamp().to_string());

        env.teardown().await.unwrap();
    }

    /// 同一用户的多次购买按时间倒序返回，总额按分取整
    #[tokio::test]
    async fn test_history_newest_first_with_total() {
        let env = TestEnvironment::setup().await.unwrap();

        for (item, price) in [("Mouse", 10.0), ("Keyboard", 20.0)] {
            let event = PurchaseEvent::new("jane", "user_456", item, price).unwrap();
            env.producer.publish_event(&event).await.unwrap();
        }
        env.wait_for_handled(2).await.unwrap();

        let history = env.gateway.get_history("user_456").await.unwrap();
        assert_eq!(history.total_purchases, 2);
        assert_eq!(history.total_spent, 30.0);
        let items: Vec<&str> = history
            .purchases
            .iter()
            .map(|p| p.item_name.as_str())
            .collect();
        assert_eq!(items, vec!["Keyboard", "Mouse"]);

        env.teardown().await.unwrap();
    }

    /// 同一用户的事件按发送顺序落库
    #[tokio::test]
    async fn test_per_user_order_preserved() {
        let env = TestEnvironment::setup().await.unwrap();

        let items = ["Monitor", "Webcam", "Headphones", "Speaker", "Printer"];
        for item in items {
            let event = PurchaseEvent::new("alice", "user_789", item, 5.0).unwrap();
            env.producer.publish_event(&event).await.unwrap();
        }
        env.wait_for_handled(items.len() as u64).await.unwrap();

        let history = env.gateway.get_history("user_789").await.unwrap();
        let stored: Vec<&str> = history
            .purchases
            .iter()
            .rev()
            .map(|p| p.item_name.as_str())
            .collect();
        assert_eq!(stored, items);
        assert_eq!(history.total_spent, 25.0);

        env.teardown().await.unwrap();
    }

    #[tokio::test]
    async fn test_unknown_user_is_not_found() {
        let env = TestEnvironment::setup().await.unwrap();

        let result = env.gateway.get_history("nobody").await;
        assert!(matches!(result, Err(GatewayError::NotFound { user_id }) if user_id == "nobody"));

        let request = Request::builder()
            .uri("/getAllUserBuys/nobody")
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(&env, request).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["success"], false);

        env.teardown().await.unwrap();
    }

    /// 通过对外服务的 HTTP 接口购买，再通过同一服务查回
    #[tokio::test]
    async fn test_buy_then_query_over_http() {
        let env = TestEnvironment::setup().await.unwrap();

        let request = Request::builder()
            .method("POST")
            .uri("/buy")
            .header("content-type", "application/json")
            .body(Body::from(
                json!({"username": "john_doe", "user_id": "user_123"}).to_string(),
            ))
            .unwrap();
        let (status, bought) = send(&env, request).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(bought["success"], true);

        env.wait_for_handled(1).await.unwrap();

        let request = Request::builder()
            .uri("/getAllUserBuys/user_123")
            .body(Body::empty())
            .unwrap();
        let (status, history) = send(&env, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(history["total_purchases"], 1);
        assert_eq!(
            history["purchases"][0]["item_name"],
            bought["purchase"]["item_name"]
        );
        assert!(history["purchases"][0]["id"].is_string());
        assert!(history["purchases"][0].get("_id").is_none());

        env.teardown().await.unwrap();
    }
}
