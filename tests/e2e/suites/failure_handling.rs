//! 故障与异常记录处理测试

#[cfg(test)]
mod failure_handling_tests {
    use std::sync::Arc;

    use crate::setup::{TestEnvironment, UnreachableStore};
    use customer_facing_service::GatewayError;
    use purchase_shared::events::PurchaseEvent;
    use purchase_shared::test_utils::TestDataGenerator;

    /// 畸形与违反规则的记录被跳过，后续合法记录照常处理
    #[tokio::test]
    async fn test_bad_records_are_skipped() {
        let env = TestEnvironment::setup().await.unwrap();
        let topic = env.kafka.topic.clone();

        env.broker.append_raw(&topic, "user_123", "not-json");
        env.broker.append_raw(
            &topic,
            "user_123",
            TestDataGenerator::purchase_payload("user_123", "Laptop", -1.0),
        );
        env.broker.append_raw(
            &topic,
            "user_123",
            TestDataGenerator::purchase_payload("user_123", "Laptop", 999.99),
        );
        env.wait_for_handled(3).await.unwrap();

        assert_eq!(env.consumer.counters().failed(), 2);
        assert_eq!(env.consumer.counters().processed(), 1);
        assert!(env.consumer.is_running());

        let history = env.gateway.get_history("user_123").await.unwrap();
        assert_eq!(history.total_purchases, 1);

        env.teardown().await.unwrap();
    }

    /// 存储不可达时记录被丢弃并计入失败，消费循环不中断
    #[tokio::test]
    async fn test_storage_outage_keeps_consumer_running() {
        let env = TestEnvironment::with_store(Arc::new(UnreachableStore))
            .await
            .unwrap();

        for item in ["Mouse", "Keyboard"] {
            let event = PurchaseEvent::new("john_doe", "user_123", item, 10.0).unwrap();
            env.producer.publish_event(&event).await.unwrap();
        }
        env.wait_for_handled(2).await.unwrap();

        assert_eq!(env.consumer.counters().failed(), 2);
        assert_eq!(env.consumer.counters().processed(), 0);
        assert!(env.consumer.is_running());

        assert!(matches!(
            env.gateway.get_history("user_123").await,
            Err(GatewayError::Unavailable(_))
        ));

        env.teardown().await.unwrap();
    }

    /// 消费者停止后生产仍然成功，重启后补齐积压
    #[tokio::test]
    async fn test_backlog_consumed_after_restart() {
        let env = TestEnvironment::setup().await.unwrap();

        env.consumer.stop().await;
        assert!(!env.consumer.is_running());

        let event = PurchaseEvent::new("john_doe", "user_123", "Tablet", 499.99).unwrap();
        env.producer.publish_event(&event).await.unwrap();

        env.consumer.start().await.unwrap();
        env.wait_for_handled(1).await.unwrap();

        let history = env.gateway.get_history("user_123").await.unwrap();
        assert_eq!(history.purchases[0].item_name, "Tablet");

        env.teardown().await.unwrap();
    }
}
