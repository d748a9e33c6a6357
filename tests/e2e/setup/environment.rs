//! 测试环境管理
//!
//! 每个测试独立构造一套 broker、存储、消费者与两个 HTTP 应用，互不共享状态。

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, bail};
use axum::Router;
use customer_facing_service::{EventProducer, HistoryGateway};
use customer_management_service::{
    EventConsumer, MemoryPurchaseStore, PurchaseProcessor, PurchaseStore,
};
use purchase_shared::config::{CommitPolicy, KafkaConfig, UpstreamConfig};
use purchase_shared::test_utils::InMemoryBroker;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

pub struct TestEnvironment {
    pub kafka: KafkaConfig,
    pub broker: InMemoryBroker,
    pub store: Arc<dyn PurchaseStore>,
    pub consumer: Arc<EventConsumer>,
    pub producer: Arc<EventProducer>,
    pub gateway: HistoryGateway,
    /// 对外服务路由（通过 oneshot 调用）
    pub facing: Router,
    server: JoinHandle<()>,
}

impl TestEnvironment {
    pub async fn setup() -> Result<Self> {
        Self::with_store(Arc::new(MemoryPurchaseStore::new())).await
    }

    /// 使用指定存储构造环境，启动消费者与管理服务 HTTP
    pub async fn with_store(store: Arc<dyn PurchaseStore>) -> Result<Self> {
        let kafka = KafkaConfig {
            commit_policy: CommitPolicy::Auto,
            stop_grace_period_secs: 2,
            ..Default::default()
        };
        let broker = InMemoryBroker::new();

        let consumer = Arc::new(EventConsumer::new(
            Arc::new(broker.subscriber(&kafka.topic, &kafka.consumer_group, kafka.commit_policy)),
            Arc::new(PurchaseProcessor::new(store.clone())),
            &kafka,
        ));
        consumer.start().await?;

        let management = customer_management_service::routes::app(
            customer_management_service::state::AppState::new(store.clone(), consumer.clone()),
        );
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let server = tokio::spawn(async move {
            let _ = axum::serve(listener, management).await;
        });

        let producer = Arc::new(EventProducer::new(Arc::new(broker.clone()), &kafka));
        producer.connect().await?;

        let gateway = HistoryGateway::new(&UpstreamConfig {
            base_url: format!("http://{addr}"),
            timeout_secs: 5,
            health_timeout_secs: 2,
        })?;

        let facing = customer_facing_service::routes::app(
            customer_facing_service::state::AppState::new(producer.clone(), gateway.clone()),
        );

        Ok(Self {
            kafka,
            broker,
            store,
            consumer,
            producer,
            gateway,
            facing,
            server,
        })
    }

    /// 等待消费者处理（成功或失败）的记录数达到 `count`
    pub async fn wait_for_handled(&self, count: u64) -> Result<()> {
        for _ in 0..300 {
            let counters = self.consumer.counters();
            if counters.processed() + counters.failed() >= count {
                return Ok(());
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        bail!(
            "等待消费超时: processed={}, failed={}, expected={count}",
            self.consumer.counters().processed(),
            self.consumer.counters().failed()
        )
    }

    pub async fn teardown(self) -> Result<()> {
        self.consumer.stop().await;
        self.store.close().await;
        self.producer.close().await?;
        self.server.abort();
        Ok(())
    }
}
