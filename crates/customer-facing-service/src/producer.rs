//! 购买事件生产者
//!
//! 持有到 broker 的连接，以 user_id 为分区键发送事件，保证同一用户的事件落在同一分区、
//! 按发送顺序被消费。连接句柄可在 close 时原子换出，在途发送各自持有句柄的 Arc，不受影响。

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use parking_lot::{Mutex, RwLock};
use purchase_shared::config::KafkaConfig;
use purchase_shared::error::{PipelineError, Result};
use purchase_shared::events::{DeliveryReceipt, PurchaseEvent};
use purchase_shared::kafka::{BrokerConnector, RecordSender};
use purchase_shared::observability::metrics;
use serde::Serialize;
use tracing::{error, info, warn};

/// 生产者统计快照
#[derive(Debug, Clone, Serialize)]
pub struct ProducerStats {
    pub connected: bool,
    pub messages_sent: u64,
    pub messages_failed: u64,
    pub last_message_time: Option<String>,
    pub topic: String,
    pub bootstrap_servers: String,
}

/// 购买事件生产者
pub struct EventProducer {
    connector: Arc<dyn BrokerConnector>,
    topic: String,
    flush_timeout: Duration,
    sender: RwLock<Option<Arc<dyn RecordSender>>>,
    messages_sent: AtomicU64,
    messages_failed: AtomicU64,
    last_message_time: Mutex<Option<DateTime<Utc>>>,
}

impl EventProducer {
    pub fn new(connector: Arc<dyn BrokerConnector>, config: &KafkaConfig) -> Self {
        Self {
            connector,
            topic: config.topic.clone(),
            flush_timeout: config.message_timeout(),
            sender: RwLock::new(None),
            messages_sent: AtomicU64::new(0),
            messages_failed: AtomicU64::new(0),
            last_message_time: Mutex::new(None),
        }
    }

    /// 建立连接；broker 不可达时返回 `Connect` 错误并保持未连接状态
    pub async fn connect(&self) -> Result<()> {
        if self.is_ready() {
            return Ok(());
        }

        let sender = self.connector.connect().await.inspect_err(|e| {
            error!(
                error = %e,
                bootstrap_servers = %self.connector.bootstrap_servers(),
                "连接 Kafka 失败"
            );
        })?;
        *self.sender.write() = Some(sender);

        info!(
            topic = %self.topic,
            bootstrap_servers = %self.connector.bootstrap_servers(),
            "购买事件生产者已就绪"
        );
        Ok(())
    }

    pub fn is_ready(&self) -> bool {
        self.sender.read().is_some()
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// 发送单个事件并等待确认
    pub async fn publish(&self, key: &str, event: &PurchaseEvent) -> Result<DeliveryReceipt> {
        let sender = self.current_sender()?;
        let result = match event.to_payload() {
            Ok(payload) => sender.send(&self.topic, key, &payload).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(receipt) => {
                self.messages_sent.fetch_add(1, Ordering::Relaxed);
                *self.last_message_time.lock() = Some(Utc::now());
                metrics::record_message_sent(&self.topic);
                info!(
                    user_id = %event.user_id(),
                    item_name = %event.item_name(),
                    partition = receipt.partition,
                    offset = receipt.offset,
                    "购买事件已发送"
                );
                Ok(receipt)
            }
            Err(e) => {
                self.messages_failed.fetch_add(1, Ordering::Relaxed);
                metrics::record_message_failed(&self.topic, e.code());
                error!(
                    user_id = %event.user_id(),
                    error = %e,
                    "购买事件发送失败"
                );
                Err(e)
            }
        }
    }

    /// 以 user_id 作为分区键发送
    pub async fn publish_event(&self, event: &PurchaseEvent) -> Result<DeliveryReceipt> {
        self.publish(event.user_id(), event).await
    }

    /// 并发提交一批事件，按输入顺序返回每条的结果
    ///
    /// 单条失败不影响其他事件；未连接时整体返回 `NotConnected`。
    pub async fn publish_batch(
        &self,
        events: &[(String, PurchaseEvent)],
    ) -> Result<Vec<Result<DeliveryReceipt>>> {
        if !self.is_ready() {
            return Err(PipelineError::NotConnected);
        }

        let results = join_all(events.iter().map(|(key, event)| self.publish(key, event))).await;

        let failed = results.iter().filter(|r| r.is_err()).count();
        if failed > 0 {
            warn!(total = results.len(), failed, "批量发送存在失败");
        }
        Ok(results)
    }

    /// 等待所有已提交的消息得到确认
    pub async fn drain(&self) -> Result<()> {
        let sender = self.sender.read().clone();
        match sender {
            Some(sender) => sender.flush(self.flush_timeout).await,
            None => Ok(()),
        }
    }

    /// 先 drain 再释放连接，可重复调用
    pub async fn close(&self) -> Result<()> {
        let Some(sender) = self.sender.write().take() else {
            return Ok(());
        };

        let flushed = sender.flush(self.flush_timeout).await;
        if let Err(e) = &flushed {
            warn!(error = %e, "关闭前 flush 未完成");
        }
        info!(topic = %self.topic, "购买事件生产者已关闭");
        flushed
    }

    pub fn stats(&self) -> ProducerStats {
        ProducerStats {
            connected: self.is_ready(),
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            messages_failed: self.messages_failed.load(Ordering::Relaxed),
            last_message_time: self.last_message_time.lock().map(|t| t.to_rfc3339()),
            topic: self.topic.clone(),
            bootstrap_servers: self.connector.bootstrap_servers().to_string(),
        }
    }

    fn current_sender(&self) -> Result<Arc<dyn RecordSender>> {
        self.sender.read().clone().ok_or(PipelineError::NotConnected)
    }
}
