//! 单条记录处理
//!
//! 反序列化 -> 校验 -> 持久化。任一步失败都归类为 [`RecordFailure`]，
//! 写入死信出口后交还给消费循环，由循环负责计数与 offset 处理。

use std::sync::Arc;

use purchase_shared::dlq::{DeadLetterMessage, DeadLetterSink, NoopDeadLetterSink};
use purchase_shared::error::{PipelineError, ValidationError};
use purchase_shared::events::{self, PersistedPurchase};
use purchase_shared::kafka::ConsumerMessage;
use tracing::{info, warn};

use crate::storage::PurchaseStore;

/// 记录处理失败的分类
#[derive(Debug, thiserror::Error)]
pub enum RecordFailure {
    /// 负载无法解析为 JSON 对象
    #[error("负载格式错误: {0}")]
    MalformedPayload(String),

    /// 负载结构正确但违反事件规则
    #[error("事件无效: {0}")]
    InvalidEvent(ValidationError),

    /// 存储写入失败，不做重试
    #[error("持久化失败: {0}")]
    PersistenceError(PipelineError),
}

impl RecordFailure {
    /// 指标与死信中使用的原因标签
    pub fn reason(&self) -> &'static str {
        match self {
            Self::MalformedPayload(_) => "malformed_payload",
            Self::InvalidEvent(_) => "invalid_event",
            Self::PersistenceError(_) => "persistence_error",
        }
    }

    /// 重新投递也无法成功的失败（格式或规则问题）
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::PersistenceError(_))
    }
}

impl From<ValidationError> for RecordFailure {
    fn from(err: ValidationError) -> Self {
        match err {
            ValidationError::Malformed(reason) => Self::MalformedPayload(reason),
            other => Self::InvalidEvent(other),
        }
    }
}

/// 购买记录处理器
pub struct PurchaseProcessor {
    store: Arc<dyn PurchaseStore>,
    dead_letters: Arc<dyn DeadLetterSink>,
}

impl PurchaseProcessor {
    pub fn new(store: Arc<dyn PurchaseStore>) -> Self {
        Self::with_dead_letter_sink(store, Arc::new(NoopDeadLetterSink))
    }

    pub fn with_dead_letter_sink(
        store: Arc<dyn PurchaseStore>,
        dead_letters: Arc<dyn DeadLetterSink>,
    ) -> Self {
        Self {
            store,
            dead_letters,
        }
    }

    /// 处理一条消费到的记录
    pub async fn process(&self, msg: &ConsumerMessage) -> Result<PersistedPurchase, RecordFailure> {
        match self.persist(msg).await {
            Ok(persisted) => {
                info!(
                    id = %persisted.id(),
                    user_id = %persisted.event().user_id(),
                    item_name = %persisted.event().item_name(),
                    partition = msg.partition,
                    offset = msg.offset,
                    "购买记录已保存"
                );
                Ok(persisted)
            }
            Err(failure) => {
                warn!(
                    reason = failure.reason(),
                    error = %failure,
                    topic = %msg.topic,
                    partition = msg.partition,
                    offset = msg.offset,
                    key = ?msg.key,
                    "记录处理失败"
                );
                self.dead_letters
                    .publish(DeadLetterMessage::from_record(
                        msg,
                        failure.reason(),
                        failure.to_string(),
                    ))
                    .await;
                Err(failure)
            }
        }
    }

    async fn persist(&self, msg: &ConsumerMessage) -> Result<PersistedPurchase, RecordFailure> {
        let event = events::validate(&msg.payload)?;

        let id = self
            .store
            .save(&event)
            .await
            .map_err(RecordFailure::PersistenceError)?;

        Ok(PersistedPurchase::new(id, event))
    }
}
