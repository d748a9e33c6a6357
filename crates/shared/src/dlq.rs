//! 死信接口
//!
//! 消费循环对每条处理失败的记录都会调用 [`DeadLetterSink::publish`]。
//! 默认实现 [`NoopDeadLetterSink`] 只记录日志，不做投递也不做重试；
//! 需要落地死信时实现该 trait 并注入消费者即可。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use crate::kafka::ConsumerMessage;

/// 死信消息信封
///
/// 包装原始消息，附加失败原因等元数据。
#[derive(Debug, Clone, Serialize)]
pub struct DeadLetterMessage {
    pub source_topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Option<String>,
    /// 原始负载（非 UTF-8 字节以替换字符显示）
    pub payload: String,
    /// 失败分类，如 `malformed_payload`
    pub reason: &'static str,
    pub error: String,
    pub failed_at: DateTime<Utc>,
}

impl DeadLetterMessage {
    pub fn from_record(
        msg: &ConsumerMessage,
        reason: &'static str,
        error: impl Into<String>,
    ) -> Self {
        Self {
            source_topic: msg.topic.clone(),
            partition: msg.partition,
            offset: msg.offset,
            key: msg.key.clone(),
            payload: msg.payload_lossy(),
            reason,
            error: error.into(),
            failed_at: Utc::now(),
        }
    }
}

/// 死信出口
#[async_trait]
pub trait DeadLetterSink: Send + Sync {
    async fn publish(&self, message: DeadLetterMessage);
}

/// 默认死信出口：仅记录日志后丢弃
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopDeadLetterSink;

#[async_trait]
impl DeadLetterSink for NoopDeadLetterSink {
    async fn publish(&self, message: DeadLetterMessage) {
        debug!(
            topic = %message.source_topic,
            partition = message.partition,
            offset = message.offset,
            reason = message.reason,
            "死信记录已丢弃"
        );
    }
}
