//! 统一错误处理模块
//!
//! 定义管道中所有共享的错误类型，使用 thiserror 提供良好的错误信息。

use thiserror::Error;

/// 购买事件的结构与规则校验错误
///
/// 生产端（发送前）与消费端（接收后）共用同一套校验，
/// 两端协议漂移会表现为校验失败而不是崩溃。
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    /// 负载不是合法的 JSON 对象
    #[error("负载格式错误: {0}")]
    Malformed(String),

    #[error("缺少必填字段: {field}")]
    MissingField { field: &'static str },

    #[error("字段无效: {field} - {reason}")]
    InvalidField { field: &'static str, reason: String },
}

impl ValidationError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field,
            reason: reason.into(),
        }
    }

    /// 是否为结构性错误（无法解析为记录），区别于字段级违规
    pub fn is_malformed(&self) -> bool {
        matches!(self, Self::Malformed(_))
    }
}

/// 管道错误类型
#[derive(Debug, Error)]
pub enum PipelineError {
    // ==================== 连接错误 ====================
    #[error("无法连接 {target}: {message}")]
    Connect { target: String, message: String },

    #[error("生产者未连接到 Kafka")]
    NotConnected,

    // ==================== Kafka 错误 ====================
    #[error("消息发送超时: topic={topic}")]
    PublishTimeout { topic: String },

    #[error("消息发送失败: {0}")]
    Publish(String),

    #[error("Kafka 错误: {0}")]
    Kafka(String),

    // ==================== 存储错误 ====================
    #[error("存储错误: {0}")]
    Storage(String),

    // ==================== 验证错误 ====================
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("序列化失败: {0}")]
    Serialization(String),

    // ==================== 通用错误 ====================
    #[error("内部错误: {0}")]
    Internal(String),
}

/// 错误结果类型别名
pub type Result<T> = std::result::Result<T, PipelineError>;

impl PipelineError {
    pub fn connect(target: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Connect {
            target: target.into(),
            message: message.into(),
        }
    }

    /// 获取错误码
    pub fn code(&self) -> &'static str {
        match self {
            Self::Connect { .. } => "CONNECT_ERROR",
            Self::NotConnected => "NOT_CONNECTED",
            Self::PublishTimeout { .. } => "PUBLISH_TIMEOUT",
            Self::Publish(_) => "PUBLISH_ERROR",
            Self::Kafka(_) => "KAFKA_ERROR",
            Self::Storage(_) => "PERSISTENCE_ERROR",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// 是否为可重试错误
    ///
    /// 组件内部从不自动重试，此标记仅供调用方决定重试策略。
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Connect { .. }
                | Self::NotConnected
                | Self::PublishTimeout { .. }
                | Self::Publish(_)
                | Self::Kafka(_)
                | Self::Storage(_)
        )
    }
}
