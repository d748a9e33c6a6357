//! 对外服务错误类型定义

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use purchase_shared::error::{PipelineError, ValidationError};
use serde_json::json;

use crate::gateway::GatewayError;

/// 对外服务错误类型
#[derive(Debug, thiserror::Error)]
pub enum FacingError {
    #[error("参数验证失败: {0}")]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Pipeline(PipelineError),

    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

impl From<PipelineError> for FacingError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::Validation(e) => Self::Validation(e),
            other => Self::Pipeline(other),
        }
    }
}

impl FacingError {
    /// 返回对应的 HTTP 状态码
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Pipeline(
                PipelineError::NotConnected
                | PipelineError::Connect { .. }
                | PipelineError::PublishTimeout { .. }
                | PipelineError::Publish(_),
            ) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Gateway(GatewayError::NotFound { .. }) => StatusCode::NOT_FOUND,
            Self::Gateway(GatewayError::Unavailable(_)) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Pipeline(_) | Self::Gateway(GatewayError::UpstreamPayload(_)) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// 返回错误码（用于 API 响应）
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Pipeline(e) => e.code(),
            Self::Gateway(GatewayError::NotFound { .. }) => "NOT_FOUND",
            Self::Gateway(GatewayError::Unavailable(_)) => "UPSTREAM_UNAVAILABLE",
            Self::Gateway(GatewayError::UpstreamPayload(_)) => "UPSTREAM_PAYLOAD_ERROR",
        }
    }
}

impl IntoResponse for FacingError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // 5xx 只返回通用提示，详细信息仅记录日志，防止泄露内部地址等信息
        let message = if status.is_server_error() {
            tracing::error!(error = %self, code = self.error_code(), "请求处理失败");
            match status {
                StatusCode::SERVICE_UNAVAILABLE => "服务暂时不可用，请稍后重试".to_string(),
                _ => "服务内部错误，请稍后重试".to_string(),
            }
        } else {
            self.to_string()
        };

        let body = json!({
            "success": false,
            "code": self.error_code(),
            "message": message,
            "data": serde_json::Value::Null
        });

        (status, axum::Json(body)).into_response()
    }
}

/// 服务层 Result 类型别名
pub type Result<T> = std::result::Result<T, FacingError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (
                FacingError::from(ValidationError::MissingField { field: "user_id" }),
                StatusCode::BAD_REQUEST,
            ),
            (
                FacingError::from(PipelineError::NotConnected),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                FacingError::from(PipelineError::PublishTimeout {
                    topic: "purchases".to_string(),
                }),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                FacingError::from(GatewayError::NotFound {
                    user_id: "nobody".to_string(),
                }),
                StatusCode::NOT_FOUND,
            ),
            (
                FacingError::from(GatewayError::Unavailable("connection refused".to_string())),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                FacingError::from(GatewayError::UpstreamPayload("missing field".to_string())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                FacingError::from(PipelineError::Serialization("bad".to_string())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, expected) in cases {
            assert_eq!(err.status_code(), expected, "{err}");
        }
    }

    #[test]
    fn test_pipeline_validation_unwrapped() {
        let err = FacingError::from(PipelineError::from(ValidationError::MissingField {
            field: "price",
        }));
        assert!(matches!(err, FacingError::Validation(_)));
        assert_eq!(err.error_code(), "VALIDATION_ERROR");
    }
}
