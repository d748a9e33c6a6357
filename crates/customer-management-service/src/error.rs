//! 管理服务错误类型定义

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use purchase_shared::error::PipelineError;
use serde_json::json;

/// 管理服务错误类型
#[derive(Debug, thiserror::Error)]
pub enum ManagementError {
    #[error("未找到用户 {user_id} 的购买记录")]
    NotFound { user_id: String },

    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

impl ManagementError {
    /// 返回对应的 HTTP 状态码
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::Pipeline(PipelineError::Validation(_)) => StatusCode::BAD_REQUEST,
            Self::Pipeline(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// 返回错误码（用于 API 响应）
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "NOT_FOUND",
            Self::Pipeline(e) => e.code(),
        }
    }
}

impl IntoResponse for ManagementError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // 存储错误只返回通用提示，详细信息仅记录日志
        let message = match &self {
            Self::NotFound { .. } | Self::Pipeline(PipelineError::Validation(_)) => self.to_string(),
            other => {
                tracing::error!(error = %other, code = other.error_code(), "请求处理失败");
                "服务内部错误，请稍后重试".to_string()
            }
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
pub type Result<T> = std::result::Result<T, ManagementError>;
