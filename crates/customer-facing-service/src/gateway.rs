//! 购买历史查询网关
//!
//! 将历史查询转发到客户管理服务并整形响应（上游的 `_id` 输出为 `id`）。
//! 无状态、无缓存，可被并发请求共享。

use std::time::Duration;

use purchase_shared::config::UpstreamConfig;
use reqwest::{Client, StatusCode, Url};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// 网关错误
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("未找到用户 {user_id} 的购买记录")]
    NotFound { user_id: String },

    /// 连接失败、超时（含读取响应体超时）或上游返回 404 以外的非 200 状态
    #[error("历史服务不可用: {0}")]
    Unavailable(String),

    /// 上游返回 200 但响应体无法解码
    #[error("历史服务响应无法解析: {0}")]
    UpstreamPayload(String),
}

/// 单条购买记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    #[serde(alias = "_id")]
    pub id: String,
    pub username: String,
    pub user_id: String,
    pub item_name: String,
    pub price: f64,
    pub timestamp: String,
}

/// 用户购买历史
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserHistory {
    pub user_id: String,
    pub username: String,
    pub total_purchases: usize,
    pub total_spent: f64,
    pub purchases: Vec<HistoryRecord>,
}

/// 历史查询网关
#[derive(Clone)]
pub struct HistoryGateway {
    client: Client,
    base_url: Url,
    health_timeout: Duration,
}

impl HistoryGateway {
    pub fn new(config: &UpstreamConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        let base_url = Url::parse(&config.base_url)?;

        Ok(Self {
            client,
            base_url,
            health_timeout: Duration::from_secs(config.health_timeout_secs),
        })
    }

    pub fn base_url(&self) -> &str {
        self.base_url.as_str()
    }

    /// 查询用户购买历史
    pub async fn get_history(&self, user_id: &str) -> Result<UserHistory, GatewayError> {
        let url = self.endpoint(&["purchases", user_id])?;
        info!(user_id, "查询购买历史");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| {
                warn!(user_id, error = %e, "历史服务请求失败");
                GatewayError::Unavailable(e.to_string())
            })?;

        match response.status() {
            StatusCode::OK => response.json::<UserHistory>().await.map_err(|e| {
                // 读取响应体超时或连接中断属于上游不可用，只有解码失败才是负载问题
                if e.is_decode() {
                    warn!(user_id, error = %e, "历史服务响应无法解析");
                    GatewayError::UpstreamPayload(e.to_string())
                } else {
                    warn!(user_id, error = %e, "读取历史服务响应失败");
                    GatewayError::Unavailable(e.to_string())
                }
            }),
            StatusCode::NOT_FOUND => Err(GatewayError::NotFound {
                user_id: user_id.to_string(),
            }),
            status => {
                warn!(user_id, status = status.as_u16(), "历史服务返回异常状态");
                Err(GatewayError::Unavailable(format!("上游返回状态 {status}")))
            }
        }
    }

    /// 探测上游 `/health`，仅 200 视为可达
    pub async fn ping(&self) -> bool {
        let Ok(url) = self.endpoint(&["health"]) else {
            return false;
        };

        match self
            .client
            .get(url)
            .timeout(self.health_timeout)
            .send()
            .await
        {
            Ok(response) => response.status() == StatusCode::OK,
            Err(e) => {
                warn!(error = %e, "历史服务健康检查失败");
                false
            }
        }
    }

    /// 在基础地址后追加路径段，路径段会被转义
    fn endpoint(&self, segments: &[&str]) -> Result<Url, GatewayError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| GatewayError::Unavailable(format!("无效的上游地址: {}", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}
