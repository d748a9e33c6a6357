//! 测试用存储实现

use async_trait::async_trait;
use customer_management_service::PurchaseStore;
use purchase_shared::error::{PipelineError, Result};
use purchase_shared::events::{PersistedPurchase, PurchaseEvent};

/// 始终不可达的存储，模拟数据库宕机
#[derive(Debug, Default)]
pub struct UnreachableStore;

#[async_trait]
impl PurchaseStore for UnreachableStore {
    async fn save(&self, _event: &PurchaseEvent) -> Result<String> {
        Err(PipelineError::Storage("connection refused".to_string()))
    }

    async fn query_by_user(&self, _user_id: &str) -> Result<Vec<PersistedPurchase>> {
        Err(PipelineError::Storage("connection refused".to_string()))
    }

    async fn ping(&self) -> Result<()> {
        Err(PipelineError::Storage("connection refused".to_string()))
    }

    async fn close(&self) {}
}
