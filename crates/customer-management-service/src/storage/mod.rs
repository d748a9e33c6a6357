//! 购买记录存储
//!
//! 消费者只依赖 [`PurchaseStore`] trait。提供内存（开发、测试）与 PostgreSQL 两种实现，
//! 由配置中的 `storage.backend` 选择。

mod memory;
mod postgres;

pub use memory::MemoryPurchaseStore;
pub use postgres::PgPurchaseStore;

use std::sync::Arc;

use async_trait::async_trait;
use purchase_shared::config::{StorageBackend, StorageConfig};
use purchase_shared::error::Result;
use purchase_shared::events::{PersistedPurchase, PurchaseEvent};

/// 购买记录存储接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PurchaseStore: Send + Sync {
    /// 保存事件，返回存储分配的 ID
    async fn save(&self, event: &PurchaseEvent) -> Result<String>;

    /// 查询用户的全部购买记录，按时间从新到旧排列
    async fn query_by_user(&self, user_id: &str) -> Result<Vec<PersistedPurchase>>;

    /// 存储可用性探测
    async fn ping(&self) -> Result<()>;

    /// 释放底层连接，之后的调用均失败或为空操作
    async fn close(&self);
}

/// 按配置创建存储；PostgreSQL 不可达时返回 `Connect` 错误
pub async fn connect(config: &StorageConfig) -> Result<Arc<dyn PurchaseStore>> {
    match config.backend {
        StorageBackend::Memory => Ok(Arc::new(MemoryPurchaseStore::new())),
        StorageBackend::Postgres => Ok(Arc::new(PgPurchaseStore::connect(config).await?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_memory_backend() {
        let config = StorageConfig {
            backend: StorageBackend::Memory,
            ..Default::default()
        };
        let store = connect(&config).await.unwrap();
        assert!(store.ping().await.is_ok());

        store.close().await;
    }
}
