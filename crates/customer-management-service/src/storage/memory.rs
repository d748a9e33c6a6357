//! 内存存储
//!
//! 使用 DashMap 按 user_id 分桶保存记录，适用于测试和开发环境。

use async_trait::async_trait;
use dashmap::DashMap;
use purchase_shared::error::Result;
use purchase_shared::events::{PersistedPurchase, PurchaseEvent};
use uuid::Uuid;

use super::PurchaseStore;

/// 内存购买记录存储
///
/// 每个用户一个追加列表，查询时按事件时间倒序返回；
/// 时间相同的记录以写入顺序靠后者优先。
#[derive(Debug, Default)]
pub struct MemoryPurchaseStore {
    data: DashMap<String, Vec<PersistedPurchase>>,
}

impl MemoryPurchaseStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 全部用户的记录总数
    pub fn len(&self) -> usize {
        self.data.iter().map(|entry| entry.value().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl PurchaseStore for MemoryPurchaseStore {
    async fn save(&self, event: &PurchaseEvent) -> Result<String> {
        let id = Uuid::now_v7().to_string();
        self.data
            .entry(event.user_id().to_string())
            .or_default()
            .push(PersistedPurchase::new(id.clone(), event.clone()));
        Ok(id)
    }

    async fn query_by_user(&self, user_id: &str) -> Result<Vec<PersistedPurchase>> {
        let mut records: Vec<PersistedPurchase> = self
            .data
            .get(user_id)
            .map(|entry| entry.value().iter().rev().cloned().collect())
            .unwrap_or_default();

        // 稳定排序，保留 rev 后“后写入在前”的相对顺序
        records.sort_by(|a, b| b.occurred_at().cmp(&a.occurred_at()));
        Ok(records)
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    /// 无外部连接需要释放
    async fn close(&self) {}
}
