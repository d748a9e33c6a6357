//! 购买历史聚合
//!
//! 将存储返回的记录（已按时间倒序）汇总为对外响应。

use purchase_shared::events::PersistedPurchase;
use serde::{Deserialize, Serialize};

/// 单条购买记录的对外表示，存储 ID 以 `_id` 字段输出
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PurchaseRecord {
    #[serde(rename = "_id")]
    pub id: String,
    pub username: String,
    pub user_id: String,
    pub item_name: String,
    pub price: f64,
    pub timestamp: String,
}

impl From<&PersistedPurchase> for PurchaseRecord {
    fn from(persisted: &PersistedPurchase) -> Self {
        let event = persisted.event();
        Self {
            id: persisted.id().to_string(),
            username: event.username().to_string(),
            user_id: event.user_id().to_string(),
            item_name: event.item_name().to_string(),
            price: event.price(),
            timestamp: event.timestamp().to_string(),
        }
    }
}

/// 用户购买历史
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PurchaseHistory {
    pub user_id: String,
    /// 取最新一条记录上的用户名
    pub username: String,
    pub total_purchases: usize,
    /// 保留两位小数
    pub total_spent: f64,
    pub purchases: Vec<PurchaseRecord>,
}

impl PurchaseHistory {
    /// 没有任何记录时返回 `None`
    pub fn from_records(user_id: &str, records: &[PersistedPurchase]) -> Option<Self> {
        let newest = records.first()?;
        let total: f64 = records.iter().map(|r| r.event().price()).sum();

        Some(Self {
            user_id: user_id.to_string(),
            username: newest.event().username().to_string(),
            total_purchases: records.len(),
            total_spent: round_currency(total),
            purchases: records.iter().map(PurchaseRecord::from).collect(),
        })
    }
}

/// 四舍五入到分
pub fn round_currency(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
