//! 客户管理服务
//!
//! 消费 Kafka 中的购买事件，校验后写入存储，并对外提供按用户查询购买历史的接口。
//!
//! ## 模块结构
//!
//! - `consumer`: 消费者生命周期与消费循环
//! - `processor`: 单条记录的校验与持久化
//! - `storage`: 存储接口及内存、PostgreSQL 实现
//! - `history`: 购买历史聚合
//! - `handlers` / `routes` / `state`: HTTP 外壳

pub mod consumer;
pub mod error;
pub mod handlers;
pub mod history;
pub mod processor;
pub mod routes;
pub mod state;
pub mod storage;

pub use consumer::{ConsumerState, ConsumerStats, EventConsumer};
pub use error::{ManagementError, Result};
pub use history::{PurchaseHistory, PurchaseRecord};
pub use processor::{PurchaseProcessor, RecordFailure};
pub use storage::{MemoryPurchaseStore, PgPurchaseStore, PurchaseStore};
