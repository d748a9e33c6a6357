//! 客户对外服务
//!
//! 接收购买请求并将购买事件发送到 Kafka，同时代理用户购买历史的查询。
//!
//! ## 模块结构
//!
//! - `producer`: 购买事件生产者
//! - `gateway`: 购买历史查询网关
//! - `catalog`: 模拟购买使用的商品目录
//! - `handlers` / `routes` / `state`: HTTP 外壳

pub mod catalog;
pub mod error;
pub mod gateway;
pub mod handlers;
pub mod producer;
pub mod routes;
pub mod state;

pub use error::{FacingError, Result};
pub use gateway::{GatewayError, HistoryGateway, HistoryRecord, UserHistory};
pub use producer::{EventProducer, ProducerStats};
