//! 共享库
//!
//! 包含两个服务共用的事件模型与校验、配置、错误处理、Kafka 抽象、可观测性以及测试工具。

pub mod config;
pub mod dlq;
pub mod error;
pub mod events;
pub mod kafka;
pub mod observability;
pub mod test_utils;
