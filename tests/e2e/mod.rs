//! 购买事件管道端到端测试
//!
//! 在进程内把两个服务串起来：对外服务 -> 内存 broker -> 消费者 -> 存储
//! -> 管理服务 HTTP -> 查询网关。覆盖：
//! - 购买与历史查询全链路
//! - 同一用户的顺序与聚合
//! - 畸形与无效记录
//! - 存储故障时消费循环继续运行

pub mod setup;
pub mod suites;

pub use setup::TestEnvironment;
