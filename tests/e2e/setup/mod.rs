//! 测试环境设置模块

mod environment;
mod stores;

pub use environment::TestEnvironment;
pub use stores::UnreachableStore;
