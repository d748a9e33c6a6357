//! 测试套件

pub mod failure_handling;
pub mod purchase_flow;
