//! 应用状态定义

use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusHandle;

use crate::consumer::EventConsumer;
use crate::storage::PurchaseStore;

/// Axum 应用共享状态
///
/// 存储与消费者在 main 中构造后注入，通过 Arc 在 handler 间共享
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn PurchaseStore>,
    pub consumer: Arc<EventConsumer>,
    /// 未启用指标时为 None
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(store: Arc<dyn PurchaseStore>, consumer: Arc<EventConsumer>) -> Self {
        Self {
            store,
            consumer,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, handle: Option<PrometheusHandle>) -> Self {
        self.metrics = handle;
        self
    }
}
