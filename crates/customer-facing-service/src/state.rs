//! 应用状态定义

use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusHandle;

use crate::gateway::HistoryGateway;
use crate::producer::EventProducer;

/// Axum 应用共享状态
#[derive(Clone)]
pub struct AppState {
    pub producer: Arc<EventProducer>,
    pub gateway: HistoryGateway,
    /// 未启用指标时为 None
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(producer: Arc<EventProducer>, gateway: HistoryGateway) -> Self {
        Self {
            producer,
            gateway,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, handle: Option<PrometheusHandle>) -> Self {
        self.metrics = handle;
        self
    }
}
