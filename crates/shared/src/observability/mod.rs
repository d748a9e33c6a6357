//! 统一可观测性模块
//!
//! 提供日志与 Prometheus 指标的统一初始化。
//! 每个服务进程在 main 中调用一次 [`init`]，核心组件只通过 `tracing` 与 `metrics` 宏上报。

pub mod metrics;
pub mod tracing;

use ::tracing::info;
use anyhow::Result;
use metrics_exporter_prometheus::PrometheusHandle;

use crate::config::ObservabilityConfig;

/// 可观测性资源守卫
///
/// 持有 Prometheus handle，服务通过它渲染 `/metrics` 端点。
pub struct ObservabilityGuard {
    metrics_handle: Option<PrometheusHandle>,
}

impl ObservabilityGuard {
    /// 创建一个空的 Guard（用于测试或禁用指标时）
    pub fn empty() -> Self {
        Self {
            metrics_handle: None,
        }
    }

    pub fn metrics_handle(&self) -> Option<PrometheusHandle> {
        self.metrics_handle.clone()
    }
}

/// 统一初始化可观测性
///
/// 初始化顺序：
/// 1. Tracing（日志）
/// 2. Metrics（Prometheus recorder，`metrics_enabled = false` 时跳过）
///
/// # Example
///
/// ```ignore
/// use purchase_shared::{config::AppConfig, observability};
///
/// let config = AppConfig::load("customer-facing-service")?;
/// let guard = observability::init(&config.service_name, &config.observability)?;
/// let handle = guard.metrics_handle();
/// ```
pub fn init(service_name: &str, config: &ObservabilityConfig) -> Result<ObservabilityGuard> {
    tracing::init(config)?;

    let metrics_handle = if config.metrics_enabled {
        Some(metrics::init(service_name)?)
    } else {
        None
    };

    info!(
        service = %service_name,
        log_format = %config.log_format,
        metrics_enabled = config.metrics_enabled,
        "Observability initialized"
    );

    Ok(ObservabilityGuard { metrics_handle })
}
