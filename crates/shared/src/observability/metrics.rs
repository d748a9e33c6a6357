//! Prometheus 指标模块
//!
//! 基于 metrics crate 和 metrics-exporter-prometheus 实现指标收集与导出。
//! recorder 安装后，由各服务自己的 `/metrics` 路由调用 `PrometheusHandle::render` 输出。

use anyhow::Result;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// 安装全局 Prometheus recorder 并注册指标描述
pub fn init(service_name: &str) -> Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    register_common_metrics(service_name);
    Ok(handle)
}

/// 注册管道指标
///
/// 这些描述会出现在 /metrics 端点的 HELP 注释中。
fn register_common_metrics(service_name: &str) {
    metrics::describe_counter!(
        "purchase_messages_sent_total",
        "Total number of purchase events acknowledged by the broker"
    );
    metrics::describe_counter!(
        "purchase_messages_failed_total",
        "Total number of purchase events that failed to publish"
    );
    metrics::describe_counter!(
        "purchase_records_processed_total",
        "Total number of consumed records persisted successfully"
    );
    metrics::describe_counter!(
        "purchase_records_failed_total",
        "Total number of consumed records that failed processing"
    );
    metrics::describe_counter!(
        "purchase_history_requests_total",
        "Total number of purchase history lookups"
    );
    metrics::describe_gauge!("purchase_consumer_lag", "Consumer backlog in records");

    metrics::counter!("service_starts_total", "service" => service_name.to_string()).increment(1);
}

// ============================================================================
// 指标记录函数
// ============================================================================

/// 记录一次成功发送
#[inline]
pub fn record_message_sent(topic: &str) {
    metrics::counter!("purchase_messages_sent_total", "topic" => topic.to_string()).increment(1);
}

/// 记录一次发送失败，`reason` 取错误码
#[inline]
pub fn record_message_failed(topic: &str, reason: &'static str) {
    metrics::counter!(
        "purchase_messages_failed_total",
        "topic" => topic.to_string(),
        "reason" => reason
    )
    .increment(1);
}

/// 记录一条被成功持久化的消费记录
#[inline]
pub fn record_record_processed() {
    metrics::counter!("purchase_records_processed_total").increment(1);
}

/// 记录一条处理失败的消费记录
#[inline]
pub fn record_record_failed(reason: &'static str) {
    metrics::counter!("purchase_records_failed_total", "reason" => reason).increment(1);
}

/// 记录一次历史查询及其结果（found / not_found / unavailable / error）
#[inline]
pub fn record_history_request(outcome: &'static str) {
    metrics::counter!("purchase_history_requests_total", "outcome" => outcome).increment(1);
}

/// 更新消费积压
#[inline]
pub fn set_consumer_lag(lag: i64) {
    metrics::gauge!("purchase_consumer_lag").set(lag as f64);
}
