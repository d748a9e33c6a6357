//! 客户对外服务
//!
//! 提供购买与历史查询 REST API。

use std::sync::Arc;

use customer_facing_service::{EventProducer, HistoryGateway, routes, state::AppState};
use purchase_shared::{config::AppConfig, kafka::KafkaConnector, observability};
use tokio::net::TcpListener;
use tracing::{error, info, warn};

const SERVICE_NAME: &str = "customer-facing-service";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load(SERVICE_NAME)?;
    let guard = observability::init(&config.service_name, &config.observability)?;

    info!("Starting {} on {}", SERVICE_NAME, config.server_addr());

    // broker 初始连接失败是致命错误
    let producer = Arc::new(EventProducer::new(
        Arc::new(KafkaConnector::new(&config.kafka)),
        &config.kafka,
    ));
    producer.connect().await?;

    let gateway = HistoryGateway::new(&config.upstream)?;
    info!(upstream = %gateway.base_url(), "历史查询网关已配置");

    let state = AppState::new(producer.clone(), gateway).with_metrics(guard.metrics_handle());
    let app = routes::app(state);

    let listener = TcpListener::bind(config.server_addr()).await?;
    info!("Listening on {}", config.server_addr());

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    if let Err(e) = producer.close().await {
        warn!(error = %e, "生产者关闭时仍有未确认的消息");
    }
    if let Err(e) = served {
        error!(error = %e, "HTTP 服务异常退出");
        return Err(e.into());
    }

    info!("Server shutdown complete");
    Ok(())
}

/// 监听关闭信号（SIGTERM 或 Ctrl+C）
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "注册 Ctrl+C 处理器失败");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "注册 SIGTERM 处理器失败");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, initiating graceful shutdown..."),
        _ = terminate => info!("Received SIGTERM, initiating graceful shutdown..."),
    }
}
