//! 客户管理服务
//!
//! 启动购买事件消费者与历史查询 REST API。

use std::sync::Arc;

use customer_management_service::{EventConsumer, PurchaseProcessor, routes, state::AppState, storage};
use purchase_shared::{config::AppConfig, kafka::KafkaSubscriber, observability};
use tokio::net::TcpListener;
use tracing::{error, info};

const SERVICE_NAME: &str = "customer-management-service";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load(SERVICE_NAME)?;

    let guard = observability::init(&config.service_name, &config.observability)?;

    info!("Starting {} on {}", SERVICE_NAME, config.server_addr());

    // 存储与 broker 的初始连接失败是致命错误
    let store = storage::connect(&config.storage).await?;
    info!(backend = ?config.storage.backend, "存储已连接");

    let processor = Arc::new(PurchaseProcessor::new(store.clone()));
    let consumer = Arc::new(EventConsumer::new(
        Arc::new(KafkaSubscriber::new(&config.kafka)),
        processor,
        &config.kafka,
    ));
    consumer.start().await?;

    let state = AppState::new(store.clone(), consumer.clone()).with_metrics(guard.metrics_handle());
    let app = routes::app(state);

    let listener = TcpListener::bind(config.server_addr()).await?;
    info!("Listening on {}", config.server_addr());

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    // 先停消费者，确保没有在途写入后再关闭存储
    consumer.stop().await;
    store.close().await;
    if let Err(e) = served {
        error!(error = %e, "HTTP 服务异常退出");
        return Err(e.into());
    }

    info!("Server shutdown complete");
    Ok(())
}

/// 监听关闭信号
///
/// 容器编排通过 SIGTERM 通知停止；本地开发通过 Ctrl+C。
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
