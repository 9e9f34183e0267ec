//! 邮件通知服务
//!
//! 启动消费者池消费用户事件并发送邮件，收到 Ctrl+C / SIGTERM 后停止所有 worker 并退出。

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use notify_shared::{config::AppConfig, observability};
use tokio::signal;
use tracing::{error, info, warn};

use notification_worker::{
    handler::SendEmailHandler,
    mailer::{Mailer, MailerSendProvider},
    pool::ConsumerPool,
};

#[tokio::main]
async fn main() -> Result<()> {
    // 1. 加载配置：config/*.toml + NOTIFY_ 环境变量
    let config = AppConfig::load("notification-worker").context("加载配置失败")?;

    // 2. 初始化日志
    let _guard = observability::init(&config.service_name, &config.observability)?;

    info!("Starting notification-worker...");
    info!(
        environment = %config.environment,
        brokers = %config.kafka.bootstrap_servers(),
        topic = %config.consumer.topic,
        group_id = %config.consumer.consumer_group,
        workers = config.consumer.consumer_count,
        mailer = ?config.mailer,
        "Configuration loaded"
    );
    config.validate()?;

    if config.mailer.api_key.is_empty() {
        warn!("未配置 mailer.api_key，邮件服务将拒绝所有请求");
    }
    if !Path::new(&config.mailer.templates_dir).is_dir() {
        warn!(templates_dir = %config.mailer.templates_dir, "邮件模板目录不存在");
    }

    // 3. 组装发送链路：服务商 -> 带重试的 Mailer -> 消息处理器
    let provider = Arc::new(MailerSendProvider::new(&config.mailer)?);
    let mailer = Mailer::from_config(&config.mailer, provider);
    let handler = Arc::new(SendEmailHandler::new(Arc::new(mailer)));

    // 4. 启动消费者池
    let pool = ConsumerPool::start_kafka(handler, &config.kafka, &config.consumer).await?;
    info!(workers = pool.len(), "notification-worker 已就绪");

    shutdown_signal().await;

    // 5. 停止所有 worker：最终提交 offset 并关闭连接
    pool.stop().await?;
    info!("notification-worker stopped");
    Ok(())
}

/// 优雅关闭信号处理
///
/// 监听 Ctrl+C 和 SIGTERM 信号
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "无法监听 Ctrl+C 信号");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "无法监听 SIGTERM 信号");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, starting graceful shutdown...");
        }
    }
}
