//! 用户事件发布工具入口

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use event_publisher::cli::{Cli, CommandRunner};
use notify_shared::config::KafkaConfig;
use notify_shared::kafka::KafkaProducer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // 优先使用环境变量 RUST_LOG，否则使用命令行参数指定的级别
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| cli.log_level.clone().into()),
        )
        .init();

    let kafka_config = KafkaConfig {
        brokers: cli.brokers.clone(),
        ..Default::default()
    };
    let producer = KafkaProducer::new(&kafka_config).context("创建 Kafka 生产者失败")?;
    let runner = CommandRunner::new(Arc::new(producer.clone()));

    let event = cli.command.to_event();
    let result = runner
        .run_publish(&event, &cli.topic, cli.key.as_deref(), cli.count, cli.strict)
        .await;

    // 退出前把未确认的消息刷到 broker
    producer.close().context("关闭 Kafka 生产者失败")?;

    result.map(|_| ())
}
