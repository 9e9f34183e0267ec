//! Kafka 辅助工具
//!
//! 每个用例使用独立的 topic 与消费组，用例之间互不干扰。

use std::time::Duration;

use anyhow::{Result, anyhow};
use rdkafka::admin::{AdminClient, AdminOptions, NewTopic, TopicReplication};
use rdkafka::client::DefaultClientContext;
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord};
use uuid::Uuid;

use notify_shared::config::KafkaConfig;

pub struct KafkaHelper {
    brokers: String,
    producer: FutureProducer,
}

impl KafkaHelper {
    pub fn new() -> Result<Self> {
        let brokers =
            std::env::var("KAFKA_BROKERS").unwrap_or_else(|_| "localhost:9092".to_string());

        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &brokers)
            .set("message.timeout.ms", "5000")
            .create()?;

        Ok(Self { brokers, producer })
    }

    /// 与被测进程一致的连接配置
    pub fn kafka_config(&self) -> KafkaConfig {
        KafkaConfig {
            brokers: self.brokers.split(',').map(str::to_string).collect(),
            ..Default::default()
        }
    }

    /// 创建一个带随机后缀的 topic
    pub async fn create_topic(&self, prefix: &str, partitions: i32) -> Result<String> {
        let name = format!("{prefix}-{}", Uuid::new_v4());

        let admin: AdminClient<DefaultClientContext> = ClientConfig::new()
            .set("bootstrap.servers", &self.brokers)
            .create()?;

        let topic = NewTopic::new(&name, partitions, TopicReplication::Fixed(1));
        let results = admin
            .create_topics(&[topic], &AdminOptions::new())
            .await?;

        for result in results {
            result.map_err(|(topic, code)| anyhow!("创建 topic {topic} 失败: {code}"))?;
        }

        Ok(name)
    }

    pub fn unique_group(&self, prefix: &str) -> String {
        format!("{prefix}-{}", Uuid::new_v4())
    }

    /// 发送任意字节，用于构造格式错误的消息
    pub async fn send_raw(&self, topic: &str, payload: &[u8]) -> Result<()> {
        self.producer
            .send(
                FutureRecord::<(), [u8]>::to(topic).payload(payload),
                Duration::from_secs(5),
            )
            .await
            .map_err(|(e, _)| anyhow!("发送消息失败: {}", e))?;

        Ok(())
    }
}
