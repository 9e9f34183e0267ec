//! Kafka 基础设施封装
//!
//! 将 rdkafka 的底层 API 封装为业务友好的 Producer/Consumer 抽象，
//! 统一消息序列化、错误映射和位点管理语义，避免各进程重复编写样板代码。

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use rdkafka::message::Message;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use serde::Serialize;
use tracing::{debug, error, info};

use crate::config::KafkaConfig;
use crate::error::SharedError;
use crate::events::UserEvent;

// ---------------------------------------------------------------------------
// Topic 常量
// ---------------------------------------------------------------------------

/// 默认 topic 名称，实际值以 `ConsumerConfig::topic` 为准
pub mod topics {
    pub const USER_EVENTS: &str = "user-events";
}

/// 入队等待上限；rdkafka 本地队列满时最多等待这么久
const QUEUE_TIMEOUT: Duration = Duration::from_secs(5);

/// 关闭生产者时刷新未完成投递的上限
const FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

// ---------------------------------------------------------------------------
// ConsumerMessage
// ---------------------------------------------------------------------------

/// 消息元数据，随负载一起交给消息处理器，用于日志定位
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageMetadata {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub timestamp: Option<i64>,
}

/// 消费到的 Kafka 消息的统一表示
///
/// 将 rdkafka 的借用消息（带生命周期约束）转换为拥有所有权的结构体，
/// 使消息可以安全地跨 await 点传递给异步处理函数。
#[derive(Debug, Clone)]
pub struct ConsumerMessage {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    /// 分区键按不透明字节处理
    pub key: Option<Vec<u8>>,
    pub payload: Vec<u8>,
    pub timestamp: Option<i64>,
}

impl ConsumerMessage {
    /// 从 rdkafka 消息构造，提取并拥有所有字段
    pub fn from_message<M: Message>(msg: &M) -> Self {
        Self {
            topic: msg.topic().to_string(),
            partition: msg.partition(),
            offset: msg.offset(),
            key: msg.key().map(<[u8]>::to_vec),
            payload: msg.payload().map(<[u8]>::to_vec).unwrap_or_default(),
            timestamp: msg.timestamp().to_millis(),
        }
    }

    pub fn metadata(&self) -> MessageMetadata {
        MessageMetadata {
            topic: self.topic.clone(),
            partition: self.partition,
            offset: self.offset,
            timestamp: self.timestamp,
        }
    }
}

// ---------------------------------------------------------------------------
// EventPublisher — 生产侧抽象
// ---------------------------------------------------------------------------

/// broker 确认写入后返回的位置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryReport {
    pub partition: i32,
    pub offset: i64,
}

/// 用户事件发布接口
///
/// 每次调用都等待 broker 确认或返回错误，不在内部缓冲或批量发送。
/// `key` 为空表示由 broker 选择分区。
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(
        &self,
        event: &UserEvent,
        topic: &str,
        key: Option<&[u8]>,
        timestamp: DateTime<Utc>,
    ) -> Result<DeliveryReport, SharedError>;
}

/// 尽力而为的发布
///
/// 邮件只是业务请求的旁路通道：发布失败只记录日志，绝不让触发它的用户请求失败。
/// 返回值表示是否已被 broker 确认。
pub async fn publish_best_effort(
    publisher: &dyn EventPublisher,
    event: &UserEvent,
    topic: &str,
    key: Option<&[u8]>,
) -> bool {
    match publisher.publish(event, topic, key, Utc::now()).await {
        Ok(report) => {
            debug!(
                topic,
                user_id = event.user_id,
                partition = report.partition,
                offset = report.offset,
                "用户事件已发布"
            );
            true
        }
        Err(e) => {
            error!(
                topic,
                user_id = event.user_id,
                task = %event.task,
                code = e.code(),
                retryable = e.is_retryable(),
                error = %e,
                "用户事件发布失败，邮件将不会发送"
            );
            false
        }
    }
}

// ---------------------------------------------------------------------------
// KafkaProducer
// ---------------------------------------------------------------------------

/// 面向业务的 Kafka 生产者
///
/// 封装 `FutureProducer` 并提供类型安全的 JSON 发送方法，
/// 内部已派生 Clone（`FutureProducer` 本身是 Arc 包装的），每个 API 进程持有一个即可。
#[derive(Clone)]
pub struct KafkaProducer {
    producer: FutureProducer,
}

impl KafkaProducer {
    /// 根据配置创建生产者
    pub fn new(config: &KafkaConfig) -> Result<Self, SharedError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", config.bootstrap_servers())
            .set("message.timeout.ms", config.message_timeout_ms.to_string())
            .create()?;

        info!(brokers = %config.bootstrap_servers(), "Kafka 生产者已初始化");
        Ok(Self { producer })
    }

    /// 发送原始字节消息并等待 broker 确认
    pub async fn send(
        &self,
        topic: &str,
        key: Option<&[u8]>,
        payload: &[u8],
        timestamp: DateTime<Utc>,
    ) -> Result<DeliveryReport, SharedError> {
        let mut record: FutureRecord<'_, [u8], [u8]> = FutureRecord::to(topic)
            .payload(payload)
            .timestamp(timestamp.timestamp_millis());
        if let Some(key) = key.filter(|k| !k.is_empty()) {
            record = record.key(key);
        }

        // rdkafka 0.39+ 返回 Delivery 结构体而非元组
        let delivery = self
            .producer
            .send(record, QUEUE_TIMEOUT)
            .await
            .map_err(|(e, _)| SharedError::Kafka(e))?;

        debug!(
            topic,
            partition = delivery.partition,
            offset = delivery.offset,
            "消息已发送"
        );
        Ok(DeliveryReport {
            partition: delivery.partition,
            offset: delivery.offset,
        })
    }

    /// 将值序列化为 JSON 后发送
    ///
    /// 序列化失败在任何网络调用之前返回。
    pub async fn send_json<T: Serialize>(
        &self,
        topic: &str,
        key: Option<&[u8]>,
        value: &T,
        timestamp: DateTime<Utc>,
    ) -> Result<DeliveryReport, SharedError> {
        let payload = serde_json::to_vec(value)?;
        self.send(topic, key, &payload, timestamp).await
    }

    /// 刷新尚未确认的消息，进程退出前调用
    pub fn close(&self) -> Result<(), SharedError> {
        self.producer.flush(FLUSH_TIMEOUT)?;
        info!("Kafka 生产者已关闭");
        Ok(())
    }
}

#[async_trait]
impl EventPublisher for KafkaProducer {
    async fn publish(
        &self,
        event: &UserEvent,
        topic: &str,
        key: Option<&[u8]>,
        timestamp: DateTime<Utc>,
    ) -> Result<DeliveryReport, SharedError> {
        self.send_json(topic, key, event, timestamp).await
    }
}

// ---------------------------------------------------------------------------
// KafkaConsumer
// ---------------------------------------------------------------------------

/// 面向业务的 Kafka 消费者连接
///
/// 关闭自动 store、保留自动提交：处理完一条消息后由调用方显式 `store_offset`，
/// 客户端按 `auto.commit.interval.ms` 周期提交已 store 的位点；
/// 关闭前再调用一次 `commit` 把剩余位点同步刷到 broker。
pub struct KafkaConsumer {
    consumer: StreamConsumer,
    group_id: String,
}

impl KafkaConsumer {
    /// 创建消费者
    pub fn new(config: &KafkaConfig, group_id: &str) -> Result<Self, SharedError> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", config.bootstrap_servers())
            .set("group.id", group_id)
            .set("session.timeout.ms", config.session_timeout_ms.to_string())
            .set("enable.auto.offset.store", "false")
            .set("enable.auto.commit", "true")
            .set(
                "auto.commit.interval.ms",
                config.auto_commit_interval_ms.to_string(),
            )
            .set("auto.offset.reset", &config.auto_offset_reset)
            .create()?;

        info!(brokers = %config.bootstrap_servers(), group_id, "Kafka 消费者已初始化");
        Ok(Self {
            consumer,
            group_id: group_id.to_string(),
        })
    }

    pub fn group_id(&self) -> &str {
        &self.group_id
    }

    /// 订阅单个 topic，分区分配与 rebalance 由 broker 的消费组协议负责
    pub fn subscribe(&self, topic: &str) -> Result<(), SharedError> {
        self.consumer.subscribe(&[topic])?;
        info!(topic, group_id = %self.group_id, "已订阅 Kafka topic");
        Ok(())
    }

    /// 拉取下一条消息，空闲时无限期等待
    pub async fn recv(&self) -> Result<ConsumerMessage, SharedError> {
        let msg = self.consumer.recv().await?;
        Ok(ConsumerMessage::from_message(&msg))
    }

    /// 标记消息已处理，等待下一次自动提交
    pub fn store_offset(&self, msg: &ConsumerMessage) -> Result<(), SharedError> {
        // 提交的位点指向下一条待消费消息
        self.consumer
            .store_offset(&msg.topic, msg.partition, msg.offset + 1)?;
        Ok(())
    }

    /// 同步提交所有已 store 的位点
    ///
    /// 没有任何可提交位点时 broker 返回 NoOffset，视为成功。
    pub fn commit(&self) -> Result<(), SharedError> {
        match self.consumer.commit_consumer_state(CommitMode::Sync) {
            Ok(()) => Ok(()),
            Err(KafkaError::ConsumerCommit(RDKafkaErrorCode::NoOffset)) => {
                debug!(group_id = %self.group_id, "没有待提交的位点");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// 退订并释放连接；rdkafka 在 drop 时完成 leave group
    pub fn close(self) {
        self.consumer.unsubscribe();
        info!(group_id = %self.group_id, "Kafka 消费者已关闭");
    }
}

// ---------------------------------------------------------------------------
// 测试
// ---------------------------------------------------------------------------
