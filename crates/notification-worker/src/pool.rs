//! 消费者池
//!
//! 同一消费组下启动 N 个 worker（序号 1..=N），分区由 broker 在组内分配。
//! 池只能启动一次、停止一次，`stop` 消费掉池本身。

use std::sync::Arc;

use futures::future::join_all;
use notify_shared::config::{ConsumerConfig, KafkaConfig};
use notify_shared::error::SharedError;
use notify_shared::kafka::KafkaConsumer;
use tracing::{error, info, warn};

use crate::consumer::{ConsumerWorker, MessageSource, WorkerHandle, WorkerState};
use crate::error::NotificationError;
use crate::handler::MessageHandler;

pub struct ConsumerPool<S: MessageSource> {
    workers: Vec<WorkerHandle<S>>,
}

impl<S: MessageSource> ConsumerPool<S> {
    /// 依次为每个序号建立连接并启动 worker
    ///
    /// 任一 worker 启动失败时，先停止已启动的 worker，再返回该错误。
    pub async fn start_with<F>(
        handler: Arc<dyn MessageHandler>,
        worker_count: usize,
        mut connect: F,
    ) -> Result<Self, NotificationError>
    where
        F: FnMut(usize) -> Result<S, SharedError>,
    {
        if worker_count == 0 {
            return Err(SharedError::Validation("worker 数量必须大于 0".to_string()).into());
        }

        let mut workers = Vec::with_capacity(worker_count);
        for ordinal in 1..=worker_count {
            match connect(ordinal) {
                Ok(source) => {
                    workers.push(ConsumerWorker::new(ordinal, source, handler.clone()).spawn());
                }
                Err(e) => {
                    error!(worker = ordinal, error = %e, "worker 启动失败，停止已启动的 worker");
                    if let Err(stop_err) = (Self { workers }).stop().await {
                        warn!(error = %stop_err, "回滚已启动的 worker 时出错");
                    }
                    return Err(e.into());
                }
            }
        }

        info!(workers = worker_count, "消费者池已启动");
        Ok(Self { workers })
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    pub fn states(&self) -> Vec<WorkerState> {
        self.workers.iter().map(WorkerHandle::state).collect()
    }

    /// 停止全部 worker
    ///
    /// 先向所有 worker 发信号，再并发关闭；某个 worker 关闭失败不影响其余 worker，
    /// 返回第一个错误。
    pub async fn stop(self) -> Result<(), NotificationError> {
        info!(workers = self.workers.len(), "正在停止消费者池");

        for worker in &self.workers {
            worker.signal_stop();
        }

        let ordinals: Vec<usize> = self.workers.iter().map(WorkerHandle::ordinal).collect();
        let results = join_all(self.workers.into_iter().map(WorkerHandle::close)).await;

        let mut first_error = None;
        for (ordinal, result) in ordinals.into_iter().zip(results) {
            if let Err(e) = result {
                error!(worker = ordinal, error = %e, "关闭 worker 失败");
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => {
                info!("消费者池已停止");
                Ok(())
            }
        }
    }
}

impl ConsumerPool<KafkaConsumer> {
    /// 每个 worker 独立连接 broker，并以同一消费组订阅同一 topic
    pub async fn start_kafka(
        handler: Arc<dyn MessageHandler>,
        kafka: &KafkaConfig,
        consumer: &ConsumerConfig,
    ) -> Result<Self, NotificationError> {
        Self::start_with(handler, consumer.consumer_count, |ordinal| {
            let connection = KafkaConsumer::new(kafka, &consumer.consumer_group)?;
            connection.subscribe(&consumer.topic)?;
            info!(
                worker = ordinal,
                topic = %consumer.topic,
                group_id = %consumer.consumer_group,
                "worker 已连接并订阅"
            );
            Ok(connection)
        })
        .await
    }
}
