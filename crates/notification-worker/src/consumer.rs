//! 消费者 worker
//!
//! 每个 worker 独占一个消费者连接，在自己的 tokio 任务中逐条拉取、处理消息。
//! 处理完一条消息后 store offset，真正的提交交给客户端的自动提交；
//! 关闭时在阻塞线程池上再做一次同步提交，然后无论提交是否成功都释放连接。
//!
//! 状态流转：`Created → Running → Stopping → Closed`。

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use async_trait::async_trait;
use notify_shared::error::SharedError;
use notify_shared::kafka::{ConsumerMessage, KafkaConsumer};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::error::NotificationError;
use crate::handler::MessageHandler;

/// worker 读取消息的来源
///
/// 生产环境为 `KafkaConsumer`，测试中替换为内存实现。
#[async_trait]
pub trait MessageSource: Send + Sync + 'static {
    /// 拉取下一条消息，空闲时一直等待
    async fn recv(&self) -> Result<ConsumerMessage, SharedError>;

    fn store_offset(&self, msg: &ConsumerMessage) -> Result<(), SharedError>;

    /// 同步提交，可能阻塞当前线程
    fn commit(&self) -> Result<(), SharedError>;

    /// 释放连接并离开消费组，可能阻塞当前线程
    fn close(self)
    where
        Self: Sized;
}

#[async_trait]
impl MessageSource for KafkaConsumer {
    async fn recv(&self) -> Result<ConsumerMessage, SharedError> {
        KafkaConsumer::recv(self).await
    }

    fn store_offset(&self, msg: &ConsumerMessage) -> Result<(), SharedError> {
        KafkaConsumer::store_offset(self, msg)
    }

    fn commit(&self) -> Result<(), SharedError> {
        KafkaConsumer::commit(self)
    }

    fn close(self) {
        KafkaConsumer::close(self)
    }
}

// ---------------------------------------------------------------------------
// WorkerState
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WorkerState {
    /// 连接已建立并完成订阅，尚未开始拉取
    Created = 0,
    Running = 1,
    /// 已收到停止信号，不再拉取新消息
    Stopping = 2,
    Closed = 3,
}

impl WorkerState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Created,
            1 => Self::Running,
            2 => Self::Stopping,
            _ => Self::Closed,
        }
    }
}

#[derive(Clone)]
struct StateCell(Arc<AtomicU8>);

impl StateCell {
    fn new(state: WorkerState) -> Self {
        Self(Arc::new(AtomicU8::new(state as u8)))
    }

    fn get(&self) -> WorkerState {
        WorkerState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// 状态只前进不后退
    fn advance(&self, state: WorkerState) {
        self.0.fetch_max(state as u8, Ordering::AcqRel);
    }
}

// ---------------------------------------------------------------------------
// ConsumerWorker
// ---------------------------------------------------------------------------

pub struct ConsumerWorker<S> {
    ordinal: usize,
    source: S,
    handler: Arc<dyn MessageHandler>,
    state: StateCell,
}

impl<S: MessageSource> ConsumerWorker<S> {
    /// `source` 必须已经连接并订阅完成
    pub fn new(ordinal: usize, source: S, handler: Arc<dyn MessageHandler>) -> Self {
        Self {
            ordinal,
            source,
            handler,
            state: StateCell::new(WorkerState::Created),
        }
    }

    pub fn ordinal(&self) -> usize {
        self.ordinal
    }

    pub fn state(&self) -> WorkerState {
        self.state.get()
    }

    /// 在独立任务中启动消费循环
    pub fn spawn(self) -> WorkerHandle<S> {
        let ordinal = self.ordinal;
        let state = self.state.clone();
        let stopping = Arc::new(AtomicBool::new(false));
        let (stop_tx, stop_rx) = watch::channel(false);

        let task = tokio::spawn(self.run(stopping.clone(), stop_rx));

        WorkerHandle {
            ordinal,
            state,
            stopping,
            stop_tx,
            task,
        }
    }

    async fn run(self, stopping: Arc<AtomicBool>, mut stop_rx: watch::Receiver<bool>) -> S {
        self.state.advance(WorkerState::Running);
        info!(worker = self.ordinal, "worker 已启动");

        // 停止标志在每轮开始时检查；空闲等待期间由 watch 唤醒
        while !stopping.load(Ordering::Acquire) {
            tokio::select! {
                biased;

                changed = stop_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }

                received = self.source.recv() => {
                    match received {
                        Ok(msg) => self.process(&msg).await,
                        Err(e) => error!(
                            worker = self.ordinal,
                            code = e.code(),
                            error = %e,
                            "接收 Kafka 消息出错"
                        ),
                    }
                }
            }
        }

        self.state.advance(WorkerState::Stopping);
        info!(worker = self.ordinal, "worker 停止拉取消息");
        self.source
    }

    /// 处理失败只记录日志，offset 照常推进
    async fn process(&self, msg: &ConsumerMessage) {
        let metadata = msg.metadata();
        debug!(
            worker = self.ordinal,
            partition = msg.partition,
            offset = msg.offset,
            "收到 Kafka 消息"
        );

        if let Err(e) = self
            .handler
            .handle(&msg.payload, &metadata, self.ordinal)
            .await
        {
            error!(
                worker = self.ordinal,
                partition = msg.partition,
                offset = msg.offset,
                stage = ?e.stage(),
                error = %e,
                "处理消息失败"
            );
        }

        if let Err(e) = self.source.store_offset(msg) {
            error!(
                worker = self.ordinal,
                partition = msg.partition,
                offset = msg.offset,
                error = %e,
                "存储 offset 失败"
            );
        }
    }
}

// ---------------------------------------------------------------------------
// WorkerHandle
// ---------------------------------------------------------------------------

/// 运行中 worker 的控制句柄
pub struct WorkerHandle<S> {
    ordinal: usize,
    state: StateCell,
    stopping: Arc<AtomicBool>,
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<S>,
}

impl<S: MessageSource> WorkerHandle<S> {
    pub fn ordinal(&self) -> usize {
        self.ordinal
    }

    pub fn state(&self) -> WorkerState {
        self.state.get()
    }

    /// 只发出停止信号，不等待；正在处理的消息会先处理完
    pub fn signal_stop(&self) {
        self.state.advance(WorkerState::Stopping);
        self.stopping.store(true, Ordering::Release);
        self.stop_tx.send_replace(true);
    }

    /// 停止 worker：等待循环退出，最后提交一次 offset，然后关闭连接
    ///
    /// 提交失败时连接仍会关闭，返回提交错误。
    pub async fn close(self) -> Result<(), NotificationError> {
        self.signal_stop();

        let source = self
            .task
            .await
            .map_err(|e| NotificationError::WorkerAborted {
                ordinal: self.ordinal,
                reason: e.to_string(),
            })?;

        let ordinal = self.ordinal;
        let committed = tokio::task::spawn_blocking(move || {
            let committed = source.commit();
            if let Err(e) = &committed {
                error!(
                    worker = ordinal,
                    code = e.code(),
                    error = %e,
                    "关闭前提交 offset 失败"
                );
            }
            source.close();
            committed
        })
        .await
        .map_err(|e| NotificationError::WorkerAborted {
            ordinal,
            reason: e.to_string(),
        })?;

        self.state.advance(WorkerState::Closed);
        info!(worker = self.ordinal, "worker 已关闭");

        committed.map_err(NotificationError::from)
    }
}

// ---------------------------------------------------------------------------
// 测试替身
// ---------------------------------------------------------------------------


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use std::time::Duration;

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !condition() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("等待条件超时");
    }

    #[tokio::test]
    async fn test_worker_processes_and_stores_offsets() {
        let probe = Arc::new(Probe::default());
        let handler = Arc::new(RecordingHandler::default());
        let (tx, source) = ChannelSource::new(probe.clone(), false);

        let worker = ConsumerWorker::new(1, source, handler.clone());
        assert_eq!(worker.state(), WorkerState::Created);
        let handle = worker.spawn();

        for offset in [10, 11, 12] {
            tx.send(message(offset, b"{}")).unwrap();
        }
        wait_until(|| probe.stored.lock().unwrap().len() == 3).await;
        assert_eq!(handle.state(), WorkerState::Running);

        handle.close().await.unwrap();

        assert_eq!(*probe.stored.lock().unwrap(), vec![10, 11, 12]);
        assert_eq!(
            *handler.seen.lock().unwrap(),
            vec![(1, 10), (1, 11), (1, 12)]
        );
        assert_eq!(probe.commits.load(Ordering::SeqCst), 1);
        assert_eq!(probe.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_handler_error_still_stores_offset() {
        let probe = Arc::new(Probe::default());
        let handler = Arc::new(RecordingHandler {
            fail: true,
            ..Default::default()
        });
        let (tx, source) = ChannelSource::new(probe.clone(), false);
        let handle = ConsumerWorker::new(2, source, handler.clone()).spawn();

        tx.send(message(5, b"not json")).unwrap();
        tx.send(message(6, b"not json")).unwrap();
        wait_until(|| probe.stored.lock().unwrap().len() == 2).await;

        handle.close().await.unwrap();
        assert_eq!(*probe.stored.lock().unwrap(), vec![5, 6]);
    }

    #[tokio::test]
    async fn test_idle_worker_stops_promptly() {
        let probe = Arc::new(Probe::default());
        let (_tx, source) = ChannelSource::new(probe.clone(), false);
        let handle = ConsumerWorker::new(3, source, Arc::new(RecordingHandler::default())).spawn();

        tokio::time::timeout(Duration::from_secs(1), handle.close())
            .await
            .expect("空闲 worker 应能及时停止")
            .unwrap();
        assert_eq!(probe.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_commit_error_returned_after_close() {
        let probe = Arc::new(Probe::default());
        let (_tx, source) = ChannelSource::new(probe.clone(), true);
        let handle = ConsumerWorker::new(4, source, Arc::new(RecordingHandler::default())).spawn();
        let state = handle.state.clone();

        let err = handle.close().await.unwrap_err();

        assert!(matches!(err, NotificationError::Shared(SharedError::Internal(_))));
        // 提交失败也必须释放连接
        assert_eq!(probe.closes.load(Ordering::SeqCst), 1);
        assert_eq!(state.get(), WorkerState::Closed);
    }

    #[tokio::test]
    async fn test_signal_stop_moves_to_stopping() {
        let probe = Arc::new(Probe::default());
        let (_tx, source) = ChannelSource::new(probe.clone(), false);
        let handle = ConsumerWorker::new(5, source, Arc::new(RecordingHandler::default())).spawn();

        handle.signal_stop();
        assert_eq!(handle.state(), WorkerState::Stopping);
        // 只发信号不关闭连接
        assert_eq!(probe.closes.load(Ordering::SeqCst), 0);

        handle.close().await.unwrap();
    }

    /// 处理到一半时只放行一次的处理器
    #[derive(Default)]
    struct GatedHandler {
        started: tokio::sync::Notify,
        release: tokio::sync::Notify,
    }

    #[async_trait]
    impl MessageHandler for GatedHandler {
        async fn handle(
            &self,
            _payload: &[u8],
            _metadata: &notify_shared::kafka::MessageMetadata,
            _worker: usize,
        ) -> Result<(), NotificationError> {
            self.started.notify_one();
            self.release.notified().await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_close_waits_for_in_flight_message() {
        let probe = Arc::new(Probe::default());
        let handler = Arc::new(GatedHandler::default());
        let (tx, source) = ChannelSource::new(probe.clone(), false);
        let handle = ConsumerWorker::new(6, source, handler.clone()).spawn();
        let state = handle.state.clone();

        tx.send(message(21, b"{}")).unwrap();
        handler.started.notified().await;

        let closing = tokio::spawn(handle.close());
        wait_until(|| state.get() == WorkerState::Stopping).await;
        tokio::task::yield_now().await;

        // 消息仍在处理中：还没有 store、提交或关闭
        assert!(probe.stored.lock().unwrap().is_empty());
        assert_eq!(probe.commits.load(Ordering::SeqCst), 0);
        assert_eq!(probe.closes.load(Ordering::SeqCst), 0);

        handler.release.notify_one();
        closing.await.unwrap().unwrap();

        assert_eq!(*probe.stored.lock().unwrap(), vec![21]);
        assert_eq!(probe.commits.load(Ordering::SeqCst), 1);
        assert_eq!(probe.closes.load(Ordering::SeqCst), 1);
        assert_eq!(state.get(), WorkerState::Closed);
    }

    #[test]
    fn test_state_never_moves_backwards() {
        let state = StateCell::new(WorkerState::Created);
        state.advance(WorkerState::Stopping);
        state.advance(WorkerState::Running);
        assert_eq!(state.get(), WorkerState::Stopping);
    }

    #[test]
    fn test_state_round_trip() {
        for state in [
            WorkerState::Created,
            WorkerState::Running,
            WorkerState::Stopping,
            WorkerState::Closed,
        ] {
            assert_eq!(WorkerState::from_u8(state as u8), state);
        }
    }
}
