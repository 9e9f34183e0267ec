//! 命令执行器
//!
//! 按次数重复发布同一事件，汇总结果。发布失败默认只记录日志，
//! 与 API 进程的行为一致；`strict` 模式下汇总后返回错误。

use std::sync::Arc;

use anyhow::{Result, bail};
use notify_shared::events::UserEvent;
use notify_shared::kafka::{EventPublisher, publish_best_effort};
use tracing::info;

/// 一次命令执行的发布结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PublishSummary {
    pub total: usize,
    pub delivered: usize,
    pub failed: usize,
}

impl PublishSummary {
    pub fn is_all_success(&self) -> bool {
        self.failed == 0
    }
}

pub struct CommandRunner {
    publisher: Arc<dyn EventPublisher>,
}

impl CommandRunner {
    pub fn new(publisher: Arc<dyn EventPublisher>) -> Self {
        Self { publisher }
    }

    /// 发布 `count` 次 `event`
    pub async fn run_publish(
        &self,
        event: &UserEvent,
        topic: &str,
        key: Option<&str>,
        count: usize,
        strict: bool,
    ) -> Result<PublishSummary> {
        info!(
            topic,
            user_id = event.user_id,
            template = ?event.template_name,
            count,
            "开始发布用户事件"
        );

        let mut summary = PublishSummary::default();
        for _ in 0..count {
            summary.total += 1;
            let delivered = publish_best_effort(
                self.publisher.as_ref(),
                event,
                topic,
                key.map(str::as_bytes),
            )
            .await;

            if delivered {
                summary.delivered += 1;
            } else {
                summary.failed += 1;
            }
        }

        info!(
            total = summary.total,
            delivered = summary.delivered,
            failed = summary.failed,
            "用户事件发布完成"
        );

        if strict && !summary.is_all_success() {
            bail!("部分事件发布失败: {}/{} 失败", summary.failed, summary.total);
        }
        Ok(summary)
    }
}
