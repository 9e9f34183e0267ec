//! 通知服务错误类型
//!
//! 定义事件解码、模板渲染、邮件投递和 worker 生命周期等场景的错误分类，
//! 便于上层根据错误类型决定重试或丢弃策略。

use std::fmt;

use notify_shared::error::SharedError;
use notify_shared::events::EventDecodeError;
use thiserror::Error;

/// 消息处理所处的阶段，用于在错误中标明失败位置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleStage {
    Decode,
    Render,
    Deliver,
}

impl fmt::Display for HandleStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Decode => "decode",
            Self::Render => "render",
            Self::Deliver => "deliver",
        };
        write!(f, "{s}")
    }
}

/// 邮件服务商单次调用的失败
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    #[error("邮件服务拒绝请求: status={status}, body={body}")]
    Rejected { status: u16, body: String },

    #[error("邮件服务请求超时")]
    Timeout,

    #[error("邮件服务请求失败: {0}")]
    Transport(String),
}

impl ProviderError {
    /// 永久性失败：请求本身有问题（收件人无效、凭据错误等），重发不会改变结果
    pub fn is_permanent(&self) -> bool {
        match self {
            Self::Rejected { status, .. } => {
                (400..500).contains(status) && *status != 408 && *status != 429
            }
            Self::Timeout | Self::Transport(_) => false,
        }
    }
}

#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("事件解码失败: {0}")]
    Decode(#[from] EventDecodeError),

    #[error("邮件模板未找到: {template}")]
    TemplateNotFound { template: String },

    #[error("邮件模板渲染失败: 模板={template}, 原因={reason}")]
    TemplateRender { template: String, reason: String },

    #[error("邮件发送失败: 收件人={recipient}, 尝试次数={attempts}, 原因={source}")]
    SendFailed {
        recipient: String,
        attempts: u32,
        #[source]
        source: ProviderError,
    },

    #[error("处理消息失败: 阶段={stage}, {source}")]
    Stage {
        stage: HandleStage,
        #[source]
        source: Box<NotificationError>,
    },

    #[error("worker {ordinal} 异常退出: {reason}")]
    WorkerAborted { ordinal: usize, reason: String },

    #[error(transparent)]
    Shared(#[from] SharedError),
}

impl NotificationError {
    /// 为错误附加失败阶段
    pub fn at_stage(self, stage: HandleStage) -> Self {
        Self::Stage {
            stage,
            source: Box::new(self),
        }
    }

    /// 错误发生的阶段，未标注阶段时返回 None
    pub fn stage(&self) -> Option<HandleStage> {
        match self {
            Self::Stage { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}
