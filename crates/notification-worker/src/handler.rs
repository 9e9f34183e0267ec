//! 消息处理器
//!
//! worker 每拉到一条消息就调用一次 `MessageHandler::handle`。
//! 处理器自身不重试，失败以带阶段信息的错误返回，由 worker 记录日志后继续推进 offset。

use std::sync::Arc;

use async_trait::async_trait;
use notify_shared::events::UserEvent;
use notify_shared::kafka::MessageMetadata;
use tracing::{debug, info};

use crate::error::{HandleStage, NotificationError};
use crate::mailer::MailTransport;

/// 单条消息的处理逻辑
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(
        &self,
        payload: &[u8],
        metadata: &MessageMetadata,
        worker: usize,
    ) -> Result<(), NotificationError>;
}

/// 解码用户事件并按模板发送邮件
pub struct SendEmailHandler {
    transport: Arc<dyn MailTransport>,
}

impl SendEmailHandler {
    pub fn new(transport: Arc<dyn MailTransport>) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl MessageHandler for SendEmailHandler {
    async fn handle(
        &self,
        payload: &[u8],
        metadata: &MessageMetadata,
        worker: usize,
    ) -> Result<(), NotificationError> {
        let event = UserEvent::decode_strict(payload)
            .map_err(|e| NotificationError::from(e).at_stage(HandleStage::Decode))?;

        info!(
            worker,
            offset = metadata.offset,
            partition = metadata.partition,
            task = %event.task,
            "收到用户事件"
        );

        let Some(template_name) = event.template_name.as_deref() else {
            debug!(worker, user_id = event.user_id, "事件无需发送邮件");
            return Ok(());
        };

        self.transport
            .send(&event.email, template_name, &event.mail_fields())
            .await
            .map_err(|e| {
                let stage = match e {
                    NotificationError::TemplateNotFound { .. }
                    | NotificationError::TemplateRender { .. } => HandleStage::Render,
                    _ => HandleStage::Deliver,
                };
                e.at_stage(stage)
            })
    }
}
