//! 内存邮件服务商
//!
//! 记录每一封投递的邮件，供用例断言收件人、模板渲染结果和投递次数。

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use notification_worker::error::ProviderError;
use notification_worker::mailer::{MailProvider, OutgoingMail};

#[derive(Clone, Default)]
pub struct RecordingProvider {
    mails: Arc<Mutex<Vec<OutgoingMail>>>,
}

impl RecordingProvider {
    pub fn mails(&self) -> Vec<OutgoingMail> {
        self.mails.lock().unwrap().clone()
    }

    /// 等待至少收到 `count` 封邮件，超时返回当前已收到的全部邮件
    pub async fn wait_for(&self, count: usize, timeout: Duration) -> Vec<OutgoingMail> {
        let deadline = tokio::time::Instant::now() + timeout;
        while tokio::time::Instant::now() < deadline {
            if self.mails.lock().unwrap().len() >= count {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        self.mails()
    }
}

#[async_trait]
impl MailProvider for RecordingProvider {
    async fn deliver(&self, mail: &OutgoingMail) -> Result<(), ProviderError> {
        self.mails.lock().unwrap().push(mail.clone());
        Ok(())
    }
}
