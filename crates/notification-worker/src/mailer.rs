//! 邮件发送
//!
//! `MailTransport` 是处理器看到的发送入口：按模板名渲染后交给 `MailProvider` 投递，
//! 投递失败按固定间隔重试。`MailProvider` 是与邮件服务商交互的唯一接缝，
//! 生产实现为 MailerSend HTTP API，测试中由 mock 替代。

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use notify_shared::config::MailerConfig;
use notify_shared::error::SharedError;
use notify_shared::retry::{RetryPolicy, retry_with_policy};
use serde::Serialize;
use tracing::{debug, info};

use crate::error::{NotificationError, ProviderError};
use crate::templates::{RenderedMail, TemplateFields, TemplateRenderer};

/// 邮件发送入口
#[async_trait]
pub trait MailTransport: Send + Sync {
    /// 渲染 `template_name` 并投递给 `recipient`，成功表示服务商已接受邮件
    async fn send(
        &self,
        recipient: &str,
        template_name: &str,
        fields: &TemplateFields,
    ) -> Result<(), NotificationError>;
}

// ---------------------------------------------------------------------------
// OutgoingMail — 服务商请求体
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MailAddress {
    pub email: String,
}

/// 一封待投递的邮件，字段名即 MailerSend 请求体的 JSON 字段
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutgoingMail {
    pub from: MailAddress,
    pub to: Vec<MailAddress>,
    pub subject: String,
    pub text: String,
    pub html: String,
}

impl OutgoingMail {
    pub fn new(sender: &str, recipient: &str, rendered: RenderedMail) -> Self {
        Self {
            from: MailAddress {
                email: sender.to_string(),
            },
            to: vec![MailAddress {
                email: recipient.to_string(),
            }],
            subject: rendered.subject,
            text: rendered.plain_body,
            html: rendered.html_body,
        }
    }

    pub fn recipient(&self) -> &str {
        self.to.first().map(|a| a.email.as_str()).unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// MailProvider — 邮件服务商
// ---------------------------------------------------------------------------

/// 邮件服务商的单次投递调用，不做重试
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MailProvider: Send + Sync {
    async fn deliver(&self, mail: &OutgoingMail) -> Result<(), ProviderError>;
}

/// MailerSend HTTP API
pub struct MailerSendProvider {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
}

impl MailerSendProvider {
    /// 每次请求的超时由 `request_timeout_ms` 控制，超时按瞬时失败处理
    pub fn new(config: &MailerConfig) -> Result<Self, NotificationError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .map_err(|e| SharedError::Internal(format!("创建 HTTP 客户端失败: {e}")))?;

        Ok(Self {
            client,
            api_url: config.api_url.clone(),
            api_key: config.api_key.clone(),
        })
    }
}

#[async_trait]
impl MailProvider for MailerSendProvider {
    async fn deliver(&self, mail: &OutgoingMail) -> Result<(), ProviderError> {
        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(mail)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout
                } else {
                    ProviderError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        if status.is_success() {
            debug!(
                recipient = mail.recipient(),
                status = status.as_u16(),
                "邮件服务已接受请求"
            );
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(ProviderError::Rejected {
            status: status.as_u16(),
            body,
        })
    }
}

// ---------------------------------------------------------------------------
// Mailer — 渲染 + 带重试的投递
// ---------------------------------------------------------------------------

pub struct Mailer {
    renderer: Arc<TemplateRenderer>,
    provider: Arc<dyn MailProvider>,
    sender: String,
    policy: RetryPolicy,
    retry_permanent_failures: bool,
}

impl Mailer {
    /// 默认最多尝试 3 次，间隔 1.5 秒
    pub fn new(
        renderer: TemplateRenderer,
        provider: Arc<dyn MailProvider>,
        sender: impl Into<String>,
    ) -> Self {
        Self {
            renderer: Arc::new(renderer),
            provider,
            sender: sender.into(),
            policy: RetryPolicy::fixed(3, Duration::from_millis(1500)),
            retry_permanent_failures: true,
        }
    }

    pub fn from_config(config: &MailerConfig, provider: Arc<dyn MailProvider>) -> Self {
        Self::new(
            TemplateRenderer::from_config(config),
            provider,
            config.sender.clone(),
        )
        .with_retry_policy(RetryPolicy::fixed(
            config.max_attempts,
            Duration::from_millis(config.retry_delay_ms),
        ))
        .with_retry_permanent_failures(config.retry_permanent_failures)
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// 关闭后，4xx（408/429 除外）等永久性失败只尝试一次
    pub fn with_retry_permanent_failures(mut self, enabled: bool) -> Self {
        self.retry_permanent_failures = enabled;
        self
    }
}

impl Mailer {
    /// 模板加载读磁盘，放到阻塞线程池执行
    async fn render(
        &self,
        template_name: &str,
        fields: &TemplateFields,
    ) -> Result<RenderedMail, NotificationError> {
        let renderer = self.renderer.clone();
        let name = template_name.to_string();
        let fields = fields.clone();

        tokio::task::spawn_blocking(move || renderer.render(&name, &fields))
            .await
            .map_err(|e| NotificationError::TemplateRender {
                template: template_name.to_string(),
                reason: e.to_string(),
            })?
    }
}

#[async_trait]
impl MailTransport for Mailer {
    async fn send(
        &self,
        recipient: &str,
        template_name: &str,
        fields: &TemplateFields,
    ) -> Result<(), NotificationError> {
        let rendered = self.render(template_name, fields).await?;
        let mail = OutgoingMail::new(&self.sender, recipient, rendered);

        let attempts = AtomicU32::new(0);
        let retry_permanent = self.retry_permanent_failures;

        retry_with_policy(
            &self.policy,
            "send_mail",
            |e: &ProviderError| retry_permanent || !e.is_permanent(),
            || {
                attempts.fetch_add(1, Ordering::Relaxed);
                self.provider.deliver(&mail)
            },
        )
        .await
        .map_err(|source| NotificationError::SendFailed {
            recipient: recipient.to_string(),
            attempts: attempts.load(Ordering::Relaxed),
            source,
        })?;

        info!(
            recipient,
            template = template_name,
            attempts = attempts.load(Ordering::Relaxed),
            "邮件发送成功"
        );
        Ok(())
    }
}
