//! 用户事件模型
//!
//! API 进程在用户完成注册、申请激活、申请重置密码等操作后发布 `UserEvent`，
//! 通知进程消费后按 `template_name` 渲染并发送邮件。
//! 事件发布后不可变；消费语义为至少一次，下游必须容忍重复投递。

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 邮件模板名称常量，与 notification-worker 的 templates 目录一一对应
pub mod templates {
    pub const USER_WELCOME: &str = "user_welcome.html";
    pub const USER_ACTIVATION_TOKEN: &str = "user_activation_token.html";
    pub const USER_RESET_PASSWORD: &str = "user_reset_password.html";
}

// ---------------------------------------------------------------------------
// UserEvent — 线上传输的事件结构
// ---------------------------------------------------------------------------

/// 用户事件
///
/// 反序列化时出现未知字段直接报错；缺失的字段取零值（空字符串、0、无模板）。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct UserEvent {
    pub user_id: i64,
    pub email: String,
    pub name: String,
    pub token: String,
    /// 为空表示该事件只做记录，不需要发送邮件
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_name: Option<String>,
    /// 人类可读的任务描述，仅用于日志
    pub task: String,
}

impl UserEvent {
    /// 注册成功后的欢迎邮件，携带激活 token
    pub fn welcome(
        user_id: i64,
        email: impl Into<String>,
        name: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        Self {
            user_id,
            email: email.into(),
            name: name.into(),
            token: token.into(),
            template_name: Some(templates::USER_WELCOME.to_string()),
            task: "send welcome email with activation token to user's email".to_string(),
        }
    }

    /// 用户重新申请激活 token
    pub fn activation(
        user_id: i64,
        email: impl Into<String>,
        name: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        Self {
            user_id,
            email: email.into(),
            name: name.into(),
            token: token.into(),
            template_name: Some(templates::USER_ACTIVATION_TOKEN.to_string()),
            task: "send activation token to user email".to_string(),
        }
    }

    /// 用户申请重置密码
    pub fn password_reset(
        user_id: i64,
        email: impl Into<String>,
        name: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        Self {
            user_id,
            email: email.into(),
            name: name.into(),
            token: token.into(),
            template_name: Some(templates::USER_RESET_PASSWORD.to_string()),
            task: "send reset password token to user email".to_string(),
        }
    }

    /// 仅记录、不发送邮件的事件
    pub fn notify_only(
        user_id: i64,
        email: impl Into<String>,
        name: impl Into<String>,
        task: impl Into<String>,
    ) -> Self {
        Self {
            user_id,
            email: email.into(),
            name: name.into(),
            token: String::new(),
            template_name: None,
            task: task.into(),
        }
    }

    pub fn requires_email(&self) -> bool {
        self.template_name.is_some()
    }

    /// 模板渲染使用的字段集合
    ///
    /// 键名是模板契约的一部分：`Token` 与 `name`。
    pub fn mail_fields(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("Token".to_string(), self.token.clone()),
            ("name".to_string(), self.name.clone()),
        ])
    }

    /// 严格解码
    ///
    /// 除未知字段外，空消息体和多个 JSON 值拼接同样视为解码失败。
    pub fn decode_strict(payload: &[u8]) -> Result<Self, EventDecodeError> {
        if payload.iter().all(u8::is_ascii_whitespace) {
            return Err(EventDecodeError::Empty);
        }

        let mut de = serde_json::Deserializer::from_slice(payload);
        let event = Self::deserialize(&mut de).map_err(EventDecodeError::from_serde)?;
        de.end().map_err(|_| EventDecodeError::TrailingData)?;
        Ok(event)
    }
}

// ---------------------------------------------------------------------------
// EventDecodeError — 解码失败分类
// ---------------------------------------------------------------------------

/// 事件解码错误
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EventDecodeError {
    #[error("消息体为空")]
    Empty,

    #[error("消息体 JSON 格式错误（第 {line} 行第 {column} 列）")]
    Syntax { line: usize, column: usize },

    #[error("消息体 JSON 不完整")]
    UnexpectedEof,

    #[error("消息体包含未知字段: {0}")]
    UnknownField(String),

    #[error("消息体字段类型错误: {0}")]
    InvalidType(String),

    #[error("消息体只能包含单个 JSON 值")]
    TrailingData,
}

impl EventDecodeError {
    fn from_serde(err: serde_json::Error) -> Self {
        use serde_json::error::Category;

        match err.classify() {
            Category::Syntax => Self::Syntax {
                line: err.line(),
                column: err.column(),
            },
            Category::Eof => Self::UnexpectedEof,
            Category::Data => {
                let message = err.to_string();
                if let Some(field) = backticked_after(&message, "unknown field `") {
                    Self::UnknownField(field)
                } else {
                    Self::InvalidType(message)
                }
            }
            Category::Io => Self::InvalidType(err.to_string()),
        }
    }
}

/// 提取 serde 错误信息中反引号包裹的字段名
fn backticked_after(message: &str, prefix: &str) -> Option<String> {
    let rest = message.strip_prefix(prefix)?;
    let end = rest.find('`')?;
    Some(rest[..end].to_string())
}
