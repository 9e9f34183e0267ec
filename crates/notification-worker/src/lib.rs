//! 邮件通知服务
//!
//! 从 Kafka 消费用户事件，按事件指定的模板渲染邮件并投递给邮件服务商。
//! 消费语义为至少一次：处理失败只记录日志，offset 照常推进。

pub mod consumer;
pub mod error;
pub mod handler;
pub mod mailer;
pub mod pool;
pub mod templates;
