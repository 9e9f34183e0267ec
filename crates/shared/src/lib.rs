//! 共享库
//!
//! 包含 API 进程与通知进程共用的配置、错误处理、事件模型、Kafka 与重试等基础设施代码。

pub mod config;
pub mod error;
pub mod events;
pub mod kafka;
pub mod observability;
pub mod retry;
