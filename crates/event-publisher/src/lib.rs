//! 用户事件发布工具
//!
//! 以命令行方式扮演 API 进程的生产者角色：构造用户事件并发布到 Kafka，
//! 用于联调邮件通知链路。

pub mod cli;
