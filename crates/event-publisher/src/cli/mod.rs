//! CLI 模块
//!
//! - `welcome` - 注册欢迎邮件（附激活 token）
//! - `activation` - 重新发送激活 token
//! - `reset` - 重置密码 token
//! - `notify-only` - 只记录、不发邮件的事件
//!
//! # 使用示例
//!
//! ```bash
//! event-publisher welcome -u 7 -e a@b.com -n A -t TOK123
//! event-publisher --brokers k1:9092,k2:9092 --count 5 reset -u 7 -e a@b.com -n A -t RESET1
//! event-publisher --strict notify-only -u 7 -e a@b.com -n A --task "profile updated"
//! ```

pub mod commands;
pub mod runner;

pub use commands::{Cli, Commands};
pub use runner::{CommandRunner, PublishSummary};
