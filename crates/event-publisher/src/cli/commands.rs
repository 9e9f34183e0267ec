//! CLI 命令定义
//!
//! 每个子命令对应一种用户事件，`Commands::to_event` 负责把参数组装成 `UserEvent`。

use clap::{Args, Parser, Subcommand};
use notify_shared::events::UserEvent;
use notify_shared::kafka::topics;

/// 用户事件发布工具
#[derive(Parser, Debug)]
#[command(name = "event-publisher")]
#[command(version, about = "向 Kafka 发布用户事件，驱动邮件通知")]
#[command(propagate_version = true)]
pub struct Cli {
    /// 日志级别 (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    pub log_level: String,

    /// Kafka brokers 地址，多个以逗号分隔
    #[arg(long, default_value = "localhost:9092", value_delimiter = ',')]
    pub brokers: Vec<String>,

    /// 目标 topic
    #[arg(long, default_value = topics::USER_EVENTS)]
    pub topic: String,

    /// 分区 key；不指定时由 broker 选择分区
    #[arg(short, long)]
    pub key: Option<String>,

    /// 重复发布次数
    #[arg(short, long, default_value = "1")]
    pub count: usize,

    /// 任一发布失败时以非零状态退出（默认只记录日志）
    #[arg(long)]
    pub strict: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// 用户标识参数，各子命令共用
#[derive(Args, Debug, Clone)]
pub struct UserArgs {
    /// 用户 ID
    #[arg(short, long)]
    pub user_id: i64,

    /// 收件邮箱
    #[arg(short, long)]
    pub email: String,

    /// 用户名
    #[arg(short, long)]
    pub name: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// 注册欢迎邮件，附带激活 token
    Welcome {
        #[command(flatten)]
        user: UserArgs,

        /// 激活 token
        #[arg(short, long)]
        token: String,
    },

    /// 重新发送激活 token
    Activation {
        #[command(flatten)]
        user: UserArgs,

        #[arg(short, long)]
        token: String,
    },

    /// 重置密码 token
    Reset {
        #[command(flatten)]
        user: UserArgs,

        #[arg(short, long)]
        token: String,
    },

    /// 只记录、不发送邮件的事件
    NotifyOnly {
        #[command(flatten)]
        user: UserArgs,

        /// 任务描述，仅用于日志
        #[arg(long)]
        task: String,
    },
}

impl Commands {
    pub fn to_event(&self) -> UserEvent {
        match self {
            Self::Welcome { user, token } => {
                UserEvent::welcome(user.user_id, &user.email, &user.name, token)
            }
            Self::Activation { user, token } => {
                UserEvent::activation(user.user_id, &user.email, &user.name, token)
            }
            Self::Reset { user, token } => {
                UserEvent::password_reset(user.user_id, &user.email, &user.name, token)
            }
            Self::NotifyOnly { user, task } => {
                UserEvent::notify_only(user.user_id, &user.email, &user.name, task)
            }
        }
    }
}
