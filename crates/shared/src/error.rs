//! 统一错误处理模块
//!
//! 定义 API 进程与通知进程共用的错误类型，使用 thiserror 提供良好的错误信息。

use rdkafka::error::KafkaError;
use thiserror::Error;

/// 共享基础设施错误
#[derive(Debug, Error)]
pub enum SharedError {
    // ==================== 配置错误 ====================
    #[error("配置加载失败: {0}")]
    Config(#[from] config::ConfigError),

    #[error("参数验证失败: {0}")]
    Validation(String),

    // ==================== Kafka 错误 ====================
    /// 保留 rdkafka 的原始错误，调用方可据此区分超时、无 leader、鉴权失败等情况
    #[error("Kafka 错误: {0}")]
    Kafka(#[from] KafkaError),

    // ==================== 序列化错误 ====================
    #[error("序列化失败: {0}")]
    Serialization(#[from] serde_json::Error),

    // ==================== 通用错误 ====================
    #[error("内部错误: {0}")]
    Internal(String),
}

/// 错误结果类型别名
pub type Result<T> = std::result::Result<T, SharedError>;

impl SharedError {
    /// 获取错误码
    pub fn code(&self) -> &'static str {
        match self {
            Self::Config(_) => "CONFIG_ERROR",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Kafka(_) => "KAFKA_ERROR",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// 是否为可重试错误
    ///
    /// 只有 broker 侧的错误可能随时间恢复；序列化与参数错误重试也不会成功。
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Kafka(_))
    }
}
