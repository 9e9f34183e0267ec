//! 配置管理模块
//!
//! 支持多格式配置文件加载，环境变量覆盖，以及类型安全的配置访问。
//! Broker 地址、topic、消费组等全部经由 `AppConfig` 显式传递，不使用进程级全局变量。

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;

use crate::error::SharedError;

/// Kafka 连接配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct KafkaConfig {
    pub brokers: Vec<String>,
    /// 消费者会话超时，超过该时间未收到心跳即触发 rebalance
    pub session_timeout_ms: u64,
    /// 自动提交间隔；worker 只负责 store offset，真正的提交由客户端按此间隔完成
    pub auto_commit_interval_ms: u64,
    pub auto_offset_reset: String,
    /// 生产者等待 broker 确认的上限
    pub message_timeout_ms: u64,
}

impl Default for KafkaConfig {
    fn default() -> Self {
        Self {
            brokers: vec!["localhost:9092".to_string()],
            session_timeout_ms: 7000,
            auto_commit_interval_ms: 5000,
            auto_offset_reset: "earliest".to_string(),
            message_timeout_ms: 5000,
        }
    }
}

impl KafkaConfig {
    /// rdkafka 需要逗号分隔的 broker 列表
    pub fn bootstrap_servers(&self) -> String {
        self.brokers.join(",")
    }
}

/// 邮件消费者池配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ConsumerConfig {
    pub topic: String,
    pub consumer_group: String,
    pub consumer_count: usize,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            topic: crate::kafka::topics::USER_EVENTS.to_string(),
            consumer_group: "notification-mailer".to_string(),
            consumer_count: 3,
        }
    }
}

/// 邮件发送配置
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct MailerConfig {
    pub api_key: String,
    pub sender: String,
    pub api_url: String,
    pub templates_dir: String,
    pub max_attempts: u32,
    pub retry_delay_ms: u64,
    pub request_timeout_ms: u64,
    /// 开启后同名模板只解析一次，渲染结果与逐次加载一致
    pub cache_templates: bool,
    /// 是否对收件人地址无效等永久性失败也执行重试
    pub retry_permanent_failures: bool,
}

impl Default for MailerConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            sender: "noreply@movies.local".to_string(),
            api_url: "https://api.mailersend.com/v1/email".to_string(),
            templates_dir: "templates".to_string(),
            max_attempts: 3,
            retry_delay_ms: 1500,
            request_timeout_ms: 5000,
            cache_templates: false,
            retry_permanent_failures: true,
        }
    }
}

// api_key 属于凭据，Debug 输出时脱敏，避免被日志带出
impl std::fmt::Debug for MailerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MailerConfig")
            .field("api_key", &"***")
            .field("sender", &self.sender)
            .field("api_url", &self.api_url)
            .field("templates_dir", &self.templates_dir)
            .field("max_attempts", &self.max_attempts)
            .field("retry_delay_ms", &self.retry_delay_ms)
            .field("request_timeout_ms", &self.request_timeout_ms)
            .field("cache_templates", &self.cache_templates)
            .field("retry_permanent_failures", &self.retry_permanent_failures)
            .finish()
    }
}

/// 可观测性配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub log_level: String,
    /// 日志输出格式：json（结构化）或 pretty（人类可读）
    pub log_format: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
        }
    }
}

impl ObservabilityConfig {
    pub fn json_logs(&self) -> bool {
        self.log_format.eq_ignore_ascii_case("json")
    }
}

/// 应用配置
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub service_name: String,
    pub environment: String,
    pub kafka: KafkaConfig,
    pub consumer: ConsumerConfig,
    pub mailer: MailerConfig,
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    /// 从配置文件和环境变量加载配置
    ///
    /// 加载顺序（后加载的会覆盖先加载的同名配置项）：
    /// 1. config/default.toml（默认配置）
    /// 2. config/{environment}.toml（环境特定配置）
    /// 3. config/{service_name}.toml（服务特定配置）
    /// 4. 环境变量（NOTIFY_ 前缀，双下划线分层，如 NOTIFY_KAFKA__BROKERS -> kafka.brokers）
    pub fn load(service_name: &str) -> Result<Self, ConfigError> {
        // .env 仅用于本地开发，不存在时忽略
        let _ = dotenvy::dotenv();

        let env = std::env::var("NOTIFY_ENV").unwrap_or_else(|_| "development".to_string());
        let config_dir = std::env::var("CONFIG_DIR").unwrap_or_else(|_| "config".to_string());

        let builder = Config::builder()
            .set_default("service_name", service_name)?
            .set_default("environment", env.clone())?
            .add_source(File::from(Path::new(&config_dir).join("default.toml")).required(false))
            .add_source(
                File::from(Path::new(&config_dir).join(format!("{}.toml", env))).required(false),
            )
            .add_source(
                File::from(Path::new(&config_dir).join(format!("{}.toml", service_name)))
                    .required(false),
            )
            .add_source(
                Environment::with_prefix("NOTIFY")
                    .prefix_separator("_")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("kafka.brokers")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// 启动前校验，配置错误时尽早失败而不是在运行中暴露
    pub fn validate(&self) -> Result<(), SharedError> {
        if self.kafka.brokers.iter().all(|b| b.trim().is_empty()) {
            return Err(SharedError::Validation(
                "kafka.brokers 不能为空".to_string(),
            ));
        }
        if self.consumer.topic.trim().is_empty() {
            return Err(SharedError::Validation(
                "consumer.topic 不能为空".to_string(),
            ));
        }
        if self.consumer.consumer_group.trim().is_empty() {
            return Err(SharedError::Validation(
                "consumer.consumer_group 不能为空".to_string(),
            ));
        }
        if self.consumer.consumer_count == 0 {
            return Err(SharedError::Validation(
                "consumer.consumer_count 必须大于 0".to_string(),
            ));
        }
        if self.mailer.max_attempts == 0 {
            return Err(SharedError::Validation(
                "mailer.max_attempts 必须大于 0".to_string(),
            ));
        }
        Ok(())
    }

    /// 是否为生产环境
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}
