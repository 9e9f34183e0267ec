//! 邮件通知链路端到端测试
//!
//! 需要本地可访问的 Kafka（默认 localhost:9092，可通过 KAFKA_BROKERS 覆盖）。
//! 邮件服务商替换为内存记录器，其余组件（生产者、消费者池、处理器、模板）均为真实实现。
//!
//! ```bash
//! cargo test --test e2e -- --ignored
//! ```

pub mod helpers;
pub mod suites;
