//! 邮件通知链路测试套件
//!
//! 生产者发布用户事件 -> 消费者池拉取 -> 处理器解码 -> 模板渲染 -> 服务商投递。

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use notification_worker::handler::SendEmailHandler;
use notification_worker::mailer::Mailer;
use notification_worker::pool::ConsumerPool;
use notification_worker::templates::TemplateRenderer;
use notify_shared::config::ConsumerConfig;
use notify_shared::events::UserEvent;
use notify_shared::kafka::{EventPublisher, KafkaConsumer, KafkaProducer};

use crate::helpers::*;

fn templates_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("crates/notification-worker/templates")
}

async fn start_pool(
    kafka: &KafkaHelper,
    topic: &str,
    group: &str,
    workers: usize,
    provider: RecordingProvider,
) -> ConsumerPool<KafkaConsumer> {
    let mailer = Mailer::new(
        TemplateRenderer::new(templates_dir()),
        Arc::new(provider),
        "noreply@movies.local",
    );
    let handler = Arc::new(SendEmailHandler::new(Arc::new(mailer)));

    ConsumerPool::start_kafka(
        handler,
        &kafka.kafka_config(),
        &ConsumerConfig {
            topic: topic.to_string(),
            consumer_group: group.to_string(),
            consumer_count: workers,
        },
    )
    .await
    .unwrap()
}

#[cfg(test)]
mod notification_flow_tests {
    use super::*;

    /// 注册欢迎事件最终变成一封发给用户的邮件
    #[tokio::test]
    #[ignore = "需要运行 Kafka"]
    async fn test_welcome_event_delivers_one_mail() {
        let kafka = KafkaHelper::new().unwrap();
        let topic = kafka.create_topic("user-events", 3).await.unwrap();
        let group = kafka.unique_group("notification-mailer");
        let provider = RecordingProvider::default();

        let pool = start_pool(&kafka, &topic, &group, 3, provider.clone()).await;

        let producer = KafkaProducer::new(&kafka.kafka_config()).unwrap();
        let event = UserEvent {
            user_id: 7,
            email: "a@b.com".to_string(),
            name: "A".to_string(),
            token: "TOK123".to_string(),
            template_name: Some("user_welcome.html".to_string()),
            task: "welcome".to_string(),
        };
        producer
            .publish(&event, &topic, None, Utc::now())
            .await
            .unwrap();

        let mails = provider.wait_for(1, Duration::from_secs(30)).await;
        pool.stop().await.unwrap();

        assert_eq!(mails.len(), 1, "应该恰好发送一封邮件");
        let mail = &mails[0];
        assert_eq!(mail.recipient(), "a@b.com");
        assert!(!mail.subject.is_empty());
        assert!(mail.text.contains("TOK123"));
        assert!(mail.html.contains("TOK123"));
    }

    /// 格式错误和无需发邮件的事件不会阻塞后续消息
    #[tokio::test]
    #[ignore = "需要运行 Kafka"]
    async fn test_bad_and_notify_only_events_are_skipped() {
        let kafka = KafkaHelper::new().unwrap();
        let topic = kafka.create_topic("user-events", 1).await.unwrap();
        let group = kafka.unique_group("notification-mailer");
        let provider = RecordingProvider::default();

        let pool = start_pool(&kafka, &topic, &group, 1, provider.clone()).await;
        let producer = KafkaProducer::new(&kafka.kafka_config()).unwrap();

        kafka.send_raw(&topic, b"{not json}").await.unwrap();
        kafka
            .send_raw(
                &topic,
                br#"{"user_id":1,"email":"x@y.z","name":"X","token":"t","task":"t","priority":1}"#,
            )
            .await
            .unwrap();
        producer
            .publish(
                &UserEvent::notify_only(3, "c@d.com", "C", "profile updated"),
                &topic,
                None,
                Utc::now(),
            )
            .await
            .unwrap();
        producer
            .publish(
                &UserEvent::password_reset(7, "a@b.com", "A", "RESET1"),
                &topic,
                Some(b"user-7"),
                Utc::now(),
            )
            .await
            .unwrap();

        let mails = provider.wait_for(1, Duration::from_secs(30)).await;
        // 多等一会，确认没有多余的邮件
        tokio::time::sleep(Duration::from_secs(2)).await;
        pool.stop().await.unwrap();

        let mails_after = provider.mails();
        assert_eq!(mails.len(), 1);
        assert_eq!(mails_after.len(), 1);
        assert_eq!(mails_after[0].recipient(), "a@b.com");
        assert!(mails_after[0].text.contains("RESET1"));
    }

    /// 停止时提交的 offset 在同组重启后不会被重复消费
    #[tokio::test]
    #[ignore = "需要运行 Kafka"]
    async fn test_restart_resumes_after_committed_offset() {
        let kafka = KafkaHelper::new().unwrap();
        let topic = kafka.create_topic("user-events", 1).await.unwrap();
        let group = kafka.unique_group("notification-mailer");
        let producer = KafkaProducer::new(&kafka.kafka_config()).unwrap();

        let first = RecordingProvider::default();
        let pool = start_pool(&kafka, &topic, &group, 1, first.clone()).await;
        producer
            .publish(
                &UserEvent::activation(7, "a@b.com", "A", "FIRST"),
                &topic,
                None,
                Utc::now(),
            )
            .await
            .unwrap();
        assert_eq!(first.wait_for(1, Duration::from_secs(30)).await.len(), 1);
        pool.stop().await.unwrap();

        let second = RecordingProvider::default();
        let pool = start_pool(&kafka, &topic, &group, 1, second.clone()).await;
        producer
            .publish(
                &UserEvent::activation(7, "a@b.com", "A", "SECOND"),
                &topic,
                None,
                Utc::now(),
            )
            .await
            .unwrap();

        second.wait_for(1, Duration::from_secs(30)).await;
        tokio::time::sleep(Duration::from_secs(2)).await;
        pool.stop().await.unwrap();

        let mails = second.mails();
        assert_eq!(mails.len(), 1, "已提交的消息不应重复投递");
        assert!(mails[0].text.contains("SECOND"));
    }
}
