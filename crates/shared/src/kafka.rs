//! Kafka 基础设施封装
//!
//! 将 rdkafka 的底层 API 封装为管道所需的两组抽象：
//! - 生产侧：[`BrokerConnector`] 建立连接并产出 [`RecordSender`]
//! - 消费侧：[`BrokerSubscriber`] 建立订阅并产出 [`RecordSource`]
//!
//! 生产者与消费者只依赖这些 trait，测试时可替换为内存实现
//! （见 [`crate::test_utils::InMemoryBroker`]）。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use rdkafka::message::{BorrowedMessage, Message};
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::{Offset, TopicPartitionList};
use tracing::{debug, info};

use crate::config::{CommitPolicy, KafkaConfig};
use crate::error::PipelineError;
use crate::events::DeliveryReceipt;

// ---------------------------------------------------------------------------
// ConsumerMessage
// ---------------------------------------------------------------------------

/// 消费到的 Kafka 消息的统一表示
///
/// 将 rdkafka 的 `BorrowedMessage`（带生命周期约束）转换为拥有所有权的结构体，
/// 使消息可以安全地跨 await 点传递给异步处理函数。
#[derive(Debug, Clone)]
pub struct ConsumerMessage {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Option<String>,
    pub payload: Vec<u8>,
}

impl ConsumerMessage {
    fn from_borrowed(msg: &BorrowedMessage<'_>) -> Self {
        let key = msg
            .key()
            .and_then(|k| std::str::from_utf8(k).ok())
            .map(String::from);

        let payload = msg.payload().map(|p| p.to_vec()).unwrap_or_default();

        Self {
            topic: msg.topic().to_string(),
            partition: msg.partition(),
            offset: msg.offset(),
            key,
            payload,
        }
    }

    /// 负载的可读形式，用于日志；非 UTF-8 字节按替换字符显示
    pub fn payload_lossy(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }
}

// ---------------------------------------------------------------------------
// 生产侧抽象
// ---------------------------------------------------------------------------

/// 已建立连接的发送端
#[async_trait]
pub trait RecordSender: Send + Sync {
    /// 发送一条消息并等待 broker 确认
    async fn send(
        &self,
        topic: &str,
        key: &str,
        payload: &[u8],
    ) -> Result<DeliveryReceipt, PipelineError>;

    /// 阻塞直到所有已提交的消息都得到确认
    async fn flush(&self, timeout: Duration) -> Result<(), PipelineError>;
}

/// 负责建立到 broker 的连接
#[async_trait]
pub trait BrokerConnector: Send + Sync {
    /// broker 不可达时必须在有限时间内以 `Connect` 错误返回
    async fn connect(&self) -> Result<Arc<dyn RecordSender>, PipelineError>;

    /// 连接目标描述（用于日志与统计）
    fn bootstrap_servers(&self) -> &str;
}

// ---------------------------------------------------------------------------
// 消费侧抽象
// ---------------------------------------------------------------------------

/// 已建立的订阅，由唯一的消费循环独占
#[async_trait]
pub trait RecordSource: Send {
    /// 拉取下一条记录；`None` 表示消息流已结束
    async fn next_record(&mut self) -> Option<Result<ConsumerMessage, PipelineError>>;

    /// 提交该记录之后的 offset（仅 `CommitPolicy::AfterPersist` 下由消费循环调用）
    fn commit(&self, msg: &ConsumerMessage) -> Result<(), PipelineError>;

    /// 当前积压的记录数，无法获取时返回 0
    fn lag(&self) -> i64;
}

/// 负责在指定消费组下订阅 topic
#[async_trait]
pub trait BrokerSubscriber: Send + Sync {
    async fn subscribe(&self) -> Result<Box<dyn RecordSource>, PipelineError>;
}

// ---------------------------------------------------------------------------
// rdkafka 生产者实现
// ---------------------------------------------------------------------------

/// 基于 rdkafka `FutureProducer` 的连接器
///
/// 使用 `acks=all` 等待全部 ISR 副本确认，gzip 压缩，30 秒请求超时。
pub struct KafkaConnector {
    config: KafkaConfig,
}

impl KafkaConnector {
    pub fn new(config: &KafkaConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }
}

#[async_trait]
impl BrokerConnector for KafkaConnector {
    async fn connect(&self) -> Result<Arc<dyn RecordSender>, PipelineError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &self.config.brokers)
            .set("acks", "all")
            .set("compression.type", "gzip")
            .set("request.timeout.ms", "30000")
            .set(
                "message.timeout.ms",
                self.config.message_timeout_ms.to_string(),
            )
            .create()
            .map_err(|e| PipelineError::connect("kafka", format!("创建生产者失败: {e}")))?;

        // rdkafka 的连接是惰性的，主动拉取一次元数据以确认 broker 可达
        let probe = producer.clone();
        let timeout = self.config.connect_timeout();
        tokio::task::spawn_blocking(move || probe.client().fetch_metadata(None, timeout).map(|_| ()))
            .await
            .map_err(|e| PipelineError::Internal(format!("元数据探测任务失败: {e}")))?
            .map_err(|e| PipelineError::connect("kafka", format!("broker 不可达: {e}")))?;

        info!(brokers = %self.config.brokers, "Kafka 生产者已连接");
        Ok(Arc::new(KafkaRecordSender {
            producer,
            queue_timeout: self.config.message_timeout(),
        }))
    }

    fn bootstrap_servers(&self) -> &str {
        &self.config.brokers
    }
}

struct KafkaRecordSender {
    producer: FutureProducer,
    queue_timeout: Duration,
}

#[async_trait]
impl RecordSender for KafkaRecordSender {
    async fn send(
        &self,
        topic: &str,
        key: &str,
        payload: &[u8],
    ) -> Result<DeliveryReceipt, PipelineError> {
        let record = FutureRecord::to(topic).key(key).payload(payload);

        let delivery = self
            .producer
            .send(record, self.queue_timeout)
            .await
            .map_err(|(e, _)| classify_send_error(topic, &e))?;

        debug!(
            topic,
            key,
            partition = delivery.partition,
            offset = delivery.offset,
            "消息已确认"
        );
        Ok(DeliveryReceipt {
            topic: topic.to_string(),
            partition: delivery.partition,
            offset: delivery.offset,
        })
    }

    async fn flush(&self, timeout: Duration) -> Result<(), PipelineError> {
        let producer = self.producer.clone();
        tokio::task::spawn_blocking(move || producer.flush(timeout))
            .await
            .map_err(|e| PipelineError::Internal(format!("flush 任务失败: {e}")))?
            .map_err(|e| classify_send_error("*", &e))
    }
}

/// 将 rdkafka 错误映射为发送超时或一般发送失败
fn classify_send_error(topic: &str, err: &KafkaError) -> PipelineError {
    match err.rdkafka_error_code() {
        Some(
            RDKafkaErrorCode::MessageTimedOut
            | RDKafkaErrorCode::RequestTimedOut
            | RDKafkaErrorCode::OperationTimedOut
            | RDKafkaErrorCode::QueueFull,
        ) => PipelineError::PublishTimeout {
            topic: topic.to_string(),
        },
        _ => PipelineError::Publish(err.to_string()),
    }
}

// ---------------------------------------------------------------------------
// rdkafka 消费者实现
// ---------------------------------------------------------------------------

/// 基于 rdkafka `StreamConsumer` 的订阅器
///
/// `CommitPolicy::Auto` 时开启 `enable.auto.commit`，offset 与处理结果无关地推进；
/// `CommitPolicy::AfterPersist` 时关闭自动提交，由消费循环显式提交。
pub struct KafkaSubscriber {
    config: KafkaConfig,
}

impl KafkaSubscriber {
    pub fn new(config: &KafkaConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }
}

#[async_trait]
impl BrokerSubscriber for KafkaSubscriber {
    async fn subscribe(&self) -> Result<Box<dyn RecordSource>, PipelineError> {
        let auto_commit = self.config.commit_policy == CommitPolicy::Auto;

        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &self.config.brokers)
            .set("group.id", &self.config.consumer_group)
            .set("auto.offset.reset", &self.config.auto_offset_reset)
            .set("enable.auto.commit", auto_commit.to_string())
            .set(
                "session.timeout.ms",
                self.config.session_timeout_ms.to_string(),
            )
            .set(
                "heartbeat.interval.ms",
                self.config.heartbeat_interval_ms.to_string(),
            )
            .set("enable.partition.eof", "false")
            .create()
            .map_err(|e| PipelineError::connect("kafka", format!("创建消费者失败: {e}")))?;
        let consumer = Arc::new(consumer);

        let probe = Arc::clone(&consumer);
        let timeout = self.config.connect_timeout();
        tokio::task::spawn_blocking(move || probe.fetch_metadata(None, timeout).map(|_| ()))
            .await
            .map_err(|e| PipelineError::Internal(format!("元数据探测任务失败: {e}")))?
            .map_err(|e| PipelineError::connect("kafka", format!("broker 不可达: {e}")))?;

        consumer
            .subscribe(&[self.config.topic.as_str()])
            .map_err(|e| PipelineError::connect("kafka", format!("订阅 topic 失败: {e}")))?;

        info!(
            brokers = %self.config.brokers,
            topic = %self.config.topic,
            group_id = %self.config.consumer_group,
            auto_commit,
            "已订阅 Kafka topic"
        );

        Ok(Box::new(KafkaRecordSource { consumer }))
    }
}

struct KafkaRecordSource {
    consumer: Arc<StreamConsumer>,
}

#[async_trait]
impl RecordSource for KafkaRecordSource {
    async fn next_record(&mut self) -> Option<Result<ConsumerMessage, PipelineError>> {
        let result = match self.consumer.recv().await {
            Ok(borrowed) => Ok(ConsumerMessage::from_borrowed(&borrowed)),
            Err(e) => Err(PipelineError::Kafka(format!("接收消息出错: {e}"))),
        };
        Some(result)
    }

    fn commit(&self, msg: &ConsumerMessage) -> Result<(), PipelineError> {
        let mut tpl = TopicPartitionList::new();
        tpl.add_partition_offset(&msg.topic, msg.partition, Offset::Offset(msg.offset + 1))
            .map_err(|e| PipelineError::Kafka(format!("构造提交列表失败: {e}")))?;
        self.consumer
            .commit(&tpl, CommitMode::Async)
            .map_err(|e| PipelineError::Kafka(format!("提交 offset 失败: {e}")))
    }

    // StreamConsumer 不直接暴露高水位，查询需要阻塞的网络往返，这里返回占位值
    fn lag(&self) -> i64 {
        0
    }
}

// ---------------------------------------------------------------------------
// 测试
// ---------------------------------------------------------------------------
