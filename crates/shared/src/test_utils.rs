//! 测试工具模块
//!
//! 提供不依赖真实 Kafka 的内存 broker 以及测试数据生成器，
//! 生产者、消费者和端到端测试都基于它运行。

use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, VecDeque};
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::sync::Notify;

use crate::config::CommitPolicy;
use crate::error::PipelineError;
use crate::events::DeliveryReceipt;
use crate::kafka::{BrokerConnector, BrokerSubscriber, ConsumerMessage, RecordSender, RecordSource};

/// 默认分区数
pub const DEFAULT_PARTITIONS: i32 = 3;

/// 可注入的发送故障
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendFault {
    /// 模拟 broker 确认超时
    Timeout,
    /// 模拟 broker 拒绝
    Rejected,
}

/// broker 中保存的一条记录
#[derive(Debug, Clone)]
pub struct BrokerRecord {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: String,
    pub payload: Vec<u8>,
}

#[derive(Default)]
struct BrokerState {
    /// (topic, partition) -> 追加日志
    logs: HashMap<(String, i32), Vec<BrokerRecord>>,
    /// (group, topic, partition) -> 下一条待消费 offset
    committed: HashMap<(String, String, i32), i64>,
    faults: VecDeque<SendFault>,
}

struct BrokerInner {
    partitions: i32,
    reachable: AtomicBool,
    state: Mutex<BrokerState>,
    notify: Notify,
}

/// 内存 broker
///
/// 与 Kafka 保持相同的可观察语义：按 key 哈希选择分区、分区内 offset 单调递增、
/// 消费组提交 offset 后重新订阅从提交位置继续。可切换为不可达并注入发送故障。
#[derive(Clone)]
pub struct InMemoryBroker {
    inner: Arc<BrokerInner>,
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::with_partitions(DEFAULT_PARTITIONS)
    }

    pub fn with_partitions(partitions: i32) -> Self {
        Self {
            inner: Arc::new(BrokerInner {
                partitions: partitions.max(1),
                reachable: AtomicBool::new(true),
                state: Mutex::new(BrokerState::default()),
                notify: Notify::new(),
            }),
        }
    }

    /// 切换 broker 可达性；不可达时连接与订阅失败，发送超时
    pub fn set_reachable(&self, reachable: bool) {
        self.inner.reachable.store(reachable, Ordering::SeqCst);
    }

    /// 让接下来的一次发送以指定故障结束
    pub fn inject_send_fault(&self, fault: SendFault) {
        self.inner.state.lock().faults.push_back(fault);
    }

    /// 相同 key 总是落到同一分区
    pub fn partition_for(&self, key: &str) -> i32 {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() % self.inner.partitions as u64) as i32
    }

    /// 直接向 topic 写入原始负载（绕过生产者，用于构造畸形记录）
    pub fn append_raw(&self, topic: &str, key: &str, payload: impl Into<Vec<u8>>) -> DeliveryReceipt {
        let receipt = self.append(topic, key, payload.into());
        self.inner.notify.notify_waiters();
        receipt
    }

    /// topic 中的全部记录，按分区、offset 排序
    pub fn records(&self, topic: &str) -> Vec<BrokerRecord> {
        let state = self.inner.state.lock();
        let mut records: Vec<BrokerRecord> = state
            .logs
            .iter()
            .filter(|((t, _), _)| t == topic)
            .flat_map(|(_, log)| log.iter().cloned())
            .collect();
        records.sort_by_key(|r| (r.partition, r.offset));
        records
    }

    /// 消费组在某分区上提交的下一条待消费 offset
    pub fn committed_offset(&self, group: &str, topic: &str, partition: i32) -> Option<i64> {
        self.inner
            .state
            .lock()
            .committed
            .get(&(group.to_string(), topic.to_string(), partition))
            .copied()
    }

    /// 为指定 topic 与消费组创建订阅器
    pub fn subscriber(&self, topic: &str, group_id: &str, policy: CommitPolicy) -> InMemorySubscriber {
        InMemorySubscriber {
            inner: Arc::clone(&self.inner),
            topic: topic.to_string(),
            group_id: group_id.to_string(),
            policy,
        }
    }

    fn append(&self, topic: &str, key: &str, payload: Vec<u8>) -> DeliveryReceipt {
        let partition = self.partition_for(key);
        let mut state = self.inner.state.lock();
        let log = state.logs.entry((topic.to_string(), partition)).or_default();
        let offset = log.len() as i64;
        log.push(BrokerRecord {
            topic: topic.to_string(),
            partition,
            offset,
            key: key.to_string(),
            payload,
        });
        DeliveryReceipt {
            topic: topic.to_string(),
            partition,
            offset,
        }
    }

    fn is_reachable(&self) -> bool {
        self.inner.reachable.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BrokerConnector for InMemoryBroker {
    async fn connect(&self) -> Result<Arc<dyn RecordSender>, PipelineError> {
        if !self.is_reachable() {
            return Err(PipelineError::connect("memory", "broker 不可达"));
        }
        Ok(Arc::new(InMemorySender {
            broker: self.clone(),
        }))
    }

    fn bootstrap_servers(&self) -> &str {
        "memory://broker"
    }
}

struct InMemorySender {
    broker: InMemoryBroker,
}

#[async_trait]
impl RecordSender for InMemorySender {
    async fn send(
        &self,
        topic: &str,
        key: &str,
        payload: &[u8],
    ) -> Result<DeliveryReceipt, PipelineError> {
        // 让出一次调度，模拟网络往返
        tokio::task::yield_now().await;

        if !self.broker.is_reachable() {
            return Err(PipelineError::PublishTimeout {
                topic: topic.to_string(),
            });
        }

        let fault = self.broker.inner.state.lock().faults.pop_front();
        match fault {
            Some(SendFault::Timeout) => Err(PipelineError::PublishTimeout {
                topic: topic.to_string(),
            }),
            Some(SendFault::Rejected) => Err(PipelineError::Publish("broker 拒绝了消息".to_string())),
            None => Ok(self.broker.append_raw(topic, key, payload.to_vec())),
        }
    }

    async fn flush(&self, _timeout: Duration) -> Result<(), PipelineError> {
        Ok(())
    }
}

/// 内存 broker 上的订阅器
pub struct InMemorySubscriber {
    inner: Arc<BrokerInner>,
    topic: String,
    group_id: String,
    policy: CommitPolicy,
}

#[async_trait]
impl BrokerSubscriber for InMemorySubscriber {
    async fn subscribe(&self) -> Result<Box<dyn RecordSource>, PipelineError> {
        if !self.inner.reachable.load(Ordering::SeqCst) {
            return Err(PipelineError::connect("memory", "broker 不可达"));
        }

        // 从消费组已提交位置开始，未提交的分区从最早位置开始
        let positions = {
            let state = self.inner.state.lock();
            (0..self.inner.partitions)
                .map(|p| {
                    let key = (self.group_id.clone(), self.topic.clone(), p);
                    (p, state.committed.get(&key).copied().unwrap_or(0))
                })
                .collect()
        };

        Ok(Box::new(InMemoryRecordSource {
            inner: Arc::clone(&self.inner),
            topic: self.topic.clone(),
            group_id: self.group_id.clone(),
            auto_commit: self.policy == CommitPolicy::Auto,
            positions,
        }))
    }
}

struct InMemoryRecordSource {
    inner: Arc<BrokerInner>,
    topic: String,
    group_id: String,
    auto_commit: bool,
    positions: HashMap<i32, i64>,
}

impl InMemoryRecordSource {
    fn poll_once(&mut self) -> Option<ConsumerMessage> {
        let mut state = self.inner.state.lock();
        for partition in 0..self.inner.partitions {
            let position = self.positions.get(&partition).copied().unwrap_or(0);
            let next = state
                .logs
                .get(&(self.topic.clone(), partition))
                .and_then(|log| log.get(position as usize))
                .cloned();

            if let Some(record) = next {
                self.positions.insert(partition, position + 1);
                if self.auto_commit {
                    state.committed.insert(
                        (self.group_id.clone(), self.topic.clone(), partition),
                        position + 1,
                    );
                }
                return Some(ConsumerMessage {
                    topic: record.topic,
                    partition: record.partition,
                    offset: record.offset,
                    key: Some(record.key),
                    payload: record.payload,
                });
            }
        }
        None
    }
}

#[async_trait]
impl RecordSource for InMemoryRecordSource {
    async fn next_record(&mut self) -> Option<Result<ConsumerMessage, PipelineError>> {
        loop {
            // 先注册等待再检查，避免检查与等待之间的写入被遗漏
            let inner = Arc::clone(&self.inner);
            let notified = inner.notify.notified();
            if let Some(msg) = self.poll_once() {
                return Some(Ok(msg));
            }
            notified.await;
        }
    }

    fn commit(&self, msg: &ConsumerMessage) -> Result<(), PipelineError> {
        let mut state = self.inner.state.lock();
        let entry = state
            .committed
            .entry((self.group_id.clone(), msg.topic.clone(), msg.partition))
            .or_insert(0);
        *entry = (*entry).max(msg.offset + 1);
        Ok(())
    }

    fn lag(&self) -> i64 {
        let state = self.inner.state.lock();
        (0..self.inner.partitions)
            .map(|p| {
                let end = state
                    .logs
                    .get(&(self.topic.clone(), p))
                    .map(|log| log.len() as i64)
                    .unwrap_or(0);
                let position = self.positions.get(&p).copied().unwrap_or(0);
                (end - position).max(0)
            })
            .sum()
    }
}

// ==================== 测试数据生成器 ====================

/// 测试数据生成器
pub struct TestDataGenerator;

impl TestDataGenerator {
    /// 合法的购买事件 JSON
    pub fn purchase_json(user_id: &str, item_name: &str, price: f64) -> Value {
        json!({
            "username": format!("{user_id}_name"),
            "user_id": user_id,
            "item_name": item_name,
            "price": price,
            "timestamp": Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Micros, true),
        })
    }

    /// 合法的购买事件负载字节
    pub fn purchase_payload(user_id: &str, item_name: &str, price: f64) -> Vec<u8> {
        Self::purchase_json(user_id, item_name, price)
            .to_string()
            .into_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partition_is_stable_per_key() {
        let broker = InMemoryBroker::new();
        let first = broker.partition_for("user_123");
        for _ in 0..10 {
            assert_eq!(broker.partition_for("user_123"), first);
        }
        assert!((0..DEFAULT_PARTITIONS).contains(&first));
    }

    #[test]
    fn test_offsets_increase_within_partition() {
        let broker = InMemoryBroker::with_partitions(1);
        let a = broker.append_raw("purchases", "u1", b"a".to_vec());
        let b = broker.append_raw("purchases", "u2", b"b".to_vec());
        assert_eq!(a.offset, 0);
        assert_eq!(b.offset, 1);
        assert_eq!(broker.records("purchases").len(), 2);
    }

    #[tokio::test]
    async fn test_unreachable_broker_rejects_connect() {
        let broker = InMemoryBroker::new();
        broker.set_reachable(false);

        assert!(matches!(
            broker.connect().await,
            Err(PipelineError::Connect { .. })
        ));
        let subscriber = broker.subscriber("purchases", "g", CommitPolicy::Auto);
        assert!(subscriber.subscribe().await.is_err());
    }

    #[tokio::test]
    async fn test_injected_fault_applies_once() {
        let broker = InMemoryBroker::new();
        let sender = broker.connect().await.unwrap();
        broker.inject_send_fault(SendFault::Timeout);

        let first = sender.send("purchases", "u1", b"{}").await;
        assert!(matches!(first, Err(PipelineError::PublishTimeout { .. })));

        let second = sender.send("purchases", "u1", b"{}").await;
        assert!(second.is_ok());
    }

    #[tokio::test]
    async fn test_auto_commit_advances_on_receipt() {
        let broker = InMemoryBroker::with_partitions(1);
        broker.append_raw("purchases", "u1", b"x".to_vec());

        let mut source = broker
            .subscriber("purchases", "g", CommitPolicy::Auto)
            .subscribe()
            .await
            .unwrap();
        assert_eq!(source.lag(), 1);

        let msg = source.next_record().await.unwrap().unwrap();
        assert_eq!(msg.offset, 0);
        assert_eq!(source.lag(), 0);
        assert_eq!(broker.committed_offset("g", "purchases", 0), Some(1));
    }

    #[tokio::test]
    async fn test_manual_commit_resumes_from_committed_offset() {
        let broker = InMemoryBroker::with_partitions(1);
        broker.append_raw("purchases", "u1", b"first".to_vec());
        broker.append_raw("purchases", "u1", b"second".to_vec());
        let subscriber = broker.subscriber("purchases", "g", CommitPolicy::AfterPersist);

        let mut source = subscriber.subscribe().await.unwrap();
        let first = source.next_record().await.unwrap().unwrap();
        source.commit(&first).unwrap();
        let _second = source.next_record().await.unwrap().unwrap();
        assert_eq!(broker.committed_offset("g", "purchases", 0), Some(1));
        drop(source);

        let mut resumed = subscriber.subscribe().await.unwrap();
        let msg = resumed.next_record().await.unwrap().unwrap();
        assert_eq!(msg.payload, b"second");
    }
}
