//! 购买事件消费者
//!
//! 状态机 `Stopped -> Starting -> Running -> Stopping -> Stopped`。
//! 每个实例只有一个消费循环，运行在独立的 tokio 任务中，
//! 通过 watch 通道接收停止信号，并在每条记录处理完毕后检查。

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicU8, AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use purchase_shared::config::{CommitPolicy, KafkaConfig};
use purchase_shared::error::PipelineError;
use purchase_shared::events::PersistedPurchase;
use purchase_shared::kafka::{BrokerSubscriber, ConsumerMessage, RecordSource};
use purchase_shared::observability::metrics;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::processor::{PurchaseProcessor, RecordFailure};

/// 消费者生命周期状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum ConsumerState {
    Stopped = 0,
    Starting = 1,
    Running = 2,
    Stopping = 3,
}

impl ConsumerState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Starting,
            2 => Self::Running,
            3 => Self::Stopping,
            _ => Self::Stopped,
        }
    }
}

/// 消费计数，由消费循环写入、统计接口读取
#[derive(Debug, Default)]
pub struct ConsumerCounters {
    processed: AtomicU64,
    failed: AtomicU64,
    lag: AtomicI64,
    last_message_time: Mutex<Option<DateTime<Utc>>>,
}

impl ConsumerCounters {
    fn record_success(&self) {
        self.processed.fetch_add(1, Ordering::Relaxed);
        *self.last_message_time.lock() = Some(Utc::now());
        metrics::record_record_processed();
    }

    fn record_failure(&self, reason: &'static str) {
        self.failed.fetch_add(1, Ordering::Relaxed);
        metrics::record_record_failed(reason);
    }

    fn set_lag(&self, lag: i64) {
        self.lag.store(lag, Ordering::Relaxed);
        metrics::set_consumer_lag(lag);
    }

    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }
}

/// 消费者统计快照
#[derive(Debug, Clone, Serialize)]
pub struct ConsumerStats {
    pub running: bool,
    pub state: ConsumerState,
    pub messages_processed: u64,
    pub messages_failed: u64,
    pub last_message_time: Option<String>,
    pub topic: String,
    pub group_id: String,
    pub commit_policy: CommitPolicy,
    pub lag: i64,
}

struct Worker {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// 购买事件消费者
pub struct EventConsumer {
    subscriber: Arc<dyn BrokerSubscriber>,
    processor: Arc<PurchaseProcessor>,
    topic: String,
    group_id: String,
    commit_policy: CommitPolicy,
    grace_period: Duration,
    state: Arc<AtomicU8>,
    counters: Arc<ConsumerCounters>,
    worker: tokio::sync::Mutex<Option<Worker>>,
}

impl EventConsumer {
    pub fn new(
        subscriber: Arc<dyn BrokerSubscriber>,
        processor: Arc<PurchaseProcessor>,
        config: &KafkaConfig,
    ) -> Self {
        Self {
            subscriber,
            processor,
            topic: config.topic.clone(),
            group_id: config.consumer_group.clone(),
            commit_policy: config.commit_policy,
            grace_period: config.stop_grace_period(),
            state: Arc::new(AtomicU8::new(ConsumerState::Stopped as u8)),
            counters: Arc::new(ConsumerCounters::default()),
            worker: tokio::sync::Mutex::new(None),
        }
    }

    /// 打开订阅并启动消费循环
    ///
    /// broker 不可达时返回 `Connect` 错误，状态回到 `Stopped`。已在运行时直接返回。
    pub async fn start(&self) -> Result<(), PipelineError> {
        let mut worker = self.worker.lock().await;

        if let Some(existing) = worker.as_ref() {
            if !existing.handle.is_finished() {
                return Ok(());
            }
            // 消息流已自行结束，回收旧任务后允许重新启动
            worker.take();
        }

        self.set_state(ConsumerState::Starting);

        let source = match self.subscriber.subscribe().await {
            Ok(source) => source,
            Err(e) => {
                self.set_state(ConsumerState::Stopped);
                error!(error = %e, topic = %self.topic, "消费者启动失败");
                return Err(e);
            }
        };

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(run_loop(
            source,
            shutdown_rx,
            Arc::clone(&self.processor),
            Arc::clone(&self.counters),
            self.commit_policy,
            Arc::clone(&self.state),
        ));

        *worker = Some(Worker {
            shutdown: shutdown_tx,
            handle,
        });
        self.set_state(ConsumerState::Running);

        info!(
            topic = %self.topic,
            group_id = %self.group_id,
            commit_policy = ?self.commit_policy,
            "购买事件消费者已启动"
        );
        Ok(())
    }

    /// 发出停止信号，在宽限期内等待在途记录处理完毕，超时则中止任务
    ///
    /// 已停止时为空操作。
    pub async fn stop(&self) {
        let mut guard = self.worker.lock().await;
        let Some(worker) = guard.take() else {
            return;
        };

        self.set_state(ConsumerState::Stopping);
        let _ = worker.shutdown.send(true);

        let mut handle = worker.handle;
        match tokio::time::timeout(self.grace_period, &mut handle).await {
            Ok(_) => info!(topic = %self.topic, "购买事件消费者已停止"),
            Err(_) => {
                warn!(
                    grace_period_secs = self.grace_period.as_secs(),
                    "消费循环未在宽限期内退出，强制中止"
                );
                handle.abort();
                let _ = handle.await;
            }
        }

        self.set_state(ConsumerState::Stopped);
    }

    pub fn state(&self) -> ConsumerState {
        ConsumerState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub fn is_running(&self) -> bool {
        self.state() == ConsumerState::Running
    }

    /// 最近一次观测到的积压量
    pub fn lag(&self) -> i64 {
        self.counters.lag.load(Ordering::Relaxed)
    }

    pub fn counters(&self) -> &ConsumerCounters {
        &self.counters
    }

    pub fn stats(&self) -> ConsumerStats {
        ConsumerStats {
            running: self.is_running(),
            state: self.state(),
            messages_processed: self.counters.processed(),
            messages_failed: self.counters.failed(),
            last_message_time: self
                .counters
                .last_message_time
                .lock()
                .map(|t| t.to_rfc3339()),
            topic: self.topic.clone(),
            group_id: self.group_id.clone(),
            commit_policy: self.commit_policy,
            lag: self.lag(),
        }
    }

    fn set_state(&self, state: ConsumerState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }
}

/// 消费循环
///
/// 停止信号优先于拉取，保证收到信号后不再开始处理新记录。
async fn run_loop(
    mut source: Box<dyn RecordSource>,
    mut shutdown: watch::Receiver<bool>,
    processor: Arc<PurchaseProcessor>,
    counters: Arc<ConsumerCounters>,
    commit_policy: CommitPolicy,
    state: Arc<AtomicU8>,
) {
    let mut frozen_partitions: HashSet<i32> = HashSet::new();
    counters.set_lag(source.lag());

    loop {
        let next = tokio::select! {
            biased;

            _ = shutdown.changed() => {
                info!("收到停止信号，退出消费循环");
                break;
            }

            next = source.next_record() => next,
        };

        match next {
            Some(Ok(msg)) => {
                let outcome = handle_record(&processor, &counters, &msg).await;
                if commit_policy == CommitPolicy::AfterPersist {
                    commit_after_handling(source.as_ref(), &mut frozen_partitions, &msg, &outcome);
                }
            }
            Some(Err(e)) => {
                warn!(error = %e, "拉取消息出错");
            }
            None => {
                info!("消息流已结束");
                break;
            }
        }

        counters.set_lag(source.lag());

        if *shutdown.borrow() {
            break;
        }
    }

    // 自行退出（消息流结束）时由循环负责把状态复位
    let _ = state.compare_exchange(
        ConsumerState::Running as u8,
        ConsumerState::Stopped as u8,
        Ordering::SeqCst,
        Ordering::SeqCst,
    );
}

/// 处理单条记录并更新计数
///
/// 拆分为独立函数，便于在测试中直接调用而无需启动消费循环。
/// 每条记录恰好计入 processed 或 failed 之一。
pub async fn handle_record(
    processor: &PurchaseProcessor,
    counters: &ConsumerCounters,
    msg: &ConsumerMessage,
) -> Result<PersistedPurchase, RecordFailure> {
    match processor.process(msg).await {
        Ok(persisted) => {
            counters.record_success();
            Ok(persisted)
        }
        Err(failure) => {
            counters.record_failure(failure.reason());
            Err(failure)
        }
    }
}

/// `AfterPersist` 策略下的提交规则
///
/// 最终处理完毕（成功，或格式/规则错误）的记录提交 offset；
/// 持久化失败会冻结该分区后续的提交，重启后从失败记录处重新消费。
fn commit_after_handling(
    source: &dyn RecordSource,
    frozen_partitions: &mut HashSet<i32>,
    msg: &ConsumerMessage,
    outcome: &Result<PersistedPurchase, RecordFailure>,
) {
    if let Err(failure) = outcome
        && !failure.is_terminal()
    {
        if frozen_partitions.insert(msg.partition) {
            warn!(
                partition = msg.partition,
                offset = msg.offset,
                "持久化失败，本次会话内冻结该分区的 offset 提交"
            );
        }
        return;
    }

    if frozen_partitions.contains(&msg.partition) {
        return;
    }

    if let Err(e) = source.commit(msg) {
        warn!(
            error = %e,
            partition = msg.partition,
            offset = msg.offset,
            "提交 offset 失败"
        );
    }
}
