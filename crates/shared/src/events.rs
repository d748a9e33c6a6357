//! 购买事件模型与校验
//!
//! 定义在生产端、Kafka 与消费端之间流转的购买事件，以及两端共用的校验规则。
//! 事件只能通过 [`PurchaseEvent::new`]（生产端）或 [`validate`]（消费端）构造，
//! 不存在半初始化的中间状态。

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{PipelineError, ValidationError};

/// 用户名与用户 ID 的最大字符数
pub const MAX_IDENTIFIER_LEN: usize = 100;

// ---------------------------------------------------------------------------
// PurchaseEvent
// ---------------------------------------------------------------------------

/// 购买事件
///
/// 构造后不可变：字段私有，只暴露只读访问器。序列化字段顺序即线上协议：
/// `username, user_id, item_name, price, timestamp`。
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PurchaseEvent {
    username: String,
    user_id: String,
    item_name: String,
    price: f64,
    timestamp: String,
    /// 由 timestamp 解析而来，仅用于排序，不参与序列化
    #[serde(skip)]
    occurred_at: DateTime<Utc>,
}

impl PurchaseEvent {
    /// 生产端构造事件，时间戳在此刻生成，调用方无法指定
    pub fn new(
        username: &str,
        user_id: &str,
        item_name: &str,
        price: f64,
    ) -> Result<Self, ValidationError> {
        let now = Utc::now();
        let timestamp = now.to_rfc3339_opts(SecondsFormat::Micros, true);
        Self::build(username, user_id, item_name, price, &timestamp)
    }

    fn build(
        username: &str,
        user_id: &str,
        item_name: &str,
        price: f64,
        timestamp: &str,
    ) -> Result<Self, ValidationError> {
        let username = normalize_identifier("username", username)?;
        let user_id = normalize_identifier("user_id", user_id)?;

        if item_name.trim().is_empty() {
            return Err(ValidationError::invalid("item_name", "不能为空"));
        }
        check_price(price)?;
        let occurred_at = parse_timestamp(timestamp)?;

        Ok(Self {
            username,
            user_id,
            item_name: item_name.to_string(),
            price,
            timestamp: timestamp.to_string(),
            occurred_at,
        })
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    /// 用户 ID，同时也是 Kafka 分区键
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn item_name(&self) -> &str {
        &self.item_name
    }

    pub fn price(&self) -> f64 {
        self.price
    }

    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }

    /// 序列化为线上 JSON 字节
    pub fn to_payload(&self) -> Result<Vec<u8>, PipelineError> {
        serde_json::to_vec(self).map_err(|e| PipelineError::Serialization(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// 校验
// ---------------------------------------------------------------------------

/// 从原始字节校验并构造购买事件
///
/// 无状态、无副作用。无法解析为 JSON 对象时返回 [`ValidationError::Malformed`]，
/// 字段缺失或违反规则时返回字段级错误。未知字段被忽略。
pub fn validate(raw: &[u8]) -> Result<PurchaseEvent, ValidationError> {
    let value: Value =
        serde_json::from_slice(raw).map_err(|e| ValidationError::Malformed(e.to_string()))?;
    validate_value(&value)
}

/// 对已解析的 JSON 值执行同一套校验
pub fn validate_value(value: &Value) -> Result<PurchaseEvent, ValidationError> {
    let Value::Object(fields) = value else {
        return Err(ValidationError::Malformed("负载必须是 JSON 对象".to_string()));
    };

    let username = required_str(fields, "username")?;
    let user_id = required_str(fields, "user_id")?;
    let item_name = required_str(fields, "item_name")?;
    let price = match fields.get("price") {
        None | Some(Value::Null) => return Err(ValidationError::MissingField { field: "price" }),
        Some(v) => v
            .as_f64()
            .ok_or_else(|| ValidationError::invalid("price", "必须是数值"))?,
    };
    let timestamp = required_str(fields, "timestamp")?;

    PurchaseEvent::build(username, user_id, item_name, price, timestamp)
}

fn required_str<'a>(
    fields: &'a Map<String, Value>,
    field: &'static str,
) -> Result<&'a str, ValidationError> {
    match fields.get(field) {
        None | Some(Value::Null) => Err(ValidationError::MissingField { field }),
        Some(Value::String(s)) => Ok(s),
        Some(_) => Err(ValidationError::invalid(field, "必须是字符串")),
    }
}

/// 去除首尾空白，拒绝空串与超长标识
fn normalize_identifier(field: &'static str, value: &str) -> Result<String, ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::invalid(field, "不能为空或仅包含空白"));
    }
    if trimmed.chars().count() > MAX_IDENTIFIER_LEN {
        return Err(ValidationError::invalid(
            field,
            format!("长度不能超过 {MAX_IDENTIFIER_LEN} 个字符"),
        ));
    }
    Ok(trimmed.to_string())
}

fn check_price(price: f64) -> Result<(), ValidationError> {
    if !price.is_finite() {
        return Err(ValidationError::invalid("price", "必须是有限数值"));
    }
    if price <= 0.0 {
        return Err(ValidationError::invalid("price", "必须大于 0"));
    }
    Ok(())
}

/// 只接受 UTC 时间（`Z` 或 `+00:00`）
fn parse_timestamp(timestamp: &str) -> Result<DateTime<Utc>, ValidationError> {
    let parsed = DateTime::parse_from_rfc3339(timestamp)
        .map_err(|e| ValidationError::invalid("timestamp", format!("不是合法的 ISO-8601 时间: {e}")))?;

    if parsed.offset().local_minus_utc() != 0 {
        return Err(ValidationError::invalid("timestamp", "必须使用 UTC 时区"));
    }
    Ok(parsed.with_timezone(&Utc))
}

// ---------------------------------------------------------------------------
// DeliveryReceipt / PersistedPurchase
// ---------------------------------------------------------------------------

/// Kafka 投递回执，仅返回给发送方，不单独持久化
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeliveryReceipt {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
}

/// 已持久化的购买记录
///
/// 由存储层独占创建，创建后只读。在事件之外附加存储分配的 ID，
/// 排序使用事件时间戳解析出的 `occurred_at`。
#[derive(Debug, Clone, PartialEq)]
pub struct PersistedPurchase {
    id: String,
    event: PurchaseEvent,
}

impl PersistedPurchase {
    pub fn new(id: impl Into<String>, event: PurchaseEvent) -> Self {
        Self {
            id: id.into(),
            event,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn event(&self) -> &PurchaseEvent {
        &self.event
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        self.event.occurred_at()
    }
}
