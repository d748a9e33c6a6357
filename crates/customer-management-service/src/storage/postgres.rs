//! PostgreSQL 存储
//!
//! 首次连接时创建 `purchases` 表及 user_id、事件时间两个索引。
//! 查询按事件时间倒序，同一时间以自增序号倒序。

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use purchase_shared::config::StorageConfig;
use purchase_shared::error::{PipelineError, Result};
use purchase_shared::events::{PersistedPurchase, PurchaseEvent, validate_value};
use serde_json::json;
use sqlx::FromRow;
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::{info, instrument};
use uuid::Uuid;

use super::PurchaseStore;

const SCHEMA: [&str; 3] = [
    r#"
    CREATE TABLE IF NOT EXISTS purchases (
        seq             BIGSERIAL PRIMARY KEY,
        id              UUID NOT NULL UNIQUE,
        username        TEXT NOT NULL,
        user_id         TEXT NOT NULL,
        item_name       TEXT NOT NULL,
        price           DOUBLE PRECISION NOT NULL,
        event_timestamp TEXT NOT NULL,
        occurred_at     TIMESTAMPTZ NOT NULL,
        created_at      TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_purchases_user_id ON purchases (user_id)",
    "CREATE INDEX IF NOT EXISTS idx_purchases_occurred_at ON purchases (occurred_at DESC)",
];

/// 数据库行映射结构
#[derive(FromRow)]
struct PurchaseRow {
    id: Uuid,
    username: String,
    user_id: String,
    item_name: String,
    price: f64,
    event_timestamp: String,
}

impl PurchaseRow {
    /// 通过共享校验重建事件，库中数据与线上协议走同一套规则
    fn into_persisted(self) -> Result<PersistedPurchase> {
        let event = validate_value(&json!({
            "username": self.username,
            "user_id": self.user_id,
            "item_name": self.item_name,
            "price": self.price,
            "timestamp": self.event_timestamp,
        }))
        .map_err(|e| PipelineError::Storage(format!("记录 {} 已损坏: {e}", self.id)))?;
        Ok(PersistedPurchase::new(self.id.to_string(), event))
    }
}

/// PostgreSQL 购买记录存储
#[derive(Clone)]
pub struct PgPurchaseStore {
    pool: PgPool,
}

impl PgPurchaseStore {
    /// 创建连接池并确保表结构存在
    #[instrument(skip(config))]
    pub async fn connect(config: &StorageConfig) -> Result<Self> {
        info!("Connecting to database...");

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_seconds))
            .connect(&config.url)
            .await
            .map_err(|e| PipelineError::connect("postgres", e.to_string()))?;

        let store = Self { pool };
        store.ensure_schema().await?;

        info!("Database connection pool created");
        Ok(store)
    }

    pub async fn ensure_schema(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(storage_error)?;
        }
        Ok(())
    }
}

fn storage_error(err: sqlx::Error) -> PipelineError {
    PipelineError::Storage(err.to_string())
}

#[async_trait]
impl PurchaseStore for PgPurchaseStore {
    async fn save(&self, event: &PurchaseEvent) -> Result<String> {
        let id = Uuid::now_v7();
        let occurred_at: DateTime<Utc> = event.occurred_at();

        sqlx::query(
            r#"
            INSERT INTO purchases (
                id, username, user_id, item_name, price, event_timestamp, occurred_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(id)
        .bind(event.username())
        .bind(event.user_id())
        .bind(event.item_name())
        .bind(event.price())
        .bind(event.timestamp())
        .bind(occurred_at)
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;

        Ok(id.to_string())
    }

    async fn query_by_user(&self, user_id: &str) -> Result<Vec<PersistedPurchase>> {
        let rows = sqlx::query_as::<_, PurchaseRow>(
            r#"
            SELECT id, username, user_id, item_name, price, event_timestamp
            FROM purchases
            WHERE user_id = $1
            ORDER BY occurred_at DESC, seq DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_error)?;

        rows.into_iter().map(PurchaseRow::into_persisted).collect()
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(storage_error)
    }

    async fn close(&self) {
        self.pool.close().await;
        info!("Database connection pool closed");
    }
}
