//! Append-only execution history.

use crate::error::StoreError;
use crate::stores::HistoryStore;
use async_trait::async_trait;
use sniper_domain::entities::{ExecutionOutcome, ExecutionRecord};
use sniper_domain::enums::{OrderSide, OrderType};
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use std::sync::Arc;

fn record_from_row(row: &PgRow) -> Result<ExecutionRecord, sqlx::Error> {
    let side: String = row.try_get("side")?;
    let order_type: String = row.try_get("order_type")?;
    let outcome: Json<ExecutionOutcome> = row.try_get("outcome")?;
    let latency_ms: i64 = row.try_get("latency_ms")?;
    Ok(ExecutionRecord {
        id: row.try_get("id")?,
        owner: row.try_get("owner")?,
        symbol: row.try_get("symbol")?,
        target_id: row.try_get("target_id")?,
        side: if side == OrderSide::Sell.as_str() { OrderSide::Sell } else { OrderSide::Buy },
        order_type: if order_type == OrderType::Limit.as_str() {
            OrderType::Limit
        } else {
            OrderType::Market
        },
        exchange_order_id: row.try_get("exchange_order_id")?,
        price: row.try_get("price")?,
        quantity: row.try_get("quantity")?,
        quote_amount: row.try_get("quote_amount")?,
        outcome: outcome.0,
        latency_ms: latency_ms.max(0) as u64,
        executed_at: row.try_get("executed_at")?,
    })
}

#[derive(Clone)]
pub struct HistoryRepository {
    pool: Arc<PgPool>,
}

impl HistoryRepository {
    #[must_use]
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl HistoryStore for HistoryRepository {
    async fn append(&self, record: ExecutionRecord) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO execution_history (id, owner, symbol, target_id, side, order_type,
                                           exchange_order_id, price, quantity, quote_amount,
                                           outcome, latency_ms, executed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(record.id)
        .bind(&record.owner)
        .bind(&record.symbol)
        .bind(record.target_id)
        .bind(record.side.as_str())
        .bind(record.order_type.as_str())
        .bind(record.exchange_order_id.as_deref())
        .bind(record.price)
        .bind(record.quantity)
        .bind(record.quote_amount)
        .bind(Json(&record.outcome))
        .bind(i64::try_from(record.latency_ms).unwrap_or(i64::MAX))
        .bind(record.executed_at)
        .execute(self.pool.as_ref())
        .await?;
        Ok(())
    }

    async fn recent(&self, limit: usize) -> Result<Vec<ExecutionRecord>, StoreError> {
        let rows = sqlx::query("SELECT * FROM execution_history ORDER BY executed_at DESC LIMIT $1")
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .fetch_all(self.pool.as_ref())
            .await?;
        Ok(rows.iter().map(record_from_row).collect::<Result<_, _>>()?)
    }
}
