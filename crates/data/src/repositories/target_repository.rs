//! Snipe target persistence.

use super::{text_column, u32_column};
use crate::error::StoreError;
use crate::stores::TargetStore;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sniper_domain::entities::{SnipeTarget, TakeProfit};
use sniper_domain::enums::TargetStatus;
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use std::sync::Arc;
use uuid::Uuid;

fn target_from_row(row: &PgRow) -> Result<SnipeTarget, sqlx::Error> {
    let take_profit: Json<TakeProfit> = row.try_get("take_profit")?;
    Ok(SnipeTarget {
        id: row.try_get("id")?,
        owner: row.try_get("owner")?,
        symbol: row.try_get("symbol")?,
        entry_strategy: text_column(row, "entry_strategy")?,
        position_size: row.try_get("position_size")?,
        take_profit: take_profit.0,
        stop_loss_pct: row.try_get("stop_loss_pct")?,
        status: text_column(row, "status")?,
        priority: row.try_get("priority")?,
        confidence_score: row.try_get("confidence_score")?,
        target_execution_time: row.try_get("target_execution_time")?,
        current_retries: u32_column(row, "current_retries")?,
        max_retries: u32_column(row, "max_retries")?,
        risk_level: text_column(row, "risk_level")?,
        error_message: row.try_get("error_message")?,
        executed_at: row.try_get("executed_at")?,
        execution_price: row.try_get("execution_price")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[derive(Clone)]
pub struct TargetRepository {
    pool: Arc<PgPool>,
}

impl TargetRepository {
    #[must_use]
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TargetStore for TargetRepository {
    async fn insert(&self, target: SnipeTarget) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO snipe_targets (id, owner, symbol, entry_strategy, position_size, take_profit,
                                       stop_loss_pct, status, priority, confidence_score,
                                       target_execution_time, current_retries, max_retries,
                                       risk_level, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            "#,
        )
        .bind(target.id)
        .bind(&target.owner)
        .bind(&target.symbol)
        .bind(target.entry_strategy.as_str())
        .bind(target.position_size)
        .bind(Json(target.take_profit))
        .bind(target.stop_loss_pct)
        .bind(target.status.as_str())
        .bind(target.priority)
        .bind(target.confidence_score)
        .bind(target.target_execution_time)
        .bind(target.current_retries as i32)
        .bind(target.max_retries as i32)
        .bind(target.risk_level.as_str())
        .bind(target.created_at)
        .bind(target.updated_at)
        .execute(self.pool.as_ref())
        .await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<SnipeTarget>, StoreError> {
        let row = sqlx::query("SELECT * FROM snipe_targets WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool.as_ref())
            .await?;
        Ok(row.as_ref().map(target_from_row).transpose()?)
    }

    async fn list_by_status(&self, status: TargetStatus) -> Result<Vec<SnipeTarget>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM snipe_targets WHERE status = $1
            ORDER BY priority ASC, target_execution_time ASC NULLS FIRST
            "#,
        )
        .bind(status.as_str())
        .fetch_all(self.pool.as_ref())
        .await?;
        Ok(rows.iter().map(target_from_row).collect::<Result<_, _>>()?)
    }

    async fn find_eligible(
        &self,
        now: DateTime<Utc>,
        advance_window: Duration,
        limit: usize,
    ) -> Result<Vec<SnipeTarget>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM snipe_targets
            WHERE status = 'ready'
              AND current_retries < max_retries
              AND (target_execution_time IS NULL OR target_execution_time <= $1)
            ORDER BY priority ASC, target_execution_time ASC NULLS FIRST
            LIMIT $2
            "#,
        )
        .bind(now + advance_window)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(self.pool.as_ref())
        .await?;
        Ok(rows.iter().map(target_from_row).collect::<Result<_, _>>()?)
    }

    async fn update_guarded(
        &self,
        target: &SnipeTarget,
        expected: TargetStatus,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE snipe_targets SET
                status = $3,
                priority = $4,
                target_execution_time = $5,
                current_retries = $6,
                error_message = $7,
                executed_at = $8,
                execution_price = $9,
                updated_at = NOW()
            WHERE id = $1 AND status = $2
            "#,
        )
        .bind(target.id)
        .bind(expected.as_str())
        .bind(target.status.as_str())
        .bind(target.priority)
        .bind(target.target_execution_time)
        .bind(target.current_retries as i32)
        .bind(target.error_message.as_deref())
        .bind(target.executed_at)
        .bind(target.execution_price)
        .execute(self.pool.as_ref())
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
