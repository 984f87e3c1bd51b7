//! Position persistence.

use super::text_column;
use crate::error::StoreError;
use crate::stores::PositionStore;
use async_trait::async_trait;
use sniper_domain::entities::{Position, PositionId};
use sniper_domain::enums::PositionStatus;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use std::sync::Arc;

fn position_from_row(row: &PgRow) -> Result<Position, sqlx::Error> {
    Ok(Position {
        id: PositionId(row.try_get("id")?),
        owner: row.try_get("owner")?,
        symbol: row.try_get("symbol")?,
        target_id: row.try_get("target_id")?,
        entry_price: row.try_get("entry_price")?,
        quantity: row.try_get("quantity")?,
        take_profit_price: row.try_get("take_profit_price")?,
        stop_loss_price: row.try_get("stop_loss_price")?,
        status: text_column(row, "status")?,
        entry_time: row.try_get("entry_time")?,
        exit_price: row.try_get("exit_price")?,
        exit_time: row.try_get("exit_time")?,
    })
}

#[derive(Clone)]
pub struct PositionRepository {
    pool: Arc<PgPool>,
}

impl PositionRepository {
    #[must_use]
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PositionStore for PositionRepository {
    async fn insert(&self, position: Position) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO positions (id, owner, symbol, target_id, entry_price, quantity,
                                   take_profit_price, stop_loss_price, status, entry_time)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(position.id.0)
        .bind(&position.owner)
        .bind(&position.symbol)
        .bind(position.target_id)
        .bind(position.entry_price)
        .bind(position.quantity)
        .bind(position.take_profit_price)
        .bind(position.stop_loss_price)
        .bind(position.status.as_str())
        .bind(position.entry_time)
        .execute(self.pool.as_ref())
        .await?;
        Ok(())
    }

    async fn get(&self, id: PositionId) -> Result<Option<Position>, StoreError> {
        let row = sqlx::query("SELECT * FROM positions WHERE id = $1")
            .bind(id.0)
            .fetch_optional(self.pool.as_ref())
            .await?;
        Ok(row.as_ref().map(position_from_row).transpose()?)
    }

    async fn list_open(&self) -> Result<Vec<Position>, StoreError> {
        let rows = sqlx::query("SELECT * FROM positions WHERE status = 'open' ORDER BY entry_time")
            .fetch_all(self.pool.as_ref())
            .await?;
        Ok(rows.iter().map(position_from_row).collect::<Result<_, _>>()?)
    }

    async fn update_guarded(
        &self,
        position: &Position,
        expected: PositionStatus,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE positions SET status = $3, exit_price = $4, exit_time = $5
            WHERE id = $1 AND status = $2
            "#,
        )
        .bind(position.id.0)
        .bind(expected.as_str())
        .bind(position.status.as_str())
        .bind(position.exit_price)
        .bind(position.exit_time)
        .execute(self.pool.as_ref())
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
