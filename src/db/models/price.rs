//! Append-only price ledger rows.
//!
//! Rows are never updated except for `is_active`. Amounts are stored as TEXT
//! and parsed into `Decimal` on the way out.

use std::str::FromStr;

use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::{FromRow, SqliteExecutor};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Price {
    pub id: String,
    pub product_id: String,
    pub amount: Decimal,
    pub is_active: bool,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(FromRow)]
struct PriceRow {
    id: String,
    product_id: String,
    amount: String,
    is_active: bool,
    created_at: String,
    updated_at: String,
}

impl TryFrom<PriceRow> for Price {
    type Error = sqlx::Error;

    fn try_from(row: PriceRow) -> Result<Self, Self::Error> {
        let amount = Decimal::from_str(&row.amount).map_err(|e| sqlx::Error::ColumnDecode {
            index: "amount".to_string(),
            source: Box::new(e),
        })?;
        Ok(Price {
            id: row.id,
            product_id: row.product_id,
            amount,
            is_active: row.is_active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

impl Price {
    pub async fn insert<'e, E>(db: E, product_id: &str, amount: Decimal) -> Result<Price, sqlx::Error>
    where
        E: SqliteExecutor<'e>,
    {
        let id = uuid::Uuid::new_v4().to_string();
        let now = crate::db::now();

        let row: PriceRow = sqlx::query_as(
            r#"
            INSERT INTO prices (id, product_id, amount, is_active, created_at, updated_at)
            VALUES (?, ?, ?, 1, ?, ?)
            RETURNING id, product_id, amount, is_active, created_at, updated_at
            "#,
        )
        .bind(&id)
        .bind(product_id)
        .bind(amount.to_string())
        .bind(&now)
        .bind(&now)
        .fetch_one(db)
        .await?;
        row.try_into()
    }

    pub async fn get_by_id<'e, E>(db: E, id: &str) -> Result<Option<Price>, sqlx::Error>
    where
        E: SqliteExecutor<'e>,
    {
        let row: Option<PriceRow> = sqlx::query_as("SELECT * FROM prices WHERE id = ?")
            .bind(id)
            .fetch_optional(db)
            .await?;
        row.map(Price::try_from).transpose()
    }

    /// Most recent active row for a product. Rows created within the same
    /// microsecond fall back to insertion order.
    pub async fn latest_active<'e, E>(db: E, product_id: &str) -> Result<Option<Price>, sqlx::Error>
    where
        E: SqliteExecutor<'e>,
    {
        let row: Option<PriceRow> = sqlx::query_as(
            r#"
            SELECT * FROM prices
            WHERE product_id = ? AND is_active = 1
            ORDER BY created_at DESC, rowid DESC
            LIMIT 1
            "#,
        )
        .bind(product_id)
        .fetch_optional(db)
        .await?;
        row.map(Price::try_from).transpose()
    }

    /// Full history for a product, newest first
    pub async fn list_for_product<'e, E>(db: E, product_id: &str) -> Result<Vec<Price>, sqlx::Error>
    where
        E: SqliteExecutor<'e>,
    {
        let rows: Vec<PriceRow> = sqlx::query_as(
            "SELECT * FROM prices WHERE product_id = ? ORDER BY created_at DESC, rowid DESC",
        )
        .bind(product_id)
        .fetch_all(db)
        .await?;
        rows.into_iter().map(Price::try_from).collect()
    }

    pub async fn set_active<'e, E>(db: E, id: &str, is_active: bool) -> Result<Option<Price>, sqlx::Error>
    where
        E: SqliteExecutor<'e>,
    {
        let row: Option<PriceRow> = sqlx::query_as(
            r#"
            UPDATE prices SET is_active = ?, updated_at = ?
            WHERE id = ?
            RETURNING id, product_id, amount, is_active, created_at, updated_at
            "#,
        )
        .bind(is_active)
        .bind(crate::db::now())
        .bind(id)
        .fetch_optional(db)
        .await?;
        row.map(Price::try_from).transpose()
    }
}
