use chrono::{DateTime, Utc};
use log::*;
use sqlx::{FromRow, SqliteConnection};

use crate::{
    sqlite::SqliteStoreError,
    vm_types::{CorrelationToken, DurableOrderId, MachineId, Money, PricedLine, ProductId, ReconciledOrder, Settlement, UserId},
};

#[derive(Debug, FromRow)]
struct OrderRow {
    id: DurableOrderId,
    correlation_token: String,
    user_id: UserId,
    machine_id: MachineId,
    total_amount: Money,
    settled_at: DateTime<Utc>,
}

#[derive(Debug, FromRow)]
struct OrderItemRow {
    product_id: ProductId,
    quantity: i64,
    unit_price: Money,
}

impl From<OrderItemRow> for PricedLine {
    fn from(row: OrderItemRow) -> Self {
        PricedLine { product_id: row.product_id, quantity: row.quantity, unit_price: row.unit_price }
    }
}

/// Inserts an order and its lines. This is not atomic. Run it inside a transaction alongside the stock and balance
/// updates, passing `&mut *tx` as the connection.
pub(crate) async fn insert_order(
    settlement: &Settlement,
    settled_at: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<DurableOrderId, SqliteStoreError> {
    let id = sqlx::query_scalar::<_, DurableOrderId>(
        r#"
            INSERT INTO orders (correlation_token, user_id, machine_id, total_amount, settled_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id;
        "#,
    )
    .bind(settlement.token.as_str())
    .bind(settlement.user_id)
    .bind(settlement.machine_id)
    .bind(settlement.total)
    .bind(settled_at)
    .fetch_one(&mut *conn)
    .await?;
    for line in &settlement.lines {
        sqlx::query("INSERT INTO order_items (order_id, product_id, quantity, unit_price) VALUES ($1, $2, $3, $4)")
            .bind(id)
            .bind(line.product_id)
            .bind(line.quantity)
            .bind(line.unit_price)
            .execute(&mut *conn)
            .await?;
    }
    debug!("🗃️ Order #{id} for {} has been saved in the DB", settlement.token);
    Ok(id)
}

/// Returns the order settled under `token`, along with its lines.
pub async fn fetch_order_by_token(
    token: &CorrelationToken,
    conn: &mut SqliteConnection,
) -> Result<Option<ReconciledOrder>, SqliteStoreError> {
    let row = sqlx::query_as::<_, OrderRow>(
        r#"
            SELECT id, correlation_token, user_id, machine_id, total_amount, settled_at
            FROM orders
            WHERE correlation_token = $1
        "#,
    )
    .bind(token.as_str())
    .fetch_optional(&mut *conn)
    .await?;
    let Some(row) = row else {
        return Ok(None);
    };
    let lines = sqlx::query_as::<_, OrderItemRow>(
        "SELECT product_id, quantity, unit_price FROM order_items WHERE order_id = $1 ORDER BY id ASC",
    )
    .bind(row.id)
    .fetch_all(conn)
    .await?
    .into_iter()
    .map(PricedLine::from)
    .collect();
    let token = row
        .correlation_token
        .parse::<CorrelationToken>()
        .map_err(|e| SqliteStoreError::QueryError(format!("Order #{} has an invalid token. {e}", row.id)))?;
    trace!("🗃️ Order #{} found for {token}", row.id);
    Ok(Some(ReconciledOrder {
        order_id: row.id,
        token,
        user_id: row.user_id,
        machine_id: row.machine_id,
        lines,
        total: row.total_amount,
        settled_at: row.settled_at,
    }))
}

pub async fn count_orders(conn: &mut SqliteConnection) -> Result<i64, SqliteStoreError> {
    let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM orders").fetch_one(conn).await?;
    Ok(count)
}
