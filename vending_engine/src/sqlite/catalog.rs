use log::*;
use sqlx::SqliteConnection;

use crate::{
    sqlite::SqliteStoreError,
    vm_types::{MachineCode, MachineId, Money, ProductId},
};

pub async fn fetch_price(product_id: ProductId, conn: &mut SqliteConnection) -> Result<Option<Money>, SqliteStoreError> {
    let price = sqlx::query_scalar::<_, Money>("SELECT price FROM products WHERE id = $1")
        .bind(product_id)
        .fetch_optional(conn)
        .await?;
    Ok(price)
}

/// The stock of a product in a machine, or `None` if the machine does not carry the product.
pub async fn fetch_stock(
    machine_id: MachineId,
    product_id: ProductId,
    conn: &mut SqliteConnection,
) -> Result<Option<i64>, SqliteStoreError> {
    let stock = sqlx::query_scalar::<_, i64>("SELECT stock FROM machine_products WHERE machine_id = $1 AND product_id = $2")
        .bind(machine_id)
        .bind(product_id)
        .fetch_optional(conn)
        .await?;
    Ok(stock)
}

pub async fn create_product(name: &str, price: Money, conn: &mut SqliteConnection) -> Result<ProductId, SqliteStoreError> {
    let id = sqlx::query_scalar::<_, ProductId>("INSERT INTO products (name, price) VALUES ($1, $2) RETURNING id")
        .bind(name)
        .bind(price)
        .fetch_one(conn)
        .await?;
    debug!("🗃️ Product {name} created with id {id} at {price}");
    Ok(id)
}

pub async fn create_machine(
    code: &MachineCode,
    location: Option<&str>,
    conn: &mut SqliteConnection,
) -> Result<MachineId, SqliteStoreError> {
    let id = sqlx::query_scalar::<_, MachineId>("INSERT INTO machines (machine_code, location) VALUES ($1, $2) RETURNING id")
        .bind(code.as_str())
        .bind(location)
        .fetch_one(conn)
        .await?;
    debug!("🗃️ Machine {code} created with id {id}");
    Ok(id)
}

pub async fn fetch_machine_id(code: &MachineCode, conn: &mut SqliteConnection) -> Result<Option<MachineId>, SqliteStoreError> {
    let id = sqlx::query_scalar::<_, MachineId>("SELECT id FROM machines WHERE machine_code = $1")
        .bind(code.as_str())
        .fetch_optional(conn)
        .await?;
    Ok(id)
}

/// Deletes a machine and its stock records. Returns false if there was no such machine.
pub async fn delete_machine(code: &MachineCode, conn: &mut SqliteConnection) -> Result<bool, SqliteStoreError> {
    let result = sqlx::query("DELETE FROM machines WHERE machine_code = $1").bind(code.as_str()).execute(conn).await?;
    Ok(result.rows_affected() > 0)
}

/// Sets the stock of a product in a machine, adding the product to the machine if necessary.
pub async fn set_stock(
    machine_id: MachineId,
    product_id: ProductId,
    stock: i64,
    conn: &mut SqliteConnection,
) -> Result<(), SqliteStoreError> {
    sqlx::query(
        r#"
        INSERT INTO machine_products (machine_id, product_id, stock) VALUES ($1, $2, $3)
        ON CONFLICT (machine_id, product_id) DO UPDATE SET stock = excluded.stock
        "#,
    )
    .bind(machine_id)
    .bind(product_id)
    .bind(stock)
    .execute(conn)
    .await?;
    trace!("🗃️ Stock of product {product_id} in machine {machine_id} set to {stock}");
    Ok(())
}

/// Removes `quantity` items from stock. Fails without changing anything if there are not enough.
pub(crate) async fn decrement_stock(
    machine_id: MachineId,
    product_id: ProductId,
    quantity: i64,
    conn: &mut SqliteConnection,
) -> Result<(), SqliteStoreError> {
    let result = sqlx::query(
        "UPDATE machine_products SET stock = stock - $1 WHERE machine_id = $2 AND product_id = $3 AND stock >= $1",
    )
    .bind(quantity)
    .bind(machine_id)
    .bind(product_id)
    .execute(&mut *conn)
    .await?;
    if result.rows_affected() == 0 {
        let available =
            fetch_stock(machine_id, product_id, conn).await?.ok_or(SqliteStoreError::UnknownProduct(product_id))?;
        return Err(SqliteStoreError::InsufficientStock { product_id, requested: quantity, available });
    }
    Ok(())
}
