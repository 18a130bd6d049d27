use log::*;
use sqlx::SqliteConnection;

use crate::{
    sqlite::SqliteStoreError,
    vm_types::{Money, UserId},
};

pub async fn fetch_balance(user_id: UserId, conn: &mut SqliteConnection) -> Result<Option<Money>, SqliteStoreError> {
    let balance = sqlx::query_scalar::<_, Money>("SELECT balance FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_optional(conn)
        .await?;
    Ok(balance)
}

pub async fn create_user(username: &str, balance: Money, conn: &mut SqliteConnection) -> Result<UserId, SqliteStoreError> {
    let id = sqlx::query_scalar::<_, UserId>("INSERT INTO users (username, balance) VALUES ($1, $2) RETURNING id")
        .bind(username)
        .bind(balance)
        .fetch_one(conn)
        .await?;
    debug!("🗃️ User {username} created with id {id} and a balance of {balance}");
    Ok(id)
}

pub async fn set_balance(user_id: UserId, balance: Money, conn: &mut SqliteConnection) -> Result<(), SqliteStoreError> {
    let result = sqlx::query("UPDATE users SET balance = $1 WHERE id = $2").bind(balance).bind(user_id).execute(conn).await?;
    if result.rows_affected() == 0 {
        return Err(SqliteStoreError::UnknownAccount(user_id));
    }
    Ok(())
}

/// Subtracts `amount` from the user's balance. Fails without changing anything if the balance is too low.
pub(crate) async fn debit(user_id: UserId, amount: Money, conn: &mut SqliteConnection) -> Result<(), SqliteStoreError> {
    let result = sqlx::query("UPDATE users SET balance = balance - $1 WHERE id = $2 AND balance >= $1")
        .bind(amount)
        .bind(user_id)
        .execute(&mut *conn)
        .await?;
    if result.rows_affected() == 0 {
        let available = fetch_balance(user_id, conn).await?.ok_or(SqliteStoreError::UnknownAccount(user_id))?;
        return Err(SqliteStoreError::InsufficientBalance { required: amount, available });
    }
    trace!("🗃️ User {user_id} debited {amount}");
    Ok(())
}
