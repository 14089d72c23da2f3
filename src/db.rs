use chrono::Datelike;
use sqlx::SqlitePool;

use crate::{
    authorize::{self, Decision, REASON_INSUFFICIENT_BALANCE},
    errors::AppError,
    structs::{Account, Card, Transaction, User},
};

pub async fn find_user_by_name(pool: &SqlitePool, name: &str) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE name = $1")
        .bind(name)
        .fetch_optional(pool)
        .await
}

pub async fn get_user_by_id(pool: &SqlitePool, id: i64) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
}

/// Creates a user and its zero-balance account in one database transaction.
/// A duplicate name fails on the unique constraint and leaves nothing behind.
pub async fn register_account(pool: &SqlitePool, name: &str) -> Result<(User, Account), AppError> {
    let created_at = chrono::Utc::now().to_string();
    let mut tx = pool.begin().await?;
    let user =
        sqlx::query_as::<_, User>("INSERT INTO users (name, created_at) VALUES ($1, $2) RETURNING *")
            .bind(name)
            .bind(&created_at)
            .fetch_one(&mut *tx)
            .await?;
    let account = sqlx::query_as::<_, Account>(
        "INSERT INTO accounts (user_id, balance_cents, created_at) VALUES ($1, 0, $2) RETURNING *",
    )
    .bind(user.id)
    .bind(&created_at)
    .fetch_one(&mut *tx)
    .await?;
    tx.commit().await?;
    log::info!("Account {} created for user {}", account.id, user.name);
    Ok((user, account))
}

pub async fn get_account(pool: &SqlitePool, id: i64) -> Result<Option<Account>, sqlx::Error> {
    sqlx::query_as::<_, Account>("SELECT * FROM accounts WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub async fn get_account_for_user(
    pool: &SqlitePool,
    user_id: i64,
) -> Result<Option<Account>, sqlx::Error> {
    sqlx::query_as::<_, Account>("SELECT * FROM accounts WHERE user_id = $1")
        .bind(user_id)
        .fetch_optional(pool)
        .await
}

/// Credits the balance and returns the updated account, or None when the
/// account no longer exists.
pub async fn deposit(
    pool: &SqlitePool,
    account_id: i64,
    amount_cents: i64,
) -> Result<Option<Account>, sqlx::Error> {
    let account = sqlx::query_as::<_, Account>(
        "UPDATE accounts SET balance_cents = balance_cents + $1 WHERE id = $2 RETURNING *",
    )
    .bind(amount_cents)
    .bind(account_id)
    .fetch_optional(pool)
    .await?;
    if let Some(account) = &account {
        log::info!(
            "Deposited {} cents into account {}",
            amount_cents,
            account.id
        );
    }
    Ok(account)
}

/// Inserts a card for the account. Expiry is fixed at issuance: December of
/// next year. The token is synthesized by the caller.
pub async fn issue_card(
    pool: &SqlitePool,
    account_id: i64,
    token: &str,
) -> Result<Card, sqlx::Error> {
    let now = chrono::Utc::now();
    let last4 = &token[token.len() - 4..];
    let card = sqlx::query_as::<_, Card>(
        "INSERT INTO cards (account_id, last4, token, exp_month, exp_year, active, created_at) \
         VALUES ($1, $2, $3, $4, $5, 1, $6) RETURNING *",
    )
    .bind(account_id)
    .bind(last4)
    .bind(token)
    .bind(12_i64)
    .bind(i64::from(now.year()) + 1)
    .bind(now.to_string())
    .fetch_one(pool)
    .await?;
    log::info!("Issued card {} on account {}", card.id, account_id);
    Ok(card)
}

pub async fn get_active_card(
    pool: &SqlitePool,
    account_id: i64,
    card_id: i64,
) -> Result<Option<Card>, sqlx::Error> {
    sqlx::query_as::<_, Card>("SELECT * FROM cards WHERE id = $1 AND account_id = $2 AND active = 1")
        .bind(card_id)
        .bind(account_id)
        .fetch_optional(pool)
        .await
}

pub async fn list_active_cards(
    pool: &SqlitePool,
    account_id: i64,
) -> Result<Vec<Card>, sqlx::Error> {
    sqlx::query_as::<_, Card>("SELECT * FROM cards WHERE account_id = $1 AND active = 1")
        .bind(account_id)
        .fetch_all(pool)
        .await
}

pub async fn list_transactions(
    pool: &SqlitePool,
    account_id: i64,
) -> Result<Vec<Transaction>, sqlx::Error> {
    sqlx::query_as::<_, Transaction>(
        "SELECT * FROM transactions WHERE account_id = $1 ORDER BY created_at DESC, id DESC",
    )
    .bind(account_id)
    .fetch_all(pool)
    .await
}

/// Authorizes a purchase and records the attempt on the ledger. Runs as one
/// database transaction: the balance check, the debit and the ledger append
/// either all land or none do. The debit re-checks the balance in the UPDATE
/// guard so concurrent purchases on the same account cannot overdraw it; a
/// declined attempt never touches the balance.
pub async fn record_purchase(
    pool: &SqlitePool,
    account_id: i64,
    card: Option<&Card>,
    merchant: &str,
    category: &str,
    amount_cents: i64,
) -> Result<(Decision, Transaction), AppError> {
    let mut tx = pool.begin().await?;

    let account = sqlx::query_as::<_, Account>("SELECT * FROM accounts WHERE id = $1")
        .bind(account_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(AppError::NotFound)?;

    let mut decision = authorize::authorize(category, card, account.balance_cents, amount_cents);

    if decision.approved {
        let debited = sqlx::query(
            "UPDATE accounts SET balance_cents = balance_cents - $1 \
             WHERE id = $2 AND balance_cents >= $1",
        )
        .bind(amount_cents)
        .bind(account_id)
        .execute(&mut *tx)
        .await?;
        if debited.rows_affected() == 0 {
            decision = Decision::declined(REASON_INSUFFICIENT_BALANCE);
        }
    }

    let txn = sqlx::query_as::<_, Transaction>(
        "INSERT INTO transactions \
         (account_id, card_id, merchant, category, amount_cents, approved, reason, created_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING *",
    )
    .bind(account_id)
    .bind(card.map(|c| c.id))
    .bind(merchant)
    .bind(category)
    .bind(amount_cents)
    .bind(decision.approved)
    .bind(decision.reason)
    .bind(chrono::Utc::now().to_string())
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;

    log::info!(
        "Purchase {} on account {}: {}",
        if decision.approved {
            "approved"
        } else {
            "declined"
        },
        account_id,
        decision.reason
    );
    Ok((decision, txn))
}
