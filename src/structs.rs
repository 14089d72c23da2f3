use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, FromRow)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub created_at: String,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, FromRow)]
pub struct Account {
    pub id: i64,
    pub user_id: i64,
    pub balance_cents: i64,
    pub created_at: String,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, FromRow)]
pub struct Card {
    pub id: i64,
    pub account_id: i64,
    pub last4: String,
    pub token: String,
    pub exp_month: i64,
    pub exp_year: i64,
    pub active: bool,
    pub created_at: String,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, FromRow)]
pub struct Transaction {
    pub id: i64,
    pub account_id: i64,
    pub card_id: Option<i64>,
    pub merchant: String,
    pub category: String,
    pub amount_cents: i64,
    pub approved: bool,
    pub reason: String,
    pub created_at: String,
}
