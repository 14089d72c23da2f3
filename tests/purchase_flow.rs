//! End-to-end flows through the repository layer against an in-memory
//! SQLite database with the real migrations applied. Covers the register →
//! deposit → issue card → purchase path, each decline reason, and the
//! append-only ledger property.

use chrono::Datelike;
use hsa_card::authorize::{
    REASON_APPROVED, REASON_INSUFFICIENT_BALANCE, REASON_INVALID_CARD, REASON_NOT_QUALIFIED,
};
use hsa_card::db;
use hsa_card::money::dollars_to_cents;
use hsa_card::structs::{Account, Card};
use hsa_card::utils::generate_card_token;
use rand::{rngs::StdRng, SeedableRng};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;

async fn setup_pool() -> SqlitePool {
    // A single connection keeps every query on the same in-memory database.
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("connect to in-memory database");
    sqlx::migrate!().run(&pool).await.expect("run migrations");
    pool
}

async fn registered_account(pool: &SqlitePool, name: &str) -> Account {
    let (_, account) = db::register_account(pool, name)
        .await
        .expect("register account");
    account
}

async fn funded_account_with_card(pool: &SqlitePool, name: &str, amount: &str) -> (Account, Card) {
    let account = registered_account(pool, name).await;
    let account = db::deposit(pool, account.id, dollars_to_cents(amount).unwrap())
        .await
        .expect("deposit")
        .expect("account exists");
    let token = generate_card_token(&mut StdRng::seed_from_u64(7));
    let card = db::issue_card(pool, account.id, &token)
        .await
        .expect("issue card");
    (account, card)
}

#[tokio::test]
async fn registration_creates_user_and_empty_account() {
    let pool = setup_pool().await;
    let (user, account) = db::register_account(&pool, "Alice").await.unwrap();

    assert_eq!(user.name, "Alice");
    assert_eq!(account.user_id, user.id);
    assert_eq!(account.balance_cents, 0);

    let found = db::find_user_by_name(&pool, "Alice").await.unwrap();
    assert_eq!(found, Some(user));
}

#[tokio::test]
async fn duplicate_registration_is_rejected_and_creates_nothing() {
    let pool = setup_pool().await;
    registered_account(&pool, "Alice").await;

    assert!(db::register_account(&pool, "Alice").await.is_err());

    let users: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
        .fetch_one(&pool)
        .await
        .unwrap();
    let accounts: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM accounts")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(users, 1);
    assert_eq!(accounts, 1);
}

#[tokio::test]
async fn deposit_credits_the_balance() {
    let pool = setup_pool().await;
    let account = registered_account(&pool, "Alice").await;

    let account = db::deposit(&pool, account.id, dollars_to_cents("50.00").unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(account.balance_cents, 5000);

    let account = db::deposit(&pool, account.id, 250).await.unwrap().unwrap();
    assert_eq!(account.balance_cents, 5250);
}

#[tokio::test]
async fn issued_card_is_active_with_fixed_expiry() {
    let pool = setup_pool().await;
    let account = registered_account(&pool, "Alice").await;

    let token = generate_card_token(&mut StdRng::seed_from_u64(99));
    let card = db::issue_card(&pool, account.id, &token).await.unwrap();

    assert!(card.active);
    assert_eq!(card.token, token);
    assert_eq!(card.last4, &token[12..]);
    assert_eq!(card.exp_month, 12);
    assert_eq!(card.exp_year, i64::from(chrono::Utc::now().year()) + 1);

    let fetched = db::get_active_card(&pool, account.id, card.id).await.unwrap();
    assert_eq!(fetched, Some(card));
}

#[tokio::test]
async fn card_lookup_is_scoped_to_the_owning_account() {
    let pool = setup_pool().await;
    let (alice, alice_card) = funded_account_with_card(&pool, "Alice", "50.00").await;
    let bob = registered_account(&pool, "Bob").await;

    assert!(db::get_active_card(&pool, bob.id, alice_card.id)
        .await
        .unwrap()
        .is_none());
    assert!(db::get_active_card(&pool, alice.id, alice_card.id)
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn approved_purchase_debits_the_exact_amount() {
    let pool = setup_pool().await;
    let (account, card) = funded_account_with_card(&pool, "Alice", "50.00").await;

    let (decision, txn) = db::record_purchase(
        &pool,
        account.id,
        Some(&card),
        "CVS",
        "pharmacy",
        dollars_to_cents("20.00").unwrap(),
    )
    .await
    .unwrap();

    assert!(decision.approved);
    assert_eq!(decision.reason, REASON_APPROVED);
    assert!(txn.approved);
    assert_eq!(txn.card_id, Some(card.id));
    assert_eq!(txn.amount_cents, 2000);

    let account = db::get_account(&pool, account.id).await.unwrap().unwrap();
    assert_eq!(account.balance_cents, 3000);
}

#[tokio::test]
async fn unqualified_category_is_declined_without_touching_the_balance() {
    let pool = setup_pool().await;
    let (account, card) = funded_account_with_card(&pool, "Alice", "30.00").await;

    let (decision, txn) = db::record_purchase(
        &pool,
        account.id,
        Some(&card),
        "Best Buy",
        "electronics",
        dollars_to_cents("10.00").unwrap(),
    )
    .await
    .unwrap();

    assert!(!decision.approved);
    assert_eq!(decision.reason, REASON_NOT_QUALIFIED);
    // The valid card was still supplied, so the ledger records it.
    assert_eq!(txn.card_id, Some(card.id));

    let account = db::get_account(&pool, account.id).await.unwrap().unwrap();
    assert_eq!(account.balance_cents, 3000);
}

#[tokio::test]
async fn purchase_without_a_matching_card_is_declined() {
    let pool = setup_pool().await;
    let account = registered_account(&pool, "Alice").await;
    db::deposit(&pool, account.id, 5000).await.unwrap();

    let (decision, txn) = db::record_purchase(&pool, account.id, None, "CVS", "pharmacy", 1000)
        .await
        .unwrap();

    assert!(!decision.approved);
    assert_eq!(decision.reason, REASON_INVALID_CARD);
    assert_eq!(txn.card_id, None);

    let account = db::get_account(&pool, account.id).await.unwrap().unwrap();
    assert_eq!(account.balance_cents, 5000);
}

#[tokio::test]
async fn purchase_beyond_the_balance_is_declined() {
    let pool = setup_pool().await;
    let (account, card) = funded_account_with_card(&pool, "Alice", "30.00").await;

    let (decision, _) = db::record_purchase(
        &pool,
        account.id,
        Some(&card),
        "Dental Partners",
        "dental",
        dollars_to_cents("9999.00").unwrap(),
    )
    .await
    .unwrap();

    assert!(!decision.approved);
    assert_eq!(decision.reason, REASON_INSUFFICIENT_BALANCE);

    let account = db::get_account(&pool, account.id).await.unwrap().unwrap();
    assert_eq!(account.balance_cents, 3000);
}

#[tokio::test]
async fn ledger_lists_every_attempt_newest_first_and_never_rewrites_history() {
    let pool = setup_pool().await;
    let (account, card) = funded_account_with_card(&pool, "Alice", "50.00").await;

    let attempts = [
        ("CVS", "pharmacy", 2000),
        ("Best Buy", "electronics", 1000),
        ("Dental Partners", "dental", 999_900),
        ("Optics Co", "vision", 500),
    ];

    let mut seen = Vec::new();
    for (merchant, category, cents) in attempts {
        db::record_purchase(&pool, account.id, Some(&card), merchant, category, cents)
            .await
            .unwrap();

        let ledger = db::list_transactions(&pool, account.id).await.unwrap();
        assert_eq!(ledger.len(), seen.len() + 1);

        // Everything recorded before this attempt is still there, untouched,
        // behind the newest entry.
        assert_eq!(&ledger[1..], &seen[..]);
        seen = ledger;
    }

    assert_eq!(seen[0].merchant, "Optics Co");
    assert!(seen[0].approved);
    assert_eq!(seen[1].reason, REASON_INSUFFICIENT_BALANCE);
    assert_eq!(seen[2].reason, REASON_NOT_QUALIFIED);
    assert_eq!(seen[3].reason, REASON_APPROVED);

    // Two approvals: $20.00 and $5.00 off the original $50.00.
    let account = db::get_account(&pool, account.id).await.unwrap().unwrap();
    assert_eq!(account.balance_cents, 2500);
}

#[tokio::test]
async fn full_scenario_matches_the_product_walkthrough() {
    let pool = setup_pool().await;

    // Register Alice and fund the account with $50.00.
    let (user, account) = db::register_account(&pool, "Alice").await.unwrap();
    assert_eq!(user.name, "Alice");
    let account = db::deposit(&pool, account.id, dollars_to_cents("50.00").unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(account.balance_cents, 5000);

    // Issue a card and buy $20.00 of pharmacy goods at CVS.
    let token = generate_card_token(&mut StdRng::seed_from_u64(1));
    let card = db::issue_card(&pool, account.id, &token).await.unwrap();
    let (decision, _) = db::record_purchase(
        &pool,
        account.id,
        Some(&card),
        "CVS",
        "pharmacy",
        dollars_to_cents("20.00").unwrap(),
    )
    .await
    .unwrap();
    assert!(decision.approved);
    let account = db::get_account(&pool, account.id).await.unwrap().unwrap();
    assert_eq!(account.balance_cents, 3000);

    // Electronics are not HSA-qualified.
    let (decision, _) = db::record_purchase(
        &pool,
        account.id,
        Some(&card),
        "Best Buy",
        "electronics",
        dollars_to_cents("10.00").unwrap(),
    )
    .await
    .unwrap();
    assert_eq!(decision.reason, REASON_NOT_QUALIFIED);
    let account = db::get_account(&pool, account.id).await.unwrap().unwrap();
    assert_eq!(account.balance_cents, 3000);

    // A dental bill beyond the balance is declined too.
    let (decision, _) = db::record_purchase(
        &pool,
        account.id,
        Some(&card),
        "Dental Partners",
        "dental",
        dollars_to_cents("9999.00").unwrap(),
    )
    .await
    .unwrap();
    assert_eq!(decision.reason, REASON_INSUFFICIENT_BALANCE);
    let account = db::get_account(&pool, account.id).await.unwrap().unwrap();
    assert_eq!(account.balance_cents, 3000);
}
