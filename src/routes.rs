use actix_identity::Identity;
use actix_session::Session;
use actix_web::{
    get, post,
    web::{self, Data},
    HttpMessage, HttpRequest, HttpResponse, Responder,
};
use serde::Deserialize;
use tera::Context;

use crate::{
    authorize, db,
    errors::AppError,
    money,
    utils::{flash, generate_card_token, take_flashes},
    AppState, TEMPLATES,
};

fn see_other(location: &str) -> HttpResponse {
    HttpResponse::SeeOther()
        .append_header(("Location", location.to_owned()))
        .finish()
}

/// Account id carried by the session identity, if any.
fn logged_in_account(identity: &Option<Identity>) -> Option<i64> {
    identity.as_ref()?.id().ok()?.parse().ok()
}

#[get("/")]
pub async fn home_handler(
    session: Session,
    identity: Option<Identity>,
) -> Result<impl Responder, AppError> {
    if logged_in_account(&identity).is_some() {
        return Ok(see_other("/dashboard"));
    }

    let mut context = Context::new();
    context.insert("title", "HSA Card Demo");
    context.insert("messages", &take_flashes(&session));
    context.insert("version", env!("CARGO_PKG_VERSION"));

    let rendered = TEMPLATES.render("home.html", &context).map_err(|e| {
        log::error!("Failed to render template: {}", e);
        AppError::TemplateError(e)
    })?;

    Ok(HttpResponse::Ok()
        .content_type("text/html; charset=utf-8")
        .body(rendered))
}

#[derive(Deserialize)]
pub struct NameForm {
    #[serde(default)]
    name: String,
}

#[post("/register")]
pub async fn register_form_handler(
    web::Form(form): web::Form<NameForm>,
    state: Data<AppState>,
    session: Session,
    request: HttpRequest,
) -> Result<impl Responder, AppError> {
    let name = form.name.trim();
    if name.is_empty() {
        flash(&session, "Please enter your name.");
        return Ok(see_other("/"));
    }

    let existing = db::find_user_by_name(&state.db_pool, name).await.map_err(|e| {
        log::error!("Failed to look up user: {}", e);
        AppError::DatabaseError(e)
    })?;
    if existing.is_some() {
        flash(
            &session,
            &format!(
                "Account with name '{}' already exists. Please use the Login option or choose a different name.",
                name
            ),
        );
        return Ok(see_other("/"));
    }

    // The unique constraint backstops a register race that slips past the
    // lookup above.
    let (user, account) = match db::register_account(&state.db_pool, name).await {
        Ok(pair) => pair,
        Err(AppError::DatabaseError(e))
            if e.as_database_error()
                .is_some_and(|d| d.is_unique_violation()) =>
        {
            flash(
                &session,
                &format!(
                    "Account with name '{}' already exists. Please use the Login option or choose a different name.",
                    name
                ),
            );
            return Ok(see_other("/"));
        }
        Err(e) => return Err(e),
    };

    Identity::login(&request.extensions(), account.id.to_string())
        .map_err(|e| AppError::SessionError(e.to_string()))?;

    flash(&session, &format!("Account created for {}.", user.name));
    Ok(see_other("/dashboard"))
}

#[post("/login")]
pub async fn login_form_handler(
    web::Form(form): web::Form<NameForm>,
    state: Data<AppState>,
    session: Session,
    request: HttpRequest,
) -> Result<impl Responder, AppError> {
    let name = form.name.trim();
    if name.is_empty() {
        flash(&session, "Please enter your name.");
        return Ok(see_other("/"));
    }

    let user = match db::find_user_by_name(&state.db_pool, name).await.map_err(|e| {
        log::error!("Failed to look up user: {}", e);
        AppError::DatabaseError(e)
    })? {
        Some(user) => user,
        None => {
            flash(
                &session,
                &format!("No account found for '{}'. Please create a new account.", name),
            );
            return Ok(see_other("/"));
        }
    };

    let account = match db::get_account_for_user(&state.db_pool, user.id)
        .await
        .map_err(|e| {
            log::error!("Failed to look up account: {}", e);
            AppError::DatabaseError(e)
        })? {
        Some(account) => account,
        None => {
            flash(&session, "Account error. Please create a new account.");
            return Ok(see_other("/"));
        }
    };

    Identity::login(&request.extensions(), account.id.to_string())
        .map_err(|e| AppError::SessionError(e.to_string()))?;

    flash(&session, &format!("Welcome back, {}!", user.name));
    Ok(see_other("/dashboard"))
}

#[post("/logout")]
pub async fn logout_handler(identity: Option<Identity>, session: Session) -> impl Responder {
    if let Some(identity) = identity {
        identity.logout();
    }
    flash(&session, "Logged out successfully.");
    see_other("/")
}

#[get("/dashboard")]
pub async fn dashboard_handler(
    state: Data<AppState>,
    session: Session,
    identity: Option<Identity>,
) -> Result<impl Responder, AppError> {
    let acct_id = match logged_in_account(&identity) {
        Some(id) => id,
        None => return Ok(see_other("/")),
    };

    let account = match db::get_account(&state.db_pool, acct_id).await.map_err(|e| {
        log::error!("Failed to load account: {}", e);
        AppError::DatabaseError(e)
    })? {
        Some(account) => account,
        None => {
            // Stale session pointing at an account that no longer exists.
            if let Some(identity) = identity {
                identity.logout();
            }
            return Ok(see_other("/"));
        }
    };

    let user = db::get_user_by_id(&state.db_pool, account.user_id)
        .await
        .map_err(|e| {
            log::error!("Failed to load user: {}", e);
            AppError::DatabaseError(e)
        })?
        .ok_or(AppError::NotFound)?;

    let cards = db::list_active_cards(&state.db_pool, account.id)
        .await
        .map_err(|e| {
            log::error!("Failed to list cards: {}", e);
            AppError::DatabaseError(e)
        })?;

    let txns = db::list_transactions(&state.db_pool, account.id)
        .await
        .map_err(|e| {
            log::error!("Failed to list transactions: {}", e);
            AppError::DatabaseError(e)
        })?;

    let mut context = Context::new();
    context.insert("title", "Dashboard");
    context.insert("user", &user);
    context.insert("account", &account);
    context.insert("cards", &cards);
    context.insert("transactions", &txns);
    context.insert("qualified", &authorize::QUALIFIED_CATEGORIES);
    context.insert("messages", &take_flashes(&session));
    context.insert("version", env!("CARGO_PKG_VERSION"));

    let rendered = TEMPLATES.render("dashboard.html", &context).map_err(|e| {
        log::error!("Failed to render template: {}", e);
        AppError::TemplateError(e)
    })?;

    Ok(HttpResponse::Ok()
        .content_type("text/html; charset=utf-8")
        .body(rendered))
}

#[derive(Deserialize)]
pub struct DepositForm {
    #[serde(default)]
    amount: String,
}

#[post("/deposit")]
pub async fn deposit_form_handler(
    web::Form(form): web::Form<DepositForm>,
    state: Data<AppState>,
    session: Session,
    identity: Option<Identity>,
) -> Result<impl Responder, AppError> {
    let acct_id = match logged_in_account(&identity) {
        Some(id) => id,
        None => return Ok(see_other("/")),
    };

    let cents = match money::dollars_to_cents(&form.amount) {
        Ok(cents) => cents,
        Err(_) => {
            flash(&session, "Enter a valid positive deposit amount.");
            return Ok(see_other("/dashboard"));
        }
    };

    match db::deposit(&state.db_pool, acct_id, cents).await.map_err(|e| {
        log::error!("Failed to record deposit: {}", e);
        AppError::DatabaseError(e)
    })? {
        Some(_) => flash(&session, &format!("Deposited {}.", money::format_cents(cents))),
        None => {
            if let Some(identity) = identity {
                identity.logout();
            }
            return Ok(see_other("/"));
        }
    }

    Ok(see_other("/dashboard"))
}

#[post("/issue-card")]
pub async fn issue_card_form_handler(
    state: Data<AppState>,
    session: Session,
    identity: Option<Identity>,
) -> Result<impl Responder, AppError> {
    let acct_id = match logged_in_account(&identity) {
        Some(id) => id,
        None => return Ok(see_other("/")),
    };

    if db::get_account(&state.db_pool, acct_id)
        .await
        .map_err(|e| {
            log::error!("Failed to load account: {}", e);
            AppError::DatabaseError(e)
        })?
        .is_none()
    {
        if let Some(identity) = identity {
            identity.logout();
        }
        return Ok(see_other("/"));
    }

    let token = generate_card_token(&mut rand::thread_rng());
    let card = db::issue_card(&state.db_pool, acct_id, &token)
        .await
        .map_err(|e| {
            log::error!("Failed to issue card: {}", e);
            AppError::DatabaseError(e)
        })?;

    flash(
        &session,
        &format!(
            "Issued virtual card •••• {} (exp {}/{}).",
            card.last4, card.exp_month, card.exp_year
        ),
    );
    Ok(see_other("/dashboard"))
}

#[derive(Deserialize)]
pub struct PurchaseForm {
    #[serde(default)]
    merchant: String,
    #[serde(default)]
    category: String,
    #[serde(default)]
    amount: String,
    #[serde(default)]
    card_id: String,
}

#[post("/purchase")]
pub async fn purchase_form_handler(
    web::Form(form): web::Form<PurchaseForm>,
    state: Data<AppState>,
    session: Session,
    identity: Option<Identity>,
) -> Result<impl Responder, AppError> {
    let acct_id = match logged_in_account(&identity) {
        Some(id) => id,
        None => return Ok(see_other("/")),
    };

    let merchant = form.merchant.trim();
    let category = form.category.trim();
    let amount = form.amount.trim();
    let card_id = form.card_id.trim();

    if merchant.is_empty() || category.is_empty() || amount.is_empty() || card_id.is_empty() {
        flash(&session, "Please fill all purchase fields.");
        return Ok(see_other("/dashboard"));
    }

    let cents = match money::dollars_to_cents(amount) {
        Ok(cents) => cents,
        Err(_) => {
            flash(&session, "Enter a valid positive purchase amount.");
            return Ok(see_other("/dashboard"));
        }
    };

    // A card id that does not parse or does not match an active card on this
    // account counts as no card; the decision order still applies.
    let card = match card_id.parse::<i64>() {
        Ok(id) => db::get_active_card(&state.db_pool, acct_id, id)
            .await
            .map_err(|e| {
                log::error!("Failed to look up card: {}", e);
                AppError::DatabaseError(e)
            })?,
        Err(_) => None,
    };

    let (decision, _txn) = match db::record_purchase(
        &state.db_pool,
        acct_id,
        card.as_ref(),
        merchant,
        category,
        cents,
    )
    .await
    {
        Ok(outcome) => outcome,
        Err(AppError::NotFound) => {
            if let Some(identity) = identity {
                identity.logout();
            }
            return Ok(see_other("/"));
        }
        Err(e) => return Err(e),
    };

    flash(
        &session,
        &format!(
            "Purchase {}: {}",
            if decision.approved { "APPROVED" } else { "DECLINED" },
            decision.reason
        ),
    );
    Ok(see_other("/dashboard"))
}
