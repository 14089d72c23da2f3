use std::{env, str::FromStr};

use actix_files::{Files, NamedFile};
use actix_identity::{config::LogoutBehaviour, IdentityMiddleware};
use actix_session::{storage::CookieSessionStore, SessionMiddleware};
use actix_web::{
    cookie::Key,
    http::{Method, StatusCode},
    middleware,
    web::{self, Data},
    App, Either, HttpResponse, HttpServer, Responder,
};
use log::info;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode},
    SqlitePool,
};

use hsa_card::{routes, AppState};

fn get_session_key() -> Key {
    match env::var("SESSION_KEY") {
        Ok(key_str) => Key::from(key_str.as_bytes()),
        Err(_) => {
            log::warn!("SESSION_KEY not set, generating a key; sessions reset on restart");
            Key::generate()
        }
    }
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenvy::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let database_url = env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://hsa.db".to_owned());

    let opts = SqliteConnectOptions::from_str(&database_url)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .read_only(false)
        .busy_timeout(std::time::Duration::from_secs(5));

    let db_pool = SqlitePool::connect_with(opts)
        .await
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;

    sqlx::migrate!()
        .run(&db_pool)
        .await
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;

    info!("Database migrated successfully");

    // One key for every worker, otherwise each worker would mint its own and
    // sessions would only stick to a single worker.
    let session_key = get_session_key();

    info!("Starting HTTP server on http://localhost:8080/");

    HttpServer::new(move || {
        App::new()
            // enable automatic response compression - usually register this first
            .wrap(middleware::Compress::default())
            // keep the cookie session (and its pending flash message) alive
            // across logout; only the identity keys are removed
            .wrap(
                IdentityMiddleware::builder()
                    .logout_behaviour(LogoutBehaviour::DeleteIdentityKeys)
                    .build(),
            )
            .wrap(SessionMiddleware::new(
                CookieSessionStore::default(),
                session_key.clone(),
            ))
            // enable logger - always register Actix Web Logger middleware last
            .wrap(middleware::Logger::default())
            .service(Files::new("/static", "static"))
            .service(routes::home_handler)
            .service(routes::register_form_handler)
            .service(routes::login_form_handler)
            .service(routes::logout_handler)
            .service(routes::dashboard_handler)
            .service(routes::deposit_form_handler)
            .service(routes::issue_card_form_handler)
            .service(routes::purchase_form_handler)
            .app_data(Data::new(AppState {
                db_pool: db_pool.clone(),
            }))
            .default_service(web::to(default_handler))
    })
    .bind(("0.0.0.0", 8080))?
    .run()
    .await
}

async fn default_handler(req_method: Method) -> Result<impl Responder, std::io::Error> {
    match req_method {
        Method::GET => {
            let file = NamedFile::open("static/404.html")?
                .customize()
                .with_status(StatusCode::NOT_FOUND);
            Ok(Either::Left(file))
        }
        _ => Ok(Either::Right(HttpResponse::MethodNotAllowed().finish())),
    }
}
