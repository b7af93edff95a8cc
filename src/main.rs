use axum::Router;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use dotenvy::dotenv;
use log::{error, info};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use dispatchserver::channels::{BlandVoiceChannel, SmtpEmailChannel, TwilioSmsChannel};
use dispatchserver::config::AppConfig;
use dispatchserver::shared::state::AppState;
use dispatchserver::shared::utils::create_conn;
use dispatchserver::store::PgStore;
use dispatchserver::{api, webhooks};

const MIGRATIONS: EmbeddedMigrations = embed_migrations!();

#[tokio::main]
async fn main() -> std::io::Result<()> {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = AppConfig::from_env().expect("Failed to load config from env");

    let pool = match create_conn() {
        Ok(pool) => pool,
        Err(e) => {
            error!("Failed to create database pool: {}", e);
            return Err(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                format!("Database pool creation failed: {}", e),
            ));
        }
    };

    {
        let mut conn = pool.get().map_err(|e| {
            std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                format!("Database connection failed: {}", e),
            )
        })?;
        if let Err(e) = conn.run_pending_migrations(MIGRATIONS) {
            error!("Failed to run database migrations: {}", e);
            return Err(std::io::Error::other(format!("Migrations failed: {}", e)));
        }
    }

    let store = Arc::new(PgStore::new(pool));
    let email = Arc::new(
        SmtpEmailChannel::new(&config.smtp).expect("Failed to build SMTP transport"),
    );
    let sms = Arc::new(TwilioSmsChannel::new(config.sms.clone()));
    let voice = Arc::new(BlandVoiceChannel::new(config.voice.clone()));

    if config.cron_secret.is_empty() {
        log::warn!("CRON_SECRET not set; cron entrypoints will reject every request");
    }
    if config.admin_token.is_empty() {
        log::warn!("ADMIN_TOKEN not set; admin endpoints will reject every request");
    }

    let host = config.server.host.clone();
    let port = config.server.port;
    let state = AppState::new(config, store, email, sms, voice);

    let app = Router::new()
        .merge(api::configure())
        .merge(webhooks::configure())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    let addr = format!("{}:{}", host, port);
    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await
}
