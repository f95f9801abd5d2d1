use std::sync::Arc;
use std::time::Duration;

use axum::http::HeaderValue;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use slotbook::config::AppConfig;
use slotbook::db;
use slotbook::handlers;
use slotbook::services::messaging::smsgate::SmsGateProvider;
use slotbook::services::messaging::twilio::TwilioSmsProvider;
use slotbook::services::messaging::MessagingProvider;
use slotbook::services::reminders;
use slotbook::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = AppConfig::from_env();
    if config.admin_token.is_empty() || config.admin_token == "changeme" {
        tracing::warn!("ADMIN_TOKEN is not set to a private value");
    }

    let conn = db::init_db(&config.database_url)?;

    let messaging: Box<dyn MessagingProvider> = match config.sms_provider.as_str() {
        "smsgate" => {
            anyhow::ensure!(
                !config.smsgate_login.is_empty(),
                "SMSGATE_LOGIN must be set when SMS_PROVIDER=smsgate"
            );
            tracing::info!("using SMS Gate provider (url: {})", config.smsgate_url);
            Box::new(SmsGateProvider::new(
                config.smsgate_url.clone(),
                config.smsgate_login.clone(),
                config.smsgate_password.clone(),
            ))
        }
        _ => {
            tracing::info!("using Twilio SMS provider");
            Box::new(TwilioSmsProvider::new(
                config.twilio_account_sid.clone(),
                config.twilio_auth_token.clone(),
                config.twilio_phone_number.clone(),
            ))
        }
    };

    let cors = match &config.cors_origin {
        Some(origin) => CorsLayer::new()
            .allow_origin(origin.parse::<HeaderValue>()?)
            .allow_methods(Any)
            .allow_headers(Any),
        None => CorsLayer::permissive(),
    };

    let state = Arc::new(AppState::new(conn, config.clone(), messaging));

    if config.reminder_interval_minutes > 0 {
        let sweep_state = Arc::clone(&state);
        let every = Duration::from_secs(config.reminder_interval_minutes * 60);
        tracing::info!(minutes = config.reminder_interval_minutes, "reminder sweep scheduled");
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            loop {
                ticker.tick().await;
                let now = sweep_state.config.local_now();
                if let Err(e) = reminders::send_reminders(&sweep_state, now).await {
                    tracing::error!(error = %e, "reminder sweep failed");
                }
            }
        });
    }

    let app = handlers::router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("starting server on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
