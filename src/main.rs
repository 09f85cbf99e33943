mod config;
mod db;
mod envelope;
mod error;
mod extract;
mod filter;
mod rate_limit;
mod routes;
mod services;
mod state;
mod validation;

use std::net::SocketAddr;

use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = config::Config::from_env().expect("invalid configuration");
    let port = config.port;

    let pool = db::init_pool(&config.database_url)
        .await
        .expect("database init failed");
    if config.mail.is_none() {
        tracing::warn!("RESEND_API_KEY not set; outbound mail is logged only");
    }
    let mailer = services::mail::from_config(config.mail.as_ref());
    let state = state::AppState::new(pool, config, mailer);

    let app = routes::app(state);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}"))
        .await
        .expect("failed to bind");

    tracing::info!(%port, "spark-server listening");
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .await
        .expect("server failed");
}
