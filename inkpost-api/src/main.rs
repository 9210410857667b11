use axum_extra::extract::cookie::Key;
use base64::{Engine, prelude::BASE64_STANDARD};
use inkpost_common::util::PositiveDuration;
use inkpost_db::client::{DbClient, DbError};
use serde::Deserialize;
use server::{ServerState, session::SessionLifetime};
use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    sync::Arc,
};
use thiserror::Error;
use time::Duration;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod server;

const SESSION_SECRET_MIN_LEN: usize = 64;

#[derive(Debug, Error)]
enum InitError {
    #[error("Error parsing .env file: {0}")]
    Dotenv(#[from] dotenvy::Error),
    #[error("Error parsing environment: {0}")]
    Envy(#[from] envy::Error),
    #[error("SESSION_SECRET is not valid base64: {0}")]
    SessionSecretEncoding(#[from] base64::DecodeError),
    #[error("SESSION_SECRET must decode to at least {SESSION_SECRET_MIN_LEN} bytes, got {0}")]
    SessionSecretTooShort(usize),
    #[error("Error opening database: {0}")]
    Database(#[from] DbError),
    #[error("Error binding tcp listener: {0}")]
    TcpBind(std::io::Error),
    #[error("Error serving server: {0}")]
    TcpServe(std::io::Error),
}

#[derive(Clone, Eq, PartialEq, Hash, Deserialize)]
struct Env {
    #[serde(default = "default_server_address")]
    server_address: IpAddr,
    #[serde(default = "default_server_port")]
    server_port: u16,
    #[serde(default = "default_database_url")]
    database_url: String,
    session_secret: Option<String>,
    /// Zero or less keeps sessions alive until logout.
    #[serde(default = "default_session_lifetime_seconds")]
    session_lifetime_seconds: i64,
}

fn default_server_address() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

fn default_server_port() -> u16 {
    5000
}

fn default_database_url() -> String {
    "sqlite://blog.db".to_owned()
}

fn default_session_lifetime_seconds() -> i64 {
    Duration::days(14).whole_seconds()
}

fn install_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "inkpost_api=debug,\
                inkpost_common=debug,\
                inkpost_db=debug,\
                tower_http=debug,axum::rejection=trace,sqlx=info"
                    .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn get_env() -> Result<Env, InitError> {
    if let Err(e) = dotenvy::dotenv() {
        if e.not_found() {
            debug!("No .dotenv file found");
        } else {
            return Err(e.into());
        }
    }

    envy::from_env().map_err(InitError::from)
}

fn cookie_key(env: &Env) -> Result<Key, InitError> {
    let Some(secret) = &env.session_secret else {
        warn!("SESSION_SECRET is not set, sessions will not survive a restart");
        return Ok(Key::generate());
    };

    let secret = BASE64_STANDARD.decode(secret.trim())?;
    if secret.len() < SESSION_SECRET_MIN_LEN {
        return Err(InitError::SessionSecretTooShort(secret.len()));
    }

    Ok(Key::from(&secret))
}

async fn shutdown_on_ctrl_c(shutdown: CancellationToken) {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl-C, shutting down"),
        Err(err) => error!(error = %err, "Could not listen for Ctrl-C, shutting down"),
    }

    shutdown.cancel();
}

#[tokio::main]
async fn main() -> Result<(), InitError> {
    install_tracing();
    let env = get_env()?;

    let db_client = DbClient::connect(&env.database_url).await?;
    db_client.migrate().await?;
    info!(database_url = %env.database_url, "Database ready");

    let session_lifetime =
        SessionLifetime(PositiveDuration::from_seconds(env.session_lifetime_seconds));
    let state = ServerState {
        db_client: Arc::new(db_client),
        cookie_key: cookie_key(&env)?,
        session_lifetime,
    };

    let tracing_layer = TraceLayer::new_for_http();
    let app = server::app(state).layer(tracing_layer);

    let server_address = SocketAddr::new(env.server_address, env.server_port);
    let listener = tokio::net::TcpListener::bind(server_address)
        .await
        .map_err(InitError::TcpBind)?;
    info!(%server_address, "Listening");

    let shutdown = CancellationToken::new();
    tokio::spawn(shutdown_on_ctrl_c(shutdown.clone()));

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
        .map_err(InitError::TcpServe)?;

    Ok(())
}
