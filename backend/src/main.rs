//! Tandem entry-point: loads configuration, wires adapters and serves the API.

mod server;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use actix_web::web;
use color_eyre::eyre::{Context, Result, eyre};
use mockable::{DefaultClock, DefaultEnv};
use ortho_config::OrthoConfig;
use reqwest::Url;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt};

use server::{ServerConfig, create_server};
use tandem::domain::linking::{AccountRegistrar, TandemSettings};
use tandem::domain::ports::{InvitationNotifier, LinkingStore};
use tandem::inbound::http::health::HealthState;
use tandem::inbound::http::session_config::{BuildMode, session_settings_from_env};
use tandem::inbound::http::state::HttpState;
use tandem::outbound::memory::InMemoryLinkingStore;
use tandem::outbound::notify::{HttpInvitationNotifier, TracingInvitationNotifier};
use tandem::outbound::persistence::{
    DbPool, DieselLinkingStore, PoolConfig, run_pending_migrations,
};
use tandem::outbound::security::Argon2PasswordHasher;

const NOTIFIER_TIMEOUT: Duration = Duration::from_secs(5);

/// Application bootstrap.
#[actix_web::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    if let Err(e) = fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .try_init()
    {
        warn!(error = %e, "tracing init failed");
    }

    let settings =
        TandemSettings::load().map_err(|err| eyre!("failed to load settings: {err}"))?;
    let session = session_settings_from_env(&DefaultEnv::new(), BuildMode::from_debug_assertions())
        .wrap_err("invalid session configuration")?;
    info!(fingerprint = %session.key_fingerprint(), "session key loaded");

    let bind_addr: SocketAddr = settings
        .bind_addr()
        .parse()
        .wrap_err_with(|| format!("invalid bind address {}", settings.bind_addr()))?;

    let registrar = Arc::new(AccountRegistrar::new(
        build_store(&settings).await?,
        Arc::new(DefaultClock),
        Arc::new(Argon2PasswordHasher::new()),
        build_notifier(&settings)?,
        &settings,
    ));
    spawn_expiry_sweep(registrar.clone(), settings.expiry_sweep_interval());

    let health_state = web::Data::new(HealthState::new());
    let config = ServerConfig::new(session, bind_addr, HttpState::new(registrar));
    let server = create_server(health_state.clone(), config)?;
    info!(%bind_addr, "tandem listening");
    let outcome = server.await;
    health_state.mark_unhealthy();
    info!("tandem stopped");
    outcome.wrap_err("http server failed")
}

/// PostgreSQL when `database_url` is set, otherwise a process-local store.
async fn build_store(settings: &TandemSettings) -> Result<Arc<dyn LinkingStore>> {
    let Some(pool_config) = PoolConfig::from_settings(settings) else {
        warn!("no database configured; linking data lives in memory only");
        return Ok(Arc::new(InMemoryLinkingStore::new()));
    };
    let applied = run_pending_migrations(pool_config.database_url())
        .await
        .map_err(|err| eyre!("failed to run migrations: {err}"))?;
    info!(applied, "database migrations applied");
    let pool = DbPool::new(pool_config)
        .await
        .map_err(|err| eyre!("failed to build database pool: {err}"))?;
    Ok(Arc::new(DieselLinkingStore::new(pool)))
}

fn build_notifier(settings: &TandemSettings) -> Result<Arc<dyn InvitationNotifier>> {
    let Some(raw) = settings.notifier_url() else {
        return Ok(Arc::new(TracingInvitationNotifier));
    };
    let endpoint = Url::parse(raw).wrap_err_with(|| format!("invalid notifier url {raw}"))?;
    let notifier = HttpInvitationNotifier::new(endpoint, NOTIFIER_TIMEOUT)
        .wrap_err("failed to build notifier client")?;
    Ok(Arc::new(notifier))
}

/// Periodically flip overdue invitations and connections to `expired`.
fn spawn_expiry_sweep(registrar: Arc<AccountRegistrar>, every: Duration) {
    actix_web::rt::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            match registrar.validator().expire_old_invitations().await {
                Ok(0) => {}
                Ok(expired) => info!(expired, "expired stale invitations"),
                Err(err) => warn!(code = %err.code(), error = %err.message(), "expiry sweep failed"),
            }
        }
    });
}
