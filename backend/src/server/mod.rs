//! Assembles the Actix application around the linking services.
//!
//! The versioned API sits behind the cookie session; health probes, the
//! optional `/metrics` endpoint and the debug-only Swagger UI do not.

mod config;

pub use config::ServerConfig;

use actix_session::SessionMiddleware;
use actix_session::config::{CookieContentSecurity, PersistentSession};
use actix_session::storage::CookieSessionStore;
use actix_web::cookie::time::Duration as CookieDuration;
use actix_web::dev::Server;
use actix_web::{App, HttpServer, web};

use tandem::Trace;
use tandem::inbound::http::configure_api;
use tandem::inbound::http::health::{HealthState, live, ready};
use tandem::inbound::http::session_config::SessionSettings;

const SESSION_COOKIE: &str = "session";
const SESSION_TTL_HOURS: i64 = 2;

/// Private, HTTP-only cookie session that outlives browser restarts for
/// [`SESSION_TTL_HOURS`].
fn session_middleware(settings: &SessionSettings) -> SessionMiddleware<CookieSessionStore> {
    let lifecycle =
        PersistentSession::default().session_ttl(CookieDuration::hours(SESSION_TTL_HOURS));
    SessionMiddleware::builder(CookieSessionStore::default(), settings.key.clone())
        .cookie_name(SESSION_COOKIE.to_owned())
        .cookie_path("/".to_owned())
        .cookie_http_only(true)
        .cookie_secure(settings.cookie_secure)
        .cookie_same_site(settings.same_site)
        .cookie_content_security(CookieContentSecurity::Private)
        .session_lifecycle(lifecycle)
        .build()
}

#[cfg(debug_assertions)]
fn mount_docs(cfg: &mut web::ServiceConfig) {
    use utoipa::OpenApi;
    use utoipa_swagger_ui::SwaggerUi;

    cfg.service(
        SwaggerUi::new("/docs").url("/api-docs/openapi.json", tandem::ApiDoc::openapi()),
    );
}

#[cfg(not(debug_assertions))]
fn mount_docs(_cfg: &mut web::ServiceConfig) {}

#[cfg(feature = "metrics")]
fn prometheus() -> std::io::Result<actix_web_prom::PrometheusMetrics> {
    actix_web_prom::PrometheusMetricsBuilder::new("tandem")
        .endpoint("/metrics")
        .build()
        .map_err(|err| std::io::Error::other(format!("metrics setup failed: {err}")))
}

/// Bind the listener and start serving.
///
/// `health_state` flips to ready as soon as the socket is bound, so the
/// readiness probe never answers before the API can.
///
/// # Errors
///
/// Fails when the address cannot be bound or, with the `metrics` feature,
/// when the Prometheus registry rejects its configuration.
pub fn create_server(
    health_state: web::Data<HealthState>,
    config: ServerConfig,
) -> std::io::Result<Server> {
    let ServerConfig {
        session,
        bind_addr,
        http_state,
    } = config;
    let http_state = web::Data::new(http_state);
    let probes = health_state.clone();

    #[cfg(feature = "metrics")]
    let metrics = prometheus()?;

    let server = HttpServer::new(move || {
        let api = web::scope("/api/v1")
            .wrap(session_middleware(&session))
            .configure(configure_api);
        let app = App::new()
            .app_data(probes.clone())
            .app_data(http_state.clone())
            .wrap(Trace)
            .service(api)
            .service(ready)
            .service(live)
            .configure(mount_docs);

        #[cfg(feature = "metrics")]
        let app = app.wrap(metrics.clone());

        app
    })
    .bind(bind_addr)?
    .run();

    health_state.mark_ready();
    Ok(server)
}
