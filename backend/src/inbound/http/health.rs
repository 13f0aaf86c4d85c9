//! Liveness and readiness probes.
//!
//! The process moves through three phases: starting (alive, not ready),
//! serving (alive and ready) and draining (neither). Probes answer with
//! `Cache-Control: no-store` so proxies never replay a stale verdict.

use std::sync::atomic::{AtomicU8, Ordering};

use actix_web::http::header::{CACHE_CONTROL, HeaderValue};
use actix_web::{HttpResponse, get, web};

const STARTING: u8 = 0;
const SERVING: u8 = 1;
const DRAINING: u8 = 2;

/// Lifecycle phase shared between bootstrap and the probe handlers.
pub struct HealthState {
    phase: AtomicU8,
}

impl Default for HealthState {
    fn default() -> Self {
        Self {
            phase: AtomicU8::new(STARTING),
        }
    }
}

impl HealthState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enter the serving phase. Has no effect once draining.
    pub fn mark_ready(&self) {
        let _ = self
            .phase
            .compare_exchange(STARTING, SERVING, Ordering::AcqRel, Ordering::Acquire);
    }

    /// Enter the draining phase; both probes fail from here on.
    pub fn mark_unhealthy(&self) {
        self.phase.store(DRAINING, Ordering::Release);
    }

    pub fn is_ready(&self) -> bool {
        self.phase.load(Ordering::Acquire) == SERVING
    }

    pub fn is_alive(&self) -> bool {
        self.phase.load(Ordering::Acquire) != DRAINING
    }
}

fn verdict(passing: bool) -> HttpResponse {
    let mut builder = if passing {
        HttpResponse::Ok()
    } else {
        HttpResponse::ServiceUnavailable()
    };
    builder
        .insert_header((CACHE_CONTROL, HeaderValue::from_static("no-store")))
        .finish()
}

/// Readiness probe.
#[utoipa::path(
    get,
    path = "/health/ready",
    tags = ["health"],
    security([]),
    responses(
        (status = 200, description = "Listener bound and store reachable"),
        (status = 503, description = "Starting up or draining")
    )
)]
#[get("/health/ready")]
pub async fn ready(state: web::Data<HealthState>) -> HttpResponse {
    verdict(state.is_ready())
}

/// Liveness probe.
#[utoipa::path(
    get,
    path = "/health/live",
    tags = ["health"],
    security([]),
    responses(
        (status = 200, description = "Process is running"),
        (status = 503, description = "Process is draining")
    )
)]
#[get("/health/live")]
pub async fn live(state: web::Data<HealthState>) -> HttpResponse {
    verdict(state.is_alive())
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::http::StatusCode;
    use actix_web::{App, test};
    use rstest::rstest;

    async fn probe(state: web::Data<HealthState>, uri: &str) -> (StatusCode, Option<String>) {
        let app = test::init_service(App::new().app_data(state).service(ready).service(live)).await;
        let res = test::call_service(&app, test::TestRequest::get().uri(uri).to_request()).await;
        let cache = res
            .headers()
            .get(CACHE_CONTROL)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);
        (res.status(), cache)
    }

    #[rstest]
    #[case("/health/ready", StatusCode::SERVICE_UNAVAILABLE)]
    #[case("/health/live", StatusCode::OK)]
    #[actix_web::test]
    async fn starting_process_is_alive_but_not_ready(
        #[case] uri: &str,
        #[case] expected: StatusCode,
    ) {
        let (status, cache) = probe(web::Data::new(HealthState::new()), uri).await;
        assert_eq!(status, expected);
        assert_eq!(cache.as_deref(), Some("no-store"));
    }

    #[actix_web::test]
    async fn serving_process_is_ready() {
        let state = web::Data::new(HealthState::new());
        state.mark_ready();
        let (status, _) = probe(state, "/health/ready").await;
        assert_eq!(status, StatusCode::OK);
    }

    #[rstest]
    #[case("/health/ready")]
    #[case("/health/live")]
    #[actix_web::test]
    async fn draining_fails_both_probes(#[case] uri: &str) {
        let state = web::Data::new(HealthState::new());
        state.mark_ready();
        state.mark_unhealthy();
        let (status, _) = probe(state, uri).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[rstest]
    #[core::prelude::v1::test]
    fn draining_is_final() {
        let state = HealthState::new();
        state.mark_unhealthy();
        state.mark_ready();
        assert!(!state.is_ready());
        assert!(!state.is_alive());
    }
}
