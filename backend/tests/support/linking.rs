//! Shared wiring for linking integration tests.
//!
//! Every harness owns a fresh in-memory store and a clock that only moves
//! when a test advances it.

use std::sync::Arc;

use actix_web::body::MessageBody;
use actix_web::dev::{ServiceFactory, ServiceRequest, ServiceResponse};
use actix_web::{App, web};
use chrono::{TimeZone, Utc};
use tandem::Trace;
use tandem::domain::linking::{AccountRegistrar, SignupRequest, TandemSettings};
use tandem::domain::ports::FixturePasswordHasher;
use tandem::inbound::http::configure_api;
use tandem::inbound::http::state::HttpState;
use tandem::inbound::http::test_utils::test_session_middleware;
use tandem::outbound::memory::InMemoryLinkingStore;
use tandem::outbound::notify::TracingInvitationNotifier;
use tandem::test_support::MutableClock;
use zeroize::Zeroizing;

pub const PASSWORD: &str = "CorrectHorse9!";

pub struct LinkingHarness {
    pub store: Arc<InMemoryLinkingStore>,
    pub clock: Arc<MutableClock>,
    pub registrar: Arc<AccountRegistrar>,
}

impl LinkingHarness {
    pub fn new() -> Self {
        let store = Arc::new(InMemoryLinkingStore::new());
        let clock = Arc::new(MutableClock::new(
            Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0)
                .single()
                .expect("valid start instant"),
        ));
        let registrar = Arc::new(AccountRegistrar::new(
            store.clone(),
            clock.clone(),
            Arc::new(FixturePasswordHasher),
            Arc::new(TracingInvitationNotifier),
            &TandemSettings::default(),
        ));
        Self {
            store,
            clock,
            registrar,
        }
    }

    /// App with the production route table, session cookie and trace ids.
    pub fn app(
        &self,
    ) -> App<
        impl ServiceFactory<
            ServiceRequest,
            Config = (),
            Response = ServiceResponse<impl MessageBody + use<>>,
            Error = actix_web::Error,
            InitError = (),
        > + use<>,
    > {
        App::new()
            .app_data(web::Data::new(HttpState::new(self.registrar.clone())))
            .wrap(Trace)
            .service(
                web::scope("/api/v1")
                    .wrap(test_session_middleware())
                    .configure(configure_api),
            )
    }
}

pub fn signup_request(email: &str, first_name: &str) -> SignupRequest {
    SignupRequest {
        email: email.to_owned(),
        password: Zeroizing::new(PASSWORD.to_owned()),
        first_name: Some(first_name.to_owned()),
        last_name: None,
    }
}
