//! HTTP server configuration object.

use std::net::SocketAddr;

use tandem::inbound::http::session_config::SessionSettings;
use tandem::inbound::http::state::HttpState;

/// Everything [`super::create_server`] needs besides the health state.
pub struct ServerConfig {
    pub(crate) session: SessionSettings,
    pub(crate) bind_addr: SocketAddr,
    pub(crate) http_state: HttpState,
}

impl ServerConfig {
    /// Construct a server configuration around the linking services.
    #[must_use]
    pub fn new(session: SessionSettings, bind_addr: SocketAddr, http_state: HttpState) -> Self {
        Self {
            session,
            bind_addr,
            http_state,
        }
    }
}
