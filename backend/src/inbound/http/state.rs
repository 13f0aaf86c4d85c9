//! Shared HTTP adapter state.
//!
//! Handlers receive this through `web::Data` and reach the domain only via
//! the [`AccountRegistrar`] and the services it exposes.

use std::sync::Arc;

use crate::domain::linking::{
    AccountRegistrar, ContactSync, InvitationService, InvitationValidator, RoomMerger,
};

/// Dependency bundle for HTTP handlers.
#[derive(Clone)]
pub struct HttpState {
    registrar: Arc<AccountRegistrar>,
}

impl HttpState {
    /// Wrap a registrar for sharing across workers.
    pub fn new(registrar: Arc<AccountRegistrar>) -> Self {
        Self { registrar }
    }

    /// Signup, login and acceptance pipeline.
    pub fn registrar(&self) -> &AccountRegistrar {
        &self.registrar
    }

    /// Invitation issuing and listing.
    pub fn invitations(&self) -> &InvitationService {
        self.registrar.invitations()
    }

    /// Token validation and decline.
    pub fn validator(&self) -> &InvitationValidator {
        self.registrar.validator()
    }

    /// Rooms and room invite codes.
    pub fn rooms(&self) -> &RoomMerger {
        self.registrar.rooms()
    }

    /// Contact listing.
    pub fn contacts(&self) -> &ContactSync {
        self.registrar.contacts()
    }
}
