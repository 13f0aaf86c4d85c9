//! Tandem: co-parent invitations and account linking.
//!
//! The crate is laid out hexagonally. [`domain`] owns the linking workflow
//! and its ports, [`inbound`] adapts HTTP requests onto it, and
//! [`outbound`] implements the ports over PostgreSQL, memory, Argon2 and
//! the invitation relay.

pub mod doc;
pub mod domain;
pub mod inbound;
pub mod middleware;
pub mod outbound;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

/// Public OpenAPI surface used by Swagger UI and tooling.
pub use doc::ApiDoc;
pub use middleware::Trace;
