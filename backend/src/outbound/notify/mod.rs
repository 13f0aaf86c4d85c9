//! Invitation notice adapters.
//!
//! The HTTP relay posts notices to an external mail service; the tracing
//! notifier stands in when no relay is configured and only logs metadata.

mod dto;
mod http_notifier;
mod tracing_notifier;

pub use http_notifier::HttpInvitationNotifier;
pub use tracing_notifier::TracingInvitationNotifier;
