//! Outbound adapters implementing domain ports.
//!
//! - **persistence**: PostgreSQL linking store using Diesel
//! - **memory**: in-process linking store for tests and local runs
//! - **security**: Argon2 password hashing
//! - **notify**: invitation notice delivery
//!
//! Adapters translate between domain types and infrastructure
//! representations. They contain no business logic.

pub mod memory;
pub mod notify;
pub mod persistence;
pub mod security;
