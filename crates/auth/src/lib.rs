//! `coursedesk-auth`: identity, sessions and authorization decisions.
//!
//! This crate is intentionally decoupled from HTTP and storage: every
//! decision is a pure function of the caller's identity and request facts.

pub mod identity;
pub mod policy;
pub mod session;

pub use identity::Identity;
pub use policy::{Decision, Operation, PolicyError, decide, list_users};
pub use session::{Session, SessionError, SessionToken, validate_session};
