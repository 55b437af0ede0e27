use coursedesk_auth::{Identity, SessionToken};
use coursedesk_core::{User, UserId};

/// Caller context for a request.
///
/// Inserted by the identity middleware; every protected handler takes it as
/// an explicit `Extension` argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityContext {
    user: User,
    session: SessionToken,
}

impl IdentityContext {
    pub fn new(user: User, session: SessionToken) -> Self {
        Self { user, session }
    }

    pub fn identity(&self) -> Identity {
        Identity::from(&self.user)
    }

    pub fn user_id(&self) -> UserId {
        self.user.id
    }

    /// The caller's user row as read at the start of the request.
    pub fn user(&self) -> &User {
        &self.user
    }

    pub fn session(&self) -> SessionToken {
        self.session
    }
}
