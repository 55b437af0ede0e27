use serde::{Deserialize, Serialize};

use coursedesk_core::{User, UserId, UserType};

/// The calling user for one request.
///
/// Built fresh from the store on every request so role changes take effect
/// immediately; handlers receive it explicitly instead of reading globals.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: UserId,
    pub usertype: UserType,
}

impl Identity {
    pub fn new(id: UserId, usertype: UserType) -> Self {
        Self { id, usertype }
    }

    pub fn is(&self, user_id: UserId) -> bool {
        self.id == user_id
    }
}

impl From<&User> for Identity {
    fn from(user: &User) -> Self {
        Self::new(user.id, user.usertype)
    }
}
