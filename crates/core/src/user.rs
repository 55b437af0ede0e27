//! Users and their role (`UserType`).

use serde::{Deserialize, Serialize};

use crate::entity::Entity;
use crate::error::{DomainError, DomainResult};
use crate::id::{LocationId, UserId};

/// Role of a user; governs every authorization decision.
///
/// The numeric ids are stable and shared with the `usertypes` lookup table.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "i32")]
pub enum UserType {
    SuperAdmin = 1,
    Presenter = 2,
    Observer = 3,
    /// Self-registered users start as teachers.
    #[default]
    Teacher = 4,
}

impl UserType {
    pub const ALL: [UserType; 4] = [
        UserType::SuperAdmin,
        UserType::Presenter,
        UserType::Observer,
        UserType::Teacher,
    ];

    pub const fn id(self) -> i32 {
        self as i32
    }

    /// Default display name (the lookup table may rename it).
    pub const fn name(self) -> &'static str {
        match self {
            UserType::SuperAdmin => "SuperAdmin",
            UserType::Presenter => "Presenter",
            UserType::Observer => "Observer",
            UserType::Teacher => "Teacher",
        }
    }
}

impl TryFrom<i32> for UserType {
    type Error = DomainError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(UserType::SuperAdmin),
            2 => Ok(UserType::Presenter),
            3 => Ok(UserType::Observer),
            4 => Ok(UserType::Teacher),
            other => Err(DomainError::validation(format!("unknown usertype {other}"))),
        }
    }
}

impl From<UserType> for i32 {
    fn from(value: UserType) -> Self {
        value.id()
    }
}

impl core::fmt::Display for UserType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub usertype: UserType,
    pub location_id: Option<LocationId>,
}

impl Entity for User {
    type Id = UserId;
    const NAME: &'static str = "user";

    fn id(&self) -> UserId {
        self.id
    }
}

impl User {
    /// Apply validated changes in place.
    pub fn apply(&mut self, changes: &UserChanges) -> DomainResult<()> {
        changes.validate()?;
        if let Some(name) = &changes.name {
            self.name = name.trim().to_string();
        }
        if let Some(email) = &changes.email {
            self.email = normalize_email(email);
        }
        if let Some(usertype) = changes.usertype {
            self.usertype = usertype;
        }
        Ok(())
    }
}

/// Input for creating a user (admin creation or self-registration).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub usertype: UserType,
    pub location_id: Option<LocationId>,
}

impl NewUser {
    pub fn new(
        name: impl Into<String>,
        email: impl Into<String>,
        usertype: UserType,
        location_id: Option<LocationId>,
    ) -> DomainResult<Self> {
        let name = validate_name(&name.into())?;
        let email = validate_email(&email.into())?;
        Ok(Self {
            name,
            email,
            usertype,
            location_id,
        })
    }

    /// A user provisioned by the sign-in flow: always a teacher, no location.
    pub fn self_registered(name: impl Into<String>, email: impl Into<String>) -> DomainResult<Self> {
        Self::new(name, email, UserType::default(), None)
    }
}

/// Partial update of a user's details. Role changes are admin-only and
/// are enforced by the caller's policy check, not here.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserChanges {
    pub name: Option<String>,
    pub email: Option<String>,
    pub usertype: Option<UserType>,
}

impl UserChanges {
    pub fn validate(&self) -> DomainResult<()> {
        if let Some(name) = &self.name {
            validate_name(name)?;
        }
        if let Some(email) = &self.email {
            validate_email(email)?;
        }
        Ok(())
    }

    pub fn normalized_email(&self) -> Option<String> {
        self.email.as_deref().map(normalize_email)
    }
}

fn validate_name(name: &str) -> DomainResult<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(DomainError::validation("name must not be empty"));
    }
    Ok(name.to_string())
}

fn validate_email(email: &str) -> DomainResult<String> {
    let email = normalize_email(email);
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() => Ok(email),
        _ => Err(DomainError::validation(format!("invalid email '{email}'"))),
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}
