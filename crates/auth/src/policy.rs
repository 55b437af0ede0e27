//! Authorization decision tables.
//!
//! Every endpoint maps its request to one [`Operation`]; [`decide`] is the
//! single place that turns (identity, operation) into a [`Decision`].
//!
//! - No IO
//! - No panics
//! - Facts that need a lookup (e.g. "is the caller presenting this course")
//!   are resolved by the caller and passed in on the operation.

use thiserror::Error;

use coursedesk_core::{UserId, UserType};

use crate::Identity;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum PolicyError {
    /// The caller's role or identity does not permit the request.
    #[error("you are not authorized to access this resource")]
    Unauthorized,

    /// The request combines parameters the caller may never combine.
    #[error("unprocessable request parameters")]
    Unprocessable,
}

/// Outcome of an authorization check.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Permitted without a row filter.
    Allow,
    /// Permitted, restricted to users of this type.
    Filter(UserType),
    Deny(PolicyError),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        !matches!(self, Decision::Deny(_))
    }

    /// `Ok(None)` for an unrestricted allow, `Ok(Some(t))` for a filtered one.
    pub fn into_result(self) -> Result<Option<UserType>, PolicyError> {
        match self {
            Decision::Allow => Ok(None),
            Decision::Filter(t) => Ok(Some(t)),
            Decision::Deny(e) => Err(e),
        }
    }
}

/// Every access-controlled operation of the API.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Operation {
    /// `GET /users[?user_type=]`
    ListUsers { filter: Option<UserType> },
    /// `GET /users/{id}`, `GET /users/{id}/locations`
    ViewUser { target: UserId },
    /// `POST /users`, `PUT /users/{id}`, `DELETE /users/{id}`
    ManageUsers,
    /// `POST|DELETE /users/{id}/locations`
    ChangeUserLocation { target: UserId },
    /// `GET /users/{id}/registrations|confirmed|presenting`
    ViewOwnRecords { target: UserId },
    /// `GET /users/{id}/documents[/{course}]`
    ViewDocuments { target: UserId },
    /// `GET /locations/{id}/users`
    ListLocationUsers,
    /// Plain reads of courses, links, presenters and reference data.
    Browse,
    /// `POST /courses`
    CreateCourse,
    /// Course edits, links and presenter assignment.
    ManageCourse { presenting: bool },
    /// `GET /courses/{id}/registrations`
    ViewAttendees { presenting: bool },
    /// `POST /courses/{id}/registrations[/{uid}]`
    Register { target: UserId },
    /// `PUT /courses/{id}/registrations[/{uid}]`
    ConfirmAttendance { presenting: bool },
    /// `DELETE /courses/{id}/registrations/{uid}`
    Unregister { target: UserId },
    /// Writes to course types, link types, locations and user type names.
    ManageReferenceData,
}

/// Decide whether `identity` may perform `op`.
pub fn decide(identity: &Identity, op: &Operation) -> Decision {
    use Decision::{Allow, Deny};
    use UserType::{Observer, Presenter, SuperAdmin, Teacher};

    let role = identity.usertype;
    let allow_if = |ok: bool| if ok { Allow } else { Deny(PolicyError::Unauthorized) };

    match *op {
        Operation::ListUsers { filter } => list_users(role, filter),
        Operation::ViewUser { target } => {
            allow_if(matches!(role, SuperAdmin | Presenter) || identity.is(target))
        }
        Operation::ManageUsers | Operation::ManageReferenceData => allow_if(role == SuperAdmin),
        Operation::ChangeUserLocation { target }
        | Operation::ViewDocuments { target }
        | Operation::Register { target }
        | Operation::Unregister { target } => allow_if(role == SuperAdmin || identity.is(target)),
        Operation::ViewOwnRecords { target } => allow_if(identity.is(target)),
        Operation::ListLocationUsers => allow_if(role != Teacher),
        Operation::Browse => Allow,
        Operation::CreateCourse => allow_if(matches!(role, SuperAdmin | Presenter)),
        Operation::ManageCourse { presenting } | Operation::ConfirmAttendance { presenting } => {
            allow_if(role == SuperAdmin || (role == Presenter && presenting))
        }
        Operation::ViewAttendees { presenting } => {
            allow_if(matches!(role, SuperAdmin | Observer) || (role == Presenter && presenting))
        }
    }
}

/// Decision table for listing users.
///
/// | caller              | no filter    | admin filter   | other filter |
/// |---------------------|--------------|----------------|--------------|
/// | SuperAdmin          | Allow        | Filter         | Filter       |
/// | Presenter, Observer | Unauthorized | Unprocessable  | Filter       |
/// | Teacher             | Unauthorized | Unauthorized   | Unauthorized |
pub fn list_users(role: UserType, filter: Option<UserType>) -> Decision {
    use UserType::{Observer, Presenter, SuperAdmin, Teacher};

    match (role, filter) {
        (Teacher, _) => Decision::Deny(PolicyError::Unauthorized),
        (SuperAdmin, None) => Decision::Allow,
        (SuperAdmin, Some(t)) => Decision::Filter(t),
        (Presenter | Observer, None) => Decision::Deny(PolicyError::Unauthorized),
        (Presenter | Observer, Some(SuperAdmin)) => Decision::Deny(PolicyError::Unprocessable),
        (Presenter | Observer, Some(t)) => Decision::Filter(t),
    }
}
