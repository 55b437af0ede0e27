//! Storage boundary.
//!
//! The store is split by concern (users, courses, attendance, reference data,
//! sessions); [`Store`] is the union every backend implements.
//!
//! Every mutating method is one unit of work: it either commits all of its
//! effects (including cascades) or none of them. Handlers make at most one
//! mutating call per request, which makes the request the transaction boundary.
//!
//! Cascades are explicit ordered steps, not backend configuration:
//! - deleting a user removes attendance rows, presenting rows, sessions, then the user
//! - deleting a course removes links, attendance rows, presenting rows, then the course

use async_trait::async_trait;
use thiserror::Error;

use coursedesk_auth::{Session, SessionToken};
use coursedesk_core::{
    Attendance, Attendee, Course, CourseChanges, CourseId, CourseLink, CourseLinkChanges,
    DomainError, LinkId, Location, LocationId, Lookup, LookupId, LookupKind, NewCourse,
    NewCourseLink, NewLocation, NewUser, Registration, User, UserChanges, UserId, UserType,
};

pub mod in_memory;
pub mod postgres;

pub use in_memory::InMemoryStore;
pub use postgres::PostgresStore;

pub type StoreResult<T> = Result<T, StoreError>;

/// Store operation error.
///
/// `Backend` carries internal detail for logs only; it must never be shown
/// to API callers verbatim.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("storage error: {0}")]
    Backend(String),
}

impl From<DomainError> for StoreError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) => StoreError::Validation(msg),
            DomainError::NotFound(entity) => StoreError::NotFound(entity),
            DomainError::Conflict(msg) => StoreError::Conflict(msg),
        }
    }
}

#[async_trait]
pub trait UserStore: Send + Sync {
    /// All users, or only those of `usertype`.
    async fn list_users(&self, usertype: Option<UserType>) -> StoreResult<Vec<User>>;
    async fn users_at_location(&self, location_id: LocationId) -> StoreResult<Vec<User>>;
    async fn get_user(&self, id: UserId) -> StoreResult<Option<User>>;
    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>>;
    /// Fails with `Conflict` when the email is taken.
    async fn create_user(&self, user: NewUser) -> StoreResult<User>;
    async fn update_user(&self, id: UserId, changes: UserChanges) -> StoreResult<User>;
    async fn set_user_location(
        &self,
        id: UserId,
        location_id: Option<LocationId>,
    ) -> StoreResult<User>;
    async fn delete_user(&self, id: UserId) -> StoreResult<()>;
}

#[async_trait]
pub trait CourseStore: Send + Sync {
    async fn list_courses(&self) -> StoreResult<Vec<Course>>;
    async fn courses_at_location(&self, location_id: LocationId) -> StoreResult<Vec<Course>>;
    async fn get_course(&self, id: CourseId) -> StoreResult<Option<Course>>;
    /// The course with the most registrations (lowest id wins ties).
    async fn most_popular_course(&self) -> StoreResult<Option<Course>>;
    async fn create_course(&self, course: NewCourse) -> StoreResult<Course>;
    async fn update_course(&self, id: CourseId, changes: CourseChanges) -> StoreResult<Course>;
    async fn delete_course(&self, id: CourseId) -> StoreResult<()>;

    async fn list_links(&self, course_id: CourseId) -> StoreResult<Vec<CourseLink>>;
    async fn get_link(&self, course_id: CourseId, link_id: LinkId)
    -> StoreResult<Option<CourseLink>>;
    async fn create_link(&self, course_id: CourseId, link: NewCourseLink)
    -> StoreResult<CourseLink>;
    async fn update_link(
        &self,
        course_id: CourseId,
        link_id: LinkId,
        changes: CourseLinkChanges,
    ) -> StoreResult<CourseLink>;
    /// Returns the course's remaining links.
    async fn delete_link(&self, course_id: CourseId, link_id: LinkId)
    -> StoreResult<Vec<CourseLink>>;

    async fn list_presenters(&self, course_id: CourseId) -> StoreResult<Vec<User>>;
    async fn is_presenting(&self, course_id: CourseId, user_id: UserId) -> StoreResult<bool>;
    /// Idempotent; returns the course's presenters afterwards.
    async fn add_presenter(&self, course_id: CourseId, user_id: UserId) -> StoreResult<Vec<User>>;
    /// Returns the course's remaining presenters.
    async fn remove_presenter(&self, course_id: CourseId, user_id: UserId)
    -> StoreResult<Vec<User>>;
    /// Courses the user presents.
    async fn presenting(&self, user_id: UserId) -> StoreResult<Vec<Course>>;
}

#[async_trait]
pub trait AttendanceStore: Send + Sync {
    async fn list_attendees(&self, course_id: CourseId) -> StoreResult<Vec<Attendee>>;
    /// Creates the (course, user) row; a second registration is `Conflict`.
    async fn register(&self, course_id: CourseId, user_id: UserId) -> StoreResult<Attendance>;
    /// Registered -> confirmed. Idempotent; `NotFound` when no row exists.
    async fn confirm(&self, course_id: CourseId, user_id: UserId) -> StoreResult<Attendance>;
    /// Confirms every listed user or none of them; returns all attendees afterwards.
    async fn confirm_many(&self, course_id: CourseId, user_ids: &[UserId])
    -> StoreResult<Vec<Attendee>>;
    /// Removes the row; returns the remaining attendees.
    async fn unregister(&self, course_id: CourseId, user_id: UserId) -> StoreResult<Vec<Attendee>>;
    /// A user's registrations, optionally only confirmed ones.
    async fn registrations(&self, user_id: UserId, confirmed_only: bool)
    -> StoreResult<Vec<Registration>>;
}

#[async_trait]
pub trait ReferenceStore: Send + Sync {
    async fn list_lookups(&self, kind: LookupKind) -> StoreResult<Vec<Lookup>>;
    async fn get_lookup(&self, kind: LookupKind, id: LookupId) -> StoreResult<Option<Lookup>>;
    /// User types are fixed; creating one is a validation error.
    async fn create_lookup(&self, kind: LookupKind, name: String) -> StoreResult<Lookup>;
    async fn rename_lookup(&self, kind: LookupKind, id: LookupId, name: String)
    -> StoreResult<Lookup>;
    /// `Conflict` while any course or link still references the row.
    async fn delete_lookup(&self, kind: LookupKind, id: LookupId) -> StoreResult<()>;

    async fn list_locations(&self) -> StoreResult<Vec<Location>>;
    async fn get_location(&self, id: LocationId) -> StoreResult<Option<Location>>;
    async fn create_location(&self, location: NewLocation) -> StoreResult<Location>;
    async fn rename_location(&self, id: LocationId, location: NewLocation) -> StoreResult<Location>;
    /// `Conflict` while any user or course is still at the location.
    async fn delete_location(&self, id: LocationId) -> StoreResult<()>;
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn create_session(&self, session: Session) -> StoreResult<()>;
    async fn get_session(&self, token: SessionToken) -> StoreResult<Option<Session>>;
    async fn delete_session(&self, token: SessionToken) -> StoreResult<()>;
}

/// Everything the API needs from a backend.
pub trait Store: UserStore + CourseStore + AttendanceStore + ReferenceStore + SessionStore {}

impl<T> Store for T where T: UserStore + CourseStore + AttendanceStore + ReferenceStore + SessionStore {}
