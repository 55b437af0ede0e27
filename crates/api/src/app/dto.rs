use axum::extract::{FromRequest, FromRequestParts};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use coursedesk_core::{
    Attendee, Course, CourseChanges, CourseId, CourseLinkChanges, LocationId, LookupId,
    NewCourse, NewCourseLink, NewUser, Registration, User, UserChanges, UserId, UserType,
    whole_hours,
};

use crate::app::errors::ApiError;

// -------------------------
// Extractors
// -------------------------

/// `Json` whose rejections become `ApiError::Validation`.
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(ApiError))]
pub struct ApiPath<T>(pub T);

#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(ApiError))]
pub struct ApiQuery<T>(pub T);

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct ListUsersQuery {
    pub user_type: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub name: String,
    pub email: String,
    pub usertype_id: Option<i32>,
    pub location_id: Option<LocationId>,
}

impl CreateUserRequest {
    pub fn into_new_user(self) -> Result<NewUser, ApiError> {
        let usertype = self
            .usertype_id
            .map(UserType::try_from)
            .transpose()?
            .unwrap_or_default();
        Ok(NewUser::new(self.name, self.email, usertype, self.location_id)?)
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateUserRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub usertype_id: Option<i32>,
}

impl UpdateUserRequest {
    pub fn into_changes(self) -> Result<UserChanges, ApiError> {
        let changes = UserChanges {
            name: self.name,
            email: self.email,
            usertype: self.usertype_id.map(UserType::try_from).transpose()?,
        };
        changes.validate()?;
        Ok(changes)
    }
}

#[derive(Debug, Deserialize)]
pub struct UserLocationRequest {
    pub location_id: LocationId,
}

#[derive(Debug, Deserialize)]
pub struct CreateCourseRequest {
    pub title: String,
    pub description: Option<String>,
    pub starts: DateTime<Utc>,
    pub ends: DateTime<Utc>,
    pub coursetype_id: Option<LookupId>,
    pub location_id: Option<LocationId>,
}

impl CreateCourseRequest {
    pub fn into_new_course(self) -> Result<NewCourse, ApiError> {
        Ok(NewCourse::new(
            self.title,
            self.description,
            self.starts,
            self.ends,
            self.coursetype_id,
            self.location_id,
        )?)
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateCourseRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub starts: Option<DateTime<Utc>>,
    pub ends: Option<DateTime<Utc>>,
    pub coursetype_id: Option<LookupId>,
    pub location_id: Option<LocationId>,
}

impl From<UpdateCourseRequest> for CourseChanges {
    fn from(req: UpdateCourseRequest) -> Self {
        CourseChanges {
            title: req.title,
            description: req.description,
            starts: req.starts,
            ends: req.ends,
            coursetype_id: req.coursetype_id,
            location_id: req.location_id,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateLinkRequest {
    pub title: String,
    pub url: String,
    pub linktype_id: Option<LookupId>,
}

impl CreateLinkRequest {
    pub fn into_new_link(self) -> Result<NewCourseLink, ApiError> {
        Ok(NewCourseLink::new(self.title, self.url, self.linktype_id)?)
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateLinkRequest {
    pub title: Option<String>,
    pub url: Option<String>,
    pub linktype_id: Option<LookupId>,
}

impl From<UpdateLinkRequest> for CourseLinkChanges {
    fn from(req: UpdateLinkRequest) -> Self {
        CourseLinkChanges {
            title: req.title,
            url: req.url,
            linktype_id: req.linktype_id,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AddPresenterRequest {
    pub user_id: UserId,
}

#[derive(Debug, Deserialize)]
pub struct ConfirmAttendanceRequest {
    pub user_ids: Vec<UserId>,
}

/// Body for creating or renaming a course type, link type or location.
#[derive(Debug, Deserialize)]
pub struct NameRequest {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct RenameUserTypeRequest {
    pub id: i32,
    pub name: String,
}

// -------------------------
// Display shapes
// -------------------------

#[derive(Debug, Serialize)]
pub struct UserView {
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub usertype_id: i32,
    pub usertype: &'static str,
    pub location_id: Option<LocationId>,
}

impl From<User> for UserView {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            name: user.name,
            email: user.email,
            usertype_id: user.usertype.id(),
            usertype: user.usertype.name(),
            location_id: user.location_id,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CourseView {
    pub id: CourseId,
    pub title: String,
    pub description: Option<String>,
    pub starts: DateTime<Utc>,
    pub ends: DateTime<Utc>,
    pub coursetype_id: Option<LookupId>,
    pub location_id: Option<LocationId>,
    pub registrations: u32,
    /// Whole hours, computed from `starts`/`ends`.
    pub hours: i64,
}

impl From<Course> for CourseView {
    fn from(course: Course) -> Self {
        Self {
            hours: course.duration_hours(),
            id: course.id,
            title: course.title,
            description: course.description,
            starts: course.starts,
            ends: course.ends,
            coursetype_id: course.coursetype_id,
            location_id: course.location_id,
            registrations: course.registrations,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RegistrationView {
    pub course: CourseView,
    pub attended: bool,
    pub hours: i64,
}

impl From<Registration> for RegistrationView {
    fn from(reg: Registration) -> Self {
        Self {
            hours: reg.hours(),
            attended: reg.attended,
            course: reg.course.into(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AttendeeView {
    pub user: UserView,
    pub attended: bool,
}

impl From<Attendee> for AttendeeView {
    fn from(a: Attendee) -> Self {
        Self {
            user: a.user.into(),
            attended: a.attended,
        }
    }
}

/// One confirmed course on an attendance certificate.
#[derive(Debug, Serialize)]
pub struct DocumentEvent {
    pub course_id: CourseId,
    pub title: String,
    /// e.g. `"May 01, 2024"`
    pub start: String,
    pub total: i64,
}

/// Attendance summary handed to the certificate renderer.
#[derive(Debug, Serialize)]
pub struct DocumentSummary {
    pub user: UserView,
    pub events: Vec<DocumentEvent>,
    pub total: i64,
}

impl DocumentSummary {
    /// Build from the user's confirmed registrations.
    pub fn new(user: User, confirmed: Vec<Registration>) -> Self {
        let events: Vec<DocumentEvent> = confirmed
            .into_iter()
            .filter(|r| r.attended)
            .map(|r| DocumentEvent {
                course_id: r.course.id,
                start: r.course.starts.format("%B %d, %Y").to_string(),
                total: whole_hours(r.course.starts, r.course.ends),
                title: r.course.title,
            })
            .collect();
        let total = events.iter().map(|e| e.total).sum();
        Self {
            user: user.into(),
            events,
            total,
        }
    }
}

pub fn message(text: &str) -> serde_json::Value {
    serde_json::json!({ "message": text })
}
