//! `coursedesk-core`: domain model for courses, users, locations and attendance.
//!
//! This crate contains **pure domain** types and rules (no storage, no HTTP).

pub mod attendance;
pub mod course;
pub mod entity;
pub mod error;
pub mod id;
pub mod link;
pub mod location;
pub mod lookup;
pub mod user;

pub use attendance::{Attendance, AttendanceState, Attendee, Registration};
pub use course::{Course, CourseChanges, NewCourse, whole_hours};
pub use entity::Entity;
pub use error::{DomainError, DomainResult};
pub use id::{CourseId, LinkId, LocationId, LookupId, UserId};
pub use link::{CourseLink, CourseLinkChanges, NewCourseLink};
pub use location::{Location, NewLocation};
pub use lookup::{Lookup, LookupKind};
pub use user::{NewUser, User, UserChanges, UserType};
