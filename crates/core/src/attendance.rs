//! Attendance: the (course, user) association with its confirmation state.

use serde::{Deserialize, Serialize};

use crate::course::Course;
use crate::id::{CourseId, UserId};
use crate::user::User;

/// Registration state of an attendance row.
///
/// The only transition exposed is `Registered -> Confirmed`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttendanceState {
    Registered,
    Confirmed,
}

/// One row per (course, user) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attendance {
    pub course_id: CourseId,
    pub user_id: UserId,
    pub attended: bool,
}

impl Attendance {
    pub fn registered(course_id: CourseId, user_id: UserId) -> Self {
        Self {
            course_id,
            user_id,
            attended: false,
        }
    }

    pub fn state(&self) -> AttendanceState {
        if self.attended {
            AttendanceState::Confirmed
        } else {
            AttendanceState::Registered
        }
    }

    /// Mark the row as attended. Returns `true` if the state changed;
    /// confirming an already confirmed row is a no-op.
    pub fn confirm(&mut self) -> bool {
        let changed = !self.attended;
        self.attended = true;
        changed
    }
}

/// A user's registration joined with its course.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registration {
    pub course: Course,
    pub attended: bool,
}

impl Registration {
    pub fn hours(&self) -> i64 {
        self.course.duration_hours()
    }
}

/// A course's attendance row joined with its user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attendee {
    pub user: User,
    pub attended: bool,
}
