//! Courses (scheduled training sessions / events).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entity::Entity;
use crate::error::{DomainError, DomainResult};
use crate::id::{CourseId, LocationId, LookupId};

/// A scheduled course.
///
/// # Invariants
/// - `ends >= starts`
/// - `title` is never blank
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Course {
    pub id: CourseId,
    pub title: String,
    pub description: Option<String>,
    pub starts: DateTime<Utc>,
    pub ends: DateTime<Utc>,
    pub coursetype_id: Option<LookupId>,
    pub location_id: Option<LocationId>,
    /// Number of attendance rows. Derived by the store on read, never written.
    pub registrations: u32,
}

impl Entity for Course {
    type Id = CourseId;
    const NAME: &'static str = "course";

    fn id(&self) -> CourseId {
        self.id
    }
}

impl Course {
    /// Length of the course in whole hours (floor).
    pub fn duration_hours(&self) -> i64 {
        whole_hours(self.starts, self.ends)
    }

    /// Apply changes in place; the resulting time window must stay valid.
    pub fn apply(&mut self, changes: &CourseChanges) -> DomainResult<()> {
        let title = match &changes.title {
            Some(t) => validate_title(t)?,
            None => self.title.clone(),
        };
        let starts = changes.starts.unwrap_or(self.starts);
        let ends = changes.ends.unwrap_or(self.ends);
        validate_window(starts, ends)?;

        self.title = title;
        self.starts = starts;
        self.ends = ends;
        if let Some(description) = &changes.description {
            self.description = Some(description.clone());
        }
        if let Some(coursetype_id) = changes.coursetype_id {
            self.coursetype_id = Some(coursetype_id);
        }
        if let Some(location_id) = changes.location_id {
            self.location_id = Some(location_id);
        }
        Ok(())
    }
}

/// Whole hours between two instants, floor-divided. Negative spans floor
/// towards negative infinity, but valid courses never produce them.
pub fn whole_hours(starts: DateTime<Utc>, ends: DateTime<Utc>) -> i64 {
    (ends - starts).num_seconds().div_euclid(3600)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCourse {
    pub title: String,
    pub description: Option<String>,
    pub starts: DateTime<Utc>,
    pub ends: DateTime<Utc>,
    pub coursetype_id: Option<LookupId>,
    pub location_id: Option<LocationId>,
}

impl NewCourse {
    pub fn new(
        title: impl Into<String>,
        description: Option<String>,
        starts: DateTime<Utc>,
        ends: DateTime<Utc>,
        coursetype_id: Option<LookupId>,
        location_id: Option<LocationId>,
    ) -> DomainResult<Self> {
        let title = validate_title(&title.into())?;
        validate_window(starts, ends)?;
        Ok(Self {
            title,
            description,
            starts,
            ends,
            coursetype_id,
            location_id,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CourseChanges {
    pub title: Option<String>,
    pub description: Option<String>,
    pub starts: Option<DateTime<Utc>>,
    pub ends: Option<DateTime<Utc>>,
    pub coursetype_id: Option<LookupId>,
    pub location_id: Option<LocationId>,
}

fn validate_title(title: &str) -> DomainResult<String> {
    let title = title.trim();
    if title.is_empty() {
        return Err(DomainError::validation("title must not be empty"));
    }
    Ok(title.to_string())
}

fn validate_window(starts: DateTime<Utc>, ends: DateTime<Utc>) -> DomainResult<()> {
    if ends < starts {
        return Err(DomainError::validation("course must not end before it starts"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use proptest::prelude::*;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 4, h, m, 0).unwrap()
    }

    fn course(starts: DateTime<Utc>, ends: DateTime<Utc>) -> Course {
        Course {
            id: CourseId::new(1),
            title: "Intro".into(),
            description: None,
            starts,
            ends,
            coursetype_id: None,
            location_id: None,
            registrations: 0,
        }
    }

    #[test]
    fn duration_is_floored_to_whole_hours() {
        assert_eq!(course(at(9, 0), at(11, 59)).duration_hours(), 2);
        assert_eq!(course(at(9, 0), at(12, 0)).duration_hours(), 3);
        assert_eq!(course(at(9, 0), at(9, 0)).duration_hours(), 0);
    }

    #[test]
    fn rejects_course_ending_before_start() {
        let err = NewCourse::new("Intro", None, at(10, 0), at(9, 0), None, None).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn apply_validates_the_resulting_window() {
        let mut c = course(at(9, 0), at(10, 0));
        let err = c
            .apply(&CourseChanges {
                starts: Some(at(11, 0)),
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
        assert_eq!(c.starts, at(9, 0));

        c.apply(&CourseChanges {
            starts: Some(at(11, 0)),
            ends: Some(at(13, 30)),
            title: Some("  Advanced ".into()),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(c.title, "Advanced");
        assert_eq!(c.duration_hours(), 2);
    }

    proptest! {
        /// Property: whole hours never exceed the exact span and lose less than an hour.
        #[test]
        fn whole_hours_is_floor_of_span(secs in 0i64..10_000_000i64) {
            let starts = at(0, 0);
            let ends = starts + Duration::seconds(secs);
            let hours = whole_hours(starts, ends);
            prop_assert!(hours * 3600 <= secs);
            prop_assert!(secs - hours * 3600 < 3600);
        }
    }
}
