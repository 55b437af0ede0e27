//! Small reference tables: course types, course link types, user type names.

use serde::{Deserialize, Serialize};

use crate::entity::Entity;
use crate::error::{DomainError, DomainResult};
use crate::id::LookupId;

/// Which reference table a [`Lookup`] row lives in.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum LookupKind {
    CourseType,
    CourseLinkType,
    UserType,
}

impl LookupKind {
    pub const fn table(self) -> &'static str {
        match self {
            LookupKind::CourseType => "coursetypes",
            LookupKind::CourseLinkType => "courselinktypes",
            LookupKind::UserType => "usertypes",
        }
    }

    pub const fn entity_name(self) -> &'static str {
        match self {
            LookupKind::CourseType => "course type",
            LookupKind::CourseLinkType => "course link type",
            LookupKind::UserType => "user type",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lookup {
    pub id: LookupId,
    pub name: String,
}

impl Entity for Lookup {
    type Id = LookupId;
    const NAME: &'static str = "lookup";

    fn id(&self) -> LookupId {
        self.id
    }
}

impl Lookup {
    pub fn validate_name(name: &str) -> DomainResult<String> {
        let name = name.trim();
        if name.is_empty() {
            return Err(DomainError::validation("name must not be empty"));
        }
        Ok(name.to_string())
    }
}
