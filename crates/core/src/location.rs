//! Locations (schools / buildings) that host courses and own users.

use serde::{Deserialize, Serialize};

use crate::entity::Entity;
use crate::error::{DomainError, DomainResult};
use crate::id::LocationId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub id: LocationId,
    pub name: String,
}

impl Entity for Location {
    type Id = LocationId;
    const NAME: &'static str = "location";

    fn id(&self) -> LocationId {
        self.id
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLocation {
    pub name: String,
}

impl NewLocation {
    pub fn new(name: impl Into<String>) -> DomainResult<Self> {
        let name = name.into().trim().to_string();
        if name.is_empty() {
            return Err(DomainError::validation("location name must not be empty"));
        }
        Ok(Self { name })
    }
}
