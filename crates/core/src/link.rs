//! Links attached to a course (slides, recordings, sign-up sheets, ...).

use serde::{Deserialize, Serialize};

use crate::entity::Entity;
use crate::error::{DomainError, DomainResult};
use crate::id::{CourseId, LinkId, LookupId};

/// A link always belongs to exactly one course and is removed with it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseLink {
    pub id: LinkId,
    pub course_id: CourseId,
    pub title: String,
    pub url: String,
    pub linktype_id: Option<LookupId>,
}

impl Entity for CourseLink {
    type Id = LinkId;
    const NAME: &'static str = "link";

    fn id(&self) -> LinkId {
        self.id
    }
}

impl CourseLink {
    pub fn apply(&mut self, changes: &CourseLinkChanges) -> DomainResult<()> {
        let title = changes.title.as_deref().map(validate_title).transpose()?;
        let url = changes.url.as_deref().map(validate_url).transpose()?;
        if let Some(title) = title {
            self.title = title;
        }
        if let Some(url) = url {
            self.url = url;
        }
        if let Some(linktype_id) = changes.linktype_id {
            self.linktype_id = Some(linktype_id);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCourseLink {
    pub title: String,
    pub url: String,
    pub linktype_id: Option<LookupId>,
}

impl NewCourseLink {
    pub fn new(
        title: impl Into<String>,
        url: impl Into<String>,
        linktype_id: Option<LookupId>,
    ) -> DomainResult<Self> {
        Ok(Self {
            title: validate_title(&title.into())?,
            url: validate_url(&url.into())?,
            linktype_id,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CourseLinkChanges {
    pub title: Option<String>,
    pub url: Option<String>,
    pub linktype_id: Option<LookupId>,
}

fn validate_title(title: &str) -> DomainResult<String> {
    let title = title.trim();
    if title.is_empty() {
        return Err(DomainError::validation("link title must not be empty"));
    }
    Ok(title.to_string())
}

fn validate_url(url: &str) -> DomainResult<String> {
    let url = url.trim();
    if url.is_empty() || url.chars().any(char::is_whitespace) {
        return Err(DomainError::validation(format!("invalid url '{url}'")));
    }
    Ok(url.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_link_trims_and_validates() {
        let link = NewCourseLink::new(" Slides ", "http://x", None).unwrap();
        assert_eq!(link.title, "Slides");
        assert_eq!(link.url, "http://x");

        assert!(NewCourseLink::new("Slides", "", None).is_err());
        assert!(NewCourseLink::new("Slides", "http://x y", None).is_err());
        assert!(NewCourseLink::new("", "http://x", None).is_err());
    }

    #[test]
    fn apply_is_all_or_nothing() {
        let mut link = CourseLink {
            id: LinkId::new(1),
            course_id: CourseId::new(5),
            title: "Slides".into(),
            url: "http://x".into(),
            linktype_id: None,
        };
        let err = link.apply(&CourseLinkChanges {
            title: Some("Deck".into()),
            url: Some(" ".into()),
            linktype_id: None,
        });
        assert!(err.is_err());
        assert_eq!(link.title, "Slides");
    }
}
