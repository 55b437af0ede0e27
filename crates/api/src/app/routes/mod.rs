use axum::{
    Router,
    routing::{get, post},
};

use coursedesk_core::LookupKind;

pub mod courses;
pub mod links;
pub mod locations;
pub mod presenters;
pub mod reference;
pub mod registrations;
pub mod system;
pub mod users;

/// Router for all endpoints that need a signed-in identity.
pub fn router() -> Router {
    let courses = courses::router()
        .merge(links::router())
        .merge(presenters::router())
        .merge(registrations::router())
        .nest("/types", reference::lookups(LookupKind::CourseType));

    Router::new()
        .route("/logout", post(system::logout))
        .route("/presenters", get(system::presenters))
        .route("/popular", get(system::popular))
        .nest("/users", users::router())
        .nest("/courses", courses)
        .nest("/courselinktypes", reference::lookups(LookupKind::CourseLinkType))
        .nest("/locations", locations::router())
        .nest("/usertypes", reference::usertypes())
}
