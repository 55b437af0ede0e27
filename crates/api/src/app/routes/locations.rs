use axum::{
    Json, Router,
    extract::Extension,
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};
use serde_json::json;

use coursedesk_auth::Operation;
use coursedesk_core::{Location, LocationId, NewLocation};

use crate::app::AppState;
use crate::app::dto::{ApiJson, ApiPath, CourseView, NameRequest, UserView};
use crate::app::errors::ApiError;
use crate::authz;
use crate::context::IdentityContext;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_locations).post(create_location))
        .route(
            "/:id",
            get(get_location).put(rename_location).delete(delete_location),
        )
        .route("/:id/users", get(location_users))
        .route("/:id/courses", get(location_courses))
}

pub async fn list_locations(
    Extension(state): Extension<AppState>,
    Extension(ctx): Extension<IdentityContext>,
) -> Result<Json<Vec<Location>>, ApiError> {
    authz::require(&ctx, Operation::Browse)?;
    Ok(Json(state.store.list_locations().await?))
}

pub async fn get_location(
    Extension(state): Extension<AppState>,
    Extension(ctx): Extension<IdentityContext>,
    ApiPath(id): ApiPath<LocationId>,
) -> Result<Json<Location>, ApiError> {
    authz::require(&ctx, Operation::Browse)?;
    let location = state
        .store
        .get_location(id)
        .await?
        .ok_or(ApiError::NotFound("location"))?;
    Ok(Json(location))
}

pub async fn create_location(
    Extension(state): Extension<AppState>,
    Extension(ctx): Extension<IdentityContext>,
    ApiJson(body): ApiJson<NameRequest>,
) -> Result<impl IntoResponse, ApiError> {
    authz::require(&ctx, Operation::ManageReferenceData)?;
    let location = state.store.create_location(NewLocation::new(body.name)?).await?;
    Ok((StatusCode::CREATED, Json(location)))
}

pub async fn rename_location(
    Extension(state): Extension<AppState>,
    Extension(ctx): Extension<IdentityContext>,
    ApiPath(id): ApiPath<LocationId>,
    ApiJson(body): ApiJson<NameRequest>,
) -> Result<Json<Location>, ApiError> {
    authz::require(&ctx, Operation::ManageReferenceData)?;
    let location = state
        .store
        .rename_location(id, NewLocation::new(body.name)?)
        .await?;
    Ok(Json(location))
}

pub async fn delete_location(
    Extension(state): Extension<AppState>,
    Extension(ctx): Extension<IdentityContext>,
    ApiPath(id): ApiPath<LocationId>,
) -> Result<Json<serde_json::Value>, ApiError> {
    authz::require(&ctx, Operation::ManageReferenceData)?;
    state.store.delete_location(id).await?;
    let remaining = state.store.list_locations().await?;
    Ok(Json(json!({
        "message": format!("location {id} deleted"),
        "locations": remaining,
    })))
}

pub async fn location_users(
    Extension(state): Extension<AppState>,
    Extension(ctx): Extension<IdentityContext>,
    ApiPath(id): ApiPath<LocationId>,
) -> Result<Json<Vec<UserView>>, ApiError> {
    authz::require(&ctx, Operation::ListLocationUsers)?;
    let users = state.store.users_at_location(id).await?;
    Ok(Json(users.into_iter().map(UserView::from).collect()))
}

pub async fn location_courses(
    Extension(state): Extension<AppState>,
    Extension(ctx): Extension<IdentityContext>,
    ApiPath(id): ApiPath<LocationId>,
) -> Result<Json<Vec<CourseView>>, ApiError> {
    authz::require(&ctx, Operation::Browse)?;
    let courses = state.store.courses_at_location(id).await?;
    Ok(Json(courses.into_iter().map(CourseView::from).collect()))
}
