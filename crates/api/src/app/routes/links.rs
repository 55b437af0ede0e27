use axum::{
    Json, Router,
    extract::Extension,
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};
use serde_json::json;

use coursedesk_auth::Operation;
use coursedesk_core::{CourseId, CourseLink, LinkId};

use crate::app::AppState;
use crate::app::dto::{ApiJson, ApiPath, CreateLinkRequest, UpdateLinkRequest};
use crate::app::errors::ApiError;
use crate::authz;
use crate::context::IdentityContext;

/// Routes under `/courses/:id/links`.
pub fn router() -> Router {
    Router::new()
        .route("/:id/links", get(list_links).post(create_link))
        .route(
            "/:id/links/:link_id",
            get(get_link).put(update_link).delete(delete_link),
        )
}

pub async fn list_links(
    Extension(state): Extension<AppState>,
    Extension(ctx): Extension<IdentityContext>,
    ApiPath(course_id): ApiPath<CourseId>,
) -> Result<Json<Vec<CourseLink>>, ApiError> {
    authz::require(&ctx, Operation::Browse)?;
    Ok(Json(state.store.list_links(course_id).await?))
}

pub async fn get_link(
    Extension(state): Extension<AppState>,
    Extension(ctx): Extension<IdentityContext>,
    ApiPath((course_id, link_id)): ApiPath<(CourseId, LinkId)>,
) -> Result<Json<CourseLink>, ApiError> {
    authz::require(&ctx, Operation::Browse)?;
    let link = state
        .store
        .get_link(course_id, link_id)
        .await?
        .ok_or(ApiError::NotFound("link"))?;
    Ok(Json(link))
}

pub async fn create_link(
    Extension(state): Extension<AppState>,
    Extension(ctx): Extension<IdentityContext>,
    ApiPath(course_id): ApiPath<CourseId>,
    ApiJson(body): ApiJson<CreateLinkRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let presenting = authz::presenting(state.store.as_ref(), &ctx, course_id).await?;
    authz::require(&ctx, Operation::ManageCourse { presenting })?;
    let link = state.store.create_link(course_id, body.into_new_link()?).await?;
    Ok((StatusCode::CREATED, Json(link)))
}

pub async fn update_link(
    Extension(state): Extension<AppState>,
    Extension(ctx): Extension<IdentityContext>,
    ApiPath((course_id, link_id)): ApiPath<(CourseId, LinkId)>,
    ApiJson(body): ApiJson<UpdateLinkRequest>,
) -> Result<Json<CourseLink>, ApiError> {
    let presenting = authz::presenting(state.store.as_ref(), &ctx, course_id).await?;
    authz::require(&ctx, Operation::ManageCourse { presenting })?;
    let link = state
        .store
        .update_link(course_id, link_id, body.into())
        .await?;
    Ok(Json(link))
}

pub async fn delete_link(
    Extension(state): Extension<AppState>,
    Extension(ctx): Extension<IdentityContext>,
    ApiPath((course_id, link_id)): ApiPath<(CourseId, LinkId)>,
) -> Result<impl IntoResponse, ApiError> {
    let presenting = authz::presenting(state.store.as_ref(), &ctx, course_id).await?;
    authz::require(&ctx, Operation::ManageCourse { presenting })?;
    let links = state.store.delete_link(course_id, link_id).await?;
    Ok(Json(json!({
        "message": format!("link {link_id} deleted"),
        "links": links,
    })))
}
