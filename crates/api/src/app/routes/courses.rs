use axum::{
    Json, Router,
    extract::Extension,
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};
use serde_json::json;

use coursedesk_auth::Operation;
use coursedesk_core::CourseId;

use crate::app::AppState;
use crate::app::dto::{ApiJson, ApiPath, CourseView, CreateCourseRequest, UpdateCourseRequest};
use crate::app::errors::ApiError;
use crate::authz;
use crate::context::IdentityContext;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_courses).post(create_course))
        .route("/:id", get(get_course).put(update_course).delete(delete_course))
}

pub async fn list_courses(
    Extension(state): Extension<AppState>,
    Extension(ctx): Extension<IdentityContext>,
) -> Result<Json<Vec<CourseView>>, ApiError> {
    authz::require(&ctx, Operation::Browse)?;
    let courses = state.store.list_courses().await?;
    Ok(Json(courses.into_iter().map(CourseView::from).collect()))
}

pub async fn get_course(
    Extension(state): Extension<AppState>,
    Extension(ctx): Extension<IdentityContext>,
    ApiPath(id): ApiPath<CourseId>,
) -> Result<Json<CourseView>, ApiError> {
    authz::require(&ctx, Operation::Browse)?;
    let course = state.store.get_course(id).await?.ok_or(ApiError::NotFound("course"))?;
    Ok(Json(course.into()))
}

pub async fn create_course(
    Extension(state): Extension<AppState>,
    Extension(ctx): Extension<IdentityContext>,
    ApiJson(body): ApiJson<CreateCourseRequest>,
) -> Result<impl IntoResponse, ApiError> {
    authz::require(&ctx, Operation::CreateCourse)?;
    let course = state.store.create_course(body.into_new_course()?).await?;
    tracing::info!(course_id = %course.id, created_by = %ctx.user_id(), "course created");
    Ok((StatusCode::CREATED, Json(CourseView::from(course))))
}

pub async fn update_course(
    Extension(state): Extension<AppState>,
    Extension(ctx): Extension<IdentityContext>,
    ApiPath(id): ApiPath<CourseId>,
    ApiJson(body): ApiJson<UpdateCourseRequest>,
) -> Result<Json<CourseView>, ApiError> {
    let presenting = authz::presenting(state.store.as_ref(), &ctx, id).await?;
    authz::require(&ctx, Operation::ManageCourse { presenting })?;
    let course = state.store.update_course(id, body.into()).await?;
    Ok(Json(course.into()))
}

/// Removes the course with its links, attendance and presenters.
pub async fn delete_course(
    Extension(state): Extension<AppState>,
    Extension(ctx): Extension<IdentityContext>,
    ApiPath(id): ApiPath<CourseId>,
) -> Result<impl IntoResponse, ApiError> {
    let presenting = authz::presenting(state.store.as_ref(), &ctx, id).await?;
    authz::require(&ctx, Operation::ManageCourse { presenting })?;
    state.store.delete_course(id).await?;
    tracing::info!(course_id = %id, deleted_by = %ctx.user_id(), "course deleted");

    let remaining = state.store.list_courses().await?;
    Ok(Json(json!({
        "message": format!("course {id} deleted"),
        "courses": remaining.into_iter().map(CourseView::from).collect::<Vec<_>>(),
    })))
}
