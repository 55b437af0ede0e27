//! Attendance on a course: register, confirm, unregister.
//!
//! A row moves registered -> confirmed and never back; removing it is the
//! only other transition.

use axum::{
    Json, Router,
    extract::Extension,
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};
use serde_json::json;

use coursedesk_auth::{Operation, decide};
use coursedesk_core::{Attendance, Attendee, CourseId, UserId};

use crate::app::AppState;
use crate::app::dto::{ApiJson, ApiPath, AttendeeView, ConfirmAttendanceRequest};
use crate::app::errors::ApiError;
use crate::authz;
use crate::context::IdentityContext;

/// Routes under `/courses/:id/registrations`.
pub fn router() -> Router {
    Router::new()
        .route(
            "/:id/registrations",
            get(list_attendees).post(register_self).put(confirm_many),
        )
        .route(
            "/:id/registrations/:user_id",
            get(get_attendance)
                .post(register_user)
                .put(confirm_user)
                .delete(unregister_user),
        )
}

fn views(attendees: Vec<Attendee>) -> Vec<AttendeeView> {
    attendees.into_iter().map(AttendeeView::from).collect()
}

pub async fn list_attendees(
    Extension(state): Extension<AppState>,
    Extension(ctx): Extension<IdentityContext>,
    ApiPath(course_id): ApiPath<CourseId>,
) -> Result<Json<Vec<AttendeeView>>, ApiError> {
    let presenting = authz::presenting(state.store.as_ref(), &ctx, course_id).await?;
    authz::require(&ctx, Operation::ViewAttendees { presenting })?;
    Ok(Json(views(state.store.list_attendees(course_id).await?)))
}

/// One attendee row; visible to whoever may see the course's attendees, and to the attendee.
pub async fn get_attendance(
    Extension(state): Extension<AppState>,
    Extension(ctx): Extension<IdentityContext>,
    ApiPath((course_id, user_id)): ApiPath<(CourseId, UserId)>,
) -> Result<Json<AttendeeView>, ApiError> {
    if ctx.user_id() != user_id {
        let presenting = authz::presenting(state.store.as_ref(), &ctx, course_id).await?;
        authz::require(&ctx, Operation::ViewAttendees { presenting })?;
    }
    let attendee = state
        .store
        .list_attendees(course_id)
        .await?
        .into_iter()
        .find(|a| a.user.id == user_id)
        .ok_or(ApiError::NotFound("registration"))?;
    Ok(Json(attendee.into()))
}

pub async fn register_self(
    Extension(state): Extension<AppState>,
    Extension(ctx): Extension<IdentityContext>,
    ApiPath(course_id): ApiPath<CourseId>,
) -> Result<impl IntoResponse, ApiError> {
    register(&state, &ctx, course_id, ctx.user_id()).await
}

pub async fn register_user(
    Extension(state): Extension<AppState>,
    Extension(ctx): Extension<IdentityContext>,
    ApiPath((course_id, user_id)): ApiPath<(CourseId, UserId)>,
) -> Result<impl IntoResponse, ApiError> {
    register(&state, &ctx, course_id, user_id).await
}

async fn register(
    state: &AppState,
    ctx: &IdentityContext,
    course_id: CourseId,
    user_id: UserId,
) -> Result<(StatusCode, Json<Attendance>), ApiError> {
    authz::require(ctx, Operation::Register { target: user_id })?;
    let attendance = state.store.register(course_id, user_id).await?;
    tracing::info!(course_id = %course_id, user_id = %user_id, "registered");
    Ok((StatusCode::CREATED, Json(attendance)))
}

/// Confirm every listed registration, or none of them.
pub async fn confirm_many(
    Extension(state): Extension<AppState>,
    Extension(ctx): Extension<IdentityContext>,
    ApiPath(course_id): ApiPath<CourseId>,
    ApiJson(body): ApiJson<ConfirmAttendanceRequest>,
) -> Result<Json<Vec<AttendeeView>>, ApiError> {
    let presenting = authz::presenting(state.store.as_ref(), &ctx, course_id).await?;
    authz::require(&ctx, Operation::ConfirmAttendance { presenting })?;
    if body.user_ids.is_empty() {
        return Err(ApiError::Validation("user_ids must not be empty".to_string()));
    }
    let attendees = state.store.confirm_many(course_id, &body.user_ids).await?;
    tracing::info!(course_id = %course_id, count = body.user_ids.len(), "attendance confirmed");
    Ok(Json(views(attendees)))
}

pub async fn confirm_user(
    Extension(state): Extension<AppState>,
    Extension(ctx): Extension<IdentityContext>,
    ApiPath((course_id, user_id)): ApiPath<(CourseId, UserId)>,
) -> Result<Json<Attendance>, ApiError> {
    let presenting = authz::presenting(state.store.as_ref(), &ctx, course_id).await?;
    authz::require(&ctx, Operation::ConfirmAttendance { presenting })?;
    Ok(Json(state.store.confirm(course_id, user_id).await?))
}

/// The remaining attendee list is only returned to callers who may see it.
pub async fn unregister_user(
    Extension(state): Extension<AppState>,
    Extension(ctx): Extension<IdentityContext>,
    ApiPath((course_id, user_id)): ApiPath<(CourseId, UserId)>,
) -> Result<Json<serde_json::Value>, ApiError> {
    authz::require(&ctx, Operation::Unregister { target: user_id })?;
    // Looked up before the delete so a failure here leaves the row intact.
    let presenting = authz::presenting(state.store.as_ref(), &ctx, course_id).await?;
    let remaining = state.store.unregister(course_id, user_id).await?;
    tracing::info!(course_id = %course_id, user_id = %user_id, "unregistered");

    let message = format!("user {user_id} unregistered from course {course_id}");
    if decide(&ctx.identity(), &Operation::ViewAttendees { presenting }).is_allowed() {
        Ok(Json(json!({ "message": message, "attendees": views(remaining) })))
    } else {
        Ok(Json(json!({ "message": message })))
    }
}
