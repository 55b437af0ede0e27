use axum::{Json, Router, extract::Extension, routing::{get, post}};
use serde_json::json;

use coursedesk_auth::Operation;
use coursedesk_core::{CourseId, UserId};

use crate::app::AppState;
use crate::app::dto::{AddPresenterRequest, ApiJson, ApiPath, UserView};
use crate::app::errors::ApiError;
use crate::authz;
use crate::context::IdentityContext;

/// Routes under `/courses/:id/presenters`.
pub fn router() -> Router {
    Router::new()
        .route("/:id/presenters", get(list_presenters).post(add_presenter))
        .route(
            "/:id/presenters/:user_id",
            post(add_presenter_by_path).delete(remove_presenter),
        )
}

fn views(users: Vec<coursedesk_core::User>) -> Vec<UserView> {
    users.into_iter().map(UserView::from).collect()
}

pub async fn list_presenters(
    Extension(state): Extension<AppState>,
    Extension(ctx): Extension<IdentityContext>,
    ApiPath(course_id): ApiPath<CourseId>,
) -> Result<Json<Vec<UserView>>, ApiError> {
    authz::require(&ctx, Operation::Browse)?;
    Ok(Json(views(state.store.list_presenters(course_id).await?)))
}

pub async fn add_presenter(
    Extension(state): Extension<AppState>,
    Extension(ctx): Extension<IdentityContext>,
    ApiPath(course_id): ApiPath<CourseId>,
    ApiJson(body): ApiJson<AddPresenterRequest>,
) -> Result<Json<Vec<UserView>>, ApiError> {
    attach(&state, &ctx, course_id, body.user_id).await
}

pub async fn add_presenter_by_path(
    Extension(state): Extension<AppState>,
    Extension(ctx): Extension<IdentityContext>,
    ApiPath((course_id, user_id)): ApiPath<(CourseId, UserId)>,
) -> Result<Json<Vec<UserView>>, ApiError> {
    attach(&state, &ctx, course_id, user_id).await
}

async fn attach(
    state: &AppState,
    ctx: &IdentityContext,
    course_id: CourseId,
    user_id: UserId,
) -> Result<Json<Vec<UserView>>, ApiError> {
    let presenting = authz::presenting(state.store.as_ref(), ctx, course_id).await?;
    authz::require(ctx, Operation::ManageCourse { presenting })?;
    let presenters = state.store.add_presenter(course_id, user_id).await?;
    tracing::info!(course_id = %course_id, user_id = %user_id, "presenter attached");
    Ok(Json(views(presenters)))
}

pub async fn remove_presenter(
    Extension(state): Extension<AppState>,
    Extension(ctx): Extension<IdentityContext>,
    ApiPath((course_id, user_id)): ApiPath<(CourseId, UserId)>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let presenting = authz::presenting(state.store.as_ref(), &ctx, course_id).await?;
    authz::require(&ctx, Operation::ManageCourse { presenting })?;
    let presenters = state.store.remove_presenter(course_id, user_id).await?;
    Ok(Json(json!({
        "message": format!("user {user_id} no longer presents course {course_id}"),
        "presenters": views(presenters),
    })))
}
