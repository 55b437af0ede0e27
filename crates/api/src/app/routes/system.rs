use axum::{
    Json,
    extract::Extension,
    http::{HeaderMap, StatusCode, header},
    response::IntoResponse,
};
use serde_json::json;

use coursedesk_auth::Operation;
use coursedesk_core::UserType;

use crate::app::AppState;
use crate::app::dto::{CourseView, UserView, message};
use crate::app::errors::ApiError;
use crate::app::sessions::expired_session_cookie;
use crate::authz;
use crate::context::IdentityContext;
use crate::middleware::authenticate;

pub async fn health() -> StatusCode {
    StatusCode::OK
}

/// Public: reports whether the request carries a live session.
pub async fn get_session(
    Extension(state): Extension<AppState>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, ApiError> {
    match authenticate(&state, &headers).await {
        Ok(ctx) => Ok(Json(json!({
            "login": true,
            "user": UserView::from(ctx.user().clone()),
        }))),
        Err(ApiError::Unauthenticated(_)) => Ok(Json(json!({ "login": false }))),
        Err(e) => Err(e),
    }
}

pub async fn logout(
    Extension(state): Extension<AppState>,
    Extension(ctx): Extension<IdentityContext>,
) -> Result<impl IntoResponse, ApiError> {
    state.store.delete_session(ctx.session()).await?;
    tracing::info!(user_id = %ctx.user_id(), "logged out");
    Ok((
        [(header::SET_COOKIE, expired_session_cookie().to_string())],
        Json(message("logged out")),
    ))
}

pub async fn presenters(
    Extension(state): Extension<AppState>,
    Extension(ctx): Extension<IdentityContext>,
) -> Result<Json<Vec<UserView>>, ApiError> {
    authz::require(&ctx, Operation::Browse)?;
    let users = state.store.list_users(Some(UserType::Presenter)).await?;
    Ok(Json(users.into_iter().map(UserView::from).collect()))
}

pub async fn popular(
    Extension(state): Extension<AppState>,
    Extension(ctx): Extension<IdentityContext>,
) -> Result<Json<CourseView>, ApiError> {
    authz::require(&ctx, Operation::Browse)?;
    let course = state
        .store
        .most_popular_course()
        .await?
        .ok_or(ApiError::NotFound("course"))?;
    Ok(Json(course.into()))
}
