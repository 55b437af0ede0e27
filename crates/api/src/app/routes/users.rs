use axum::{
    Json, Router,
    extract::Extension,
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};
use serde_json::json;

use coursedesk_auth::Operation;
use coursedesk_core::{CourseId, UserId, UserType};

use crate::app::AppState;
use crate::app::dto::{
    ApiJson, ApiPath, ApiQuery, CourseView, CreateUserRequest, DocumentSummary, ListUsersQuery,
    RegistrationView, UpdateUserRequest, UserLocationRequest, UserView,
};
use crate::app::errors::ApiError;
use crate::authz;
use crate::context::IdentityContext;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_users).post(create_user))
        .route("/:id", get(get_user).put(update_user).delete(delete_user))
        .route(
            "/:id/locations",
            get(get_user_location)
                .post(set_user_location)
                .delete(clear_user_location),
        )
        .route("/:id/registrations", get(registrations))
        .route("/:id/confirmed", get(confirmed))
        .route("/:id/presenting", get(presenting))
        .route("/:id/documents", get(documents))
        .route("/:id/documents/:course_id", get(course_document))
}

pub async fn list_users(
    Extension(state): Extension<AppState>,
    Extension(ctx): Extension<IdentityContext>,
    ApiQuery(query): ApiQuery<ListUsersQuery>,
) -> Result<Json<Vec<UserView>>, ApiError> {
    let requested = match query.user_type {
        None => None,
        Some(raw) => match UserType::try_from(raw) {
            Ok(t) => Some(t),
            Err(_) => {
                // Only callers allowed to filter learn that the id is unknown.
                authz::require(
                    &ctx,
                    Operation::ListUsers {
                        filter: Some(UserType::Teacher),
                    },
                )?;
                return Err(ApiError::Unprocessable(format!("unknown user type {raw}")));
            }
        },
    };

    let filter = authz::require(&ctx, Operation::ListUsers { filter: requested })?;
    let users = state.store.list_users(filter).await?;
    Ok(Json(users.into_iter().map(UserView::from).collect()))
}

pub async fn get_user(
    Extension(state): Extension<AppState>,
    Extension(ctx): Extension<IdentityContext>,
    ApiPath(id): ApiPath<UserId>,
) -> Result<Json<UserView>, ApiError> {
    authz::require(&ctx, Operation::ViewUser { target: id })?;
    let user = state.store.get_user(id).await?.ok_or(ApiError::NotFound("user"))?;
    Ok(Json(user.into()))
}

pub async fn create_user(
    Extension(state): Extension<AppState>,
    Extension(ctx): Extension<IdentityContext>,
    ApiJson(body): ApiJson<CreateUserRequest>,
) -> Result<impl IntoResponse, ApiError> {
    authz::require(&ctx, Operation::ManageUsers)?;
    let user = state.store.create_user(body.into_new_user()?).await?;
    tracing::info!(user_id = %user.id, created_by = %ctx.user_id(), "user created");
    Ok((StatusCode::CREATED, Json(UserView::from(user))))
}

pub async fn update_user(
    Extension(state): Extension<AppState>,
    Extension(ctx): Extension<IdentityContext>,
    ApiPath(id): ApiPath<UserId>,
    ApiJson(body): ApiJson<UpdateUserRequest>,
) -> Result<Json<UserView>, ApiError> {
    authz::require(&ctx, Operation::ManageUsers)?;
    let user = state.store.update_user(id, body.into_changes()?).await?;
    Ok(Json(user.into()))
}

pub async fn delete_user(
    Extension(state): Extension<AppState>,
    Extension(ctx): Extension<IdentityContext>,
    ApiPath(id): ApiPath<UserId>,
) -> Result<impl IntoResponse, ApiError> {
    authz::require(&ctx, Operation::ManageUsers)?;
    state.store.delete_user(id).await?;
    tracing::info!(user_id = %id, deleted_by = %ctx.user_id(), "user deleted");

    let remaining = state.store.list_users(None).await?;
    Ok(Json(json!({
        "message": format!("user {id} deleted"),
        "users": remaining.into_iter().map(UserView::from).collect::<Vec<_>>(),
    })))
}

pub async fn get_user_location(
    Extension(state): Extension<AppState>,
    Extension(ctx): Extension<IdentityContext>,
    ApiPath(id): ApiPath<UserId>,
) -> Result<impl IntoResponse, ApiError> {
    authz::require(&ctx, Operation::ViewUser { target: id })?;
    let user = state.store.get_user(id).await?.ok_or(ApiError::NotFound("user"))?;
    let location = match user.location_id {
        Some(location_id) => state.store.get_location(location_id).await?,
        None => None,
    };
    Ok(Json(json!({ "user_id": id, "location": location })))
}

pub async fn set_user_location(
    Extension(state): Extension<AppState>,
    Extension(ctx): Extension<IdentityContext>,
    ApiPath(id): ApiPath<UserId>,
    ApiJson(body): ApiJson<UserLocationRequest>,
) -> Result<Json<UserView>, ApiError> {
    authz::require(&ctx, Operation::ChangeUserLocation { target: id })?;
    let user = state
        .store
        .set_user_location(id, Some(body.location_id))
        .await?;
    Ok(Json(user.into()))
}

pub async fn clear_user_location(
    Extension(state): Extension<AppState>,
    Extension(ctx): Extension<IdentityContext>,
    ApiPath(id): ApiPath<UserId>,
) -> Result<Json<UserView>, ApiError> {
    authz::require(&ctx, Operation::ChangeUserLocation { target: id })?;
    let user = state.store.set_user_location(id, None).await?;
    Ok(Json(user.into()))
}

pub async fn registrations(
    Extension(state): Extension<AppState>,
    Extension(ctx): Extension<IdentityContext>,
    ApiPath(id): ApiPath<UserId>,
) -> Result<Json<Vec<RegistrationView>>, ApiError> {
    authz::require(&ctx, Operation::ViewOwnRecords { target: id })?;
    let regs = state.store.registrations(id, false).await?;
    Ok(Json(regs.into_iter().map(RegistrationView::from).collect()))
}

pub async fn confirmed(
    Extension(state): Extension<AppState>,
    Extension(ctx): Extension<IdentityContext>,
    ApiPath(id): ApiPath<UserId>,
) -> Result<Json<Vec<RegistrationView>>, ApiError> {
    authz::require(&ctx, Operation::ViewOwnRecords { target: id })?;
    let regs = state.store.registrations(id, true).await?;
    Ok(Json(regs.into_iter().map(RegistrationView::from).collect()))
}

pub async fn presenting(
    Extension(state): Extension<AppState>,
    Extension(ctx): Extension<IdentityContext>,
    ApiPath(id): ApiPath<UserId>,
) -> Result<Json<Vec<CourseView>>, ApiError> {
    authz::require(&ctx, Operation::ViewOwnRecords { target: id })?;
    let courses = state.store.presenting(id).await?;
    Ok(Json(courses.into_iter().map(CourseView::from).collect()))
}

/// Attendance summary over every confirmed course.
pub async fn documents(
    Extension(state): Extension<AppState>,
    Extension(ctx): Extension<IdentityContext>,
    ApiPath(id): ApiPath<UserId>,
) -> Result<Json<DocumentSummary>, ApiError> {
    authz::require(&ctx, Operation::ViewDocuments { target: id })?;
    let user = state.store.get_user(id).await?.ok_or(ApiError::NotFound("user"))?;
    let confirmed = state.store.registrations(id, true).await?;
    Ok(Json(DocumentSummary::new(user, confirmed)))
}

/// Attendance summary for a single confirmed course.
pub async fn course_document(
    Extension(state): Extension<AppState>,
    Extension(ctx): Extension<IdentityContext>,
    ApiPath((id, course_id)): ApiPath<(UserId, CourseId)>,
) -> Result<Json<DocumentSummary>, ApiError> {
    authz::require(&ctx, Operation::ViewDocuments { target: id })?;
    let user = state.store.get_user(id).await?.ok_or(ApiError::NotFound("user"))?;
    let confirmed: Vec<_> = state
        .store
        .registrations(id, true)
        .await?
        .into_iter()
        .filter(|r| r.course.id == course_id)
        .collect();
    if confirmed.is_empty() {
        return Err(ApiError::NotFound("confirmed attendance"));
    }
    Ok(Json(DocumentSummary::new(user, confirmed)))
}
