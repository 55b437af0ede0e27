//! Reference tables: course types, course link types and user type names.
//!
//! [`lookups`] serves both editable tables; the table is picked by the
//! `LookupKind` extension the parent router layers on.

use axum::{
    Json, Router,
    extract::Extension,
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};
use serde_json::json;

use coursedesk_auth::Operation;
use coursedesk_core::{Lookup, LookupId, LookupKind, UserType};

use crate::app::AppState;
use crate::app::dto::{ApiJson, ApiPath, NameRequest, RenameUserTypeRequest};
use crate::app::errors::ApiError;
use crate::authz;
use crate::context::IdentityContext;

/// CRUD over one editable lookup table.
pub fn lookups(kind: LookupKind) -> Router {
    Router::new()
        .route("/", get(list_lookups).post(create_lookup))
        .route(
            "/:id",
            get(get_lookup).put(rename_lookup).delete(delete_lookup),
        )
        .layer(Extension(kind))
}

/// User type names; the four ids are fixed, only names change.
pub fn usertypes() -> Router {
    Router::new()
        .route("/", get(list_lookups).post(rename_usertype))
        .route("/:id", get(get_lookup))
        .layer(Extension(LookupKind::UserType))
}

pub async fn list_lookups(
    Extension(state): Extension<AppState>,
    Extension(ctx): Extension<IdentityContext>,
    Extension(kind): Extension<LookupKind>,
) -> Result<Json<Vec<Lookup>>, ApiError> {
    authz::require(&ctx, Operation::Browse)?;
    Ok(Json(state.store.list_lookups(kind).await?))
}

pub async fn get_lookup(
    Extension(state): Extension<AppState>,
    Extension(ctx): Extension<IdentityContext>,
    Extension(kind): Extension<LookupKind>,
    ApiPath(id): ApiPath<LookupId>,
) -> Result<Json<Lookup>, ApiError> {
    authz::require(&ctx, Operation::Browse)?;
    let lookup = state
        .store
        .get_lookup(kind, id)
        .await?
        .ok_or(ApiError::NotFound(kind.entity_name()))?;
    Ok(Json(lookup))
}

pub async fn create_lookup(
    Extension(state): Extension<AppState>,
    Extension(ctx): Extension<IdentityContext>,
    Extension(kind): Extension<LookupKind>,
    ApiJson(body): ApiJson<NameRequest>,
) -> Result<impl IntoResponse, ApiError> {
    authz::require(&ctx, Operation::ManageReferenceData)?;
    let lookup = state.store.create_lookup(kind, body.name).await?;
    Ok((StatusCode::CREATED, Json(lookup)))
}

pub async fn rename_lookup(
    Extension(state): Extension<AppState>,
    Extension(ctx): Extension<IdentityContext>,
    Extension(kind): Extension<LookupKind>,
    ApiPath(id): ApiPath<LookupId>,
    ApiJson(body): ApiJson<NameRequest>,
) -> Result<Json<Lookup>, ApiError> {
    authz::require(&ctx, Operation::ManageReferenceData)?;
    Ok(Json(state.store.rename_lookup(kind, id, body.name).await?))
}

pub async fn delete_lookup(
    Extension(state): Extension<AppState>,
    Extension(ctx): Extension<IdentityContext>,
    Extension(kind): Extension<LookupKind>,
    ApiPath(id): ApiPath<LookupId>,
) -> Result<Json<serde_json::Value>, ApiError> {
    authz::require(&ctx, Operation::ManageReferenceData)?;
    state.store.delete_lookup(kind, id).await?;
    let remaining = state.store.list_lookups(kind).await?;
    Ok(Json(json!({
        "message": format!("{} {id} deleted", kind.entity_name()),
        "items": remaining,
    })))
}

pub async fn rename_usertype(
    Extension(state): Extension<AppState>,
    Extension(ctx): Extension<IdentityContext>,
    ApiJson(body): ApiJson<RenameUserTypeRequest>,
) -> Result<Json<Lookup>, ApiError> {
    authz::require(&ctx, Operation::ManageReferenceData)?;
    let usertype = UserType::try_from(body.id)?;
    let id = LookupId::new(i64::from(usertype.id()));
    let lookup = state
        .store
        .rename_lookup(LookupKind::UserType, id, body.name)
        .await?;
    Ok(Json(lookup))
}
