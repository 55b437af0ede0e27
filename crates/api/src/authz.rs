//! API-side authorization guard.
//!
//! Handlers resolve request facts (e.g. whether the caller presents the
//! course) and hand them to the pure decision tables in `coursedesk-auth`.

use coursedesk_auth::{Operation, decide};
use coursedesk_core::{CourseId, UserType};
use coursedesk_infra::Store;

use crate::app::errors::ApiError;
use crate::context::IdentityContext;

/// Check `op` for the caller. `Ok(Some(t))` means the caller may only see
/// users of type `t`.
pub fn require(ctx: &IdentityContext, op: Operation) -> Result<Option<UserType>, ApiError> {
    let identity = ctx.identity();
    decide(&identity, &op).into_result().map_err(|e| {
        tracing::info!(
            user_id = %identity.id,
            usertype = %identity.usertype,
            operation = ?op,
            "access denied"
        );
        e.into()
    })
}

/// Whether the caller is a presenter assigned to `course_id`.
///
/// Only presenters need the lookup; for every other role the answer does not
/// change the decision.
pub async fn presenting(
    store: &dyn Store,
    ctx: &IdentityContext,
    course_id: CourseId,
) -> Result<bool, ApiError> {
    if ctx.identity().usertype != UserType::Presenter {
        return Ok(false);
    }
    Ok(store.is_presenting(course_id, ctx.user_id()).await?)
}
