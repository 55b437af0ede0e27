//! Sign-in: the entry point for the OAuth callback.
//!
//! The provider exchange happens elsewhere; it hands over the verified
//! profile and gets back a session to set on the client.

use chrono::Utc;
use cookie::{Cookie, SameSite};

use coursedesk_auth::Session;
use coursedesk_core::{NewUser, User};
use coursedesk_infra::StoreError;

use crate::app::AppState;
use crate::app::errors::ApiError;
use crate::middleware::SESSION_COOKIE;

/// Identity claims returned by the login provider.
#[derive(Debug, Clone)]
pub struct Profile {
    pub email: Option<String>,
    pub name: String,
}

/// Result of a successful sign-in.
#[derive(Debug, Clone)]
pub struct SignedIn {
    pub user: User,
    pub session: Session,
    /// To be set on the client by the callback response.
    pub cookie: Cookie<'static>,
}

/// Find or provision the user for `profile` and open a session.
///
/// New users are always teachers without a location.
pub async fn sign_in(state: &AppState, profile: Profile) -> Result<SignedIn, ApiError> {
    let email = profile
        .email
        .filter(|e| !e.trim().is_empty())
        .ok_or_else(|| ApiError::Validation("unable to login, email is null".to_string()))?;

    let user = match state.store.find_user_by_email(&email).await? {
        Some(user) => user,
        None => {
            let new_user = NewUser::self_registered(profile.name, email.clone())?;
            match state.store.create_user(new_user).await {
                Ok(user) => {
                    tracing::info!(user_id = %user.id, "provisioned user on first login");
                    user
                }
                // Lost a race with a concurrent first login.
                Err(StoreError::Conflict(_)) => state
                    .store
                    .find_user_by_email(&email)
                    .await?
                    .ok_or(ApiError::NotFound("user"))?,
                Err(e) => return Err(e.into()),
            }
        }
    };

    let session = Session::issue(user.id, Utc::now(), state.session_ttl);
    state.store.create_session(session.clone()).await?;
    let cookie = session_cookie(&session);
    Ok(SignedIn {
        user,
        session,
        cookie,
    })
}

/// The cookie that carries `session` back to the browser.
fn session_cookie(session: &Session) -> Cookie<'static> {
    let max_age = cookie::time::Duration::seconds((session.expires_at - session.issued_at).num_seconds());
    Cookie::build((SESSION_COOKIE, session.token.to_string()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .max_age(max_age)
        .build()
}

/// A cookie that clears the session on the client.
pub fn expired_session_cookie() -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, ""))
        .path("/")
        .max_age(cookie::time::Duration::ZERO)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use coursedesk_core::UserType;
    use coursedesk_infra::InMemoryStore;

    fn state() -> AppState {
        AppState::new(Arc::new(InMemoryStore::new()), chrono::Duration::hours(2))
    }

    #[tokio::test]
    async fn first_login_provisions_a_teacher() {
        let state = state();
        let SignedIn {
            user,
            session,
            cookie,
        } = sign_in(
            &state,
            Profile {
                email: Some("New.Teacher@school.org".into()),
                name: "New Teacher".into(),
            },
        )
        .await
        .unwrap();

        assert_eq!(user.usertype, UserType::Teacher);
        assert_eq!(user.email, "new.teacher@school.org");
        assert_eq!(user.location_id, None);
        assert_eq!(session.user_id, user.id);
        assert_eq!(session.expires_at - session.issued_at, chrono::Duration::hours(2));
        assert_eq!(cookie.value(), session.token.to_string());
        assert_eq!(state.store.get_session(session.token).await.unwrap(), Some(session));
    }

    #[tokio::test]
    async fn returning_user_keeps_their_role() {
        let state = state();
        let admin = state
            .store
            .create_user(
                NewUser::new("Admin", "admin@school.org", UserType::SuperAdmin, None).unwrap(),
            )
            .await
            .unwrap();

        let signed = sign_in(
            &state,
            Profile {
                email: Some("admin@school.org".into()),
                name: "Whatever".into(),
            },
        )
        .await
        .unwrap();
        assert_eq!(signed.user, admin);
        assert_eq!(state.store.list_users(None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn missing_email_is_rejected() {
        let err = sign_in(
            &state(),
            Profile {
                email: None,
                name: "Nobody".into(),
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }

    #[test]
    fn cookie_carries_the_token() {
        let session = Session::issue(coursedesk_core::UserId::new(1), Utc::now(), chrono::Duration::hours(1));
        let cookie = session_cookie(&session);
        assert_eq!(cookie.name(), SESSION_COOKIE);
        assert_eq!(cookie.value(), session.token.to_string());
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.max_age(), Some(cookie::time::Duration::hours(1)));
    }
}
