//! Session cookies and the identity extractors built on them.
//!
//! The `session` cookie is signed with the server's [`Key`] and carries a
//! [`SessionToken`]. Only the token's hash is stored, so a leaked database does
//! not leak usable sessions.

use crate::server::{Result, ServerError};
use axum::{
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use axum_extra::extract::{
    SignedCookieJar,
    cookie::{Cookie, Key, SameSite},
};
use inkpost_common::{
    model::{
        Id,
        auth::{CreateSession, SessionToken},
        user::{User, UserMarker},
    },
    util::PositiveDuration,
};
use inkpost_db::client::DbClient;
use std::sync::Arc;
use time::UtcDateTime;
use tracing::{debug, info, warn};

pub const SESSION_COOKIE: &str = "session";

/// How long a new session stays valid. `None` means until logout.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct SessionLifetime(pub Option<PositiveDuration>);

/// Whoever sent the request, if they hold a live session.
#[derive(Clone, Eq, PartialEq, Debug, Default, Hash)]
pub struct CurrentUser(pub Option<User>);

/// Gate for admin-only routes. Rejects everyone else with 403 before the handler runs.
#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct AdminUser(pub User);

impl<S> FromRequestParts<S> for CurrentUser
where
    Arc<DbClient>: FromRef<S>,
    Key: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ServerError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Ok(jar) = SignedCookieJar::<Key>::from_request_parts(parts, state).await;
        let db = Arc::<DbClient>::from_ref(state);

        Ok(Self(resolve_user(&jar, &db).await?))
    }
}

impl<S> FromRequestParts<S> for AdminUser
where
    Arc<DbClient>: FromRef<S>,
    Key: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ServerError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let CurrentUser(user) = CurrentUser::from_request_parts(parts, state).await?;

        match user {
            Some(user) if user.is_admin() => Ok(Self(user)),
            Some(user) => {
                warn!(user_id = %user.id, uri = %parts.uri, "Member tried an admin route");
                Err(ServerError::AdminOnly)
            }
            None => {
                warn!(uri = %parts.uri, "Anonymous caller tried an admin route");
                Err(ServerError::AdminOnly)
            }
        }
    }
}

async fn resolve_user(jar: &SignedCookieJar, db: &DbClient) -> Result<Option<User>> {
    let Some(token) = session_token(jar) else {
        return Ok(None);
    };

    let token_hash = token.hash()?;
    let Some(session) = db.fetch_session(&token_hash).await? else {
        debug!(user_id = %token.user_id, "Session cookie names an unknown session");
        return Ok(None);
    };

    if session.user != token.user_id || session.is_expired_at(UtcDateTime::now()) {
        db.delete_session(&token_hash).await?;
        debug!(user_id = %session.user, "Dropped stale session");
        return Ok(None);
    }

    Ok(db.fetch_user(session.user).await?)
}

fn session_token(jar: &SignedCookieJar) -> Option<SessionToken> {
    let cookie = jar.get(SESSION_COOKIE)?;

    cookie
        .value()
        .parse()
        .inspect_err(|err| debug!(error = %err, "Ignoring malformed session cookie"))
        .ok()
}

/// Persists a new session for `user` and hands its token to the client.
///
/// Any session the client already held is deleted first, and expired sessions
/// of all users are purged.
pub async fn start(
    jar: SignedCookieJar,
    db: &DbClient,
    lifetime: SessionLifetime,
    user: Id<UserMarker>,
) -> Result<SignedCookieJar> {
    if let Some(previous_user) = forget_session(&jar, db).await? {
        debug!(user_id = %previous_user, "Replacing previous session");
    }
    let now = UtcDateTime::now();
    db.delete_expired_sessions(now).await?;

    let token = SessionToken::generate_random(user);
    db.create_session(&CreateSession {
        user,
        token_hash: token.hash()?,
        created_at: now,
        expires_after: lifetime.0,
    })
    .await?;

    let mut cookie = Cookie::build((SESSION_COOKIE, token.as_token_str()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax);
    if let Some(lifetime) = lifetime.0 {
        cookie = cookie.max_age(lifetime.get());
    }

    Ok(jar.add(cookie))
}

/// Forgets the session named by the cookie, if any, and clears the cookie.
pub async fn end(jar: SignedCookieJar, db: &DbClient) -> Result<SignedCookieJar> {
    if let Some(user_id) = forget_session(&jar, db).await? {
        info!(%user_id, "User logged out");
    }

    Ok(jar.remove(Cookie::build(SESSION_COOKIE).path("/")))
}

async fn forget_session(jar: &SignedCookieJar, db: &DbClient) -> Result<Option<Id<UserMarker>>> {
    let Some(token) = session_token(jar) else {
        return Ok(None);
    };

    db.delete_session(&token.hash()?).await?;
    Ok(Some(token.user_id))
}
