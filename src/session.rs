//! Per-browser session tracking.
//!
//! The authenticated flag and current username live in an explicit
//! [`SessionContext`] handed to each handler, keyed by a random token in an
//! HttpOnly cookie. Tokens carry an expiry deadline: lookups reject expired
//! entries and new logins sweep them out, so stale tokens stop
//! authenticating and the map stays bounded. The session-log table records
//! login/logout times durably; this map only answers "who is this request".

use axum::{
    async_trait, extract::FromRequestParts, http::request::Parts, response::Redirect,
};
use axum_extra::extract::CookieJar;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::AppState;

pub const SESSION_COOKIE: &str = "reportdeck_session";

/// How long a login stays valid without an explicit logout.
const SESSION_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// The authenticated identity for one browser session.
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub token: String,
    pub username: String,
}

#[derive(Debug)]
struct SessionEntry {
    username: String,
    expires_at: Instant,
}

/// token -> identity for every live browser session. Sessions do not
/// survive a restart; the session-log table is the durable record.
#[derive(Debug, Default)]
pub struct SessionMap {
    inner: DashMap<String, SessionEntry>,
}

impl SessionMap {
    pub fn insert(&self, token: String, username: String) {
        // Each login is a chance to drop entries whose deadline passed,
        // including tokens orphaned by an earlier re-login.
        let now = Instant::now();
        self.inner.retain(|_, entry| entry.expires_at > now);

        self.inner.insert(
            token,
            SessionEntry {
                username,
                expires_at: now + SESSION_TTL,
            },
        );
    }

    pub fn get(&self, token: &str) -> Option<SessionContext> {
        let expired = match self.inner.get(token) {
            Some(entry) if entry.expires_at > Instant::now() => {
                return Some(SessionContext {
                    token: token.to_string(),
                    username: entry.username.clone(),
                });
            }
            Some(_) => true,
            None => false,
        };

        if expired {
            self.inner.remove(token);
        }
        None
    }

    pub fn remove(&self, token: &str) {
        self.inner.remove(token);
    }
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for SessionContext {
    type Rejection = Redirect;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let jar = CookieJar::from_request_parts(parts, state)
            .await
            .map_err(|err| match err {})?;

        jar.get(SESSION_COOKIE)
            .and_then(|cookie| state.sessions.get(cookie.value()))
            .ok_or_else(|| Redirect::to("/login"))
    }
}
