use axum::extract::FromRequestParts;
use axum::http::header;
use axum::http::request::Parts;
use rusqlite::params;

use crate::db::models::User;
use crate::error::AppError;
use crate::state::AppState;

/// Optional user extractor for view routes. Resolves the session cookie to a
/// full user record, or None when there is no live session. The page handlers
/// decide between rendering and redirecting, so this never rejects with 401.
pub struct MaybeUser(pub Option<User>);

impl FromRequestParts<AppState> for MaybeUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let Some(token) = session_token(&parts.headers, &state.config.auth.cookie_name) else {
            return Ok(MaybeUser(None));
        };

        let conn = state.db.get()?;
        let user = conn
            .query_row(
                "SELECT u.id, u.username, u.password_hash, u.oauth_id, u.oauth_username, u.created_at \
                 FROM sessions s \
                 JOIN users u ON u.id = s.user_id \
                 WHERE s.token = ?1 AND s.expires_at > datetime('now')",
                params![token],
                |row| {
                    Ok(User {
                        id: row.get(0)?,
                        username: row.get(1)?,
                        password_hash: row.get(2)?,
                        oauth_id: row.get(3)?,
                        oauth_username: row.get(4)?,
                        created_at: row.get(5)?,
                    })
                },
            )
            .ok();

        Ok(MaybeUser(user))
    }
}

/// Pull the session token out of the Cookie headers.
pub fn session_token<'a>(headers: &'a axum::http::HeaderMap, cookie_name: &str) -> Option<&'a str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|s| s.split(';'))
        .map(|s| s.trim())
        .find_map(|cookie| {
            let mut split = cookie.splitn(2, '=');
            let key = split.next()?.trim();
            let val = split.next()?.trim();
            if key == cookie_name {
                Some(val)
            } else {
                None
            }
        })
}
