use axum::extract::{Query, State};
use axum::http::{header, HeaderMap};
use axum::response::{AppendHeaders, IntoResponse, Redirect, Response};
use axum::routing::get;
use axum::{Form, Router};
use rusqlite::params;
use serde::Deserialize;

use crate::auth::password;
use crate::auth::session;
use crate::error::{AppError, AppResult};
use crate::extractors::{session_token, MaybeUser};
use crate::routes::pages;
use crate::state::AppState;

const OAUTH_STATE_COOKIE: &str = "microblog_oauth_state";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/signup", get(pages::signup_page).post(signup))
        .route("/login", get(pages::login_page).post(login))
        .route("/logout", get(logout))
        .route("/auth/github", get(github_login))
        .route("/auth/github/callback", get(github_callback))
}

// -- Request types --

#[derive(Deserialize)]
pub struct CredentialsForm {
    pub username: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
}

// -- Cookie helpers --

fn session_cookie(name: &str, token: &str, max_age_hours: u64) -> String {
    let max_age_secs = max_age_hours * 3600;
    format!(
        "{}={}; HttpOnly; SameSite=Lax; Path=/; Max-Age={}",
        name, token, max_age_secs
    )
}

fn clear_session_cookie(name: &str) -> String {
    format!("{}=; HttpOnly; SameSite=Lax; Path=/; Max-Age=0", name)
}

fn oauth_state_cookie(state: &str) -> String {
    format!(
        "{}={}; HttpOnly; SameSite=Lax; Path=/; Max-Age=300",
        OAUTH_STATE_COOKIE, state
    )
}

fn clear_oauth_state_cookie() -> String {
    format!("{}=; HttpOnly; SameSite=Lax; Path=/; Max-Age=0", OAUTH_STATE_COOKIE)
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err.sqlite_error_code(),
        Some(rusqlite::ErrorCode::ConstraintViolation)
    )
}

// -- Credential handlers --

/// POST /signup - create a user with a hashed password and log them in.
/// A duplicate username surfaces the uniqueness violation, it is never
/// silently overwritten.
pub async fn signup(
    State(state): State<AppState>,
    maybe_user: MaybeUser,
    Form(form): Form<CredentialsForm>,
) -> AppResult<Response> {
    if maybe_user.0.is_some() {
        return Ok(Redirect::to("/profile").into_response());
    }

    let username = form.username.trim().to_string();
    if username.is_empty() || form.password.is_empty() {
        return Err(AppError::BadRequest(
            "username and password are required".into(),
        ));
    }

    let hash = password::hash_password(&form.password)?;
    let user_id = uuid::Uuid::now_v7().to_string();

    let conn = state.db.get()?;
    conn.execute(
        "INSERT INTO users (id, username, password_hash) VALUES (?1, ?2, ?3)",
        params![user_id, username, hash],
    )
    .map_err(|e| {
        if is_unique_violation(&e) {
            AppError::BadRequest("username already taken".into())
        } else {
            AppError::Database(e)
        }
    })?;
    drop(conn);

    let token = session::create_session(&state.db, &user_id, state.config.auth.session_hours)?;

    Ok((
        AppendHeaders([(
            header::SET_COOKIE,
            session_cookie(
                &state.config.auth.cookie_name,
                &token,
                state.config.auth.session_hours,
            ),
        )]),
        Redirect::to("/profile"),
    )
        .into_response())
}

/// POST /login - verify the credential and establish a session. Any
/// credential failure bounces back to the login form, no JSON error body.
pub async fn login(
    State(state): State<AppState>,
    Form(form): Form<CredentialsForm>,
) -> AppResult<Response> {
    let conn = state.db.get()?;
    let row: Option<(String, Option<String>)> = conn
        .query_row(
            "SELECT id, password_hash FROM users WHERE username = ?1",
            params![form.username.trim()],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .ok();
    drop(conn);

    // Unknown user, OAuth-only user, or wrong password all fail the same way
    let Some((user_id, Some(hash))) = row else {
        return Ok(Redirect::to("/login").into_response());
    };
    if !password::verify_password(&form.password, &hash) {
        return Ok(Redirect::to("/login").into_response());
    }

    let token = session::create_session(&state.db, &user_id, state.config.auth.session_hours)?;

    Ok((
        AppendHeaders([(
            header::SET_COOKIE,
            session_cookie(
                &state.config.auth.cookie_name,
                &token,
                state.config.auth.session_hours,
            ),
        )]),
        Redirect::to("/profile"),
    )
        .into_response())
}

/// GET /logout - drop the session row, clear the cookie, go home.
pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> AppResult<Response> {
    if let Some(token) = session_token(&headers, &state.config.auth.cookie_name) {
        session::delete_session(&state.db, token)?;
    }

    Ok((
        AppendHeaders([(
            header::SET_COOKIE,
            clear_session_cookie(&state.config.auth.cookie_name),
        )]),
        Redirect::to("/"),
    )
        .into_response())
}

// -- OAuth handlers --

/// GET /auth/github - send the user to GitHub with a fresh CSRF state.
pub async fn github_login(State(state): State<AppState>) -> AppResult<Response> {
    let Some(ref client) = state.github else {
        return Ok(Redirect::to("/login").into_response());
    };

    let csrf_state = session::generate_token();
    let url = client.authorization_url(&csrf_state);

    Ok((
        AppendHeaders([(header::SET_COOKIE, oauth_state_cookie(&csrf_state))]),
        Redirect::to(&url),
    )
        .into_response())
}

/// GET /auth/github/callback - verify state, trade the code for a profile,
/// then look the user up by their GitHub subject id, creating a record on
/// first login. Every failure on this path redirects to /login.
pub async fn github_callback(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<CallbackQuery>,
) -> AppResult<Response> {
    let Some(ref client) = state.github else {
        return Ok(Redirect::to("/login").into_response());
    };

    let expected_state = session_token(&headers, OAUTH_STATE_COOKIE);
    let (Some(code), Some(callback_state)) = (query.code, query.state) else {
        return Ok(login_redirect());
    };
    if expected_state != Some(callback_state.as_str()) {
        tracing::warn!("OAuth callback state mismatch");
        return Ok(login_redirect());
    }

    let token = match client.exchange_code(&code).await {
        Ok(token) => token,
        Err(e) => {
            tracing::warn!("OAuth code exchange failed: {}", e);
            return Ok(login_redirect());
        }
    };
    let profile = match client.get_user(&token.access_token).await {
        Ok(profile) => profile,
        Err(e) => {
            tracing::warn!("OAuth profile fetch failed: {}", e);
            return Ok(login_redirect());
        }
    };

    let oauth_id = profile.id.to_string();
    let conn = state.db.get()?;
    let existing: Option<String> = conn
        .query_row(
            "SELECT id FROM users WHERE oauth_id = ?1",
            params![oauth_id],
            |row| row.get(0),
        )
        .ok();

    // First OAuth login creates a fresh record; there is no merging with an
    // existing local account of the same name.
    let user_id = match existing {
        Some(id) => id,
        None => {
            let id = uuid::Uuid::now_v7().to_string();
            let inserted = conn.execute(
                "INSERT INTO users (id, username, oauth_id, oauth_username) VALUES (?1, ?2, ?3, ?4)",
                params![id, profile.login, oauth_id, profile.login],
            );
            if let Err(e) = inserted {
                tracing::warn!("OAuth user creation failed: {}", e);
                return Ok(login_redirect());
            }
            id
        }
    };
    drop(conn);

    let token = session::create_session(&state.db, &user_id, state.config.auth.session_hours)?;

    Ok((
        AppendHeaders([
            (
                header::SET_COOKIE,
                session_cookie(
                    &state.config.auth.cookie_name,
                    &token,
                    state.config.auth.session_hours,
                ),
            ),
            (header::SET_COOKIE, clear_oauth_state_cookie()),
        ]),
        Redirect::to("/profile"),
    )
        .into_response())
}

fn login_redirect() -> Response {
    (
        AppendHeaders([(header::SET_COOKIE, clear_oauth_state_cookie())]),
        Redirect::to("/login"),
    )
        .into_response()
}
