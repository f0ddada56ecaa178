use askama::Template;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};

use crate::error::AppResult;
use crate::extractors::MaybeUser;

#[derive(Template)]
#[template(path = "pages/home.html")]
pub struct HomeTemplate {
    pub logged_in: bool,
}

#[derive(Template)]
#[template(path = "pages/signup.html")]
pub struct SignupTemplate;

#[derive(Template)]
#[template(path = "pages/login.html")]
pub struct LoginTemplate;

#[derive(Template)]
#[template(path = "pages/profile.html")]
pub struct ProfileTemplate {
    pub username: String,
    pub oauth_username: Option<String>,
}

/// Wrapper to render askama templates as axum responses
pub struct Html<T: Template>(pub T);

impl<T: Template> IntoResponse for Html<T> {
    fn into_response(self) -> Response {
        match self.0.render() {
            Ok(body) => (
                StatusCode::OK,
                [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
                body,
            )
                .into_response(),
            Err(e) => {
                tracing::error!("Template render error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Template error").into_response()
            }
        }
    }
}

/// GET / - home page, rendered for everyone.
pub async fn home(maybe_user: MaybeUser) -> AppResult<Response> {
    Ok(Html(HomeTemplate {
        logged_in: maybe_user.0.is_some(),
    })
    .into_response())
}

/// GET /signup - signup form; an authenticated user is sent to their profile.
pub async fn signup_page(maybe_user: MaybeUser) -> AppResult<Response> {
    if maybe_user.0.is_some() {
        return Ok(Redirect::to("/profile").into_response());
    }
    Ok(Html(SignupTemplate).into_response())
}

/// GET /login - login form; an authenticated user is sent to their profile.
pub async fn login_page(maybe_user: MaybeUser) -> AppResult<Response> {
    if maybe_user.0.is_some() {
        return Ok(Redirect::to("/profile").into_response());
    }
    Ok(Html(LoginTemplate).into_response())
}

/// GET /profile - requires a live session, otherwise bounce to login.
pub async fn profile(maybe_user: MaybeUser) -> AppResult<Response> {
    let Some(user) = maybe_user.0 else {
        return Ok(Redirect::to("/login").into_response());
    };

    Ok(Html(ProfileTemplate {
        username: user.username,
        oauth_username: user.oauth_username,
    })
    .into_response())
}
