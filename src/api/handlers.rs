use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
    Extension, Form, Json,
};
use serde::{Deserialize, Serialize};

use crate::fault;
use crate::store::StoreError;

use super::auth::SessionId;
use super::error::ApiError;
use super::pages;
use super::AppState;

pub(super) const DUPLICATE_USERNAME: &str = "That username is already taken, please choose another.";
pub(super) const UNEXPECTED_SIGNUP_ERROR: &str = "An unexpected error occurred. Please try again.";
pub(super) const MISSING_CREDENTIALS: &str = "Username and password are required.";
pub(super) const LOGIN_FAILED: &str = "Login Failed";

#[derive(Serialize)]
pub(super) struct HealthResponse {
    status: &'static str,
}

pub(super) async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

#[derive(Debug, Deserialize)]
pub(super) struct Credentials {
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
}

impl Credentials {
    fn is_complete(&self) -> bool {
        !self.username.trim().is_empty() && !self.password.is_empty()
    }
}

pub(super) async fn index(
    State(state): State<AppState>,
    Extension(session): Extension<SessionId>,
) -> Html<String> {
    Html(pages::index(session.data(&state).error_mode))
}

pub(super) async fn signup_form(
    State(state): State<AppState>,
    Extension(session): Extension<SessionId>,
) -> Html<String> {
    Html(pages::signup(None, session.data(&state).error_mode))
}

pub(super) async fn signup(
    State(state): State<AppState>,
    Extension(session): Extension<SessionId>,
    Form(form): Form<Credentials>,
) -> Response {
    let error_mode = session.data(&state).error_mode;
    if !form.is_complete() {
        return (
            StatusCode::BAD_REQUEST,
            Html(pages::signup(Some(MISSING_CREDENTIALS), error_mode)),
        )
            .into_response();
    }

    let username = form.username.trim();
    match state.store.create_user(username, &form.password).await {
        Ok(user) => {
            tracing::info!(user_id = user.id, username = %user.username, "new user created");
            Redirect::to("/login").into_response()
        }
        Err(StoreError::DuplicateUsername(name)) => {
            tracing::error!(username = %name, "signup failed: username already exists");
            Html(pages::signup(Some(DUPLICATE_USERNAME), error_mode)).into_response()
        }
        Err(e) => {
            tracing::error!(error = %e, "unexpected error during signup");
            Html(pages::signup(Some(UNEXPECTED_SIGNUP_ERROR), error_mode)).into_response()
        }
    }
}

pub(super) async fn login_form(
    State(state): State<AppState>,
    Extension(session): Extension<SessionId>,
) -> Html<String> {
    Html(pages::login(session.data(&state).error_mode))
}

pub(super) async fn login(
    State(state): State<AppState>,
    Extension(session): Extension<SessionId>,
    Form(form): Form<Credentials>,
) -> Result<Response, ApiError> {
    if fault::tripped(session.data(&state).error_mode, state.faults.as_ref()) {
        tracing::error!("login process failed unexpectedly");
        return Err(ApiError::InjectedFault("Login Error"));
    }

    if !form.is_complete() {
        return Ok(LOGIN_FAILED.into_response());
    }

    match state.store.authenticate(form.username.trim(), &form.password).await? {
        Some(user) => {
            state.sessions.set_user(&session.0, Some(user.id));
            tracing::info!(user_id = user.id, "user logged in");
            Ok(Redirect::to("/dashboard").into_response())
        }
        None => {
            tracing::info!(username = %form.username, "login rejected");
            Ok(LOGIN_FAILED.into_response())
        }
    }
}

pub(super) async fn logout(
    State(state): State<AppState>,
    Extension(session): Extension<SessionId>,
) -> Result<Redirect, ApiError> {
    if fault::tripped(session.data(&state).error_mode, state.faults.as_ref()) {
        tracing::error!("logout failed due to session error");
        return Err(ApiError::InjectedFault("Logout Error"));
    }
    if let Some(previous) = session.data(&state).user_id {
        tracing::info!(user_id = previous, "user logged out");
    }
    state.sessions.set_user(&session.0, None);
    Ok(Redirect::to("/"))
}

pub(super) async fn dashboard(
    State(state): State<AppState>,
    Extension(session): Extension<SessionId>,
) -> Result<Response, ApiError> {
    let data = session.data(&state);
    let Some(user_id) = data.user_id else {
        return Ok(Redirect::to("/login").into_response());
    };

    let Some(user) = state.store.get_user(user_id).await? else {
        // The session outlived its user row (e.g. database replaced).
        state.sessions.set_user(&session.0, None);
        return Ok(Redirect::to("/login").into_response());
    };
    let plants = state.store.plants_for_owner(user_id).await?;
    Ok(Html(pages::dashboard(&user, &plants, data.error_mode)).into_response())
}

pub(super) async fn toggle_error_mode(
    State(state): State<AppState>,
    Extension(session): Extension<SessionId>,
    headers: HeaderMap,
) -> Redirect {
    if let Some(enabled) = state.sessions.toggle_error_mode(&session.0) {
        tracing::info!("error mode toggled to {}", if enabled { "on" } else { "off" });
    }
    Redirect::to(&redirect_target(&headers))
}

/// Where to send the browser after toggling: back to the referring page when
/// it belongs to this site, otherwise the landing page.
pub(super) fn redirect_target(headers: &HeaderMap) -> String {
    let Some(referer) = headers.get(header::REFERER).and_then(|v| v.to_str().ok()) else {
        return "/".to_string();
    };
    let path = if referer.starts_with('/') {
        Some(referer)
    } else {
        same_host_path(referer, headers)
    };
    match path {
        Some(path) if is_local_path(path) => path.to_string(),
        _ => "/".to_string(),
    }
}

/// Path part of an absolute referer whose authority matches `Host`.
fn same_host_path<'a>(referer: &'a str, headers: &HeaderMap) -> Option<&'a str> {
    let host = headers.get(header::HOST).and_then(|v| v.to_str().ok())?;
    let rest = referer
        .strip_prefix("http://")
        .or_else(|| referer.strip_prefix("https://"))?;
    let (authority, path) = rest.split_at(rest.find('/')?);
    authority.eq_ignore_ascii_case(host).then_some(path)
}

/// Browsers read `//x` and `/\x` as a scheme-relative URL to host `x`.
fn is_local_path(path: &str) -> bool {
    path.starts_with('/') && !path.starts_with("//") && !path.starts_with("/\\")
}
