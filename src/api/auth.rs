use axum::{
    extract::{Request, State},
    http::{header, HeaderValue},
    middleware::Next,
    response::Response,
};

use crate::session::{self, SessionData};

use super::AppState;

/// Id of the browser session attached to the current request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionId(pub String);

impl SessionId {
    /// Current data for this session; an expired session reads as anonymous.
    pub fn data(&self, state: &AppState) -> SessionData {
        state.sessions.get(&self.0).unwrap_or_default()
    }
}

/// Extract the session cookie value from the request headers.
fn extract_session_cookie(req: &Request) -> Option<String> {
    req.headers()
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find_map(|v| session::session_id_from_cookie(v).map(str::to_string))
}

/// Session middleware.
///
/// Resolves the session cookie to a live server-side session, minting a new
/// one (and a `Set-Cookie` header) when the cookie is missing, unknown or
/// expired. Handlers read the id from the `SessionId` extension.
pub async fn attach_session(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Response {
    let existing = extract_session_cookie(&req).filter(|id| state.sessions.get(id).is_some());
    let (id, minted) = match existing {
        Some(id) => (id, false),
        None => (state.sessions.create(), true),
    };

    req.extensions_mut().insert(SessionId(id.clone()));
    let mut response = next.run(req).await;

    if minted {
        match HeaderValue::from_str(&session::session_cookie(&id)) {
            Ok(value) => {
                response.headers_mut().append(header::SET_COOKIE, value);
            }
            Err(e) => tracing::error!(error = %e, "failed to build session cookie"),
        }
    }
    response
}
