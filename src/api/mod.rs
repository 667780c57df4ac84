pub mod auth;
pub mod error;
mod handlers;
mod pages;
mod web;
mod ws;

use axum::{
    extract::DefaultBodyLimit,
    http::{HeaderName, HeaderValue},
    routing::{get, post},
    Router,
};
use tokio_util::sync::CancellationToken;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

use std::sync::Arc;

use crate::fault::FaultInjector;
use crate::registry::ConnectionRegistry;
use crate::session::SessionStore;
use crate::store::Store;

use handlers::*;

pub use ws::add_plant;

#[derive(Clone)]
pub struct AppState {
    pub store: Store,
    pub sessions: Arc<SessionStore>,
    pub registry: ConnectionRegistry,
    /// Coin used by error mode.
    pub faults: Arc<dyn FaultInjector>,
    /// Cancelled on server shutdown; open sockets close when it fires.
    pub shutdown: CancellationToken,
}

pub fn router(state: AppState) -> Router {
    // Everything a browser session touches goes through the session layer.
    let browser = Router::new()
        .route("/", get(index))
        .route("/signup", get(signup_form).post(signup))
        .route("/login", get(login_form).post(login))
        .route("/logout", get(logout))
        .route("/dashboard", get(dashboard))
        .route("/toggle_error_mode", post(toggle_error_mode))
        .route("/socket", get(ws::socket))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            auth::attach_session,
        ));

    Router::new()
        .route("/health", get(health))
        .route("/static/{*path}", get(web::static_asset))
        .merge(browser)
        .with_state(state)
        .layer(DefaultBodyLimit::max(64 * 1024))
        .layer(TraceLayer::new_for_http())
        .layer(SetResponseHeaderLayer::overriding(
            HeaderName::from_static("x-frame-options"),
            HeaderValue::from_static("DENY"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            HeaderName::from_static("x-content-type-options"),
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            HeaderName::from_static("referrer-policy"),
            HeaderValue::from_static("same-origin"),
        ))
}

#[cfg(test)]
pub(crate) fn test_state() -> AppState {
    use crate::broker::Broker;
    use crate::fault::NeverFail;
    use std::time::Duration;

    AppState {
        store: Store::open_in_memory().unwrap(),
        sessions: Arc::new(SessionStore::new(Duration::from_secs(3600))),
        registry: ConnectionRegistry::new(Broker::new()),
        faults: Arc::new(NeverFail),
        shutdown: CancellationToken::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fault::AlwaysFail;
    use crate::session::SESSION_COOKIE;
    use axum::{
        body::Body,
        http::{header, Request, StatusCode},
        response::Response,
    };
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn cookie_of(response: &Response) -> String {
        let set_cookie = response
            .headers()
            .get(header::SET_COOKIE)
            .expect("response should mint a session")
            .to_str()
            .unwrap();
        set_cookie.split(';').next().unwrap().to_string()
    }

    fn session_id(cookie: &str) -> String {
        cookie
            .strip_prefix(&format!("{SESSION_COOKIE}="))
            .unwrap()
            .to_string()
    }

    async fn body_text(response: Response) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn get_req(uri: &str, cookie: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri(uri);
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        builder.body(Body::empty()).unwrap()
    }

    fn post_form(uri: &str, cookie: Option<&str>, form: &str) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        builder.body(Body::from(form.to_string())).unwrap()
    }

    /// Start a session by visiting the landing page.
    async fn new_session(app: &Router) -> String {
        let response = app.clone().oneshot(get_req("/", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        cookie_of(&response)
    }

    fn location(response: &Response) -> &str {
        response
            .headers()
            .get(header::LOCATION)
            .unwrap()
            .to_str()
            .unwrap()
    }

    #[tokio::test]
    async fn health_is_ok() {
        let app = router(test_state());
        let response = app.oneshot(get_req("/health", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get(header::SET_COOKIE).is_none());
        assert_eq!(body_text(response).await, r#"{"status":"ok"}"#);
    }

    #[tokio::test]
    async fn security_headers_present() {
        let app = router(test_state());
        let response = app.oneshot(get_req("/", None)).await.unwrap();
        let headers = response.headers();
        assert_eq!(headers.get("x-frame-options").unwrap(), "DENY");
        assert_eq!(headers.get("x-content-type-options").unwrap(), "nosniff");
        assert_eq!(headers.get("referrer-policy").unwrap(), "same-origin");
    }

    #[tokio::test]
    async fn static_assets_served_with_mime() {
        let app = router(test_state());
        let response = app
            .clone()
            .oneshot(get_req("/static/dashboard.js", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let content_type = response.headers().get(header::CONTENT_TYPE).unwrap();
        assert!(content_type.to_str().unwrap().contains("javascript"));

        let response = app
            .oneshot(get_req("/static/missing.js", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn signup_redirects_to_login() {
        let state = test_state();
        let app = router(state.clone());
        let response = app
            .oneshot(post_form("/signup", None, "username=alice&password=pw"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), "/login");
        assert_eq!(state.store.count_users_named("alice").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn duplicate_signup_shows_form_error() {
        let state = test_state();
        let app = router(state.clone());
        app.clone()
            .oneshot(post_form("/signup", None, "username=alice&password=pw"))
            .await
            .unwrap();
        let response = app
            .oneshot(post_form("/signup", None, "username=alice&password=other"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let page = body_text(response).await;
        assert!(page.contains("already taken"));
        assert_eq!(state.store.count_users_named("alice").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn failed_signup_shows_generic_error_and_adds_nothing() {
        let state = test_state();
        state
            .store
            .execute_batch(
                "CREATE TRIGGER reject_users BEFORE INSERT ON users \
                 BEGIN SELECT RAISE(ABORT, 'users are read-only'); END;",
            )
            .await
            .unwrap();
        let app = router(state.clone());

        let response = app
            .oneshot(post_form("/signup", None, "username=alice&password=pw"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let page = body_text(response).await;
        assert!(page.contains("An unexpected error occurred"));
        assert!(!page.contains("already taken"));
        assert_eq!(state.store.count_users_named("alice").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn usernames_are_trimmed_on_signup_and_login() {
        let state = test_state();
        let app = router(state.clone());
        app.clone()
            .oneshot(post_form("/signup", None, "username=+alice+&password=pw"))
            .await
            .unwrap();
        assert_eq!(state.store.count_users_named("alice").await.unwrap(), 1);
        assert_eq!(state.store.count_users_named(" alice ").await.unwrap(), 0);

        let cookie = new_session(&app).await;
        let response = app
            .oneshot(post_form("/login", Some(&cookie), "username=alice+&password=pw"))
            .await
            .unwrap();
        assert_eq!(location(&response), "/dashboard");
    }

    #[tokio::test]
    async fn blank_signup_is_bad_request() {
        let app = router(test_state());
        let response = app
            .oneshot(post_form("/signup", None, "username=&password="))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn login_sets_session_user_and_logout_clears_it() {
        let state = test_state();
        let user = state.store.create_user("alice", "pw").await.unwrap();
        let app = router(state.clone());
        let cookie = new_session(&app).await;
        let id = session_id(&cookie);

        let response = app
            .clone()
            .oneshot(post_form("/login", Some(&cookie), "username=alice&password=pw"))
            .await
            .unwrap();
        assert_eq!(location(&response), "/dashboard");
        assert_eq!(state.sessions.get(&id).unwrap().user_id, Some(user.id));

        let response = app
            .oneshot(get_req("/logout", Some(&cookie)))
            .await
            .unwrap();
        assert_eq!(location(&response), "/");
        assert_eq!(state.sessions.get(&id).unwrap().user_id, None);
    }

    #[tokio::test]
    async fn wrong_password_reports_login_failed() {
        let state = test_state();
        state.store.create_user("alice", "pw").await.unwrap();
        let app = router(state.clone());
        let cookie = new_session(&app).await;

        let response = app
            .oneshot(post_form("/login", Some(&cookie), "username=alice&password=nope"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "Login Failed");
        assert_eq!(state.sessions.get(&session_id(&cookie)).unwrap().user_id, None);
    }

    #[tokio::test]
    async fn dashboard_requires_login() {
        let app = router(test_state());
        let response = app.oneshot(get_req("/dashboard", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), "/login");
    }

    #[tokio::test]
    async fn dashboard_lists_own_plants_only() {
        let state = test_state();
        let alice = state.store.create_user("alice", "pw").await.unwrap();
        let bob = state.store.create_user("bob", "pw").await.unwrap();
        state.store.create_plant(alice.id, "Venus", "flytrap").await.unwrap();
        state.store.create_plant(bob.id, "Drosera", "sundew").await.unwrap();

        let app = router(state.clone());
        let cookie = new_session(&app).await;
        state.sessions.set_user(&session_id(&cookie), Some(alice.id));

        let response = app
            .oneshot(get_req("/dashboard", Some(&cookie)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let page = body_text(response).await;
        assert!(page.contains("Venus"));
        assert!(!page.contains("Drosera"));
    }

    #[tokio::test]
    async fn toggle_twice_restores_flag() {
        let state = test_state();
        let app = router(state.clone());
        let cookie = new_session(&app).await;
        let id = session_id(&cookie);

        for expected in [true, false] {
            let response = app
                .clone()
                .oneshot(post_form("/toggle_error_mode", Some(&cookie), ""))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::SEE_OTHER);
            assert_eq!(state.sessions.get(&id).unwrap().error_mode, expected);
        }
    }

    #[tokio::test]
    async fn toggle_returns_to_referer() {
        let app = router(test_state());
        let cookie = new_session(&app).await;
        let request = Request::builder()
            .method("POST")
            .uri("/toggle_error_mode")
            .header(header::COOKIE, &cookie)
            .header(header::REFERER, "/signup")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(location(&response), "/signup");
    }

    #[tokio::test]
    async fn error_mode_fault_fails_login_with_500() {
        let mut state = test_state();
        state.faults = Arc::new(AlwaysFail);
        state.store.create_user("alice", "pw").await.unwrap();
        let app = router(state.clone());
        let cookie = new_session(&app).await;
        let id = session_id(&cookie);
        state.sessions.toggle_error_mode(&id);

        let response = app
            .oneshot(post_form("/login", Some(&cookie), "username=alice&password=pw"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_text(response).await, "Login Error");
        assert_eq!(state.sessions.get(&id).unwrap().user_id, None);
    }

    #[tokio::test]
    async fn error_mode_fault_keeps_user_logged_in() {
        let mut state = test_state();
        state.faults = Arc::new(AlwaysFail);
        let user = state.store.create_user("alice", "pw").await.unwrap();
        let app = router(state.clone());
        let cookie = new_session(&app).await;
        let id = session_id(&cookie);
        state.sessions.set_user(&id, Some(user.id));
        state.sessions.toggle_error_mode(&id);

        let response = app
            .oneshot(get_req("/logout", Some(&cookie)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_text(response).await, "Logout Error");
        assert_eq!(state.sessions.get(&id).unwrap().user_id, Some(user.id));
    }

    #[tokio::test]
    async fn coin_ignored_without_error_mode() {
        let mut state = test_state();
        state.faults = Arc::new(AlwaysFail);
        state.store.create_user("alice", "pw").await.unwrap();
        let app = router(state);
        let cookie = new_session(&app).await;

        let response = app
            .oneshot(post_form("/login", Some(&cookie), "username=alice&password=pw"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
    }

    #[tokio::test]
    async fn socket_route_requires_upgrade() {
        let app = router(test_state());
        let response = app.oneshot(get_req("/socket", None)).await.unwrap();
        assert_ne!(response.status(), StatusCode::NOT_FOUND);
        assert_ne!(response.status(), StatusCode::OK);
    }
}
