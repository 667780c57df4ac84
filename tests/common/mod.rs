#![allow(dead_code)]

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use futures::StreamExt;
use greenhouse::api::{self, AppState};
use greenhouse::broker::Broker;
use greenhouse::fault::{FaultInjector, NeverFail};
use greenhouse::registry::ConnectionRegistry;
use greenhouse::session::SessionStore;
use greenhouse::store::Store;
use http_body_util::BodyExt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

pub type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// App state backed by a database file in a temporary directory.
///
/// The directory is removed when the returned `TempDir` is dropped.
pub fn test_state(faults: Arc<dyn FaultInjector>) -> (AppState, TempDir) {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let store = Store::open(dir.path().join("greenhouse.db")).expect("failed to open store");
    let state = AppState {
        store,
        sessions: Arc::new(SessionStore::new(Duration::from_secs(3600))),
        registry: ConnectionRegistry::new(Broker::new()),
        faults,
        shutdown: CancellationToken::new(),
    };
    (state, dir)
}

pub fn default_state() -> (AppState, TempDir) {
    test_state(Arc::new(NeverFail))
}

/// Starts an HTTP server and returns its address
pub async fn start_server(app: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    addr
}

/// Pair of `Cookie` header value and bare session id.
pub struct Browser {
    pub cookie: String,
    pub session_id: String,
}

/// Visit the landing page to obtain a fresh session.
pub async fn new_browser(app: &Router) -> Browser {
    let response = app
        .clone()
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let set_cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .expect("landing page should mint a session")
        .to_str()
        .unwrap();
    let cookie = set_cookie.split(';').next().unwrap().to_string();
    let session_id = cookie.split_once('=').unwrap().1.to_string();
    Browser { cookie, session_id }
}

pub async fn post_form(
    app: &Router,
    browser: &Browser,
    uri: &str,
    form: &str,
) -> axum::response::Response {
    app.clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header(header::COOKIE, &browser.cookie)
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from(form.to_string()))
                .unwrap(),
        )
        .await
        .unwrap()
}

pub async fn get(app: &Router, browser: &Browser, uri: &str) -> axum::response::Response {
    app.clone()
        .oneshot(
            Request::builder()
                .uri(uri)
                .header(header::COOKIE, &browser.cookie)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap()
}

pub async fn body_text(response: axum::response::Response) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

/// Sign up and log in `username`, returning the logged-in browser.
pub async fn signup_and_login(app: &Router, username: &str, password: &str) -> Browser {
    let browser = new_browser(app).await;
    let form = format!("username={username}&password={password}");
    let response = post_form(app, &browser, "/signup", &form).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    let response = post_form(app, &browser, "/login", &form).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    browser
}

/// Open `/socket` carrying the browser's session cookie.
pub async fn connect_socket(addr: SocketAddr, browser: &Browser) -> Socket {
    let mut request = format!("ws://{addr}/socket").into_client_request().unwrap();
    request
        .headers_mut()
        .insert(header::COOKIE, browser.cookie.parse().unwrap());
    let (ws, _) = connect_async(request).await.expect("websocket connect failed");
    ws
}

/// Receive the next text frame as JSON, failing after two seconds.
pub async fn recv_json(ws: &mut Socket) -> serde_json::Value {
    let deadline = Duration::from_secs(2);
    loop {
        let msg = tokio::time::timeout(deadline, ws.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("socket closed")
            .expect("socket error");
        if let Message::Text(text) = msg {
            return serde_json::from_str(text.as_str()).expect("frame should be JSON");
        }
    }
}

pub fn add_plant_frame(name: &str, kind: &str) -> Message {
    Message::Text(
        serde_json::json!({
            "event": "add_plant",
            "data": { "plant_name": name, "plant_type": kind },
        })
        .to_string()
        .into(),
    )
}

pub fn router(state: &AppState) -> Router {
    api::router(state.clone())
}
