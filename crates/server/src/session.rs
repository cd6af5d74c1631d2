//! Cookie-backed HTTP sessions.

use crate::AppState;
use axum::extract::{Request, State};
use axum::http::header::{COOKIE, SET_COOKIE};
use axum::http::{HeaderMap, HeaderValue};
use axum::middleware::Next;
use axum::response::Response;

/// The session attached to the current request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub id: String,
    /// `true` when the id was issued by this request.
    pub is_new: bool,
}

/// Session-id lookup for the current request.
#[cfg_attr(test, mockall::automock)]
pub trait SessionLookup: Send + Sync {
    /// The session id, or `None` when the request has no session.
    fn session_id(&self, request: &Request) -> Option<String>;
}

/// Reads the [`Session`] extension installed by [`session_middleware`].
#[derive(Debug, Default, Clone, Copy)]
pub struct CookieSession;

impl SessionLookup for CookieSession {
    fn session_id(&self, request: &Request) -> Option<String> {
        request.extensions().get::<Session>().map(|s| s.id.clone())
    }
}

/// Attach a [`Session`] to every request, issuing a new id (and a
/// `Set-Cookie`) when the client did not present one.
pub async fn session_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let cookie_name = state.config.load().session.cookie_name.clone();

    let session = match cookie_value(request.headers(), &cookie_name).filter(|v| !v.is_empty()) {
        Some(id) => Session { id, is_new: false },
        None => Session {
            id: new_session_id(),
            is_new: true,
        },
    };
    request.extensions_mut().insert(session.clone());

    let mut response = next.run(request).await;

    if session.is_new {
        match HeaderValue::from_str(&format!("{cookie_name}={}; Path=/; HttpOnly", session.id)) {
            Ok(value) => {
                response.headers_mut().append(SET_COOKIE, value);
            }
            Err(e) => tracing::warn!("Failed to build session cookie: {e}"),
        }
    }

    response
}

/// Value of cookie `name` across all `Cookie` headers.
pub fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(k, _)| *k == name)
        .map(|(_, v)| v.trim().to_string())
}

fn new_session_id() -> String {
    uuid::Uuid::new_v4().simple().to_string().to_uppercase()
}
