//! Registers the acting user into the logging context for the lifetime of a
//! request.
//!
//! The identity is the authenticated username when there is one, otherwise
//! `anonymous-<last 4 chars of the session id>`. Requests with neither are
//! left untagged. Registration happens before the downstream chain runs and
//! is undone after it finishes, however it finishes.

use crate::AppState;
use crate::auth::SecurityService;
use crate::session::SessionLookup;
use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use forum_core::mdc::{self, LoggerMdc};
use std::future::Future;
use std::sync::Arc;

const ANONYMOUS_PREFIX: &str = "anonymous-";
const ANONYMOUS_SUFFIX_CHARS: usize = 4;

/// Who a request is logged as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestIdentity {
    Authenticated(String),
    Anonymous(String),
}

impl RequestIdentity {
    /// Anonymous tag built from the trailing characters of `session_id`.
    /// Ids shorter than four characters are used whole.
    pub fn anonymous(session_id: &str) -> Self {
        let start = session_id
            .char_indices()
            .rev()
            .nth(ANONYMOUS_SUFFIX_CHARS - 1)
            .map_or(0, |(i, _)| i);
        Self::Anonymous(format!("{ANONYMOUS_PREFIX}{}", &session_id[start..]))
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Authenticated(name) | Self::Anonymous(name) => name,
        }
    }
}

pub struct LoggingConfigurationFilter {
    security: Arc<dyn SecurityService>,
    sessions: Arc<dyn SessionLookup>,
    mdc: Arc<dyn LoggerMdc>,
}

impl LoggingConfigurationFilter {
    pub fn new(
        security: Arc<dyn SecurityService>,
        sessions: Arc<dyn SessionLookup>,
        mdc: Arc<dyn LoggerMdc>,
    ) -> Self {
        Self {
            security,
            sessions,
            mdc,
        }
    }

    pub fn derive_identity(&self, request: &Request) -> Option<RequestIdentity> {
        let username = self.security.current_user_username(request);
        if !username.is_empty() {
            return Some(RequestIdentity::Authenticated(username));
        }
        self.sessions
            .session_id(request)
            .filter(|id| !id.is_empty())
            .map(|id| RequestIdentity::anonymous(&id))
    }

    /// Run `chain` once with `request`, with the request's identity registered
    /// for its whole duration. The chain's output, error values included, is
    /// returned untouched.
    pub async fn process<C, Fut>(&self, request: Request, chain: C) -> Fut::Output
    where
        C: FnOnce(Request) -> Fut,
        Fut: Future,
    {
        let _registration = self
            .derive_identity(&request)
            .map(|identity| Registration::new(self.mdc.clone(), &identity));
        chain(request).await
    }
}

/// Unregisters on drop: normal return, unwinding, or cancellation.
struct Registration {
    mdc: Arc<dyn LoggerMdc>,
}

impl Registration {
    fn new(mdc: Arc<dyn LoggerMdc>, identity: &RequestIdentity) -> Self {
        mdc.register_user(identity.as_str());
        Self { mdc }
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.mdc.unregister_user();
    }
}

/// axum adapter: gives each request its own MDC scope and runs the rest of
/// the stack through [`LoggingConfigurationFilter::process`].
pub async fn logging_configuration_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let filter = state.logging_filter.clone();
    mdc::scope(async move { filter.process(request, |req| next.run(req)).await }).await
}
