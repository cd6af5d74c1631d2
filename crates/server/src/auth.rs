use crate::AppState;
use axum::extract::{FromRequestParts, Request, State};
use axum::http::HeaderMap;
use axum::http::request::Parts;
use axum::middleware::Next;
use axum::response::Response;
use forum_core::review::User;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String,
    pub uid: u64,
    pub exp: usize,
    pub iat: usize,
}

/// The authenticated principal of a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Authentication {
    pub user_id: u64,
    pub username: String,
}

impl Authentication {
    pub fn user(&self) -> User {
        User::new(self.user_id, self.username.clone())
    }
}

/// Username lookup for the current request.
#[cfg_attr(test, mockall::automock)]
pub trait SecurityService: Send + Sync {
    /// The authenticated username, or an empty string for anonymous requests.
    fn current_user_username(&self, request: &Request) -> String;
}

/// Reads the [`Authentication`] installed by [`authentication_middleware`].
#[derive(Debug, Default, Clone, Copy)]
pub struct JwtSecurityService;

impl SecurityService for JwtSecurityService {
    fn current_user_username(&self, request: &Request) -> String {
        request
            .extensions()
            .get::<Authentication>()
            .map(|a| a.username.clone())
            .unwrap_or_default()
    }
}

/// Extractor for the acting user; `None` for anonymous requests.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub Option<User>);

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(
            parts
                .extensions
                .get::<Authentication>()
                .map(Authentication::user),
        ))
    }
}

/// Resolve a bearer token into an [`Authentication`] extension.
///
/// Never rejects: a missing, invalid or expired token, or one naming a user
/// no longer in the config, leaves the request anonymous.
pub async fn authentication_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    if let Some(token) = bearer_token(request.headers()) {
        let config = state.config.load();
        match config.security.resolve_jwt_secret() {
            Some(secret) => match verify_token(&token, &secret) {
                Ok(claims) if config.security.find_user(&claims.sub).is_some() => {
                    request.extensions_mut().insert(Authentication {
                        user_id: claims.uid,
                        username: claims.sub,
                    });
                }
                Ok(claims) => {
                    tracing::debug!(user = %claims.sub, "Token names an unknown user");
                }
                Err(e) => tracing::debug!("Ignoring invalid bearer token: {e}"),
            },
            None => tracing::debug!("Bearer token presented but no JWT secret configured"),
        }
    }

    next.run(request).await
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Generate a JWT token for a user.
pub fn generate_token(
    user_id: u64,
    username: &str,
    secret: &str,
    ttl_secs: u64,
) -> Result<String, jsonwebtoken::errors::Error> {
    let now = chrono::Utc::now().timestamp() as usize;
    let claims = Claims {
        sub: username.to_string(),
        uid: user_id,
        iat: now,
        exp: now + ttl_secs as usize,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
}

pub fn verify_token(token: &str, secret: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    let key = DecodingKey::from_secret(secret.as_bytes());
    decode::<Claims>(token, &key, &Validation::default()).map(|data| data.claims)
}
