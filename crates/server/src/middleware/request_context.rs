use axum::http::HeaderValue;
use axum::{extract::Request, middleware::Next, response::Response};
use forum_core::context::RequestContext;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Inject a `RequestContext` extension and echo its id back in `x-request-id`.
pub async fn request_context_middleware(mut request: Request, next: Next) -> Response {
    let ctx = RequestContext::from_headers(request.headers());
    let request_id = HeaderValue::from_str(&ctx.request_id).ok();
    request.extensions_mut().insert(ctx);

    let mut response = next.run(request).await;
    if let Some(value) = request_id {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}
