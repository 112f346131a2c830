//! Baseline HTTP hardening applied to every response.

use axum::{
    Router,
    extract::Request,
    http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
};
use tower_http::{
    cors::{Any, CorsLayer},
    set_header::SetResponseHeaderLayer,
};

const HARDENING_HEADERS: [(&str, &str); 6] = [
    ("x-dns-prefetch-control", "off"),
    ("x-frame-options", "SAMEORIGIN"),
    ("strict-transport-security", "max-age=15552000; includeSubDomains"),
    ("x-download-options", "noopen"),
    ("x-content-type-options", "nosniff"),
    ("x-xss-protection", "1; mode=block"),
];

const NO_CACHE_HEADERS: [(&str, &str); 4] = [
    ("cache-control", "no-store, no-cache, must-revalidate, proxy-revalidate"),
    ("pragma", "no-cache"),
    ("expires", "0"),
    ("surrogate-control", "no-store"),
];

/// Wraps `router` in the security stack.
///
/// From the outside in: CORS, hardening headers, cache suppression, then
/// HTTPS enforcement when `enforce_https` is set.
pub fn harden<S>(router: Router<S>, enforce_https: bool) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    let mut router = router;

    if enforce_https {
        router = router.layer(middleware::from_fn(require_https));
    }

    for (name, value) in NO_CACHE_HEADERS {
        router = router.layer(SetResponseHeaderLayer::overriding(
            HeaderName::from_static(name),
            HeaderValue::from_static(value),
        ));
    }

    for (name, value) in HARDENING_HEADERS {
        router = router.layer(SetResponseHeaderLayer::if_not_present(
            HeaderName::from_static(name),
            HeaderValue::from_static(value),
        ));
    }

    router.layer(cors())
}

/// Allows any origin.
pub fn cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
}

/// First value of `X-Forwarded-Proto`, as set by the platform router.
fn forwarded_proto(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("x-forwarded-proto")?
        .to_str()
        .ok()?
        .split(',')
        .next()
        .map(str::trim)
}

/// Redirects plaintext reads to HTTPS and refuses plaintext writes.
async fn require_https(request: Request, next: Next) -> Response {
    if forwarded_proto(request.headers()).is_some_and(|proto| proto.eq_ignore_ascii_case("https"))
    {
        return next.run(request).await;
    }

    if request.method() != Method::GET && request.method() != Method::HEAD {
        return (StatusCode::FORBIDDEN, "HTTPS required").into_response();
    }

    let Some(host) = request
        .headers()
        .get(header::HOST)
        .and_then(|host| host.to_str().ok())
    else {
        return (StatusCode::FORBIDDEN, "HTTPS required").into_response();
    };

    let path = request
        .uri()
        .path_and_query()
        .map_or("/", |pq| pq.as_str());
    let location = format!("https://{host}{path}");

    match HeaderValue::from_str(&location) {
        Ok(location) => (StatusCode::MOVED_PERMANENTLY, [(header::LOCATION, location)]).into_response(),
        Err(_) => (StatusCode::BAD_REQUEST, "Bad request").into_response(),
    }
}
