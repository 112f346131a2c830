//! Front-end bundle serving and GraphQL forwarding.

use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{HeaderMap, Method, StatusCode, Uri, header},
    response::{Html, IntoResponse, Response},
};
use std::path::Path;
use std::sync::Arc;

use crate::{auth::AppState, error::AppError};

/// Headers that describe a single connection and must not be forwarded.
const HOP_BY_HOP: [header::HeaderName; 9] = [
    header::CONNECTION,
    header::HeaderName::from_static("keep-alive"),
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
    header::HOST,
];

/// Reads `index.html` from the bundle directory.
pub async fn serve_index(static_dir: &Path) -> Result<Html<String>, AppError> {
    let path = static_dir.join("index.html");
    tokio::fs::read_to_string(&path)
        .await
        .map(Html)
        .map_err(|e| AppError::StaticAsset {
            path: path.display().to_string(),
            details: e.to_string(),
        })
}

/// Forwards a GraphQL request to the configured engine.
pub async fn graphql(
    State(state): State<Arc<AppState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, AppError> {
    let upstream = state
        .config
        .graphql_upstream
        .as_deref()
        .ok_or(AppError::UpstreamUnavailable)?;
    forward(&state.http_client, upstream, method, &uri, headers, body).await
}

/// Forwards a schema explorer request. Only available locally.
pub async fn graphiql(
    State(state): State<Arc<AppState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, AppError> {
    if !state.config.mode.is_local() {
        return Ok(StatusCode::NOT_FOUND.into_response());
    }
    let upstream = state
        .config
        .graphql_upstream
        .as_deref()
        .ok_or(AppError::UpstreamUnavailable)?;
    forward(&state.http_client, upstream, method, &uri, headers, body).await
}

/// Sends the request to `upstream` unchanged and relays the answer.
async fn forward(
    client: &reqwest::Client,
    upstream: &str,
    method: Method,
    uri: &Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, AppError> {
    let url = upstream_url(upstream, uri);
    tracing::debug!(%method, %url, bytes = body.len(), "forwarding to GraphQL engine");

    let upstream_response = client
        .request(method, &url)
        .headers(strip_hop_by_hop(headers))
        .body(body)
        .send()
        .await
        .map_err(|e| AppError::Upstream {
            details: e.to_string(),
        })?;

    let status = upstream_response.status();
    let mut response_headers = strip_hop_by_hop(upstream_response.headers().clone());
    response_headers.remove(header::CONTENT_LENGTH);
    let body = upstream_response
        .bytes()
        .await
        .map_err(|e| AppError::Upstream {
            details: e.to_string(),
        })?;

    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;
    *response.headers_mut() = response_headers;
    Ok(response)
}

fn upstream_url(upstream: &str, uri: &Uri) -> String {
    let path_and_query = uri.path_and_query().map_or(uri.path(), |pq| pq.as_str());
    format!("{}{}", upstream.trim_end_matches('/'), path_and_query)
}

fn strip_hop_by_hop(mut headers: HeaderMap) -> HeaderMap {
    for name in &HOP_BY_HOP {
        headers.remove(name);
    }
    headers
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upstream_url_keeps_path_and_query() {
        let uri: Uri = "/graphql?operationName=Samples".parse().unwrap();
        assert_eq!(
            upstream_url("http://localhost:4000/", &uri),
            "http://localhost:4000/graphql?operationName=Samples"
        );
    }

    #[test]
    fn hop_by_hop_headers_are_dropped() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONNECTION, "keep-alive".parse().unwrap());
        headers.insert(header::HOST, "sdr.example.com".parse().unwrap());
        headers.insert(header::CONTENT_TYPE, "application/json".parse().unwrap());

        let headers = strip_hop_by_hop(headers);
        assert!(headers.get(header::CONNECTION).is_none());
        assert!(headers.get(header::HOST).is_none());
        assert_eq!(headers[header::CONTENT_TYPE], "application/json");
    }

    #[tokio::test]
    async fn index_is_read_from_bundle() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("index.html"), "<div id=\"root\"></div>").unwrap();

        let Html(body) = serve_index(dir.path()).await.unwrap();
        assert_eq!(body, "<div id=\"root\"></div>");
    }

    #[tokio::test]
    async fn missing_index_is_a_static_asset_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = serve_index(dir.path()).await.unwrap_err();
        assert!(matches!(err, AppError::StaticAsset { .. }));
    }
}
