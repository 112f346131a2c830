//! Router-level tests for the auth gate and session lifecycle.
//!
//! These drive the full application router with a scripted identity provider
//! and an in-memory session store.

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
    response::Response,
};
use base64::Engine;
use sdr_app_core::SessionId;
use sdr_app_platform_access::{AuthContext, MemorySessionStore, Session, SessionStore};
use sdr_app_server::{
    app,
    auth::{
        AccountPage, AppState, AuthState, ChallengeOptions, IdentityProvider, ProviderError,
        cookies,
    },
    config::{ExecutionMode, ServerConfig},
};
use serde_json::json;
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

const LOGIN_PAGE: &str = "https://appid.example.com/oauth/v4/t-1/authorization";
const INDEX_HTML: &str = "<!DOCTYPE html><div id=\"root\"></div>";

/// What the provider does when asked to refresh.
#[derive(Clone, Copy)]
enum Refresh {
    Live,
    AlreadyExpired,
    Rejected,
}

struct FakeProvider {
    refresh: Refresh,
}

fn jwt(payload: serde_json::Value) -> String {
    let engine = base64::engine::general_purpose::URL_SAFE_NO_PAD;
    let header = engine.encode(br#"{"alg":"none","typ":"JWT"}"#);
    let body = engine.encode(payload.to_string());
    format!("{header}.{body}.sig")
}

fn context(lifetime: chrono::Duration, refresh_token: Option<&str>) -> AuthContext {
    let id_token = jwt(json!({
        "sub": "user-1",
        "iss": "https://appid.example.com/oauth/v4/t-1",
        "email": "ada@example.com",
        "identities": [{"provider": "cloud_directory", "id": "cd-42"}]
    }));
    AuthContext::from_tokens(
        "access-1".to_string(),
        id_token,
        refresh_token.map(str::to_string),
        Some(lifetime),
    )
    .unwrap()
}

fn live_context() -> AuthContext {
    context(chrono::Duration::hours(1), Some("rt-session"))
}

fn expired_context() -> AuthContext {
    context(chrono::Duration::seconds(-60), Some("rt-session"))
}

#[async_trait]
impl IdentityProvider for FakeProvider {
    fn authorization_url(&self, options: &ChallengeOptions) -> (String, AuthState) {
        let url = if options.force_login {
            format!("{LOGIN_PAGE}?state=csrf-1&prompt=login")
        } else {
            format!("{LOGIN_PAGE}?state=csrf-1")
        };
        let state = AuthState {
            csrf_token: "csrf-1".to_string(),
            pkce_verifier: Some("verifier".to_string()),
            nonce: Some("nonce".to_string()),
            return_to: options.return_to.clone(),
        };
        (url, state)
    }

    async fn exchange_code(
        &self,
        code: &str,
        _state: &AuthState,
    ) -> Result<AuthContext, ProviderError> {
        if code == "good-code" {
            Ok(context(chrono::Duration::hours(1), Some("rt-login")))
        } else {
            Err(ProviderError::TokenExchange("invalid_grant".to_string()))
        }
    }

    async fn refresh_tokens(&self, _refresh_token: &str) -> Result<AuthContext, ProviderError> {
        match self.refresh {
            Refresh::Live => Ok(context(chrono::Duration::hours(1), Some("rt-new"))),
            Refresh::AlreadyExpired => Ok(context(chrono::Duration::seconds(-1), Some("rt-new"))),
            Refresh::Rejected => Err(ProviderError::Refresh("invalid_grant".to_string())),
        }
    }

    async fn account_url(
        &self,
        page: AccountPage,
        _context: &AuthContext,
        return_to: &str,
    ) -> Result<(String, AuthState), ProviderError> {
        match page {
            AccountPage::ChangePassword => Ok((
                "https://appid.example.com/oauth/v4/t-1/cloud_directory/change_password"
                    .to_string(),
                AuthState {
                    csrf_token: "csrf-2".to_string(),
                    pkce_verifier: None,
                    nonce: None,
                    return_to: return_to.to_string(),
                },
            )),
            AccountPage::ChangeDetails => Err(ProviderError::Unauthorized(
                "generate_code returned 401".to_string(),
            )),
        }
    }
}

struct Harness {
    app: Router,
    store: Arc<MemorySessionStore>,
    _bundle: TempDir,
}

impl Harness {
    fn new(refresh: Refresh, mode: ExecutionMode) -> Self {
        let bundle = tempfile::tempdir().unwrap();
        std::fs::write(bundle.path().join("index.html"), INDEX_HTML).unwrap();
        std::fs::write(bundle.path().join("app.js"), "console.log('sdr')").unwrap();

        let config = ServerConfig {
            static_dir: bundle.path().to_path_buf(),
            mode,
            ..ServerConfig::default()
        };
        let store = Arc::new(MemorySessionStore::new());
        let state = Arc::new(AppState::new(
            config,
            Arc::new(FakeProvider { refresh }),
            store.clone(),
            reqwest::Client::new(),
        ));

        Self {
            app: app::router(state),
            store,
            _bundle: bundle,
        }
    }

    fn local(refresh: Refresh) -> Self {
        Self::new(refresh, ExecutionMode::Local)
    }

    async fn seed(&self, auth_context: Option<AuthContext>) -> SessionId {
        let mut session = Session::new(SessionId::new(), chrono::Duration::hours(1));
        if let Some(auth_context) = auth_context {
            session.set_auth_context(auth_context);
        }
        self.store.save(&session).await.unwrap();
        session.id()
    }

    async fn session(&self, id: SessionId) -> Option<Session> {
        self.store.load(&id).await.unwrap()
    }

    async fn get(&self, uri: &str, cookie: Option<&str>) -> Response {
        let mut request = Request::builder().uri(uri);
        if let Some(cookie) = cookie {
            request = request.header(header::COOKIE, cookie);
        }
        self.app
            .clone()
            .oneshot(request.body(Body::empty()).unwrap())
            .await
            .unwrap()
    }
}

fn set_cookies(response: &Response) -> Vec<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .map(|value| value.to_str().unwrap().to_string())
        .collect()
}

fn set_cookie(response: &Response, name: &str) -> Option<String> {
    let prefix = format!("{name}=");
    set_cookies(response)
        .into_iter()
        .find(|cookie| cookie.starts_with(&prefix))
}

fn cookie_value(set_cookie: &str) -> &str {
    let pair = set_cookie.split(';').next().unwrap();
    pair.split_once('=').unwrap().1
}

fn location(response: &Response) -> &str {
    response.headers()[header::LOCATION].to_str().unwrap()
}

async fn body_text(response: Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn valid_session_is_served_without_refresh_cookie() {
    let harness = Harness::local(Refresh::Rejected);
    let id = harness.seed(Some(live_context())).await;

    let response = harness
        .get("/app/dashboard", Some(&format!("session={id}")))
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert!(set_cookie(&response, "refreshToken").is_none());
    assert_eq!(body_text(response).await, INDEX_HTML);
}

#[tokio::test]
async fn anonymous_request_is_sent_to_provider_login() {
    let harness = Harness::local(Refresh::Live);

    let response = harness.get("/app/dashboard", None).await;

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert!(location(&response).starts_with(LOGIN_PAGE));
    assert!(!location(&response).contains("prompt=login"));

    let auth_state = set_cookie(&response, "auth_state").expect("auth state cookie");
    assert!(auth_state.contains("HttpOnly"));
}

#[tokio::test]
async fn expired_session_is_refreshed_from_cookie() {
    let harness = Harness::local(Refresh::Live);
    let id = harness.seed(Some(expired_context())).await;

    let response = harness
        .get(
            "/app/dashboard",
            Some(&format!("session={id}; refreshToken=rt-old")),
        )
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    let refresh = set_cookie(&response, "refreshToken").expect("refresh cookie");
    assert_eq!(cookie_value(&refresh), "rt-new");
    assert!(refresh.contains("Max-Age=2592000"));
    assert_eq!(body_text(response).await, INDEX_HTML);

    let session = harness.session(id).await.expect("session kept");
    assert!(session.is_authenticated());
}

#[tokio::test]
async fn refresh_token_inside_expired_context_is_used() {
    let harness = Harness::local(Refresh::Live);
    let id = harness.seed(Some(expired_context())).await;

    let response = harness
        .get("/app", Some(&format!("session={id}")))
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert!(set_cookie(&response, "refreshToken").is_some());
}

#[tokio::test]
async fn refresh_without_live_session_is_denied() {
    let harness = Harness::local(Refresh::AlreadyExpired);
    let id = harness.seed(Some(expired_context())).await;

    let response = harness
        .get(
            "/app/dashboard",
            Some(&format!("session={id}; refreshToken=rt-old")),
        )
        .await;

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert!(location(&response).starts_with(LOGIN_PAGE));
    assert!(set_cookie(&response, "refreshToken").is_none());
}

#[tokio::test]
async fn rejected_refresh_falls_through_to_login() {
    let harness = Harness::local(Refresh::Rejected);

    let response = harness
        .get("/app/dashboard", Some("refreshToken=rt-revoked"))
        .await;

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert!(location(&response).starts_with(LOGIN_PAGE));
}

#[tokio::test]
async fn provider_unauthorized_clears_session() {
    let harness = Harness::local(Refresh::Live);
    let id = harness.seed(Some(live_context())).await;

    let response = harness
        .get(
            "/change_details",
            Some(&format!("session={id}; refreshToken=rt-session")),
        )
        .await;

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/");
    assert!(harness.session(id).await.is_none());

    let session_cookie = set_cookie(&response, "session").expect("session removal");
    assert!(session_cookie.contains("Max-Age=0"));
    let refresh_cookie = set_cookie(&response, "refreshToken").expect("refresh removal");
    assert!(refresh_cookie.contains("Max-Age=0"));
}

#[tokio::test]
async fn account_page_without_login_is_unauthorized() {
    let harness = Harness::local(Refresh::Live);

    let response = harness.get("/change_password", None).await;

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/");
}

#[tokio::test]
async fn change_password_redirects_to_cloud_directory() {
    let harness = Harness::local(Refresh::Live);
    let id = harness.seed(Some(live_context())).await;

    let response = harness
        .get("/change_password", Some(&format!("session={id}")))
        .await;

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert!(location(&response).ends_with("/cloud_directory/change_password"));
    assert!(set_cookie(&response, "auth_state").is_some());
}

#[tokio::test]
async fn logout_is_idempotent() {
    let harness = Harness::local(Refresh::Live);
    let id = harness.seed(Some(live_context())).await;
    let cookie = format!("session={id}; refreshToken=rt-session");

    for _ in 0..2 {
        let response = harness.get("/logout", Some(&cookie)).await;

        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), "/login");
        let refresh = set_cookie(&response, "refreshToken").expect("refresh removal");
        assert_eq!(cookie_value(&refresh), "");
        assert!(refresh.contains("Max-Age=0"));

        let session = harness.session(id).await.expect("session kept");
        assert!(session.auth_context().is_none());
    }
}

#[tokio::test]
async fn logout_without_session_redirects_to_login() {
    let harness = Harness::local(Refresh::Live);

    let response = harness.get("/logout", None).await;

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/login");
    assert!(set_cookie(&response, "session").is_none());
    assert!(harness.store.is_empty().await);
}

#[tokio::test]
async fn error_page_without_session_stores_nothing() {
    let harness = Harness::local(Refresh::Live);

    let response = harness.get("/error", None).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert!(set_cookie(&response, "session").is_none());
    assert!(harness.store.is_empty().await);
}

#[tokio::test]
async fn token_is_null_when_logged_out() {
    let harness = Harness::local(Refresh::Live);

    let response = harness.get("/token", None).await;

    assert_eq!(response.status(), StatusCode::OK);
    let body: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(body, json!({ "tokens": null }));
}

#[tokio::test]
async fn token_returns_context_when_logged_in() {
    let harness = Harness::local(Refresh::Live);
    let id = harness.seed(Some(live_context())).await;

    let response = harness.get("/token", Some(&format!("session={id}"))).await;

    let body: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(body["tokens"]["accessToken"], "access-1");
    assert_eq!(body["tokens"]["identity"]["subject"], "user-1");
}

fn auth_state_cookie(return_to: &str) -> String {
    let state = AuthState {
        csrf_token: "csrf-1".to_string(),
        pkce_verifier: Some("verifier".to_string()),
        nonce: Some("nonce".to_string()),
        return_to: return_to.to_string(),
    };
    let cookie = cookies::auth_state_cookie(&state, false).unwrap();
    format!("auth_state={}", cookie.value())
}

#[tokio::test]
async fn callback_stores_context_and_refresh_cookie() {
    let harness = Harness::local(Refresh::Live);

    let response = harness
        .get(
            "/ibm/bluemix/appid/callback?code=good-code&state=csrf-1",
            Some(&auth_state_cookie("/app/dashboard")),
        )
        .await;

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/app/dashboard");

    let refresh = set_cookie(&response, "refreshToken").expect("refresh cookie");
    assert_eq!(cookie_value(&refresh), "rt-login");
    assert!(refresh.contains("Max-Age=2592000"));

    let auth_state = set_cookie(&response, "auth_state").expect("auth state removal");
    assert!(auth_state.contains("Max-Age=0"));

    let session_cookie = set_cookie(&response, "session").expect("session cookie");
    let id: SessionId = cookie_value(&session_cookie).parse().unwrap();
    let session = harness.session(id).await.expect("session stored");
    assert!(session.is_authenticated());
}

#[tokio::test]
async fn callback_issues_new_session_id() {
    let harness = Harness::local(Refresh::Live);
    let planted = harness.seed(None).await;

    let response = harness
        .get(
            "/ibm/bluemix/appid/callback?code=good-code&state=csrf-1",
            Some(&format!("session={planted}; {}", auth_state_cookie("/app"))),
        )
        .await;

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/app");

    let session_cookie = set_cookie(&response, "session").expect("session cookie");
    let issued: SessionId = cookie_value(&session_cookie).parse().unwrap();
    assert_ne!(issued, planted);

    assert!(harness.session(planted).await.is_none());
    let session = harness.session(issued).await.expect("new session stored");
    assert!(session.is_authenticated());

    let replayed = harness.get("/app", Some(&format!("session={planted}"))).await;
    assert_eq!(replayed.status(), StatusCode::SEE_OTHER);
    assert!(location(&replayed).starts_with(LOGIN_PAGE));
}

#[tokio::test]
async fn callback_with_mismatched_state_flashes_error_once() {
    let harness = Harness::local(Refresh::Live);

    let response = harness
        .get(
            "/ibm/bluemix/appid/callback?code=good-code&state=forged",
            Some(&auth_state_cookie("/app")),
        )
        .await;

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/error");
    assert!(set_cookie(&response, "refreshToken").is_none());

    let session_cookie = set_cookie(&response, "session").expect("session cookie");
    let cookie = format!("session={}", cookie_value(&session_cookie));

    let first = body_text(harness.get("/error", Some(&cookie)).await).await;
    assert!(first.contains("Login state did not match"));

    let second = body_text(harness.get("/error", Some(&cookie)).await).await;
    assert!(!second.contains("Login state did not match"));
}

#[tokio::test]
async fn failed_code_exchange_flashes_error() {
    let harness = Harness::local(Refresh::Live);

    let response = harness
        .get(
            "/ibm/bluemix/appid/callback?code=bad-code&state=csrf-1",
            Some(&auth_state_cookie("/app")),
        )
        .await;

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/error");
}

#[tokio::test]
async fn forced_logins_ask_for_prompt() {
    let harness = Harness::local(Refresh::Live);

    for path in ["/login", "/ibm/bluemix/appid/login"] {
        let response = harness.get(path, None).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert!(location(&response).contains("prompt=login"), "{path}");
    }
}

#[tokio::test]
async fn root_routes_by_login_state() {
    let harness = Harness::local(Refresh::Live);
    let id = harness.seed(Some(live_context())).await;

    let logged_in = harness.get("/", Some(&format!("session={id}"))).await;
    assert_eq!(location(&logged_in), "/app");

    let anonymous = harness.get("/", None).await;
    assert!(location(&anonymous).starts_with(LOGIN_PAGE));
}

#[tokio::test]
async fn static_files_are_served_unauthenticated() {
    let harness = Harness::local(Refresh::Live);

    let response = harness.get("/app.js", None).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "console.log('sdr')");
}

#[tokio::test]
async fn responses_carry_security_headers() {
    let harness = Harness::local(Refresh::Live);

    let response = harness.get("/token", None).await;

    let headers = response.headers();
    assert_eq!(headers["x-frame-options"], "SAMEORIGIN");
    assert_eq!(headers["x-content-type-options"], "nosniff");
    assert_eq!(
        headers["cache-control"],
        "no-store, no-cache, must-revalidate, proxy-revalidate"
    );
    assert_eq!(headers["surrogate-control"], "no-store");
}

#[tokio::test]
async fn hosted_mode_redirects_plaintext_to_https() {
    let harness = Harness::new(Refresh::Live, ExecutionMode::Hosted);

    let response = harness
        .app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/app/dashboard")
                .header(header::HOST, "sdr.example.com")
                .header("x-forwarded-proto", "http")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::MOVED_PERMANENTLY);
    assert_eq!(location(&response), "https://sdr.example.com/app/dashboard");
}

#[tokio::test]
async fn local_mode_allows_plaintext() {
    let harness = Harness::local(Refresh::Live);

    let response = harness.get("/token", None).await;

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn graphql_without_upstream_is_unavailable() {
    let harness = Harness::local(Refresh::Live);

    let response = harness
        .app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/graphql")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(r#"{"query":"{ samples { id } }"}"#))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn graphiql_is_hidden_when_hosted() {
    let harness = Harness::new(Refresh::Live, ExecutionMode::Hosted);

    let response = harness
        .app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/graphiql")
                .header("x-forwarded-proto", "https")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
