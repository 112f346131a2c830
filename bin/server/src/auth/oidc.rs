//! App ID client implementation using the openidconnect crate.

use async_trait::async_trait;
use openidconnect::core::{
    CoreAuthPrompt, CoreAuthenticationFlow, CoreClient, CoreProviderMetadata,
};
use openidconnect::url::Url;
use openidconnect::{
    AuthorizationCode, ClientId, ClientSecret, CsrfToken, IssuerUrl, Nonce, OAuth2TokenResponse,
    PkceCodeChallenge, PkceCodeVerifier, RedirectUrl, RefreshToken, Scope, TokenResponse,
};
use sdr_app_platform_access::{AppIdConfig, AuthContext};
use std::time::Duration;

use super::provider::{AccountPage, AuthState, ChallengeOptions, IdentityProvider, ProviderError};

/// Upper bound for any single call to App ID.
const PROVIDER_TIMEOUT: Duration = Duration::from_secs(10);

/// OIDC client for an App ID tenant.
pub struct OidcClient {
    provider_metadata: CoreProviderMetadata,
    client_id: ClientId,
    client_secret: ClientSecret,
    redirect_url: RedirectUrl,
    http_client: reqwest::Client,
    config: AppIdConfig,
}

impl OidcClient {
    /// Creates a new client by discovering the tenant's provider metadata.
    pub async fn discover(config: AppIdConfig) -> Result<Self, ProviderError> {
        let issuer_url = IssuerUrl::new(config.issuer_url().to_string())
            .map_err(|e| ProviderError::Configuration(format!("invalid issuer URL: {}", e)))?;

        let http_client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(PROVIDER_TIMEOUT)
            .build()
            .map_err(|e| {
                ProviderError::Configuration(format!("failed to create HTTP client: {}", e))
            })?;

        let provider_metadata = CoreProviderMetadata::discover_async(issuer_url, &http_client)
            .await
            .map_err(|e| ProviderError::Discovery(format!("failed to discover provider: {}", e)))?;

        let redirect_url = RedirectUrl::new(config.redirect_uri().to_string())
            .map_err(|e| ProviderError::Configuration(format!("invalid redirect URI: {}", e)))?;

        Ok(Self {
            provider_metadata,
            client_id: ClientId::new(config.client_id().to_string()),
            client_secret: ClientSecret::new(config.secret().to_string()),
            redirect_url,
            http_client,
            config,
        })
    }

    /// Asks App ID for a one-time code authorizing the change-details page.
    async fn generate_code(&self, context: &AuthContext) -> Result<String, ProviderError> {
        let url = format!(
            "{}/cloud_directory/generate_code",
            self.config.oauth_server_url()
        );

        let response = self
            .http_client
            .post(&url)
            .header(
                reqwest::header::AUTHORIZATION,
                format!(
                    "Bearer {} {}",
                    context.access_token(),
                    context.identity_token()
                ),
            )
            .send()
            .await
            .map_err(|e| ProviderError::AccountManagement(format!("generate_code failed: {}", e)))?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(ProviderError::Unauthorized(
                "generate_code rejected the session tokens".to_string(),
            ));
        }
        if !status.is_success() {
            return Err(ProviderError::AccountManagement(format!(
                "generate_code returned {}",
                status
            )));
        }

        response
            .text()
            .await
            .map(|code| code.trim().to_string())
            .map_err(|e| ProviderError::AccountManagement(format!("unreadable code: {}", e)))
    }
}

#[async_trait]
impl IdentityProvider for OidcClient {
    fn authorization_url(&self, options: &ChallengeOptions) -> (String, AuthState) {
        let client = CoreClient::from_provider_metadata(
            self.provider_metadata.clone(),
            self.client_id.clone(),
            Some(self.client_secret.clone()),
        )
        .set_redirect_uri(self.redirect_url.clone());

        let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();

        let mut auth_request = client
            .authorize_url(
                CoreAuthenticationFlow::AuthorizationCode,
                CsrfToken::new_random,
                Nonce::new_random,
            )
            .set_pkce_challenge(pkce_challenge);

        for scope in self.config.scopes() {
            auth_request = auth_request.add_scope(Scope::new(scope.to_string()));
        }

        if options.force_login {
            auth_request = auth_request.add_prompt(CoreAuthPrompt::Login);
        }

        let (auth_url, csrf_token, nonce) = auth_request.url();

        let state = AuthState {
            csrf_token: csrf_token.secret().clone(),
            pkce_verifier: Some(pkce_verifier.secret().clone()),
            nonce: Some(nonce.secret().clone()),
            return_to: options.return_to.clone(),
        };

        (auth_url.to_string(), state)
    }

    async fn exchange_code(
        &self,
        code: &str,
        state: &AuthState,
    ) -> Result<AuthContext, ProviderError> {
        let client = CoreClient::from_provider_metadata(
            self.provider_metadata.clone(),
            self.client_id.clone(),
            Some(self.client_secret.clone()),
        )
        .set_redirect_uri(self.redirect_url.clone());

        let mut token_request = client
            .exchange_code(AuthorizationCode::new(code.to_string()))
            .map_err(|e| ProviderError::TokenExchange(format!("token endpoint error: {}", e)))?;

        if let Some(verifier) = &state.pkce_verifier {
            token_request = token_request.set_pkce_verifier(PkceCodeVerifier::new(verifier.clone()));
        }

        let token_response = token_request
            .request_async(&self.http_client)
            .await
            .map_err(|e| ProviderError::TokenExchange(format!("token exchange failed: {}", e)))?;

        let id_token = token_response
            .id_token()
            .ok_or_else(|| ProviderError::TokenExchange("no ID token in response".to_string()))?;

        let verifier = client.id_token_verifier();
        let verified = match &state.nonce {
            Some(nonce) => id_token
                .claims(&verifier, &Nonce::new(nonce.clone()))
                .map(|_| ()),
            // Account pages return without a nonce of ours to compare against.
            None => id_token
                .claims(&verifier, |_: Option<&Nonce>| Ok(()))
                .map(|_| ()),
        };
        verified.map_err(|e| {
            ProviderError::TokenValidation(format!("ID token validation failed: {}", e))
        })?;

        context_from_response(&token_response)
    }

    async fn refresh_tokens(&self, refresh_token: &str) -> Result<AuthContext, ProviderError> {
        let client = CoreClient::from_provider_metadata(
            self.provider_metadata.clone(),
            self.client_id.clone(),
            Some(self.client_secret.clone()),
        )
        .set_redirect_uri(self.redirect_url.clone());

        let token_response = client
            .exchange_refresh_token(&RefreshToken::new(refresh_token.to_string()))
            .map_err(|e| ProviderError::Refresh(format!("token endpoint error: {}", e)))?
            .request_async(&self.http_client)
            .await
            .map_err(|e| ProviderError::Refresh(format!("refresh rejected: {}", e)))?;

        Ok(context_from_response(&token_response)?.or_refresh_token(refresh_token))
    }

    async fn account_url(
        &self,
        page: AccountPage,
        context: &AuthContext,
        return_to: &str,
    ) -> Result<(String, AuthState), ProviderError> {
        let user_id = context
            .identity()
            .cloud_directory_user_id()
            .map_err(|e| ProviderError::AccountManagement(e.to_string()))?
            .to_string();

        let state = AuthState {
            csrf_token: CsrfToken::new_random().secret().clone(),
            pkce_verifier: None,
            nonce: None,
            return_to: return_to.to_string(),
        };

        let param = match page {
            AccountPage::ChangePassword => ("user_id", user_id),
            AccountPage::ChangeDetails => ("code", self.generate_code(context).await?),
        };

        let url = account_page_url(&self.config, page, (param.0, &param.1), &state.csrf_token)?;
        Ok((url, state))
    }
}

/// Builds the URL of a Cloud Directory page for this client.
fn account_page_url(
    config: &AppIdConfig,
    page: AccountPage,
    param: (&str, &str),
    state: &str,
) -> Result<String, ProviderError> {
    let mut url = Url::parse(&format!(
        "{}/cloud_directory/{}",
        config.oauth_server_url(),
        page
    ))
    .map_err(|e| ProviderError::Configuration(format!("invalid OAuth server URL: {}", e)))?;

    url.query_pairs_mut()
        .append_pair("client_id", config.client_id())
        .append_pair("redirect_uri", config.redirect_uri())
        .append_pair(param.0, param.1)
        .append_pair("language", "en")
        .append_pair("state", state);

    Ok(url.to_string())
}

/// Converts a token endpoint response into an authentication context.
///
/// The raw ID token is read from the serialized response; it has either been
/// verified by the caller or came straight from the token endpoint over TLS.
fn context_from_response<TR>(token_response: &TR) -> Result<AuthContext, ProviderError>
where
    TR: OAuth2TokenResponse + serde::Serialize,
{
    let response_json = serde_json::to_value(token_response).map_err(|e| {
        ProviderError::TokenValidation(format!("failed to serialize token response: {}", e))
    })?;

    let id_token = response_json
        .get("id_token")
        .and_then(|v| v.as_str())
        .ok_or_else(|| ProviderError::TokenValidation("no id_token in response".to_string()))?;

    let expires_in = token_response
        .expires_in()
        .and_then(|lifetime| chrono::Duration::from_std(lifetime).ok());

    AuthContext::from_tokens(
        token_response.access_token().secret().clone(),
        id_token.to_string(),
        token_response.refresh_token().map(|t| t.secret().clone()),
        expires_in,
    )
    .map_err(|e| ProviderError::TokenValidation(e.to_string()))
}
