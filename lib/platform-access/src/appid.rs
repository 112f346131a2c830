//! IBM App ID client configuration.
//!
//! App ID is an OpenID Connect provider. A tenant is addressed by its OAuth
//! server URL, which doubles as the OIDC issuer used for discovery.

use serde::{Deserialize, Serialize};

/// Fields a local settings file must provide.
///
/// The redirect URI is computed by the server and is not part of this list.
pub const REQUIRED_FIELDS: [&str; 5] = [
    "clientId",
    "secret",
    "tenantId",
    "oauthServerUrl",
    "profilesUrl",
];

/// Credentials and endpoints for an App ID tenant.
///
/// Field names follow the App ID service credential format so the same
/// struct deserializes from `localdev-config.json` and from a platform binding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppIdConfig {
    #[serde(alias = "clientid")]
    client_id: String,
    secret: String,
    #[serde(alias = "tenantid")]
    tenant_id: String,
    #[serde(alias = "oauthserverurl")]
    oauth_server_url: String,
    #[serde(alias = "profilesurl")]
    profiles_url: String,
    #[serde(alias = "redirecturi")]
    redirect_uri: String,
    /// OAuth2 scopes to request as a comma-separated string.
    /// Default: "openid"
    #[serde(default = "default_scopes")]
    scopes: String,
}

fn default_scopes() -> String {
    "openid".to_string()
}

impl AppIdConfig {
    /// Creates a configuration with the default scope set.
    #[must_use]
    pub fn new(
        client_id: String,
        secret: String,
        tenant_id: String,
        oauth_server_url: String,
        profiles_url: String,
        redirect_uri: String,
    ) -> Self {
        Self {
            client_id,
            secret,
            tenant_id,
            oauth_server_url,
            profiles_url,
            redirect_uri,
            scopes: default_scopes(),
        }
    }

    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    #[must_use]
    pub fn secret(&self) -> &str {
        &self.secret
    }

    #[must_use]
    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    /// Returns the tenant's OAuth server URL without a trailing slash.
    #[must_use]
    pub fn oauth_server_url(&self) -> &str {
        self.oauth_server_url.trim_end_matches('/')
    }

    #[must_use]
    pub fn profiles_url(&self) -> &str {
        &self.profiles_url
    }

    #[must_use]
    pub fn redirect_uri(&self) -> &str {
        &self.redirect_uri
    }

    /// Returns the OIDC issuer used for provider discovery.
    #[must_use]
    pub fn issuer_url(&self) -> &str {
        self.oauth_server_url()
    }

    /// Returns the OAuth2 scopes to request, parsed from comma-separated string.
    #[must_use]
    pub fn scopes(&self) -> Vec<&str> {
        self.scopes
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect()
    }
}
