//! Centralized server configuration.
//!
//! Server settings are loaded via the `config` crate from environment
//! variables. App ID credentials come from one of two places depending on the
//! [`ExecutionMode`]:
//!
//! - **Local**: `localdev-config.json` next to the server, overridable with
//!   `APPID_*` environment variables. A missing field is fatal.
//! - **Hosted**: the App ID service binding the platform injects through
//!   `VCAP_SERVICES`, with the public route taken from `VCAP_APPLICATION`.

use rootcause::Report;
use sdr_app_platform_access::{AppIdConfig, REQUIRED_FIELDS};
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// Path the provider redirects back to after authentication.
pub const APPID_CALLBACK_PATH: &str = "/ibm/bluemix/appid/callback";

/// Path that forces an interactive login.
pub const APPID_LOGIN_PATH: &str = "/ibm/bluemix/appid/login";

/// Where the process is running.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExecutionMode {
    /// A developer machine.
    #[default]
    Local,
    /// The Cloud Foundry platform.
    Hosted,
}

impl ExecutionMode {
    /// Hosted when the platform has injected `VCAP_APPLICATION`.
    #[must_use]
    pub fn detect() -> Self {
        Self::from_vcap_application(std::env::var("VCAP_APPLICATION").ok().as_deref())
    }

    fn from_vcap_application(value: Option<&str>) -> Self {
        match value {
            Some(v) if !v.trim().is_empty() => Self::Hosted,
            _ => Self::Local,
        }
    }

    #[must_use]
    pub fn is_local(self) -> bool {
        self == Self::Local
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => write!(f, "local"),
            Self::Hosted => write!(f, "hosted"),
        }
    }
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Address to bind.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Directory holding the compiled front-end bundle.
    #[serde(default = "default_static_dir")]
    pub static_dir: PathBuf,

    /// Local App ID settings file, read in local mode only.
    #[serde(default = "default_local_config_path")]
    pub local_config_path: PathBuf,

    /// Base URL of the GraphQL engine requests are forwarded to.
    #[serde(default)]
    pub graphql_upstream: Option<String>,

    /// Largest request body forwarded to the GraphQL engine (file uploads).
    #[serde(default = "default_graphql_body_limit_bytes")]
    pub graphql_body_limit_bytes: usize,

    /// Session configuration.
    #[serde(default)]
    pub session: SessionConfig,

    /// Detected at load time, never read from the environment.
    #[serde(skip)]
    pub mode: ExecutionMode,
}

/// Session-related configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Idle lifetime of a session in minutes; every save extends it.
    #[serde(default = "default_session_duration_minutes")]
    pub duration_minutes: i64,

    /// Interval between session cleanup runs, in seconds.
    #[serde(default = "default_cleanup_interval_seconds")]
    pub cleanup_interval_seconds: u64,

    /// Whether to set the Secure flag on cookies.
    /// Unset means "secure unless running locally".
    #[serde(default)]
    pub secure_cookies: Option<bool>,
}

fn default_port() -> u16 {
    6006
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_static_dir() -> PathBuf {
    PathBuf::from("client/build")
}

fn default_local_config_path() -> PathBuf {
    PathBuf::from("localdev-config.json")
}

fn default_graphql_body_limit_bytes() -> usize {
    50 * 1024 * 1024
}

fn default_session_duration_minutes() -> i64 {
    24 * 60
}

fn default_cleanup_interval_seconds() -> u64 {
    300
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            duration_minutes: default_session_duration_minutes(),
            cleanup_interval_seconds: default_cleanup_interval_seconds(),
            secure_cookies: None,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind_address: default_bind_address(),
            static_dir: default_static_dir(),
            local_config_path: default_local_config_path(),
            graphql_upstream: None,
            graphql_body_limit_bytes: default_graphql_body_limit_bytes(),
            session: SessionConfig::default(),
            mode: ExecutionMode::default(),
        }
    }
}

impl ServerConfig {
    /// Loads configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is present but cannot be parsed.
    pub fn from_env() -> Result<Self, Report<ConfigError>> {
        let mut config: Self = config::Config::builder()
            .add_source(
                config::Environment::default()
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .and_then(config::Config::try_deserialize)
            .map_err(|e| ConfigError::Invalid {
                details: e.to_string(),
            })?;
        config.mode = ExecutionMode::detect();
        config.validate()?;
        Ok(config)
    }

    /// Rejects values the server cannot run with.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for a non-positive session duration or
    /// cleanup interval.
    pub fn validate(&self) -> Result<(), Report<ConfigError>> {
        if self.session.duration_minutes <= 0 {
            return Err(ConfigError::Invalid {
                details: "SESSION__DURATION_MINUTES must be positive".to_string(),
            }
            .into());
        }
        if self.session.cleanup_interval_seconds == 0 {
            return Err(ConfigError::Invalid {
                details: "SESSION__CLEANUP_INTERVAL_SECONDS must be positive".to_string(),
            }
            .into());
        }
        Ok(())
    }

    /// Whether cookies carry the Secure flag.
    #[must_use]
    pub fn secure_cookies(&self) -> bool {
        self.session
            .secure_cookies
            .unwrap_or(!self.mode.is_local())
    }

    /// Session lifetime as a chrono duration.
    #[must_use]
    pub fn session_duration(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.session.duration_minutes)
    }
}

/// Configuration errors. All of them are fatal at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A required App ID field is absent from the local settings.
    MissingField { field: &'static str, path: PathBuf },
    /// The settings could not be read or parsed.
    Invalid { details: String },
    /// Hosted mode without an App ID service binding.
    MissingServiceBinding,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingField { field, path } => write!(
                f,
                "Required parameter is missing: {field}. When running locally, make sure \
                 to create a file {} in the root directory. See config.template.json for \
                 an example of a configuration file.",
                path.display()
            ),
            Self::Invalid { details } => write!(f, "invalid configuration: {details}"),
            Self::MissingServiceBinding => {
                write!(f, "no App ID service is bound to this application")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// App ID fields from the local settings file overlaid by `APPID_*`
/// variables, keyed by lower-cased name.
#[derive(Debug, Default)]
struct LocalAppIdSettings(HashMap<String, String>);

impl LocalAppIdSettings {
    /// Reads `path` (if present) and then `env`, whose values win.
    fn load(path: &Path, env: config::Environment) -> Result<Self, Report<ConfigError>> {
        let file: HashMap<String, String> = config::Config::builder()
            .add_source(
                config::File::from(path)
                    .format(config::FileFormat::Json)
                    .required(false),
            )
            .build()
            .and_then(config::Config::try_deserialize)
            .map_err(|e| ConfigError::Invalid {
                details: format!("{}: {e}", path.display()),
            })?;

        let overrides: HashMap<String, String> = config::Config::builder()
            .add_source(env)
            .build()
            .and_then(config::Config::try_deserialize)
            .map_err(|e| ConfigError::Invalid {
                details: format!("APPID_* environment: {e}"),
            })?;

        Ok(Self(
            file.into_iter()
                .chain(overrides)
                .map(|(key, value)| (key.to_lowercase(), value))
                .collect(),
        ))
    }

    fn field(&self, name: &str) -> Option<&str> {
        self.0
            .get(&name.to_lowercase())
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
    }

    /// Returns the first required field that is absent or empty.
    fn first_missing(&self) -> Option<&'static str> {
        REQUIRED_FIELDS
            .into_iter()
            .find(|field| self.field(field).is_none())
    }

    fn into_appid(self, path: &Path, port: u16) -> Result<AppIdConfig, Report<ConfigError>> {
        if let Some(field) = self.first_missing() {
            return Err(ConfigError::MissingField {
                field,
                path: path.to_path_buf(),
            }
            .into());
        }

        let required = |name: &str| self.field(name).unwrap_or_default().to_string();
        Ok(AppIdConfig::new(
            required("clientId"),
            required("secret"),
            required("tenantId"),
            required("oauthServerUrl"),
            required("profilesUrl"),
            format!("http://localhost:{port}{APPID_CALLBACK_PATH}"),
        ))
    }
}

/// Reads App ID credentials for local development.
///
/// Returns `Ok(None)` outside local mode, where the identity adapter resolves
/// credentials from the platform instead.
///
/// # Errors
///
/// Returns [`ConfigError::MissingField`] naming the first required field that
/// is absent, or [`ConfigError::Invalid`] if the file is not valid JSON.
pub fn load_local_appid(
    mode: ExecutionMode,
    path: &Path,
    port: u16,
) -> Result<Option<AppIdConfig>, Report<ConfigError>> {
    if !mode.is_local() {
        return Ok(None);
    }

    LocalAppIdSettings::load(path, config::Environment::with_prefix("APPID"))?
        .into_appid(path, port)
        .map(Some)
}

/// Platform-injected environment (Cloud Foundry).
#[derive(Debug, Clone, Default)]
pub struct PlatformEnv {
    vcap_application: Option<serde_json::Value>,
    vcap_services: Option<serde_json::Value>,
}

impl PlatformEnv {
    /// Reads `VCAP_APPLICATION` and `VCAP_SERVICES`.
    ///
    /// # Errors
    ///
    /// Returns an error if either variable is set but is not valid JSON.
    pub fn from_env() -> Result<Self, Report<ConfigError>> {
        Self::parse(
            std::env::var("VCAP_APPLICATION").ok().as_deref(),
            std::env::var("VCAP_SERVICES").ok().as_deref(),
        )
    }

    /// Parses the raw variable values.
    pub fn parse(
        vcap_application: Option<&str>,
        vcap_services: Option<&str>,
    ) -> Result<Self, Report<ConfigError>> {
        let parse = |name: &str,
                     raw: Option<&str>|
         -> Result<Option<serde_json::Value>, Report<ConfigError>> {
            raw.map(|raw| {
                serde_json::from_str(raw).map_err(|e| {
                    Report::from(ConfigError::Invalid {
                        details: format!("{name} is not valid JSON: {e}"),
                    })
                })
            })
            .transpose()
        };

        Ok(Self {
            vcap_application: parse("VCAP_APPLICATION", vcap_application)?,
            vcap_services: parse("VCAP_SERVICES", vcap_services)?,
        })
    }

    /// The first public route of the application, e.g. `sdr.example.com`.
    #[must_use]
    pub fn application_uri(&self) -> Option<&str> {
        self.vcap_application
            .as_ref()?
            .get("application_uris")?
            .get(0)?
            .as_str()
    }

    /// Public base URL of the application.
    #[must_use]
    pub fn url(&self) -> Option<String> {
        self.application_uri().map(|uri| format!("https://{uri}"))
    }

    /// App ID credentials from the service binding.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingServiceBinding`] if no App ID service is
    /// bound, or [`ConfigError::Invalid`] if its credentials are malformed.
    pub fn appid_credentials(&self) -> Result<AppIdConfig, Report<ConfigError>> {
        let credentials = self
            .vcap_services
            .as_ref()
            .and_then(|services| services.as_object())
            .and_then(|services| {
                services
                    .iter()
                    .find(|(label, _)| label.eq_ignore_ascii_case("appid"))
                    .map(|(_, bindings)| bindings)
            })
            .and_then(|bindings| bindings.get(0))
            .and_then(|binding| binding.get("credentials"))
            .ok_or(ConfigError::MissingServiceBinding)?;

        let mut credentials = credentials.clone();
        let redirect_uri = self
            .url()
            .map(|url| format!("{url}{APPID_CALLBACK_PATH}"))
            .unwrap_or_default();
        if let Some(object) = credentials.as_object_mut() {
            object
                .entry("redirectUri")
                .or_insert(serde_json::Value::String(redirect_uri));
        }

        serde_json::from_value(credentials).map_err(|e| {
            ConfigError::Invalid {
                details: format!("App ID service credentials: {e}"),
            }
            .into()
        })
    }
}

/// Resolves the App ID configuration for the current mode.
///
/// Local settings win when present; otherwise the platform binding is used.
pub fn resolve_appid(
    local: Option<AppIdConfig>,
    platform: &PlatformEnv,
) -> Result<AppIdConfig, Report<ConfigError>> {
    match local {
        Some(config) => Ok(config),
        None => platform.appid_credentials(),
    }
}
