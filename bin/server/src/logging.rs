//! Tracing setup.
//!
//! Human-readable output goes to stdout. A JSON copy of every event goes to
//! `sdr-app.log` in the platform's log directory when that file can be opened.

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{ExecutionMode, PlatformEnv};

const LOG_FILE_NAME: &str = "sdr-app.log";

/// Resolves the log file location.
///
/// On a platform instance `HOME` is the application directory, so logs go to
/// the sibling `logs` directory the platform already provides.
#[must_use]
pub fn log_file_path(home: &Path, on_platform_instance: bool) -> PathBuf {
    if on_platform_instance {
        home.join("..").join("logs").join(LOG_FILE_NAME)
    } else {
        home.join("logs").join(LOG_FILE_NAME)
    }
}

/// Installs the global subscriber.
///
/// Returns the log file path actually in use, if any.
pub fn init() -> Option<PathBuf> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=debug".into());

    let path = std::env::var_os("HOME").map(|home| {
        log_file_path(
            Path::new(&home),
            std::env::var_os("CF_INSTANCE_IP").is_some(),
        )
    });

    let file = path.as_deref().and_then(|path| open_log_file(path).ok());
    let file_layer = file.map(|file| {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(Arc::new(file))
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .init();

    match &path {
        Some(path) if path.exists() => {
            tracing::info!(log_file = %path.display(), "file logging configured");
            Some(path.clone())
        }
        Some(path) => {
            tracing::warn!(log_file = %path.display(), "log file unavailable, logging to stdout only");
            None
        }
        None => {
            tracing::warn!("HOME is not set, logging to stdout only");
            None
        }
    }
}

fn open_log_file(path: &Path) -> std::io::Result<fs::File> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}

/// Logs the environment the server was started with.
pub fn log_environment(mode: ExecutionMode, platform: &PlatformEnv, port: u16) {
    let var = |name: &str| std::env::var(name).unwrap_or_default();
    tracing::info!(
        mode = %mode,
        url = platform.url().as_deref().unwrap_or("http://localhost"),
        port,
        user = %var("USER"),
        home = %var("HOME"),
        cf_instance_ip = %var("CF_INSTANCE_IP"),
        cf_instance_ports = %var("CF_INSTANCE_PORTS"),
        vcap_app_port = %var("VCAP_APP_PORT"),
        "important environment variables"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_logs_live_under_home() {
        let path = log_file_path(Path::new("/home/dev"), false);
        assert_eq!(path, PathBuf::from("/home/dev/logs/sdr-app.log"));
    }

    #[test]
    fn platform_logs_live_beside_app_dir() {
        let path = log_file_path(Path::new("/home/vcap/app"), true);
        assert_eq!(path, PathBuf::from("/home/vcap/app/../logs/sdr-app.log"));
    }

    #[test]
    fn open_log_file_creates_directory() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = log_file_path(dir.path(), false);

        open_log_file(&path).expect("open");
        assert!(path.exists());
    }
}
