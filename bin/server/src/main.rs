use sdr_app_platform_access::{MemorySessionStore, SessionStore};
use sdr_app_server::{
    app,
    auth::{AppState, OidcClient},
    config::{self, PlatformEnv, ServerConfig},
    logging,
};
use std::process::ExitCode;
use std::sync::Arc;

#[tokio::main]
async fn main() -> ExitCode {
    logging::init();

    let config = match ServerConfig::from_env() {
        Ok(config) => config,
        Err(e) => return fatal(e),
    };
    let platform = match PlatformEnv::from_env() {
        Ok(platform) => platform,
        Err(e) => return fatal(e),
    };
    tracing::info!(mode = %config.mode, "loaded configuration");

    let local = match config::load_local_appid(config.mode, &config.local_config_path, config.port)
    {
        Ok(local) => local,
        Err(e) => return fatal(e),
    };
    let appid = match config::resolve_appid(local, &platform) {
        Ok(appid) => appid,
        Err(e) => return fatal(e),
    };

    tracing::info!(
        issuer = %appid.issuer_url(),
        profiles = %appid.profiles_url(),
        "discovering App ID provider"
    );
    let provider = match OidcClient::discover(appid).await {
        Ok(provider) => provider,
        Err(e) => return fatal(e),
    };

    let sessions = Arc::new(MemorySessionStore::new());
    purge_expired_sessions(sessions.as_ref(), "startup").await;

    let cleanup_store = sessions.clone();
    let cleanup_interval_secs = config.session.cleanup_interval_seconds;
    tokio::spawn(async move {
        let mut interval =
            tokio::time::interval(std::time::Duration::from_secs(cleanup_interval_secs));
        // The first tick completes immediately; startup already purged.
        interval.tick().await;
        loop {
            interval.tick().await;
            purge_expired_sessions(cleanup_store.as_ref(), "periodic").await;
        }
    });

    logging::log_environment(config.mode, &platform, config.port);

    let addr = format!("{}:{}", config.bind_address, config.port);
    let state = Arc::new(AppState::new(
        config,
        Arc::new(provider),
        sessions,
        reqwest::Client::new(),
    ));
    let app = app::router(state);

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => return fatal(e),
    };
    tracing::info!("listening on http://{}", addr);

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        return fatal(e);
    }

    ExitCode::SUCCESS
}

fn fatal(error: impl std::fmt::Display) -> ExitCode {
    tracing::error!(%error, "server failed");
    eprintln!("{error}");
    ExitCode::FAILURE
}

async fn purge_expired_sessions(store: &dyn SessionStore, trigger: &str) {
    match store.delete_expired().await {
        Ok(count) if count > 0 => {
            tracing::info!(deleted_sessions = count, trigger, "cleaned up expired sessions");
        }
        Ok(_) => {}
        Err(e) => {
            tracing::warn!(error = %e, trigger, "failed to clean up expired sessions");
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("shutting down");
}
