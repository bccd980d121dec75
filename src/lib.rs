pub mod domain;
pub mod infra;
pub mod subsystems;

use std::{sync::Arc, time::Duration};

use anyhow::Context;
use axum::extract::FromRef;
use domain::cart::SessionRegistry;
use infra::{HttpConnector, Settings};
use subsystems::{SessionReaper, WebServer};
use tokio_graceful_shutdown::{IntoSubsystem, SubsystemBuilder, Toplevel};
use tracing_appender::non_blocking::WorkerGuard;

#[derive(Clone, FromRef)]
pub struct AppState {
    pub settings: Settings,
    pub sessions: SessionRegistry,
}

pub fn build_subsystems(state: AppState) -> Toplevel {
    let session_reaper = SessionReaper::new(state.clone());
    let webserver = WebServer::new(state);

    // Setup and execute subsystem tree
    Toplevel::new(async |s| {
        s.start(SubsystemBuilder::new(
            "SessionReaper",
            session_reaper.into_subsystem(),
        ));
        s.start(SubsystemBuilder::new(
            "Webserver",
            webserver.into_subsystem(),
        ));
    })
}

pub async fn start_server(state: AppState) -> anyhow::Result<()> {
    build_subsystems(state)
        .catch_signals()
        .handle_shutdown_requests(Duration::from_millis(2000))
        .await
        .map_err(Into::into)
}

pub fn configure_tracing(settings: &Settings) -> WorkerGuard {
    let file_appender = tracing_appender::rolling::daily(
        settings.application.logs_directory.clone(),
        "cart_sync.log",
    );
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    tracing_subscriber::fmt()
        .with_ansi(false)
        .with_writer(non_blocking)
        .init();
    _guard
}

/// Builds the application state against the HTTP collaborators named in `settings`.
pub fn construct_app_state(settings: Settings) -> Result<AppState, anyhow::Error> {
    let connector = HttpConnector::new(settings.remote.clone())
        .context("Failed to build the HTTP client for the remote collaborators.")?;
    Ok(AppState {
        settings,
        sessions: SessionRegistry::new(Arc::new(connector)),
    })
}
