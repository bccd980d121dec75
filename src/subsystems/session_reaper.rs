use async_trait::async_trait;
use tokio::{select, time::MissedTickBehavior};
use tokio_graceful_shutdown::{IntoSubsystem, SubsystemHandle};
use tracing::{debug, error, info};

use crate::AppState;

/// Periodically ends cart sessions that have sat idle for too long.
pub struct SessionReaper {
    state: AppState,
}

impl SessionReaper {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    async fn start(&self) {
        let application = &self.state.settings.application;
        let idle_timeout = application.session_idle_timeout();
        let mut interval = tokio::time::interval(application.reaper_interval());
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            interval.tick().await;
            let reaped = self.state.sessions.reap_idle(idle_timeout).await;
            if reaped.is_empty() {
                debug!("Session reaper: no idle sessions.");
            } else {
                info!("Session reaper: ended {} idle session(s).", reaped.len());
            }
        }
    }
}

#[async_trait]
impl IntoSubsystem<anyhow::Error> for SessionReaper {
    async fn run(self, subsys: SubsystemHandle) -> Result<(), anyhow::Error> {
        info!("Session reaper starting.");
        select!(
            _ = self.start() => {
                error!("Session reaper stopped.");
            }
            _ = subsys.on_shutdown_requested() => {
                info!("Session reaper shutdown.");
            }
        );
        Ok(())
    }
}
