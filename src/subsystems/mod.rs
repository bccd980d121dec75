mod session_reaper;
mod web_server;

pub use session_reaper::SessionReaper;
pub use web_server::{WebServer, health_check_endpoint, router};
