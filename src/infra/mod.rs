mod cli;
mod client_error;
mod config;
mod http_remote;

pub use cli::Cli;
pub use client_error::ClientError;
pub use config::{RemoteSettings, ServerSettings, Settings, get_config_settings};
pub use http_remote::{HttpConnector, HttpRemote, USER_ID_HEADER};
