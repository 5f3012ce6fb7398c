use std::io;

use linedesk_sdk::ApiError;
use thiserror::Error;

use crate::config::ConfigError;
use crate::dialpad::DialPadError;
use crate::dispatcher::DispatchError;
use crate::recents::RecentsError;
use crate::session::SessionError;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("{0}")]
    Config(#[from] ConfigError),
    #[error("{}", .0.user_message())]
    Api(#[from] ApiError),
    #[error("{0}")]
    Dispatch(#[from] DispatchError),
    #[error("{0}")]
    DialPad(#[from] DialPadError),
    #[error("{0}")]
    Session(#[from] SessionError),
    #[error("{0}")]
    Recents(#[from] RecentsError),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("logging initialization failed: {0}")]
    Logging(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}
