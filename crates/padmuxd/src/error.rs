use thiserror::Error;

use crate::virtual_pad::VirtualError;

#[derive(Debug, Error)]
pub enum Error {
    #[error("device backend: {0}")]
    Device(#[from] padmux_gamepad::Error),
    #[error("virtual controller: {0}")]
    Virtual(#[from] VirtualError),
    #[error("key injection: {0}")]
    Keys(#[from] padmux_control::Error),
    #[error("settings: {0}")]
    Settings(#[from] padmux_workspace::ProfileError),
    #[error("engine failed to start: {0}")]
    Startup(String),
}

pub type Result<T> = std::result::Result<T, Error>;
