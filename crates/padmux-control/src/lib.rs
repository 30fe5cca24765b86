mod chord;
mod key;
mod performer;

use thiserror::Error;

pub use chord::KeyChord;
pub use key::{parse_key, Key};
pub use performer::Performer;

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to connect to the input system: {0}")]
    Connection(String),
    #[error("key injection failed: {0}")]
    Input(String),
    #[error("unknown key: {0}")]
    UnknownKey(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Receiver of system-wide key events.
pub trait KeySink {
    fn key_down(&mut self, key: Key) -> Result<()>;
    fn key_up(&mut self, key: Key) -> Result<()>;
}

impl<S: KeySink + ?Sized> KeySink for Box<S> {
    fn key_down(&mut self, key: Key) -> Result<()> {
        (**self).key_down(key)
    }

    fn key_up(&mut self, key: Key) -> Result<()> {
        (**self).key_up(key)
    }
}

/// Sink that drops every event. Used when key injection is unavailable.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl KeySink for NullSink {
    fn key_down(&mut self, _key: Key) -> Result<()> {
        Ok(())
    }

    fn key_up(&mut self, _key: Key) -> Result<()> {
        Ok(())
    }
}
