use enigo::{Direction, Enigo, Keyboard, Settings};

use crate::{Error, Key, KeySink, Result};

/// System-wide key injection through enigo.
pub struct Performer {
    enigo: Enigo,
}

impl Performer {
    /// Create a new performer.
    pub fn new() -> Result<Self> {
        let settings = Settings::default();
        let enigo = Enigo::new(&settings).map_err(|e| Error::Connection(e.to_string()))?;
        Ok(Self { enigo })
    }

    fn send(&mut self, key: Key, direction: Direction) -> Result<()> {
        self.enigo
            .key(key.to_enigo(), direction)
            .map_err(|e| Error::Input(e.to_string()))
    }
}

impl KeySink for Performer {
    fn key_down(&mut self, key: Key) -> Result<()> {
        self.send(key, Direction::Press)
    }

    fn key_up(&mut self, key: Key) -> Result<()> {
        self.send(key, Direction::Release)
    }
}
