use std::fmt;

use serde::de::{value::Error as DeError, IntoDeserializer, Visitor};
use serde::{Deserialize, Deserializer};
use smallvec::SmallVec;

use crate::key::{parse_key, Key};
use crate::{Error, KeySink, Result};

/// Ordered set of keys pressed together, written as `ctrl+shift+a`.
///
/// Keys go down in listed order and come up in reverse order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct KeyChord {
    keys: SmallVec<[Key; 4]>,
}

impl KeyChord {
    pub fn from_key(key: Key) -> Self {
        let mut keys = SmallVec::new();
        keys.push(key);
        Self { keys }
    }

    pub fn keys(&self) -> &[Key] {
        &self.keys
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn press(&self, sink: &mut dyn KeySink) -> Result<()> {
        for key in &self.keys {
            sink.key_down(*key)?;
        }
        Ok(())
    }

    /// Release every key, even if some releases fail. Returns the first error.
    pub fn release(&self, sink: &mut dyn KeySink) -> Result<()> {
        let mut first_error = None;
        for key in self.keys.iter().rev() {
            if let Err(e) = sink.key_up(*key) {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

impl<'de> Deserialize<'de> for KeyChord {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct KeyChordVisitor;

        impl Visitor<'_> for KeyChordVisitor {
            type Value = KeyChord;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("key chord string")
            }

            fn visit_str<E>(self, v: &str) -> std::result::Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                let mut keys: SmallVec<[Key; 4]> = SmallVec::new();
                // A lone "+" is the plus key, not a separator.
                if v.trim() == "+" {
                    keys.push(Key::Unicode('+'));
                    return Ok(KeyChord { keys });
                }
                for part in v.split('+') {
                    let part = part.trim();
                    match parse_key(part) {
                        Some(k) => keys.push(k),
                        None => {
                            return Err(E::custom(format!("Invalid key: {part}")));
                        }
                    }
                }
                Ok(KeyChord { keys })
            }
        }

        deserializer.deserialize_str(KeyChordVisitor)
    }
}

impl std::str::FromStr for KeyChord {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        KeyChord::deserialize(s.into_deserializer())
            .map_err(|e: DeError| Error::UnknownKey(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        events: Vec<(Key, bool)>,
        fail_up: Option<Key>,
    }

    impl KeySink for Recorder {
        fn key_down(&mut self, key: Key) -> Result<()> {
            self.events.push((key, true));
            Ok(())
        }

        fn key_up(&mut self, key: Key) -> Result<()> {
            self.events.push((key, false));
            if self.fail_up == Some(key) {
                return Err(Error::Input("stuck".into()));
            }
            Ok(())
        }
    }

    #[test]
    fn parses_keys_in_order() {
        let chord: KeyChord = "ctrl+shift+a".parse().unwrap();
        assert_eq!(chord.keys(), &[Key::Control, Key::Shift, Key::Unicode('a')]);
    }

    #[test]
    fn lone_plus_is_a_key() {
        let chord: KeyChord = "+".parse().unwrap();
        assert_eq!(chord.keys(), &[Key::Unicode('+')]);
    }

    #[test]
    fn empty_and_invalid_parts_fail() {
        assert!("".parse::<KeyChord>().is_err());
        assert!("ctrl+".parse::<KeyChord>().is_err());
        let err = "ctrl+foo".parse::<KeyChord>().unwrap_err();
        assert!(err.to_string().contains("Invalid key: foo"));
    }

    #[test]
    fn press_in_order_release_in_reverse() {
        let chord: KeyChord = "alt+tab".parse().unwrap();
        let mut sink = Recorder::default();
        chord.press(&mut sink).unwrap();
        chord.release(&mut sink).unwrap();
        assert_eq!(
            sink.events,
            vec![
                (Key::Alt, true),
                (Key::Tab, true),
                (Key::Tab, false),
                (Key::Alt, false),
            ]
        );
    }

    #[test]
    fn release_continues_past_failures() {
        let chord: KeyChord = "ctrl+c".parse().unwrap();
        let mut sink = Recorder {
            fail_up: Some(Key::Unicode('c')),
            ..Recorder::default()
        };
        assert!(chord.release(&mut sink).is_err());
        assert_eq!(sink.events.last(), Some(&(Key::Control, false)));
    }
}
