use enigo::Key as EnigoKey;

/// A key that can be injected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
    Unicode(char),
    Control,
    Meta,
    Shift,
    Alt,
    Home,
    End,
    PageUp,
    PageDown,
    UpArrow,
    DownArrow,
    LeftArrow,
    RightArrow,
    Delete,
    Backspace,
    Escape,
    Tab,
    Space,
    Return,
    CapsLock,
    VolumeUp,
    VolumeDown,
    VolumeMute,
    F1,
    F2,
    F3,
    F4,
    F5,
    F6,
    F7,
    F8,
    F9,
    F10,
    F11,
    F12,
    F13,
    F14,
    F15,
    F16,
    F17,
    F18,
    F19,
    F20,
    /// Platform key code, passed through untouched.
    Other(u32),
}

impl Key {
    pub fn is_modifier(&self) -> bool {
        matches!(self, Key::Control | Key::Meta | Key::Shift | Key::Alt)
    }

    pub fn to_enigo(&self) -> EnigoKey {
        match self {
            Key::Unicode(ch) => EnigoKey::Unicode(*ch),
            Key::Control => EnigoKey::Control,
            Key::Meta => EnigoKey::Meta,
            Key::Shift => EnigoKey::Shift,
            Key::Alt => EnigoKey::Alt,
            Key::Home => EnigoKey::Home,
            Key::End => EnigoKey::End,
            Key::PageUp => EnigoKey::PageUp,
            Key::PageDown => EnigoKey::PageDown,
            Key::UpArrow => EnigoKey::UpArrow,
            Key::DownArrow => EnigoKey::DownArrow,
            Key::LeftArrow => EnigoKey::LeftArrow,
            Key::RightArrow => EnigoKey::RightArrow,
            Key::Delete => EnigoKey::Delete,
            Key::Backspace => EnigoKey::Backspace,
            Key::Escape => EnigoKey::Escape,
            Key::Tab => EnigoKey::Tab,
            Key::Space => EnigoKey::Space,
            Key::Return => EnigoKey::Return,
            Key::CapsLock => EnigoKey::CapsLock,
            Key::VolumeUp => EnigoKey::VolumeUp,
            Key::VolumeDown => EnigoKey::VolumeDown,
            Key::VolumeMute => EnigoKey::VolumeMute,
            Key::F1 => EnigoKey::F1,
            Key::F2 => EnigoKey::F2,
            Key::F3 => EnigoKey::F3,
            Key::F4 => EnigoKey::F4,
            Key::F5 => EnigoKey::F5,
            Key::F6 => EnigoKey::F6,
            Key::F7 => EnigoKey::F7,
            Key::F8 => EnigoKey::F8,
            Key::F9 => EnigoKey::F9,
            Key::F10 => EnigoKey::F10,
            Key::F11 => EnigoKey::F11,
            Key::F12 => EnigoKey::F12,
            Key::F13 => EnigoKey::F13,
            Key::F14 => EnigoKey::F14,
            Key::F15 => EnigoKey::F15,
            Key::F16 => EnigoKey::F16,
            Key::F17 => EnigoKey::F17,
            Key::F18 => EnigoKey::F18,
            Key::F19 => EnigoKey::F19,
            Key::F20 => EnigoKey::F20,
            Key::Other(code) => EnigoKey::Other(*code),
        }
    }
}

impl From<Key> for EnigoKey {
    fn from(key: Key) -> Self {
        key.to_enigo()
    }
}

/// Parse a key name into a [`Key`].
///
/// Names are matched case-insensitively. A single printable character maps
/// to [`Key::Unicode`], `code:<n>` to a raw platform key code.
///
/// ```
/// use padmux_control::{parse_key, Key};
///
/// assert_eq!(parse_key("a"), Some(Key::Unicode('a')));
/// assert_eq!(parse_key("Ctrl"), Some(Key::Control));
/// assert_eq!(parse_key("code:36"), Some(Key::Other(36)));
/// ```
pub fn parse_key(input: &str) -> Option<Key> {
    let input = input.trim();
    let mut chars = input.chars();
    let first = chars.next()?;
    if chars.next().is_none() {
        return (!first.is_whitespace() && !first.is_control())
            .then(|| Key::Unicode(first.to_ascii_lowercase()));
    }

    let lower = input.to_ascii_lowercase();
    if let Some(code) = lower.strip_prefix("code:") {
        return code.trim().parse().ok().map(Key::Other);
    }

    let key = match lower.as_str() {
        // Modifiers
        "ctrl" | "control" => Key::Control,
        "meta" | "cmd" | "command" | "super" | "win" => Key::Meta,
        "shift" => Key::Shift,
        "alt" | "option" => Key::Alt,

        // Navigation
        "home" => Key::Home,
        "end" => Key::End,
        "page_up" | "pageup" => Key::PageUp,
        "page_down" | "pagedown" => Key::PageDown,
        "arrow_up" | "up" => Key::UpArrow,
        "arrow_down" | "down" => Key::DownArrow,
        "arrow_left" | "left" => Key::LeftArrow,
        "arrow_right" | "right" => Key::RightArrow,

        // Actions
        "delete" | "del" => Key::Delete,
        "backspace" => Key::Backspace,
        "escape" | "esc" => Key::Escape,
        "tab" => Key::Tab,
        "space" | "spacebar" => Key::Space,
        "enter" | "return" => Key::Return,
        "caps_lock" | "capslock" => Key::CapsLock,

        // Media
        "volume_up" => Key::VolumeUp,
        "volume_down" => Key::VolumeDown,
        "volume_mute" | "mute" => Key::VolumeMute,

        "f1" => Key::F1,
        "f2" => Key::F2,
        "f3" => Key::F3,
        "f4" => Key::F4,
        "f5" => Key::F5,
        "f6" => Key::F6,
        "f7" => Key::F7,
        "f8" => Key::F8,
        "f9" => Key::F9,
        "f10" => Key::F10,
        "f11" => Key::F11,
        "f12" => Key::F12,
        "f13" => Key::F13,
        "f14" => Key::F14,
        "f15" => Key::F15,
        "f16" => Key::F16,
        "f17" => Key::F17,
        "f18" => Key::F18,
        "f19" => Key::F19,
        "f20" => Key::F20,
        _ => return None,
    };
    Some(key)
}
