//! Hotkey combination parsing and display
//!
//! A combo is one primary key plus an exact required set of Ctrl/Alt/Shift
//! modifiers, written as e.g. "F8" or "Ctrl+Shift+F8" in the config file.

use crate::error::HotkeyError;
use evdev::Key;

/// A primary key plus the exact modifier set that must be held.
///
/// Equality is structural. The primary key is never itself a modifier;
/// `Combo::parse` rejects that at construction time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Combo {
    pub key: Key,
    pub ctrl: bool,
    pub alt: bool,
    pub shift: bool,
}

impl Combo {
    /// Parse a combo string like "F8", "Ctrl+F8" or "Ctrl+Shift+Space".
    /// Segment order is free; the last non-modifier segment is the primary key.
    pub fn parse(spec: &str) -> Result<Self, HotkeyError> {
        let mut ctrl = false;
        let mut alt = false;
        let mut shift = false;
        let mut key = None;

        for segment in spec.split('+') {
            let segment = segment.trim();
            if segment.is_empty() {
                return Err(HotkeyError::InvalidCombo(spec.to_string()));
            }
            match segment.to_ascii_lowercase().as_str() {
                "ctrl" | "control" => ctrl = true,
                "alt" => alt = true,
                "shift" => shift = true,
                _ => {
                    if key.is_some() {
                        // Two primary keys in one combo
                        return Err(HotkeyError::InvalidCombo(spec.to_string()));
                    }
                    let parsed = parse_key_name(segment)?;
                    if is_modifier(parsed) {
                        return Err(HotkeyError::ModifierAsPrimary(segment.to_string()));
                    }
                    key = Some(parsed);
                }
            }
        }

        let key = key.ok_or_else(|| HotkeyError::InvalidCombo(spec.to_string()))?;
        Ok(Self { key, ctrl, alt, shift })
    }

    pub fn has_modifiers(&self) -> bool {
        self.ctrl || self.alt || self.shift
    }
}

impl std::fmt::Display for Combo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.ctrl {
            write!(f, "Ctrl+")?;
        }
        if self.alt {
            write!(f, "Alt+")?;
        }
        if self.shift {
            write!(f, "Shift+")?;
        }
        write!(f, "{}", display_key_name(self.key))
    }
}

/// Whether a key is one of the tracked modifier keys (either side)
pub fn is_modifier(key: Key) -> bool {
    matches!(
        key,
        Key::KEY_LEFTCTRL
            | Key::KEY_RIGHTCTRL
            | Key::KEY_LEFTALT
            | Key::KEY_RIGHTALT
            | Key::KEY_LEFTSHIFT
            | Key::KEY_RIGHTSHIFT
            | Key::KEY_LEFTMETA
            | Key::KEY_RIGHTMETA
    )
}

/// Parse a key name string to an evdev Key
pub fn parse_key_name(name: &str) -> Result<Key, HotkeyError> {
    // Normalize: uppercase and replace - or space with _
    let normalized: String = name
        .chars()
        .map(|c| match c {
            '-' | ' ' => '_',
            c => c.to_ascii_uppercase(),
        })
        .collect();

    // Add KEY_ prefix if not present
    let key_name = if normalized.starts_with("KEY_") {
        normalized
    } else {
        format!("KEY_{}", normalized)
    };

    let key = match key_name.as_str() {
        // Letters
        "KEY_A" => Key::KEY_A,
        "KEY_B" => Key::KEY_B,
        "KEY_C" => Key::KEY_C,
        "KEY_D" => Key::KEY_D,
        "KEY_E" => Key::KEY_E,
        "KEY_F" => Key::KEY_F,
        "KEY_G" => Key::KEY_G,
        "KEY_H" => Key::KEY_H,
        "KEY_I" => Key::KEY_I,
        "KEY_J" => Key::KEY_J,
        "KEY_K" => Key::KEY_K,
        "KEY_L" => Key::KEY_L,
        "KEY_M" => Key::KEY_M,
        "KEY_N" => Key::KEY_N,
        "KEY_O" => Key::KEY_O,
        "KEY_P" => Key::KEY_P,
        "KEY_Q" => Key::KEY_Q,
        "KEY_R" => Key::KEY_R,
        "KEY_S" => Key::KEY_S,
        "KEY_T" => Key::KEY_T,
        "KEY_U" => Key::KEY_U,
        "KEY_V" => Key::KEY_V,
        "KEY_W" => Key::KEY_W,
        "KEY_X" => Key::KEY_X,
        "KEY_Y" => Key::KEY_Y,
        "KEY_Z" => Key::KEY_Z,

        // Digits (top row)
        "KEY_0" => Key::KEY_0,
        "KEY_1" => Key::KEY_1,
        "KEY_2" => Key::KEY_2,
        "KEY_3" => Key::KEY_3,
        "KEY_4" => Key::KEY_4,
        "KEY_5" => Key::KEY_5,
        "KEY_6" => Key::KEY_6,
        "KEY_7" => Key::KEY_7,
        "KEY_8" => Key::KEY_8,
        "KEY_9" => Key::KEY_9,

        // Function keys
        "KEY_F1" => Key::KEY_F1,
        "KEY_F2" => Key::KEY_F2,
        "KEY_F3" => Key::KEY_F3,
        "KEY_F4" => Key::KEY_F4,
        "KEY_F5" => Key::KEY_F5,
        "KEY_F6" => Key::KEY_F6,
        "KEY_F7" => Key::KEY_F7,
        "KEY_F8" => Key::KEY_F8,
        "KEY_F9" => Key::KEY_F9,
        "KEY_F10" => Key::KEY_F10,
        "KEY_F11" => Key::KEY_F11,
        "KEY_F12" => Key::KEY_F12,
        "KEY_F13" => Key::KEY_F13,
        "KEY_F14" => Key::KEY_F14,
        "KEY_F15" => Key::KEY_F15,
        "KEY_F16" => Key::KEY_F16,
        "KEY_F17" => Key::KEY_F17,
        "KEY_F18" => Key::KEY_F18,
        "KEY_F19" => Key::KEY_F19,
        "KEY_F20" => Key::KEY_F20,
        "KEY_F21" => Key::KEY_F21,
        "KEY_F22" => Key::KEY_F22,
        "KEY_F23" => Key::KEY_F23,
        "KEY_F24" => Key::KEY_F24,

        // Lock and navigation keys
        "KEY_SCROLLLOCK" => Key::KEY_SCROLLLOCK,
        "KEY_PAUSE" => Key::KEY_PAUSE,
        "KEY_CAPSLOCK" => Key::KEY_CAPSLOCK,
        "KEY_NUMLOCK" => Key::KEY_NUMLOCK,
        "KEY_INSERT" => Key::KEY_INSERT,
        "KEY_HOME" => Key::KEY_HOME,
        "KEY_END" => Key::KEY_END,
        "KEY_PAGEUP" => Key::KEY_PAGEUP,
        "KEY_PAGEDOWN" => Key::KEY_PAGEDOWN,
        "KEY_DELETE" => Key::KEY_DELETE,

        // Common keys
        "KEY_SPACE" => Key::KEY_SPACE,
        "KEY_ENTER" => Key::KEY_ENTER,
        "KEY_TAB" => Key::KEY_TAB,
        "KEY_BACKSPACE" => Key::KEY_BACKSPACE,
        "KEY_GRAVE" | "KEY_BACKTICK" => Key::KEY_GRAVE,

        // Modifier keys (accepted here so the caller can reject them
        // with a precise ModifierAsPrimary error)
        "KEY_LEFTCTRL" | "KEY_LCTRL" => Key::KEY_LEFTCTRL,
        "KEY_RIGHTCTRL" | "KEY_RCTRL" => Key::KEY_RIGHTCTRL,
        "KEY_LEFTALT" | "KEY_LALT" => Key::KEY_LEFTALT,
        "KEY_RIGHTALT" | "KEY_RALT" => Key::KEY_RIGHTALT,
        "KEY_LEFTSHIFT" | "KEY_LSHIFT" => Key::KEY_LEFTSHIFT,
        "KEY_RIGHTSHIFT" | "KEY_RSHIFT" => Key::KEY_RIGHTSHIFT,
        "KEY_LEFTMETA" | "KEY_SUPER" => Key::KEY_LEFTMETA,
        "KEY_RIGHTMETA" => Key::KEY_RIGHTMETA,

        _ => return Err(HotkeyError::UnknownKey(name.to_string())),
    };

    Ok(key)
}

/// Human-readable key name for tooltips and logs (strips the KEY_ prefix)
fn display_key_name(key: Key) -> String {
    let name = format!("{:?}", key);
    name.strip_prefix("KEY_").unwrap_or(&name).to_string()
}
