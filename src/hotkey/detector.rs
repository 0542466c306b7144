//! Edge detection for the push-to-talk combo
//!
//! Pure state machine with no I/O: the evdev listener feeds it raw key
//! events and forwards whatever it emits. Keeping it free of device code
//! makes the tricky parts (auto-repeat, partial modifier release, exact
//! modifier matching) unit-testable.

use super::combo::{is_modifier, Combo};
use super::HotkeyEvent;
use evdev::Key;

/// Key transition as reported by the input subsystem
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyState {
    Up,
    Down,
    /// Kernel auto-repeat while held; never a fresh edge
    Repeat,
}

impl KeyState {
    /// Map an evdev event value (0 = up, 1 = down, 2 = repeat)
    pub fn from_event_value(value: i32) -> Option<Self> {
        match value {
            0 => Some(KeyState::Up),
            1 => Some(KeyState::Down),
            2 => Some(KeyState::Repeat),
            _ => None,
        }
    }
}

/// Detects press/release transitions of a target combo from the raw
/// key event stream.
///
/// Match semantics: the held Ctrl/Alt/Shift state must exactly equal the
/// combo's required set at the moment the primary key goes down. An
/// unrelated modifier held at that moment blocks the match. While active,
/// releasing a required modifier forces an immediate `Released` even
/// though the primary key is still down.
#[derive(Debug)]
pub struct ComboDetector {
    target: Combo,
    // Live modifier state, tracked from both left and right variants
    ctrl: bool,
    alt: bool,
    shift: bool,
    // Primary key physically held (suppresses duplicate down events)
    primary_down: bool,
    // A Pressed has been emitted and no Released yet
    active: bool,
}

impl ComboDetector {
    pub fn new(target: Combo) -> Self {
        Self {
            target,
            ctrl: false,
            alt: false,
            shift: false,
            primary_down: false,
            active: false,
        }
    }

    /// Replace the monitored combo. Resets held-key tracking so a stale
    /// press of the old combo can never produce events against the new one.
    /// Live modifier state is physical fact and is kept.
    pub fn retarget(&mut self, target: Combo) {
        self.target = target;
        self.primary_down = false;
        self.active = false;
    }

    pub fn target(&self) -> Combo {
        self.target
    }

    /// Whether a Pressed has been emitted without a matching Released
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Seed live modifier state from an out-of-band query of currently
    /// held keys (used at listener startup, before any events arrive).
    pub fn seed_modifier(&mut self, key: Key) {
        match key {
            Key::KEY_LEFTCTRL | Key::KEY_RIGHTCTRL => self.ctrl = true,
            Key::KEY_LEFTALT | Key::KEY_RIGHTALT => self.alt = true,
            Key::KEY_LEFTSHIFT | Key::KEY_RIGHTSHIFT => self.shift = true,
            _ => {}
        }
    }

    /// Feed one key event; returns at most one edge event.
    pub fn on_key(&mut self, key: Key, state: KeyState) -> Option<HotkeyEvent> {
        if is_modifier(key) {
            return self.on_modifier(key, state);
        }

        if key != self.target.key {
            return None;
        }

        match state {
            KeyState::Down => {
                if self.primary_down {
                    // Duplicate down while held (some devices re-report)
                    return None;
                }
                self.primary_down = true;
                // Match is evaluated only at this down-edge
                if self.modifiers_match() {
                    self.active = true;
                    return Some(HotkeyEvent::Pressed);
                }
                None
            }
            KeyState::Up => {
                self.primary_down = false;
                if self.active {
                    self.active = false;
                    return Some(HotkeyEvent::Released);
                }
                None
            }
            KeyState::Repeat => None,
        }
    }

    fn on_modifier(&mut self, key: Key, state: KeyState) -> Option<HotkeyEvent> {
        let held = match state {
            KeyState::Down => true,
            KeyState::Up => false,
            KeyState::Repeat => return None,
        };

        match key {
            Key::KEY_LEFTCTRL | Key::KEY_RIGHTCTRL => self.ctrl = held,
            Key::KEY_LEFTALT | Key::KEY_RIGHTALT => self.alt = held,
            Key::KEY_LEFTSHIFT | Key::KEY_RIGHTSHIFT => self.shift = held,
            _ => return None, // Meta is not matchable, only rejected as primary
        }

        // Implicit release: a modifier went up while the combo is active
        // and the modifier state no longer satisfies the target. Prevents
        // a stuck recording when the modifier is released before the key.
        if !held && self.active && !self.modifiers_match() {
            self.active = false;
            return Some(HotkeyEvent::Released);
        }

        None
    }

    /// Exact equality against the required set: an extra held modifier
    /// is a mismatch, not a superset match.
    fn modifiers_match(&self) -> bool {
        self.ctrl == self.target.ctrl
            && self.alt == self.target.alt
            && self.shift == self.target.shift
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hotkey::HotkeyEvent::{Pressed, Released};

    fn detector(spec: &str) -> ComboDetector {
        ComboDetector::new(Combo::parse(spec).unwrap())
    }

    #[test]
    fn test_bare_key_press_release() {
        let mut d = detector("F8");
        assert_eq!(d.on_key(Key::KEY_F8, KeyState::Down), Some(Pressed));
        assert_eq!(d.on_key(Key::KEY_F8, KeyState::Up), Some(Released));
    }

    #[test]
    fn test_repeat_events_are_suppressed() {
        let mut d = detector("F8");
        assert_eq!(d.on_key(Key::KEY_F8, KeyState::Down), Some(Pressed));
        for _ in 0..10 {
            assert_eq!(d.on_key(Key::KEY_F8, KeyState::Repeat), None);
        }
        // Some devices re-report value=1 while held; still not a fresh edge
        assert_eq!(d.on_key(Key::KEY_F8, KeyState::Down), None);
        assert_eq!(d.on_key(Key::KEY_F8, KeyState::Up), Some(Released));
    }

    #[test]
    fn test_modifier_combo_matches_exactly() {
        let mut d = detector("Ctrl+Shift+F8");
        assert_eq!(d.on_key(Key::KEY_LEFTCTRL, KeyState::Down), None);
        assert_eq!(d.on_key(Key::KEY_LEFTSHIFT, KeyState::Down), None);
        assert_eq!(d.on_key(Key::KEY_F8, KeyState::Down), Some(Pressed));
        assert_eq!(d.on_key(Key::KEY_F8, KeyState::Up), Some(Released));
    }

    #[test]
    fn test_missing_modifier_blocks_match() {
        let mut d = detector("Ctrl+F8");
        assert_eq!(d.on_key(Key::KEY_F8, KeyState::Down), None);
        assert_eq!(d.on_key(Key::KEY_F8, KeyState::Up), None);
    }

    #[test]
    fn test_extra_modifier_blocks_match() {
        // Exact equality: holding Alt on a Ctrl+F8 combo is a mismatch
        let mut d = detector("Ctrl+F8");
        d.on_key(Key::KEY_LEFTCTRL, KeyState::Down);
        d.on_key(Key::KEY_LEFTALT, KeyState::Down);
        assert_eq!(d.on_key(Key::KEY_F8, KeyState::Down), None);
    }

    #[test]
    fn test_any_modifier_blocks_bare_key() {
        let mut d = detector("F8");
        d.on_key(Key::KEY_LEFTSHIFT, KeyState::Down);
        assert_eq!(d.on_key(Key::KEY_F8, KeyState::Down), None);
        d.on_key(Key::KEY_LEFTSHIFT, KeyState::Up);
        assert_eq!(d.on_key(Key::KEY_F8, KeyState::Down), None); // still held
        d.on_key(Key::KEY_F8, KeyState::Up);
        assert_eq!(d.on_key(Key::KEY_F8, KeyState::Down), Some(Pressed));
    }

    #[test]
    fn test_either_side_modifier_counts() {
        let mut d = detector("Ctrl+F8");
        d.on_key(Key::KEY_RIGHTCTRL, KeyState::Down);
        assert_eq!(d.on_key(Key::KEY_F8, KeyState::Down), Some(Pressed));
    }

    #[test]
    fn test_implicit_release_on_modifier_up() {
        // Release of a required modifier while the primary key is still
        // down forces exactly one Released
        let mut d = detector("Ctrl+F8");
        d.on_key(Key::KEY_LEFTCTRL, KeyState::Down);
        assert_eq!(d.on_key(Key::KEY_F8, KeyState::Down), Some(Pressed));
        assert_eq!(d.on_key(Key::KEY_LEFTCTRL, KeyState::Up), Some(Released));
        // The eventual primary key-up is silent; already released
        assert_eq!(d.on_key(Key::KEY_F8, KeyState::Up), None);
    }

    #[test]
    fn test_unrelated_modifier_up_does_not_release() {
        let mut d = detector("Ctrl+F8");
        d.on_key(Key::KEY_LEFTCTRL, KeyState::Down);
        assert_eq!(d.on_key(Key::KEY_F8, KeyState::Down), Some(Pressed));
        // Shift pressed and released mid-hold: state returns to an exact
        // match, so no release fires on the way back down
        assert_eq!(d.on_key(Key::KEY_LEFTSHIFT, KeyState::Down), None);
        assert_eq!(d.on_key(Key::KEY_LEFTSHIFT, KeyState::Up), None);
        assert_eq!(d.on_key(Key::KEY_F8, KeyState::Up), Some(Released));
    }

    #[test]
    fn test_no_double_release() {
        let mut d = detector("Ctrl+Shift+F8");
        d.on_key(Key::KEY_LEFTCTRL, KeyState::Down);
        d.on_key(Key::KEY_LEFTSHIFT, KeyState::Down);
        assert_eq!(d.on_key(Key::KEY_F8, KeyState::Down), Some(Pressed));
        assert_eq!(d.on_key(Key::KEY_LEFTCTRL, KeyState::Up), Some(Released));
        // Second required modifier going up must not release again
        assert_eq!(d.on_key(Key::KEY_LEFTSHIFT, KeyState::Up), None);
        assert_eq!(d.on_key(Key::KEY_F8, KeyState::Up), None);
    }

    #[test]
    fn test_retarget_resets_held_state() {
        let mut d = detector("F8");
        assert_eq!(d.on_key(Key::KEY_F8, KeyState::Down), Some(Pressed));
        assert!(d.is_active());

        d.retarget(Combo::parse("F9").unwrap());
        assert!(!d.is_active());
        // The old key's release must not fire against the new target
        assert_eq!(d.on_key(Key::KEY_F8, KeyState::Up), None);
        assert_eq!(d.on_key(Key::KEY_F9, KeyState::Down), Some(Pressed));
    }

    #[test]
    fn test_retarget_keeps_modifier_state() {
        let mut d = detector("F8");
        d.on_key(Key::KEY_LEFTCTRL, KeyState::Down);
        d.retarget(Combo::parse("Ctrl+F8").unwrap());
        // Ctrl is physically held, so the new combo matches immediately
        assert_eq!(d.on_key(Key::KEY_F8, KeyState::Down), Some(Pressed));
    }

    #[test]
    fn test_seed_modifier_state() {
        let mut d = detector("Ctrl+F8");
        d.seed_modifier(Key::KEY_LEFTCTRL);
        assert_eq!(d.on_key(Key::KEY_F8, KeyState::Down), Some(Pressed));
    }

    #[test]
    fn test_key_state_from_event_value() {
        assert_eq!(KeyState::from_event_value(0), Some(KeyState::Up));
        assert_eq!(KeyState::from_event_value(1), Some(KeyState::Down));
        assert_eq!(KeyState::from_event_value(2), Some(KeyState::Repeat));
        assert_eq!(KeyState::from_event_value(3), None);
    }
}
