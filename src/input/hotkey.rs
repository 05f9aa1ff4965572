//! Host stand-in for the hardware button.
//!
//! Watches one keyboard key or mouse button system-wide using `rdev` and
//! exposes it as an active-low pin: held = `Low`, released = `High`.
//! Debounce and press classification stay in [`super::InputController`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use anyhow::anyhow;
use rdev::{listen, Event, EventType, Key};
use tracing::{info, warn};

use crate::platform::{ButtonPin, Level};

/// Parsed target: either a keyboard key or a mouse button.
#[derive(Debug, Clone, PartialEq)]
enum HotkeyTarget {
    Keyboard(Key),
    MouseButton(rdev::Button),
}

impl HotkeyTarget {
    /// `Some(pressed)` when the event concerns this target.
    fn press_state(&self, event: &EventType) -> Option<bool> {
        match (self, event) {
            (Self::Keyboard(k), EventType::KeyPress(e)) if k == e => Some(true),
            (Self::Keyboard(k), EventType::KeyRelease(e)) if k == e => Some(false),
            (Self::MouseButton(b), EventType::ButtonPress(e)) if b == e => Some(true),
            (Self::MouseButton(b), EventType::ButtonRelease(e)) if b == e => Some(false),
            _ => None,
        }
    }
}

/// Button backed by a global key binding.
#[derive(Debug, Clone)]
pub struct KeyButton {
    pressed: Arc<AtomicBool>,
}

impl KeyButton {
    /// Start listening for `key_name` on a background thread.
    pub fn start(key_name: &str) -> anyhow::Result<Self> {
        let target =
            parse_key(key_name).ok_or_else(|| anyhow!("Unknown button key: {key_name}"))?;
        let pressed = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&pressed);

        info!(key = %key_name, "Starting button listener");
        thread::spawn(move || {
            let callback = move |event: Event| {
                if let Some(down) = target.press_state(&event.event_type) {
                    // Key repeat re-sends presses; storing the level is idempotent.
                    flag.store(down, Ordering::Release);
                }
            };
            if let Err(e) = listen(callback) {
                warn!("Button listener error: {:?}", e);
            }
        });

        Ok(Self { pressed })
    }
}

impl ButtonPin for KeyButton {
    fn read(&mut self) -> Level {
        if self.pressed.load(Ordering::Acquire) {
            Level::Low
        } else {
            Level::High
        }
    }
}

/// Parse a key name string (from config) into an rdev target.
fn parse_key(name: &str) -> Option<HotkeyTarget> {
    let name_lower = name.to_lowercase().trim().to_string();

    match name_lower.as_str() {
        "mousebutton3" | "mouse3" | "middleclick" => {
            return Some(HotkeyTarget::MouseButton(rdev::Button::Middle))
        }
        "mousebutton4" | "mouse4" | "xbutton1" => {
            return Some(HotkeyTarget::MouseButton(rdev::Button::Unknown(4)))
        }
        "mousebutton5" | "mouse5" | "xbutton2" => {
            return Some(HotkeyTarget::MouseButton(rdev::Button::Unknown(5)))
        }
        _ => {}
    }

    let key = match name_lower.as_str() {
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
        "space" => Key::Space,
        "tab" => Key::Tab,
        "escape" | "esc" => Key::Escape,
        "capslock" => Key::CapsLock,
        "scrolllock" => Key::ScrollLock,
        "pause" => Key::Pause,
        "insert" => Key::Insert,
        "home" => Key::Home,
        "end" => Key::End,
        "pageup" => Key::PageUp,
        "pagedown" => Key::PageDown,
        "delete" => Key::Delete,
        "rightctrl" | "controlright" => Key::ControlRight,
        "rightalt" | "altgr" => Key::AltGr,
        _ => {
            warn!("Unknown button key: {}", name);
            return None;
        }
    };

    Some(HotkeyTarget::Keyboard(key))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_key_names() {
        assert_eq!(parse_key("Space"), Some(HotkeyTarget::Keyboard(Key::Space)));
        assert_eq!(parse_key(" F5 "), Some(HotkeyTarget::Keyboard(Key::F5)));
        assert_eq!(
            parse_key("MouseButton4"),
            Some(HotkeyTarget::MouseButton(rdev::Button::Unknown(4)))
        );
        assert_eq!(parse_key("hyperkey"), None);
    }

    #[test]
    fn test_target_tracks_only_its_key() {
        let target = HotkeyTarget::Keyboard(Key::Space);
        assert_eq!(target.press_state(&EventType::KeyPress(Key::Space)), Some(true));
        assert_eq!(target.press_state(&EventType::KeyRelease(Key::Space)), Some(false));
        assert_eq!(target.press_state(&EventType::KeyPress(Key::Tab)), None);
        assert_eq!(
            target.press_state(&EventType::ButtonPress(rdev::Button::Left)),
            None
        );
    }

    #[test]
    fn test_pin_level_is_active_low() {
        let mut button = KeyButton {
            pressed: Arc::new(AtomicBool::new(false)),
        };
        assert_eq!(button.read(), Level::High);
        button.pressed.store(true, Ordering::Release);
        assert_eq!(button.read(), Level::Low);
    }
}
