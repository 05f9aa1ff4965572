//! Button input: debounce and short/long press classification.
//!
//! The short press fires on the confirmed press edge, not on release. A long
//! press fires once per hold when the button has been down for the
//! threshold; a long hold therefore reports the short edge first.

pub mod hotkey;

use std::time::Duration;

use crate::config::DeviceConfig;
use crate::platform::{ButtonPin, Clock, Level};

/// Classified button events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonEvent {
    ShortPress,
    LongPress,
}

/// Result of one poll. Both can be set in the same poll only with a zero
/// long-press threshold.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ButtonEvents {
    pub short_press: bool,
    pub long_press: bool,
}

impl ButtonEvents {
    /// Events in the order they happened.
    pub fn iter(&self) -> impl Iterator<Item = ButtonEvent> {
        [
            self.short_press.then_some(ButtonEvent::ShortPress),
            self.long_press.then_some(ButtonEvent::LongPress),
        ]
        .into_iter()
        .flatten()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct InputSettings {
    pub debounce: Duration,
    pub long_press_ms: u64,
}

impl From<&DeviceConfig> for InputSettings {
    fn from(cfg: &DeviceConfig) -> Self {
        Self {
            debounce: Duration::from_millis(cfg.debounce_ms),
            long_press_ms: cfg.long_press_ms,
        }
    }
}

pub struct InputController<P: ButtonPin> {
    pin: P,
    settings: InputSettings,
    last_level: Level,
    press_start_ms: u64,
    long_press_reported: bool,
}

impl<P: ButtonPin> InputController<P> {
    /// The pin is pulled up, so the idle level is high.
    pub fn new(pin: P, settings: InputSettings) -> Self {
        Self {
            pin,
            settings,
            last_level: Level::High,
            press_start_ms: 0,
            long_press_reported: false,
        }
    }

    /// Sample the button once. Blocks for the debounce delay on edges only.
    pub fn poll<C: Clock>(&mut self, clock: &C) -> ButtonEvents {
        let mut events = ButtonEvents::default();
        let now = clock.now_ms();
        let mut level = self.pin.read();

        if level != self.last_level {
            clock.sleep(self.settings.debounce);
            level = self.pin.read();

            if level == Level::Low {
                self.press_start_ms = now;
                self.long_press_reported = false;
                events.short_press = true;
            }
            self.last_level = level;
        }

        if level == Level::Low
            && !self.long_press_reported
            && now.saturating_sub(self.press_start_ms) >= self.settings.long_press_ms
        {
            self.long_press_reported = true;
            events.long_press = true;
        }

        events
    }

    #[cfg(test)]
    pub fn pin_mut(&mut self) -> &mut P {
        &mut self.pin
    }
}
