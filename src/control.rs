//! The cooperative control loop.
//!
//! Each tick: drain pending link events without blocking, poll the button,
//! then attempt one capture if a session is listening, otherwise idle
//! briefly. A capture attempt already waits on the bus, so it never idles.
//! Everything runs on one thread; the loop is the only writer of device
//! state.

use std::ops::ControlFlow;
use std::time::Duration;

use tokio::sync::mpsc::{self, error::TryRecvError};
use tracing::info;

use crate::audio::AudioBus;
use crate::bridge::{BridgeSender, LinkEvent};
use crate::input::InputController;
use crate::platform::{ButtonPin, Clock, Indicator, PowerControl};
use crate::session::{DeviceState, SessionMachine};

/// Grace period before powering down so the last messages can leave.
const HALT_GRACE: Duration = Duration::from_millis(100);

pub struct ControlLoop<B, S, I, P, C, W>
where
    B: AudioBus,
    S: BridgeSender,
    I: Indicator,
    P: ButtonPin,
    C: Clock,
    W: PowerControl,
{
    machine: SessionMachine<B, S, I>,
    input: InputController<P>,
    events: mpsc::UnboundedReceiver<LinkEvent>,
    clock: C,
    power: W,
    idle_delay: Duration,
}

impl<B, S, I, P, C, W> ControlLoop<B, S, I, P, C, W>
where
    B: AudioBus,
    S: BridgeSender,
    I: Indicator,
    P: ButtonPin,
    C: Clock,
    W: PowerControl,
{
    pub fn new(
        machine: SessionMachine<B, S, I>,
        input: InputController<P>,
        events: mpsc::UnboundedReceiver<LinkEvent>,
        clock: C,
        power: W,
        idle_delay: Duration,
    ) -> Self {
        Self {
            machine,
            input,
            events,
            clock,
            power,
            idle_delay,
        }
    }

    /// Run until the low-power halt.
    pub fn run(mut self) {
        info!("Control loop running");
        while self.tick().is_continue() {}
        info!("Control loop halted");
    }

    /// One loop iteration. `Break` once the device has halted.
    pub fn tick(&mut self) -> ControlFlow<()> {
        loop {
            match self.events.try_recv() {
                Ok(event) => {
                    let now = self.clock.now_ms();
                    self.machine.handle_link_event(event, now);
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    // Link task is gone for good; behave as if the bridge dropped.
                    if self.machine.state() != DeviceState::Disconnected {
                        let now = self.clock.now_ms();
                        self.machine.handle_link_event(LinkEvent::Disconnected, now);
                    }
                    break;
                }
            }
        }

        let buttons = self.input.poll(&self.clock);
        for event in buttons.iter() {
            let now = self.clock.now_ms();
            if self.machine.handle_button(event, now).is_break() {
                self.clock.sleep(HALT_GRACE);
                self.power.enter_low_power();
                return ControlFlow::Break(());
            }
        }

        if self.machine.is_listening() {
            let _ = self.machine.capture_tick();
        } else {
            self.clock.sleep(self.idle_delay);
        }
        ControlFlow::Continue(())
    }

    #[cfg(test)]
    pub fn machine(&self) -> &SessionMachine<B, S, I> {
        &self.machine
    }

    #[cfg(test)]
    pub fn machine_mut(&mut self) -> &mut SessionMachine<B, S, I> {
        &mut self.machine
    }

    #[cfg(test)]
    pub fn input_mut(&mut self) -> &mut InputController<P> {
        &mut self.input
    }

    #[cfg(test)]
    pub fn clock(&self) -> &C {
        &self.clock
    }

    #[cfg(test)]
    pub fn power(&self) -> &W {
        &self.power
    }
}
