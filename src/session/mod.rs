//! Session state machine: the single owner of device state.
//!
//! Consumes link and button events, drives the audio pipeline's mode, and
//! emits control messages. Device state, the session id and (through the
//! pipeline) the bus mode are plain fields mutated only from the control
//! loop thread.

pub mod state;

use std::ops::ControlFlow;

use tracing::{debug, error, info, warn};

use crate::audio::{AudioBus, AudioPipeline, BusMode};
use crate::bridge::{BridgeSender, Inbound, LinkEvent, Outbound};
use crate::input::ButtonEvent;
use crate::platform::Indicator;

pub use state::DeviceState;
use state::{transition, Action, Outcome, SessionEvent};

/// Identity announced to the bridge on every connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub device_id: String,
    pub sample_rate: u32,
    pub channels: u16,
}

pub struct SessionMachine<B: AudioBus, S: BridgeSender, I: Indicator> {
    state: DeviceState,
    session_id: Option<String>,
    pipeline: AudioPipeline<B>,
    link: S,
    indicator: I,
    device_info: DeviceInfo,
}

impl<B: AudioBus, S: BridgeSender, I: Indicator> SessionMachine<B, S, I> {
    /// Starts in `Disconnected` with the indicator on while waiting for the
    /// bridge.
    pub fn new(pipeline: AudioPipeline<B>, link: S, mut indicator: I, device_info: DeviceInfo) -> Self {
        indicator.set(true);
        Self {
            state: DeviceState::Disconnected,
            session_id: None,
            pipeline,
            link,
            indicator,
            device_info,
        }
    }

    /// Bring the bus up in capture mode.
    pub fn boot(&mut self) -> anyhow::Result<()> {
        self.pipeline.ensure_mode(BusMode::Capture)
    }

    pub fn state(&self) -> DeviceState {
        self.state
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn handle_link_event(&mut self, event: LinkEvent, now_ms: u64) {
        match event {
            LinkEvent::Connected => {
                let _ = self.dispatch(SessionEvent::LinkConnected, now_ms);
            }
            LinkEvent::Disconnected => {
                let _ = self.dispatch(SessionEvent::LinkDisconnected, now_ms);
            }
            LinkEvent::Control(msg) => self.handle_control(msg, now_ms),
            LinkEvent::Audio(bytes) => self.handle_audio(&bytes),
        }
    }

    /// Returns `Break` once the device has committed to the low-power halt.
    pub fn handle_button(&mut self, event: ButtonEvent, now_ms: u64) -> ControlFlow<()> {
        let event = match event {
            ButtonEvent::ShortPress => SessionEvent::ShortPress,
            ButtonEvent::LongPress => {
                info!("Long press, going to sleep");
                SessionEvent::LongPress
            }
        };
        self.dispatch(event, now_ms)
    }

    /// Whether a session is open with the microphone live.
    pub fn is_listening(&self) -> bool {
        self.state == DeviceState::InSession && self.pipeline.mode() == Some(BusMode::Capture)
    }

    /// Stream one microphone frame if a session is listening.
    ///
    /// Returns `true` when a frame went out.
    pub fn capture_tick(&mut self) -> bool {
        if !self.is_listening() {
            return false;
        }
        self.pipeline.capture_tick(&mut self.link)
    }

    fn handle_control(&mut self, msg: Inbound, now_ms: u64) {
        match msg {
            Inbound::Ready {} => info!("Bridge ready"),
            Inbound::SessionStarted { session_id } => {
                info!(session_id = %session_id, "Bridge started session");
                let _ = self.dispatch(SessionEvent::SessionStarted { session_id }, now_ms);
            }
            Inbound::SessionEnded {
                session_id,
                frames_sent,
            } => {
                info!(?session_id, ?frames_sent, "Bridge ended session");
                let _ = self.dispatch(SessionEvent::SessionEnded, now_ms);
            }
            Inbound::VadSpeechStart {} => info!("VAD: speech detected"),
            Inbound::VadSpeechEnd {} => info!("VAD: speech ended"),
            Inbound::Transcript { text, is_final } => {
                info!(is_final, "Transcript: {}", text);
            }
            Inbound::AgentSpeakingStart {} => {
                info!("Agent started speaking");
                let _ = self.dispatch(SessionEvent::AgentSpeakingStart, now_ms);
            }
            Inbound::AgentSpeakingEnd {} => {
                info!("Agent finished speaking");
                let _ = self.dispatch(SessionEvent::AgentSpeakingEnd, now_ms);
            }
        }
    }

    fn handle_audio(&mut self, bytes: &[u8]) {
        if self.state != DeviceState::Speaking {
            debug!(state = %self.state, bytes = bytes.len(), "Discarding inbound audio");
            return;
        }
        if let Err(e) = self.pipeline.playback_tick(bytes) {
            error!("Playback failed: {:#}", e);
        }
    }

    fn dispatch(&mut self, event: SessionEvent, now_ms: u64) -> ControlFlow<()> {
        match transition(self.state, &event) {
            Outcome::Apply { next, actions } => {
                let mut halt = false;
                for action in actions {
                    halt |= self.perform(action, now_ms);
                }
                if next != self.state {
                    info!(from = %self.state, to = %next, session_id = ?self.session_id(), "State change");
                    self.state = next;
                }
                if halt {
                    return ControlFlow::Break(());
                }
            }
            Outcome::Ignored => {
                debug!(state = %self.state, ?event, "Event ignored");
            }
            Outcome::Rejected(reason) => {
                warn!(state = %self.state, ?event, "Rejected: {}", reason);
            }
        }
        ControlFlow::Continue(())
    }

    /// Execute one action. Returns `true` for the halt.
    fn perform(&mut self, action: Action, now_ms: u64) -> bool {
        match action {
            Action::AnnounceDevice => {
                let device = &self.device_info;
                let msg = Outbound::DeviceInfo {
                    device_id: device.device_id.clone(),
                    sample_rate: device.sample_rate,
                    channels: device.channels,
                };
                info!(device_id = %device.device_id, "Announcing device");
                self.send(msg);
            }
            Action::OpenSession => {
                let id = format!("session-{now_ms}");
                info!(session_id = %id, "Starting new session");
                self.session_id = Some(id);
            }
            Action::RecordSessionId(id) => {
                self.session_id = Some(id);
            }
            Action::SendStartSession => {
                let session_id = self.session_id.clone().unwrap_or_default();
                self.send(Outbound::StartSession { session_id });
            }
            Action::SendEndSession => {
                let session_id = self.session_id.clone().unwrap_or_default();
                info!(session_id = %session_id, "Ending session");
                self.send(Outbound::EndSession { session_id });
            }
            Action::ClearSession => {
                self.session_id = None;
            }
            Action::EnsureCapture => {
                if let Err(e) = self.pipeline.ensure_mode(BusMode::Capture) {
                    error!("Failed to switch bus to capture: {:#}", e);
                }
            }
            Action::IndicatorOn => self.indicator.set(true),
            Action::IndicatorOff => self.indicator.set(false),
            Action::Halt => return true,
        }
        false
    }

    fn send(&mut self, msg: Outbound) {
        if !self.link.send_control(&msg) {
            debug!(?msg, "Control message dropped, link down");
        }
    }

    #[cfg(test)]
    pub fn link(&self) -> &S {
        &self.link
    }

    #[cfg(test)]
    pub fn link_mut(&mut self) -> &mut S {
        &mut self.link
    }

    #[cfg(test)]
    pub fn indicator(&self) -> &I {
        &self.indicator
    }

    #[cfg(test)]
    pub fn pipeline(&self) -> &AudioPipeline<B> {
        &self.pipeline
    }

    #[cfg(test)]
    pub fn pipeline_mut(&mut self) -> &mut AudioPipeline<B> {
        &mut self.pipeline
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::pcm::{decode_le, encode_le};
    use crate::audio::PipelineSettings;
    use crate::testing::{MockBus, MockIndicator, RecordingLink};
    use std::time::Duration;

    type Machine = SessionMachine<MockBus, RecordingLink, MockIndicator>;

    fn machine() -> Machine {
        let pipeline = AudioPipeline::new(
            MockBus::default(),
            PipelineSettings {
                gain: 3,
                frame_samples: 480,
                read_timeout: Duration::from_millis(10),
            },
        );
        let mut m = SessionMachine::new(
            pipeline,
            RecordingLink::default(),
            MockIndicator::default(),
            DeviceInfo {
                device_id: "umi-test".into(),
                sample_rate: 16_000,
                channels: 1,
            },
        );
        m.boot().unwrap();
        m
    }

    fn connected() -> Machine {
        let mut m = machine();
        m.handle_link_event(LinkEvent::Connected, 0);
        m
    }

    fn in_session(now_ms: u64) -> Machine {
        let mut m = connected();
        let _ = m.handle_button(ButtonEvent::ShortPress, now_ms);
        m
    }

    fn control(m: &mut Machine, msg: Inbound) {
        m.handle_link_event(LinkEvent::Control(msg), 0);
    }

    fn count_ends(m: &Machine) -> usize {
        m.link()
            .control
            .iter()
            .filter(|c| matches!(c, Outbound::EndSession { .. }))
            .count()
    }

    #[test]
    fn test_scenario_a_boot_and_connect() {
        let mut m = machine();
        assert_eq!(m.state(), DeviceState::Disconnected);
        assert!(m.indicator().on);

        m.handle_link_event(LinkEvent::Connected, 0);

        assert_eq!(m.state(), DeviceState::Idle);
        assert_eq!(
            m.link().control,
            vec![Outbound::DeviceInfo {
                device_id: "umi-test".into(),
                sample_rate: 16_000,
                channels: 1,
            }]
        );
        assert!(!m.indicator().on);
    }

    #[test]
    fn test_scenario_b_start_session() {
        let m = in_session(1234);

        assert_eq!(m.state(), DeviceState::InSession);
        assert_eq!(m.session_id(), Some("session-1234"));
        assert_eq!(
            m.link().control.last(),
            Some(&Outbound::StartSession {
                session_id: "session-1234".into()
            })
        );
        assert_eq!(m.pipeline().mode(), Some(BusMode::Capture));
        assert!(m.indicator().on);
    }

    #[test]
    fn test_scenario_c_speaking_plays_audio() {
        let mut m = in_session(5);
        control(&mut m, Inbound::AgentSpeakingStart {});
        assert_eq!(m.state(), DeviceState::Speaking);

        let mut bytes = Vec::new();
        encode_le(&[10, -10, 300], &mut bytes);
        m.handle_link_event(LinkEvent::Audio(bytes), 0);

        assert_eq!(m.pipeline().mode(), Some(BusMode::Playback));
        assert_eq!(m.pipeline().bus().writes, vec![vec![[10, 10], [-10, -10], [300, 300]]]);

        control(&mut m, Inbound::AgentSpeakingEnd {});
        assert_eq!(m.state(), DeviceState::InSession);
        assert_eq!(m.pipeline().mode(), Some(BusMode::Capture));
    }

    #[test]
    fn test_scenario_d_end_session_by_button() {
        let mut m = in_session(77);
        let _ = m.handle_button(ButtonEvent::ShortPress, 900);

        assert_eq!(m.state(), DeviceState::Idle);
        assert_eq!(m.session_id(), None);
        assert_eq!(
            m.link().control.last(),
            Some(&Outbound::EndSession {
                session_id: "session-77".into()
            })
        );
        assert!(!m.indicator().on);
    }

    #[test]
    fn test_scenario_f_link_drop_and_reconnect() {
        let mut m = in_session(1);
        m.handle_link_event(LinkEvent::Disconnected, 0);
        assert_eq!(m.state(), DeviceState::Disconnected);
        assert_eq!(m.session_id(), None);
        assert!(!m.indicator().on);

        m.handle_link_event(LinkEvent::Connected, 0);
        assert_eq!(m.state(), DeviceState::Idle);
        let infos = m
            .link()
            .control
            .iter()
            .filter(|c| matches!(c, Outbound::DeviceInfo { .. }))
            .count();
        assert_eq!(infos, 2);
    }

    #[test]
    fn test_press_while_disconnected_never_starts() {
        let mut m = machine();
        for _ in 0..3 {
            assert!(m.handle_button(ButtonEvent::ShortPress, 0).is_continue());
        }
        assert_eq!(m.state(), DeviceState::Disconnected);
        assert!(m.link().control.is_empty());
    }

    #[test]
    fn test_short_presses_alternate_and_pair_messages() {
        let mut m = connected();
        for i in 0..6u64 {
            let _ = m.handle_button(ButtonEvent::ShortPress, i * 1000);
            if i % 2 == 0 {
                assert!(m.state().in_session());
            } else {
                assert_eq!(m.state(), DeviceState::Idle);
            }
            if i == 2 {
                control(&mut m, Inbound::AgentSpeakingStart {});
            }
        }
        let kinds: Vec<&str> = m
            .link()
            .control
            .iter()
            .map(|c| match c {
                Outbound::DeviceInfo { .. } => "info",
                Outbound::StartSession { .. } => "start",
                Outbound::EndSession { .. } => "end",
            })
            .collect();
        assert_eq!(
            kinds,
            vec!["info", "start", "end", "start", "end", "start", "end"]
        );
    }

    #[test]
    fn test_bridge_session_end_sends_nothing() {
        let mut m = in_session(3);
        control(
            &mut m,
            Inbound::SessionEnded {
                session_id: Some("session-3".into()),
                frames_sent: Some(10),
            },
        );
        assert_eq!(m.state(), DeviceState::Idle);
        assert_eq!(m.session_id(), None);
        assert_eq!(count_ends(&m), 0);
        assert!(!m.indicator().on);
    }

    #[test]
    fn test_session_started_rerecords_id_only() {
        let mut m = in_session(3);
        control(
            &mut m,
            Inbound::SessionStarted {
                session_id: "bridge-9".into(),
            },
        );
        assert_eq!(m.state(), DeviceState::InSession);
        assert_eq!(m.session_id(), Some("bridge-9"));

        let mut idle = connected();
        control(
            &mut idle,
            Inbound::SessionStarted {
                session_id: "bridge-9".into(),
            },
        );
        assert_eq!(idle.state(), DeviceState::Idle);
        assert_eq!(idle.session_id(), None);
    }

    #[test]
    fn test_informational_messages_do_not_change_state() {
        let mut m = in_session(3);
        for msg in [
            Inbound::Ready {},
            Inbound::VadSpeechStart {},
            Inbound::VadSpeechEnd {},
            Inbound::Transcript {
                text: "hi".into(),
                is_final: true,
            },
        ] {
            control(&mut m, msg);
            assert_eq!(m.state(), DeviceState::InSession);
        }
    }

    #[test]
    fn test_audio_outside_speaking_is_discarded() {
        let mut m = in_session(3);
        m.handle_link_event(LinkEvent::Audio(vec![1, 0, 2, 0]), 0);
        assert!(m.pipeline().bus().writes.is_empty());
        assert_eq!(m.pipeline().mode(), Some(BusMode::Capture));
    }

    #[test]
    fn test_capture_only_in_session() {
        let mut m = connected();
        m.pipeline_mut().bus_mut().queue_input(&[1; 480]);
        assert!(!m.is_listening());
        assert!(!m.capture_tick());

        let _ = m.handle_button(ButtonEvent::ShortPress, 0);
        assert!(m.is_listening());
        assert!(m.capture_tick());
        assert_eq!(decode_le(&m.link().audio[0]), vec![3; 480]);

        control(&mut m, Inbound::AgentSpeakingStart {});
        m.pipeline_mut().bus_mut().queue_input(&[1; 480]);
        assert!(!m.is_listening());
        assert!(!m.capture_tick());
    }

    #[test]
    fn test_long_press_ends_active_session_then_halts() {
        let mut m = in_session(3);
        assert!(m.handle_button(ButtonEvent::LongPress, 3000).is_break());
        assert_eq!(count_ends(&m), 1);
        assert_eq!(m.state(), DeviceState::Idle);

        let mut idle = connected();
        assert!(idle.handle_button(ButtonEvent::LongPress, 3000).is_break());
        assert_eq!(count_ends(&idle), 0);
    }

    #[test]
    fn test_sends_while_link_down_are_dropped_quietly() {
        let mut m = connected();
        m.link_mut().connected = false;
        let _ = m.handle_button(ButtonEvent::ShortPress, 0);
        assert_eq!(m.state(), DeviceState::InSession);
        assert_eq!(m.link().control.len(), 1);
    }
}
