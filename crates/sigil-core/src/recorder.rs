//! Capture engine: turns raw hook callbacks into an [`EventTimeline`].
//!
//! [`Recorder`] is the synchronous state machine; it never blocks and knows
//! nothing about threads. [`CaptureEngine`] owns one capture session: it
//! installs the hook, runs a session thread that is the only writer of the
//! recorder, and hands the finished timeline back when the thread is joined.

use crate::config::CaptureConfig;
use crate::geometry::Desktop;
use crate::input::{HookError, InputHook, RawInput, RawInputKind};
use crate::{CoordMode, Event, EventKind, EventTimeline, KeyPhase, MouseEvent, MousePhase};
use crossbeam_channel::{bounded, select, Receiver, Sender};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// A delay is stamped this far before the event it precedes.
const DELAY_LEAD: f64 = 0.0001;

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error(transparent)]
    Hook(#[from] HookError),
    #[error("capture already active")]
    AlreadyActive,
    #[error("capture session thread panicked")]
    SessionPanicked,
}

/// Per-session choices made by the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureOptions {
    pub coord_mode: CoordMode,
    pub record_keyboard: bool,
    pub record_mouse_move: bool,
    pub record_delay: bool,
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self {
            coord_mode: CoordMode::Absolute,
            record_keyboard: true,
            record_mouse_move: true,
            record_delay: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RecorderState {
    #[default]
    Idle,
    Recording,
}

#[derive(Debug, Clone)]
pub enum RecorderEvent {
    StateChanged { old: RecorderState, new: RecorderState },
    /// An event was appended or merged.
    EventCaptured { event_count: usize },
    /// One of the application's own hotkeys was pressed; it is not recorded.
    HotkeyPressed { key: String },
    RecordingCompleted { timeline: EventTimeline },
}

pub struct Recorder {
    config: CaptureConfig,
    options: CaptureOptions,
    state: RecorderState,
    timeline: EventTimeline,
    /// Anchor for monitor-relative positions, captured at start.
    anchor: Option<(i32, i32)>,
    last_event_time: Option<f64>,
    last_move_sample: Option<f64>,
    /// Raw position of the previous recorded mouse event.
    last_recorded_pos: Option<(i32, i32)>,
    held_keys: HashMap<String, f64>,
    /// Manual delays requested before the first event arrived.
    leading_delays: Vec<f64>,
    anchor_fallback_logged: bool,
}

impl Recorder {
    pub fn new(config: CaptureConfig) -> Self {
        Self {
            config,
            options: CaptureOptions::default(),
            state: RecorderState::Idle,
            timeline: EventTimeline::new(),
            anchor: None,
            last_event_time: None,
            last_move_sample: None,
            last_recorded_pos: None,
            held_keys: HashMap::new(),
            leading_delays: Vec::new(),
            anchor_fallback_logged: false,
        }
    }

    pub fn state(&self) -> RecorderState {
        self.state
    }

    pub fn event_count(&self) -> usize {
        self.timeline.len()
    }

    pub fn start(
        &mut self,
        options: CaptureOptions,
        anchor: Option<(i32, i32)>,
    ) -> Option<RecorderEvent> {
        if self.state != RecorderState::Idle {
            return None;
        }

        self.options = options;
        self.anchor = anchor;
        self.timeline = EventTimeline::new();
        self.last_event_time = None;
        self.last_move_sample = None;
        self.last_recorded_pos = None;
        self.held_keys.clear();
        self.leading_delays.clear();
        self.anchor_fallback_logged = false;
        self.state = RecorderState::Recording;

        info!(?options, ?anchor, "Recording started");
        Some(RecorderEvent::StateChanged {
            old: RecorderState::Idle,
            new: RecorderState::Recording,
        })
    }

    /// Stop recording and return the time-normalized timeline.
    pub fn stop(&mut self) -> Option<RecorderEvent> {
        if self.state != RecorderState::Recording {
            return None;
        }
        self.state = RecorderState::Idle;

        let mut timeline = std::mem::take(&mut self.timeline);
        for seconds in self.leading_delays.drain(..) {
            timeline.push(Event::delay(0.0, seconds));
        }
        timeline.normalize();
        self.held_keys.clear();

        info!(events = timeline.len(), "Recording stopped");
        Some(RecorderEvent::RecordingCompleted { timeline })
    }

    /// Append a delay chosen by the user, exempt from the minimum-gap rule.
    pub fn inject_delay(&mut self, seconds: f64) -> bool {
        if self.state != RecorderState::Recording || !seconds.is_finite() || seconds < 0.0 {
            return false;
        }
        match self.last_event_time {
            Some(last) => self.timeline.push(Event::delay(last + DELAY_LEAD, seconds)),
            None => self.leading_delays.push(seconds),
        }
        debug!(seconds, "Manual delay inserted");
        true
    }

    /// Feed one raw hook callback.
    pub fn push(&mut self, raw: RawInput) -> Option<RecorderEvent> {
        if self.state != RecorderState::Recording {
            return None;
        }
        let ts = raw.timestamp;

        match raw.kind {
            RawInputKind::MouseMove { x, y } => {
                if !self.options.record_mouse_move {
                    return None;
                }
                if let Some(last) = self.last_move_sample {
                    if ts - last < self.config.move_sample_interval() {
                        return None;
                    }
                }
                self.last_move_sample = Some(ts);
                self.append_mouse(ts, MousePhase::Move, None, (x, y), None)
            }
            RawInputKind::MouseDown { x, y, button } => {
                self.append_mouse(ts, MousePhase::Down, Some(button), (x, y), None)
            }
            RawInputKind::MouseUp { x, y, button } => {
                self.append_mouse(ts, MousePhase::Up, Some(button), (x, y), None)
            }
            RawInputKind::Wheel { x, y, delta } => {
                if self.merge_wheel(ts, delta) {
                    return Some(self.captured());
                }
                self.append_mouse(ts, MousePhase::Wheel, None, (x, y), Some(delta))
            }
            RawInputKind::KeyDown { key } => {
                if self.is_hotkey(&key) {
                    return Some(RecorderEvent::HotkeyPressed { key });
                }
                if !self.options.record_keyboard {
                    return None;
                }
                if self.held_keys.contains_key(&key) {
                    debug!(key, "Ignoring repeated key down");
                    return None;
                }
                self.held_keys.insert(key.clone(), ts);
                self.append(ts, EventKind::Keyboard { key, phase: KeyPhase::Down })
            }
            RawInputKind::KeyUp { key } => {
                if self.is_hotkey(&key) || !self.options.record_keyboard {
                    return None;
                }
                let pressed_at = self.held_keys.remove(&key);
                let down_is_last = matches!(
                    self.timeline.last().map(|e| &e.kind),
                    Some(EventKind::Keyboard { key: k, phase: KeyPhase::Down }) if *k == key
                );

                match pressed_at {
                    Some(since) if down_is_last => {
                        // Encode the hold length so replay keeps the key down as long.
                        let hold = ts - since;
                        if hold >= self.config.min_delay() {
                            self.timeline
                                .push(Event::delay((ts - DELAY_LEAD).max(since), hold));
                        }
                        self.timeline.push(Event::key(ts, key, KeyPhase::Up));
                        self.last_event_time = Some(ts);
                        Some(self.captured())
                    }
                    _ => self.append(ts, EventKind::Keyboard { key, phase: KeyPhase::Up }),
                }
            }
        }
    }

    fn is_hotkey(&self, key: &str) -> bool {
        self.config.excluded_keys().contains(&key)
    }

    /// Fold a wheel tick into the previous wheel event when it is recent enough.
    fn merge_wheel(&mut self, ts: f64, delta: i32) -> bool {
        let window = self.config.wheel_merge_window();
        let Some(last) = self.timeline.last_mut() else {
            return false;
        };
        let last_time = last.time;
        match &mut last.kind {
            EventKind::Mouse(m) if m.is_wheel() && ts - last_time < window => {
                m.wheel_delta = Some(m.wheel_delta.unwrap_or(0) + delta);
                last.time = ts;
                debug!(delta, total = ?m.wheel_delta, "Merged wheel event");
                true
            }
            _ => false,
        }
    }

    fn append_mouse(
        &mut self,
        ts: f64,
        phase: MousePhase,
        button: Option<crate::MouseButton>,
        raw: (i32, i32),
        wheel_delta: Option<i32>,
    ) -> Option<RecorderEvent> {
        let (position, coord_mode) = self.resolve_position(raw);
        let mouse = MouseEvent {
            phase,
            button,
            position,
            coord_mode,
            wheel_delta,
            random_range: None,
        };
        self.append(ts, EventKind::Mouse(mouse))
    }

    fn resolve_position(&mut self, (x, y): (i32, i32)) -> ((i32, i32), CoordMode) {
        let resolved = match self.options.coord_mode {
            CoordMode::Absolute => ((x, y), CoordMode::Absolute),
            CoordMode::MonitorRelative => match self.anchor {
                Some((ax, ay)) => ((x - ax, y - ay), CoordMode::MonitorRelative),
                None => {
                    if !self.anchor_fallback_logged {
                        warn!("No anchor captured, recording absolute positions instead");
                        self.anchor_fallback_logged = true;
                    }
                    ((x, y), CoordMode::Absolute)
                }
            },
            CoordMode::CursorRelative => match self.last_recorded_pos {
                Some((px, py)) => ((x - px, y - py), CoordMode::CursorRelative),
                None => ((x, y), CoordMode::Absolute),
            },
        };
        self.last_recorded_pos = Some((x, y));
        resolved
    }

    /// Append a non-delay event, preceded by the gap since the last event.
    fn append(&mut self, ts: f64, kind: EventKind) -> Option<RecorderEvent> {
        match self.last_event_time {
            Some(last) => {
                let elapsed = ts - last;
                if self.options.record_delay && elapsed >= self.config.min_delay() {
                    self.timeline
                        .push(Event::delay((ts - DELAY_LEAD).max(last), elapsed));
                }
            }
            None => {
                for seconds in self.leading_delays.drain(..) {
                    self.timeline.push(Event::delay(ts - DELAY_LEAD, seconds));
                }
            }
        }

        debug!(ts, ?kind, "Recording event");
        self.timeline.push(Event::new(ts, kind));
        self.last_event_time = Some(ts);
        Some(self.captured())
    }

    fn captured(&self) -> RecorderEvent {
        RecorderEvent::EventCaptured {
            event_count: self.timeline.len(),
        }
    }
}

enum SessionCommand {
    InjectDelay { seconds: f64, reply: Sender<bool> },
    Stop,
}

struct CaptureSession {
    cmd_tx: Sender<SessionCommand>,
    thread: JoinHandle<EventTimeline>,
}

/// Owns the hook registration and the session thread for one capture at a time.
pub struct CaptureEngine {
    hook: Arc<dyn InputHook>,
    desktop: Arc<dyn Desktop>,
    config: CaptureConfig,
    session: Option<CaptureSession>,
    event_tx: Sender<RecorderEvent>,
    event_rx: Receiver<RecorderEvent>,
}

impl CaptureEngine {
    pub fn new(hook: Arc<dyn InputHook>, desktop: Arc<dyn Desktop>, config: CaptureConfig) -> Self {
        let (event_tx, event_rx) = bounded(256);
        Self {
            hook,
            desktop,
            config,
            session: None,
            event_tx,
            event_rx,
        }
    }

    pub fn is_capturing(&self) -> bool {
        self.session.is_some()
    }

    /// Progress notifications (captured counts, hotkeys, completion).
    pub fn events(&self) -> Receiver<RecorderEvent> {
        self.event_rx.clone()
    }

    /// Start a session. Returns false if one is already active or the hook
    /// cannot be registered.
    pub fn start(&mut self, options: CaptureOptions) -> bool {
        match self.try_start(options) {
            Ok(()) => true,
            Err(e) => {
                error!(error = %e, "Failed to start capture");
                false
            }
        }
    }

    fn try_start(&mut self, options: CaptureOptions) -> Result<(), CaptureError> {
        if self.session.is_some() {
            return Err(CaptureError::AlreadyActive);
        }

        let stream = self.hook.install()?;
        let anchor = self.desktop.cursor_position();

        let mut recorder = Recorder::new(self.config.clone());
        if let Some(event) = recorder.start(options, anchor) {
            self.emit(event);
        }

        let (cmd_tx, cmd_rx) = bounded::<SessionCommand>(16);
        let event_tx = self.event_tx.clone();

        let thread = thread::spawn(move || {
            debug!("Capture session thread started");
            let forward = |event: Option<RecorderEvent>| {
                if let Some(event) = event {
                    if let Err(e) = event_tx.try_send(event) {
                        debug!("Dropped recorder event: {}", e);
                    }
                }
            };

            let raw_rx = stream.events().clone();
            loop {
                select! {
                    recv(raw_rx) -> msg => match msg {
                        Ok(raw) => forward(recorder.push(raw)),
                        Err(_) => {
                            warn!("Input hook disconnected, ending capture session");
                            break;
                        }
                    },
                    recv(cmd_rx) -> cmd => match cmd {
                        Ok(SessionCommand::InjectDelay { seconds, reply }) => {
                            let _ = reply.send(recorder.inject_delay(seconds));
                        }
                        Ok(SessionCommand::Stop) | Err(_) => break,
                    },
                }
            }

            // Whatever the hook delivered before the stop request still belongs
            // to this session.
            for raw in raw_rx.try_iter() {
                forward(recorder.push(raw));
            }
            drop(stream);

            match recorder.stop() {
                Some(RecorderEvent::RecordingCompleted { timeline }) => timeline,
                _ => EventTimeline::new(),
            }
        });

        self.session = Some(CaptureSession { cmd_tx, thread });
        Ok(())
    }

    /// Insert a manual delay while capturing.
    pub fn inject_delay(&self, seconds: f64) -> bool {
        let Some(session) = &self.session else {
            return false;
        };
        let (reply_tx, reply_rx) = bounded(1);
        if session
            .cmd_tx
            .send(SessionCommand::InjectDelay { seconds, reply: reply_tx })
            .is_err()
        {
            return false;
        }
        reply_rx.recv().unwrap_or(false)
    }

    /// Unregister the hook and return the finalized timeline.
    ///
    /// Returns an empty timeline when no session is active.
    pub fn stop(&mut self) -> EventTimeline {
        let Some(session) = self.session.take() else {
            warn!("Stop requested but no capture is active");
            return EventTimeline::new();
        };

        let _ = session.cmd_tx.send(SessionCommand::Stop);
        let timeline = match session.thread.join() {
            Ok(timeline) => timeline,
            Err(_) => {
                error!(error = %CaptureError::SessionPanicked, "Capture session lost");
                EventTimeline::new()
            }
        };

        self.emit(RecorderEvent::StateChanged {
            old: RecorderState::Recording,
            new: RecorderState::Idle,
        });
        self.emit(RecorderEvent::RecordingCompleted {
            timeline: timeline.clone(),
        });
        timeline
    }

    fn emit(&self, event: RecorderEvent) {
        if let Err(e) = self.event_tx.try_send(event) {
            debug!("Dropped recorder event: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Monitor;
    use crate::MouseButton;
    use std::sync::Mutex;

    fn recorder(options: CaptureOptions, anchor: Option<(i32, i32)>) -> Recorder {
        let mut recorder = Recorder::new(CaptureConfig::default());
        recorder.start(options, anchor);
        recorder
    }

    fn finish(mut recorder: Recorder) -> EventTimeline {
        match recorder.stop() {
            Some(RecorderEvent::RecordingCompleted { timeline }) => timeline,
            other => panic!("unexpected {:?}", other),
        }
    }

    fn input(ts: f64, kind: RawInputKind) -> RawInput {
        RawInput::new(ts, kind)
    }

    fn wheel(ts: f64, delta: i32) -> RawInput {
        input(ts, RawInputKind::Wheel { x: 50, y: 50, delta })
    }

    fn wheel_deltas(timeline: &EventTimeline) -> Vec<i32> {
        timeline
            .iter()
            .filter_map(|e| e.as_mouse())
            .filter(|m| m.is_wheel())
            .filter_map(|m| m.wheel_delta)
            .collect()
    }

    #[test]
    fn test_recorder_basic() {
        let mut r = recorder(CaptureOptions::default(), None);
        assert_eq!(r.state(), RecorderState::Recording);

        r.push(input(100.0, RawInputKind::MouseMove { x: 100, y: 200 }));
        r.push(input(100.5, RawInputKind::MouseDown { x: 100, y: 200, button: MouseButton::Left }));
        r.push(input(100.6, RawInputKind::MouseUp { x: 100, y: 200, button: MouseButton::Left }));

        let timeline = finish(r);
        // move, delay, down, delay, up
        assert_eq!(timeline.len(), 5);
        assert_eq!(timeline.events()[0].time, 0.0);
        assert!(timeline.events().windows(2).all(|w| w[0].time <= w[1].time));
        match timeline.events()[1].kind {
            EventKind::Delay { seconds, .. } => assert!((seconds - 0.5).abs() < 1e-9),
            ref other => panic!("expected delay, got {:?}", other),
        }
    }

    #[test]
    fn test_start_is_rejected_while_recording() {
        let mut r = recorder(CaptureOptions::default(), None);
        assert!(r.start(CaptureOptions::default(), None).is_none());
    }

    #[test]
    fn test_move_throttle_and_disable() {
        let mut r = recorder(CaptureOptions { record_delay: false, ..Default::default() }, None);
        r.push(input(1.000, RawInputKind::MouseMove { x: 0, y: 0 }));
        r.push(input(1.004, RawInputKind::MouseMove { x: 1, y: 0 }));
        r.push(input(1.012, RawInputKind::MouseMove { x: 2, y: 0 }));
        assert_eq!(r.event_count(), 2);

        let mut r = recorder(CaptureOptions { record_mouse_move: false, ..Default::default() }, None);
        r.push(input(1.0, RawInputKind::MouseMove { x: 0, y: 0 }));
        r.push(input(1.1, RawInputKind::MouseDown { x: 0, y: 0, button: MouseButton::Right }));
        r.push(input(1.2, wheel(1.2, 1).kind));
        let timeline = finish(r);
        assert!(timeline
            .iter()
            .filter_map(|e| e.as_mouse())
            .all(|m| m.phase != MousePhase::Move));
        assert_eq!(timeline.iter().filter(|e| e.as_mouse().is_some()).count(), 2);
    }

    #[test]
    fn test_short_gaps_do_not_produce_delays() {
        let mut r = recorder(CaptureOptions::default(), None);
        r.push(input(5.000, RawInputKind::KeyDown { key: "a".into() }));
        r.push(input(5.004, RawInputKind::KeyDown { key: "b".into() }));
        r.push(input(5.030, RawInputKind::KeyDown { key: "c".into() }));
        let timeline = finish(r);
        let delays: Vec<_> = timeline.iter().filter(|e| e.is_delay()).collect();
        assert_eq!(delays.len(), 1);
        assert_eq!(timeline.len(), 4);
    }

    #[test]
    fn test_wheel_consolidation() {
        let mut r = recorder(CaptureOptions::default(), None);
        r.push(wheel(2.0, 3));
        r.push(wheel(2.1, 2));
        assert_eq!(wheel_deltas(&finish(r)), vec![5]);

        let mut r = recorder(CaptureOptions::default(), None);
        r.push(wheel(2.0, 3));
        r.push(wheel(2.6, 2));
        assert_eq!(wheel_deltas(&finish(r)), vec![3, 2]);
    }

    #[test]
    fn test_wheel_merge_keeps_delay_clock() {
        let mut r = recorder(CaptureOptions::default(), None);
        r.push(wheel(1.0, 1));
        r.push(wheel(1.3, 1));
        r.push(input(2.0, RawInputKind::KeyDown { key: "x".into() }));
        let timeline = finish(r);
        let delay = timeline
            .iter()
            .find_map(|e| match e.kind {
                EventKind::Delay { seconds, .. } => Some(seconds),
                _ => None,
            })
            .unwrap();
        assert!((delay - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_key_hold_and_autorepeat() {
        let mut r = recorder(CaptureOptions::default(), None);
        r.push(input(3.0, RawInputKind::KeyDown { key: "a".into() }));
        r.push(input(3.2, RawInputKind::KeyDown { key: "a".into() }));
        r.push(input(3.4, RawInputKind::KeyDown { key: "a".into() }));
        r.push(input(3.5, RawInputKind::KeyUp { key: "a".into() }));
        let timeline = finish(r);

        assert_eq!(timeline.len(), 3);
        assert!(matches!(
            timeline.events()[0].kind,
            EventKind::Keyboard { phase: KeyPhase::Down, .. }
        ));
        match timeline.events()[1].kind {
            EventKind::Delay { seconds, .. } => assert!((seconds - 0.5).abs() < 1e-9),
            ref other => panic!("expected hold delay, got {:?}", other),
        }
        assert!(matches!(
            timeline.events()[2].kind,
            EventKind::Keyboard { phase: KeyPhase::Up, .. }
        ));
    }

    #[test]
    fn test_key_hold_with_interleaved_click_is_not_double_counted() {
        let mut r = recorder(CaptureOptions::default(), None);
        r.push(input(1.0, RawInputKind::KeyDown { key: "ShiftLeft".into() }));
        r.push(input(1.4, RawInputKind::MouseDown { x: 1, y: 1, button: MouseButton::Left }));
        r.push(input(1.5, RawInputKind::KeyUp { key: "ShiftLeft".into() }));
        let timeline = finish(r);
        assert!((timeline.duration() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_hotkeys_and_disabled_keyboard() {
        let mut r = recorder(CaptureOptions { record_keyboard: false, ..Default::default() }, None);
        let event = r.push(input(1.0, RawInputKind::KeyDown { key: "F10".into() }));
        assert!(matches!(event, Some(RecorderEvent::HotkeyPressed { ref key }) if key == "F10"));
        r.push(input(1.1, RawInputKind::KeyUp { key: "F10".into() }));
        r.push(input(1.2, RawInputKind::KeyDown { key: "q".into() }));
        assert_eq!(r.event_count(), 0);
    }

    #[test]
    fn test_record_delay_disabled() {
        let mut r = recorder(CaptureOptions { record_delay: false, ..Default::default() }, None);
        r.push(input(1.0, RawInputKind::MouseDown { x: 0, y: 0, button: MouseButton::Left }));
        r.push(input(2.0, RawInputKind::MouseUp { x: 0, y: 0, button: MouseButton::Left }));
        assert!(finish(r).iter().all(|e| !e.is_delay()));
    }

    #[test]
    fn test_monitor_relative_uses_anchor() {
        let options = CaptureOptions { coord_mode: CoordMode::MonitorRelative, ..Default::default() };
        let mut r = recorder(options, Some((500, 400)));
        r.push(input(1.0, RawInputKind::MouseDown { x: 520, y: 390, button: MouseButton::Left }));
        let timeline = finish(r);
        let m = timeline.events()[0].as_mouse().unwrap();
        assert_eq!(m.position, (20, -10));
        assert_eq!(m.coord_mode, CoordMode::MonitorRelative);

        let mut r = recorder(options, None);
        r.push(input(1.0, RawInputKind::MouseDown { x: 520, y: 390, button: MouseButton::Left }));
        let m = finish(r).events()[0].as_mouse().unwrap().clone();
        assert_eq!(m.position, (520, 390));
        assert_eq!(m.coord_mode, CoordMode::Absolute);
    }

    #[test]
    fn test_cursor_relative_deltas() {
        let options = CaptureOptions {
            coord_mode: CoordMode::CursorRelative,
            record_delay: false,
            ..Default::default()
        };
        let mut r = recorder(options, None);
        r.push(input(1.00, RawInputKind::MouseMove { x: 100, y: 100 }));
        r.push(input(1.05, RawInputKind::MouseMove { x: 130, y: 90 }));
        r.push(input(1.10, RawInputKind::MouseDown { x: 135, y: 95, button: MouseButton::Left }));
        let timeline = finish(r);
        let samples: Vec<_> = timeline
            .iter()
            .filter_map(|e| e.as_mouse())
            .map(|m| (m.position, m.coord_mode))
            .collect();
        assert_eq!(
            samples,
            vec![
                ((100, 100), CoordMode::Absolute),
                ((30, -10), CoordMode::CursorRelative),
                ((5, 5), CoordMode::CursorRelative),
            ]
        );
    }

    #[test]
    fn test_manual_delay() {
        let mut r = recorder(CaptureOptions { record_delay: false, ..Default::default() }, None);
        assert!(r.inject_delay(1.5));
        r.push(input(10.0, RawInputKind::KeyDown { key: "a".into() }));
        assert!(r.inject_delay(0.002));
        assert!(!r.inject_delay(f64::NAN));
        r.push(input(10.5, RawInputKind::KeyDown { key: "b".into() }));
        let timeline = finish(r);
        assert_eq!(timeline.events()[0].time, 0.0);
        assert!(timeline.events()[0].is_delay());
        assert!((timeline.duration() - 1.502).abs() < 1e-9);
        assert!(timeline.events().windows(2).all(|w| w[0].time <= w[1].time));
    }

    struct FakeHook {
        tx: Mutex<Option<Sender<RawInput>>>,
        fail: bool,
    }

    impl FakeHook {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(Self { tx: Mutex::new(None), fail })
        }

        fn send(&self, raw: RawInput) {
            let guard = self.tx.lock().unwrap();
            guard.as_ref().expect("hook not installed").send(raw).unwrap();
        }
    }

    impl InputHook for FakeHook {
        fn install(&self) -> Result<crate::input::HookStream, HookError> {
            if self.fail {
                return Err(HookError::Registration("access denied".into()));
            }
            let (tx, rx) = bounded(64);
            *self.tx.lock().unwrap() = Some(tx);
            Ok(crate::input::HookStream::new(rx, ()))
        }
    }

    struct FixedDesktop;

    impl Desktop for FixedDesktop {
        fn monitors(&self) -> Vec<Monitor> {
            vec![Monitor { x: 0, y: 0, width: 1920, height: 1080, is_primary: true }]
        }

        fn cursor_position(&self) -> Option<(i32, i32)> {
            Some((960, 540))
        }
    }

    #[test]
    fn test_engine_session_through_channel() {
        let hook = FakeHook::new(false);
        let mut engine = CaptureEngine::new(hook.clone(), Arc::new(FixedDesktop), CaptureConfig::default());
        let options = CaptureOptions { coord_mode: CoordMode::MonitorRelative, ..Default::default() };

        assert!(engine.start(options));
        assert!(!engine.start(options));
        assert!(engine.is_capturing());

        hook.send(input(50.0, RawInputKind::MouseDown { x: 970, y: 545, button: MouseButton::Left }));
        hook.send(input(50.2, RawInputKind::MouseUp { x: 970, y: 545, button: MouseButton::Left }));
        assert!(engine.inject_delay(1.0));

        let timeline = engine.stop();
        assert!(!engine.is_capturing());
        assert_eq!(timeline.events()[0].time, 0.0);
        // The manual delay may land before or after the clicks depending on
        // which channel the session thread serviced first.
        let first_mouse = timeline.iter().find_map(|e| e.as_mouse()).unwrap();
        assert_eq!(first_mouse.position, (10, 5));
        assert!((timeline.duration() - 1.2).abs() < 1e-9);

        let events: Vec<_> = engine.events().try_iter().collect();
        assert!(events
            .iter()
            .any(|e| matches!(e, RecorderEvent::RecordingCompleted { .. })));
    }

    #[test]
    fn test_engine_hook_failure_leaves_engine_idle() {
        let mut engine = CaptureEngine::new(FakeHook::new(true), Arc::new(FixedDesktop), CaptureConfig::default());
        assert!(!engine.start(CaptureOptions::default()));
        assert!(!engine.is_capturing());
        assert!(!engine.inject_delay(1.0));
        assert!(engine.stop().is_empty());
    }
}
