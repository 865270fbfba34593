//! Recorded input events and the timeline that holds them.
//!
//! The in-memory model is a tagged enum; the persisted form is a flat JSON
//! object (`type`, `time`, plus per-type fields) so recordings stay readable
//! and tolerate the legacy `is_relative` flag.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Longest delay (and delay jitter) a timeline may hold: one day.
pub const MAX_DELAY_SECONDS: f64 = 86_400.0;

fn valid_delay(seconds: f64) -> bool {
    seconds.is_finite() && (0.0..=MAX_DELAY_SECONDS).contains(&seconds)
}

/// Key press direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyPhase {
    Down,
    Up,
}

/// What a mouse event does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MousePhase {
    Move,
    Down,
    Up,
    Double,
    Wheel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MouseButton {
    #[serde(alias = "Button.left")]
    Left,
    #[serde(alias = "Button.right")]
    Right,
    #[serde(alias = "Button.middle")]
    Middle,
}

/// How a stored mouse position is turned back into screen coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoordMode {
    /// Global screen coordinates.
    #[default]
    Absolute,
    /// Offset from the anchor captured when the session started.
    #[serde(alias = "gesture_relative")]
    MonitorRelative,
    /// Delta from the previous mouse sample.
    #[serde(alias = "mouse_relative", alias = "playback_relative")]
    CursorRelative,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MouseEvent {
    pub phase: MousePhase,
    pub button: Option<MouseButton>,
    pub position: (i32, i32),
    pub coord_mode: CoordMode,
    pub wheel_delta: Option<i32>,
    /// Per-axis jitter in pixels applied at replay time.
    pub random_range: Option<u32>,
}

impl MouseEvent {
    pub fn new(phase: MousePhase, position: (i32, i32), coord_mode: CoordMode) -> Self {
        Self {
            phase,
            button: None,
            position,
            coord_mode,
            wheel_delta: None,
            random_range: None,
        }
    }

    pub fn with_button(mut self, button: MouseButton) -> Self {
        self.button = Some(button);
        self
    }

    pub fn with_wheel_delta(mut self, delta: i32) -> Self {
        self.wheel_delta = Some(delta);
        self
    }

    pub fn is_wheel(&self) -> bool {
        self.phase == MousePhase::Wheel
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
    Keyboard {
        key: String,
        phase: KeyPhase,
    },
    Mouse(MouseEvent),
    Delay {
        seconds: f64,
        /// Symmetric jitter in seconds applied at replay time.
        random_range: Option<f64>,
    },
}

/// A single recorded action, stamped with seconds since recording start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "PersistedEvent", try_from = "PersistedEvent")]
pub struct Event {
    pub time: f64,
    pub kind: EventKind,
}

impl Event {
    pub fn new(time: f64, kind: EventKind) -> Self {
        Self { time, kind }
    }

    pub fn key(time: f64, key: impl Into<String>, phase: KeyPhase) -> Self {
        Self::new(
            time,
            EventKind::Keyboard {
                key: key.into(),
                phase,
            },
        )
    }

    pub fn mouse(time: f64, mouse: MouseEvent) -> Self {
        Self::new(time, EventKind::Mouse(mouse))
    }

    pub fn delay(time: f64, seconds: f64) -> Self {
        Self::new(
            time,
            EventKind::Delay {
                seconds,
                random_range: None,
            },
        )
    }

    pub fn is_delay(&self) -> bool {
        matches!(self.kind, EventKind::Delay { .. })
    }

    pub fn as_mouse(&self) -> Option<&MouseEvent> {
        match &self.kind {
            EventKind::Mouse(m) => Some(m),
            _ => None,
        }
    }
}

/// Errors raised while decoding a persisted event.
#[derive(Debug, Error)]
pub enum EventFormatError {
    #[error("unknown event type: {0}")]
    UnknownType(String),
    #[error("{kind} event is missing field `{field}`")]
    MissingField { kind: &'static str, field: &'static str },
    #[error("invalid event_type `{value}` for {kind} event")]
    InvalidPhase { kind: &'static str, value: String },
    #[error("{field} {value} is out of range")]
    OutOfRange { field: &'static str, value: f64 },
}

/// Flat on-disk shape of an [`Event`].
#[derive(Debug, Clone, Serialize, Deserialize)]
struct PersistedEvent {
    #[serde(rename = "type")]
    kind: String,
    time: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    event_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    button: Option<MouseButton>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    position: Option<[i32; 2]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    coord_mode: Option<CoordMode>,
    /// Older recordings only know "relative to the gesture anchor or not".
    #[serde(default, skip_serializing)]
    is_relative: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    delta: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    delay: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    random_range: Option<f64>,
}

impl PersistedEvent {
    fn bare(kind: &str, time: f64) -> Self {
        Self {
            kind: kind.to_string(),
            time,
            event_type: None,
            key: None,
            button: None,
            position: None,
            coord_mode: None,
            is_relative: None,
            delta: None,
            delay: None,
            random_range: None,
        }
    }
}

impl From<Event> for PersistedEvent {
    fn from(event: Event) -> Self {
        match event.kind {
            EventKind::Keyboard { key, phase } => {
                let mut p = PersistedEvent::bare("keyboard", event.time);
                p.event_type = Some(key_phase_name(phase).to_string());
                p.key = Some(key);
                p
            }
            EventKind::Mouse(m) => {
                let mut p = PersistedEvent::bare("mouse", event.time);
                p.event_type = Some(mouse_phase_name(m.phase).to_string());
                p.button = m.button;
                p.position = Some([m.position.0, m.position.1]);
                p.coord_mode = Some(m.coord_mode);
                p.delta = m.wheel_delta;
                p.random_range = m.random_range.map(f64::from);
                p
            }
            EventKind::Delay {
                seconds,
                random_range,
            } => {
                let mut p = PersistedEvent::bare("delay", event.time);
                p.delay = Some(seconds);
                p.random_range = random_range;
                p
            }
        }
    }
}

impl TryFrom<PersistedEvent> for Event {
    type Error = EventFormatError;

    fn try_from(p: PersistedEvent) -> Result<Self, Self::Error> {
        let kind = match p.kind.as_str() {
            "keyboard" => {
                let raw = p.event_type.ok_or(EventFormatError::MissingField {
                    kind: "keyboard",
                    field: "event_type",
                })?;
                let phase = match raw.as_str() {
                    "down" => KeyPhase::Down,
                    "up" => KeyPhase::Up,
                    _ => {
                        return Err(EventFormatError::InvalidPhase {
                            kind: "keyboard",
                            value: raw,
                        })
                    }
                };
                let key = p.key.ok_or(EventFormatError::MissingField {
                    kind: "keyboard",
                    field: "key",
                })?;
                EventKind::Keyboard { key, phase }
            }
            "mouse" => {
                let raw = p.event_type.ok_or(EventFormatError::MissingField {
                    kind: "mouse",
                    field: "event_type",
                })?;
                let phase = match raw.as_str() {
                    "move" => MousePhase::Move,
                    "down" => MousePhase::Down,
                    "up" => MousePhase::Up,
                    "double" => MousePhase::Double,
                    "wheel" => MousePhase::Wheel,
                    _ => {
                        return Err(EventFormatError::InvalidPhase {
                            kind: "mouse",
                            value: raw,
                        })
                    }
                };
                let [x, y] = p.position.ok_or(EventFormatError::MissingField {
                    kind: "mouse",
                    field: "position",
                })?;
                let coord_mode = match (p.coord_mode, p.is_relative) {
                    (Some(mode), _) => mode,
                    (None, Some(true)) => CoordMode::MonitorRelative,
                    (None, _) => CoordMode::Absolute,
                };
                EventKind::Mouse(MouseEvent {
                    phase,
                    button: p.button,
                    position: (x, y),
                    coord_mode,
                    wheel_delta: p.delta,
                    random_range: p.random_range.map(|r| r.max(0.0).round() as u32),
                })
            }
            "delay" => {
                let seconds = p.delay.ok_or(EventFormatError::MissingField {
                    kind: "delay",
                    field: "delay",
                })?;
                if !valid_delay(seconds) {
                    return Err(EventFormatError::OutOfRange {
                        field: "delay",
                        value: seconds,
                    });
                }
                if let Some(range) = p.random_range.filter(|r| !valid_delay(*r)) {
                    return Err(EventFormatError::OutOfRange {
                        field: "random_range",
                        value: range,
                    });
                }
                EventKind::Delay {
                    seconds,
                    random_range: p.random_range,
                }
            }
            other => return Err(EventFormatError::UnknownType(other.to_string())),
        };

        Ok(Event { time: p.time, kind })
    }
}

fn key_phase_name(phase: KeyPhase) -> &'static str {
    match phase {
        KeyPhase::Down => "down",
        KeyPhase::Up => "up",
    }
}

fn mouse_phase_name(phase: MousePhase) -> &'static str {
    match phase {
        MousePhase::Move => "move",
        MousePhase::Down => "down",
        MousePhase::Up => "up",
        MousePhase::Double => "double",
        MousePhase::Wheel => "wheel",
    }
}

/// Ordered list of recorded events.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventTimeline {
    events: Vec<Event>,
}

impl EventTimeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_events(events: Vec<Event>) -> Self {
        Self { events }
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn into_events(self) -> Vec<Event> {
        self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Event> {
        self.events.iter()
    }

    pub fn push(&mut self, event: Event) {
        self.events.push(event);
    }

    pub fn last(&self) -> Option<&Event> {
        self.events.last()
    }

    pub(crate) fn last_mut(&mut self) -> Option<&mut Event> {
        self.events.last_mut()
    }

    /// Total of all delay durations, ignoring jitter.
    pub fn duration(&self) -> f64 {
        self.events
            .iter()
            .filter_map(|e| match e.kind {
                EventKind::Delay { seconds, .. } => Some(seconds),
                _ => None,
            })
            .sum()
    }

    /// Re-base all times on the first event so the timeline starts at zero.
    pub fn normalize(&mut self) {
        let Some(base) = self.events.first().map(|e| e.time) else {
            return;
        };
        for event in &mut self.events {
            event.time = (event.time - base).max(0.0);
        }
    }

    /// Insert an event before `index` (`index == len` appends).
    pub fn insert(&mut self, index: usize, event: Event) -> bool {
        if index > self.events.len() {
            return false;
        }
        self.events.insert(index, event);
        true
    }

    /// Insert a delay before `index`, timestamped like its neighbour.
    pub fn insert_delay(&mut self, index: usize, seconds: f64) -> bool {
        if !valid_delay(seconds) {
            return false;
        }
        let time = match index.checked_sub(1).and_then(|i| self.events.get(i)) {
            Some(prev) => prev.time,
            None => self.events.first().map(|e| e.time).unwrap_or(0.0),
        };
        self.insert(index, Event::delay(time, seconds))
    }

    pub fn remove(&mut self, index: usize) -> Option<Event> {
        if index >= self.events.len() {
            return None;
        }
        Some(self.events.remove(index))
    }

    /// Change the duration of the delay at `index`.
    pub fn set_delay(&mut self, index: usize, new_seconds: f64) -> bool {
        if !valid_delay(new_seconds) {
            return false;
        }
        match self.events.get_mut(index).map(|e| &mut e.kind) {
            Some(EventKind::Delay { seconds, .. }) => {
                *seconds = new_seconds;
                true
            }
            _ => false,
        }
    }

    /// Set or clear the delay jitter (seconds) of the delay at `index`.
    pub fn set_delay_jitter(&mut self, index: usize, range: Option<f64>) -> bool {
        if matches!(range, Some(r) if !valid_delay(r)) {
            return false;
        }
        match self.events.get_mut(index).map(|e| &mut e.kind) {
            Some(EventKind::Delay { random_range, .. }) => {
                *random_range = range;
                true
            }
            _ => false,
        }
    }

    /// Set or clear the position jitter (pixels) of the mouse event at `index`.
    pub fn set_position_jitter(&mut self, index: usize, range: Option<u32>) -> bool {
        match self.events.get_mut(index).map(|e| &mut e.kind) {
            Some(EventKind::Mouse(m)) => {
                m.random_range = range;
                true
            }
            _ => false,
        }
    }
}

impl IntoIterator for EventTimeline {
    type Item = Event;
    type IntoIter = std::vec::IntoIter<Event>;

    fn into_iter(self) -> Self::IntoIter {
        self.events.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> EventTimeline {
        EventTimeline::from_events(vec![
            Event::key(0.0, "a", KeyPhase::Down),
            Event::delay(0.099, 0.1),
            Event::key(0.1, "a", KeyPhase::Up),
            Event::mouse(
                0.25,
                MouseEvent::new(MousePhase::Down, (10, -4), CoordMode::MonitorRelative)
                    .with_button(MouseButton::Left),
            ),
            Event::mouse(
                0.3,
                MouseEvent::new(MousePhase::Wheel, (800, 600), CoordMode::Absolute)
                    .with_wheel_delta(-3),
            ),
        ])
    }

    #[test]
    fn test_persisted_field_names() {
        let json = serde_json::to_value(sample()).unwrap();
        assert_eq!(json[0]["type"], "keyboard");
        assert_eq!(json[0]["event_type"], "down");
        assert_eq!(json[0]["key"], "a");
        assert_eq!(json[1]["type"], "delay");
        assert_eq!(json[1]["delay"], 0.1);
        assert_eq!(json[3]["button"], "left");
        assert_eq!(json[3]["position"], serde_json::json!([10, -4]));
        assert_eq!(json[3]["coord_mode"], "monitor_relative");
        assert_eq!(json[4]["delta"], -3);
        assert!(json[4].get("is_relative").is_none());
    }

    #[test]
    fn test_json_round_trip() {
        let mut timeline = sample();
        assert!(timeline.set_delay_jitter(1, Some(0.05)));
        assert!(timeline.set_position_jitter(3, Some(4)));
        let json = serde_json::to_string(&timeline).unwrap();
        let back: EventTimeline = serde_json::from_str(&json).unwrap();
        assert_eq!(back, timeline);
    }

    #[test]
    fn test_legacy_is_relative_and_aliases() {
        let json = r#"[
            {"type":"mouse","time":0.0,"event_type":"down","button":"Button.left","position":[5,6],"is_relative":true},
            {"type":"mouse","time":0.5,"event_type":"move","position":[1,1],"coord_mode":"mouse_relative"},
            {"type":"mouse","time":0.7,"event_type":"up","position":[1,1]}
        ]"#;
        let timeline: EventTimeline = serde_json::from_str(json).unwrap();
        let modes: Vec<_> = timeline
            .iter()
            .map(|e| e.as_mouse().unwrap().coord_mode)
            .collect();
        assert_eq!(
            modes,
            vec![
                CoordMode::MonitorRelative,
                CoordMode::CursorRelative,
                CoordMode::Absolute
            ]
        );
        assert_eq!(
            timeline.events()[0].as_mouse().unwrap().button,
            Some(MouseButton::Left)
        );
    }

    #[test]
    fn test_malformed_event_rejected() {
        let missing_key = r#"[{"type":"keyboard","time":0.0,"event_type":"down"}]"#;
        assert!(serde_json::from_str::<EventTimeline>(missing_key).is_err());

        let bad_type = r#"[{"type":"joystick","time":0.0}]"#;
        assert!(serde_json::from_str::<EventTimeline>(bad_type).is_err());

        let bad_phase = r#"[{"type":"mouse","time":0.0,"event_type":"hover","position":[0,0]}]"#;
        assert!(serde_json::from_str::<EventTimeline>(bad_phase).is_err());
    }

    #[test]
    fn test_normalize_rebases_on_first_event() {
        let mut timeline = EventTimeline::from_events(vec![
            Event::key(12.5, "a", KeyPhase::Down),
            Event::delay(12.4, 0.3),
            Event::key(12.8, "a", KeyPhase::Up),
        ]);
        timeline.normalize();
        let times: Vec<f64> = timeline.iter().map(|e| e.time).collect();
        assert_eq!(times[0], 0.0);
        assert_eq!(times[1], 0.0);
        assert!((times[2] - 0.3).abs() < 1e-9);
    }

    #[test]
    fn test_editing_out_of_range_is_rejected() {
        let mut timeline = sample();
        assert!(!timeline.insert(99, Event::delay(0.0, 1.0)));
        assert!(timeline.remove(99).is_none());
        assert!(!timeline.set_delay(0, 1.0));
        assert!(!timeline.set_delay(42, 1.0));
        assert!(!timeline.set_position_jitter(1, Some(3)));
        assert!(!timeline.insert_delay(1, -1.0));
        assert_eq!(timeline.len(), 5);
    }

    #[test]
    fn test_oversized_delays_are_rejected() {
        let mut timeline = sample();
        assert!(!timeline.set_delay(1, 1e20));
        assert!(!timeline.set_delay_jitter(1, Some(1e300)));
        assert!(!timeline.insert_delay(0, MAX_DELAY_SECONDS * 2.0));
        assert!(timeline.set_delay(1, MAX_DELAY_SECONDS));
        assert_eq!(timeline.len(), 5);

        let huge_range = r#"[{"type":"delay","time":0.0,"delay":0.01,"random_range":1e300}]"#;
        assert!(serde_json::from_str::<EventTimeline>(huge_range).is_err());
        let huge_delay = r#"[{"type":"delay","time":0.0,"delay":1e20}]"#;
        assert!(serde_json::from_str::<EventTimeline>(huge_delay).is_err());
    }

    #[test]
    fn test_insert_delay_and_duration() {
        let mut timeline = sample();
        assert!(timeline.insert_delay(3, 2.0));
        assert_eq!(timeline.len(), 6);
        assert_eq!(timeline.events()[3].time, timeline.events()[2].time);
        assert!((timeline.duration() - 2.1).abs() < 1e-9);
        assert!(timeline.set_delay(3, 0.5));
        assert!((timeline.duration() - 0.6).abs() < 1e-9);
    }
}
