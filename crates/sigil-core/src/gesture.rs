//! Gesture classification: turns a stroke of points into a [`GestureKey`].

use crate::config::GestureConfig;
use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

bitflags! {
    /// Modifier keys held when a gesture was armed.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Modifiers: u8 {
        const CTRL = 0b001;
        const SHIFT = 0b010;
        const ALT = 0b100;
    }
}

impl Modifiers {
    /// Canonical prefix used in gesture keys.
    pub fn prefix(self) -> &'static str {
        const PREFIXES: [&str; 8] = [
            "NONE",
            "Ctrl",
            "Shift",
            "Ctrl+Shift",
            "Alt",
            "Ctrl+Alt",
            "Shift+Alt",
            "Ctrl+Shift+Alt",
        ];
        PREFIXES[usize::from(self.bits() & 0b111)]
    }
}

/// One stroke direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Right,
    Left,
    Up,
    Down,
    Still,
}

impl Direction {
    pub fn symbol(self) -> char {
        match self {
            Direction::Right => '→',
            Direction::Left => '←',
            Direction::Up => '↑',
            Direction::Down => '↓',
            Direction::Still => '•',
        }
    }

    /// Screen coordinates: y grows downwards.
    fn of(dx: f64, dy: f64) -> Self {
        if dx == 0.0 && dy == 0.0 {
            Direction::Still
        } else if dx.abs() >= dy.abs() {
            if dx >= 0.0 {
                Direction::Right
            } else {
                Direction::Left
            }
        } else if dy > 0.0 {
            Direction::Down
        } else {
            Direction::Up
        }
    }
}

/// Lookup key for a stored macro, e.g. `Ctrl+→↓` or `NONE+tooShort`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GestureKey(String);

impl GestureKey {
    pub fn new(modifiers: Modifiers, path: &str) -> Self {
        Self(format!("{}+{}", modifiers.prefix(), path))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for GestureKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for GestureKey {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl AsRef<str> for GestureKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Classify `points` drawn while `modifiers` were held. Pure and deterministic.
pub fn classify(points: &[(i32, i32)], modifiers: Modifiers, config: &GestureConfig) -> GestureKey {
    let n = points.len();
    if n < config.min_points {
        return GestureKey::new(modifiers, "tooShort");
    }

    let segment = config.min_segment.max(n / 10).max(1);
    let skip = segment / 2;
    if n < skip + config.min_points {
        return GestureKey::new(modifiers, &Direction::Still.symbol().to_string());
    }

    let threshold = f64::from(config.noise_threshold_px);
    let mut accepted: Vec<Direction> = Vec::new();
    let accept = |dx: f64, dy: f64, accepted: &mut Vec<Direction>| {
        let dir = Direction::of(dx, dy);
        let magnitude = dx.abs().max(dy.abs());
        if accepted.last() != Some(&dir) && magnitude > threshold {
            accepted.push(dir);
        }
    };

    let mut reference = to_f64(points[skip]);
    let mut i = skip;
    while i + segment <= n {
        let c = centroid(&points[i..i + segment]);
        accept(c.0 - reference.0, c.1 - reference.1, &mut accepted);
        reference = c;
        i += segment;
    }

    if i < n {
        let end = to_f64(points[n - 1]);
        accept(end.0 - reference.0, end.1 - reference.1, &mut accepted);
    }

    accepted.dedup();
    accepted.truncate(config.max_symbols);

    if accepted.is_empty() {
        let start = to_f64(points[skip]);
        let end = to_f64(points[n - 1]);
        accepted.push(Direction::of(end.0 - start.0, end.1 - start.1));
    }

    let path: String = accepted.iter().map(|d| d.symbol()).collect();
    GestureKey::new(modifiers, &path)
}

fn to_f64((x, y): (i32, i32)) -> (f64, f64) {
    (f64::from(x), f64::from(y))
}

fn centroid(window: &[(i32, i32)]) -> (f64, f64) {
    let len = window.len() as f64;
    let (sx, sy) = window.iter().fold((0.0, 0.0), |(sx, sy), &(x, y)| {
        (sx + f64::from(x), sy + f64::from(y))
    });
    (sx / len, sy / len)
}

/// Collects points for one armed gesture.
#[derive(Debug)]
pub struct GestureClassifier {
    config: GestureConfig,
    points: Vec<(i32, i32)>,
    modifiers: Modifiers,
    armed: bool,
}

impl GestureClassifier {
    pub fn new(config: GestureConfig) -> Self {
        Self {
            config,
            points: Vec::new(),
            modifiers: Modifiers::empty(),
            armed: false,
        }
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    pub fn modifiers(&self) -> Modifiers {
        self.modifiers
    }

    pub fn arm(&mut self, start: (i32, i32), modifiers: Modifiers) {
        self.points.clear();
        self.points.push(start);
        self.modifiers = modifiers;
        self.armed = true;
        debug!(?start, ?modifiers, "Gesture armed");
    }

    /// Modifiers pressed after arming join the mask, so the key prefix names
    /// every modifier held during the stroke rather than only those down at
    /// `arm` time. Ctrl then Shift and Shift then Ctrl give the same key.
    pub fn add_modifiers(&mut self, modifiers: Modifiers) {
        if self.armed {
            self.modifiers |= modifiers;
        }
    }

    pub fn feed(&mut self, point: (i32, i32)) {
        if self.armed {
            self.points.push(point);
        }
    }

    /// Finish the gesture. Returns `None` if nothing was armed.
    pub fn disarm(&mut self) -> Option<GestureKey> {
        if !self.armed {
            return None;
        }
        self.armed = false;
        let key = classify(&self.points, self.modifiers, &self.config);
        debug!(points = self.points.len(), %key, "Gesture classified");
        self.points.clear();
        Some(key)
    }

    /// Drop the gesture in progress without classifying it.
    pub fn cancel(&mut self) {
        if self.armed {
            debug!(points = self.points.len(), "Gesture cancelled");
        }
        self.armed = false;
        self.points.clear();
    }
}
