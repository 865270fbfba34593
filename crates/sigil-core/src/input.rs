//! Raw input as delivered by a global hook, and the hook seam itself.

use crate::MouseButton;
use crossbeam_channel::Receiver;
use std::any::Any;
use thiserror::Error;

/// One raw hook callback.
#[derive(Debug, Clone, PartialEq)]
pub struct RawInput {
    /// Seconds on the hook's monotonic clock. Only differences are meaningful.
    pub timestamp: f64,
    pub kind: RawInputKind,
}

impl RawInput {
    pub fn new(timestamp: f64, kind: RawInputKind) -> Self {
        Self { timestamp, kind }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RawInputKind {
    MouseMove { x: i32, y: i32 },
    MouseDown { x: i32, y: i32, button: MouseButton },
    MouseUp { x: i32, y: i32, button: MouseButton },
    Wheel { x: i32, y: i32, delta: i32 },
    KeyDown { key: String },
    KeyUp { key: String },
}

#[derive(Debug, Error)]
pub enum HookError {
    #[error("hook registration failed: {0}")]
    Registration(String),
}

/// A live hook registration. Dropping it unregisters the hook.
pub struct HookStream {
    events: Receiver<RawInput>,
    _registration: Box<dyn Any + Send>,
}

impl HookStream {
    /// `registration` is kept alive for as long as the stream and dropped with it.
    pub fn new<G: Any + Send>(events: Receiver<RawInput>, registration: G) -> Self {
        Self {
            events,
            _registration: Box::new(registration),
        }
    }

    pub fn events(&self) -> &Receiver<RawInput> {
        &self.events
    }
}

/// Source of global keyboard and mouse callbacks.
pub trait InputHook: Send + Sync {
    fn install(&self) -> Result<HookStream, HookError>;
}
