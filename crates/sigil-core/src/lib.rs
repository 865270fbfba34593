//! sigil-core: event model, capture/replay engines and gesture recognition.
//!
//! This crate stays platform-agnostic. OS hooks, monitor enumeration and
//! input injection live in `sigil-platform` behind the [`InputHook`],
//! [`Desktop`] and [`ActionExecutor`] traits.

pub mod config;
mod engine;
mod event;
mod geometry;
mod gesture;
mod input;
mod orchestrator;
mod recorder;
mod storage;

pub use config::{
    CaptureConfig, ConfigError, ConfigResult, CursorRelativePolicy, GestureConfig, PlaybackConfig,
    SigilConfig, StopPolicy, StorageConfig,
};
pub use engine::{
    jitter_point, jittered_delay, resolve_target, ActionExecutor, Actuation, Player, PlayerEvent,
    PlayerState,
};
pub use event::{
    CoordMode, Event, EventFormatError, EventKind, EventTimeline, KeyPhase, MouseButton,
    MouseEvent, MousePhase, MAX_DELAY_SECONDS,
};
pub use geometry::{monitor_at, to_absolute, to_relative, Desktop, Monitor};
pub use gesture::{classify, Direction, GestureClassifier, GestureKey, Modifiers};
pub use input::{HookError, HookStream, InputHook, RawInput, RawInputKind};
pub use orchestrator::{
    GestureListener, GestureMode, GestureOrchestrator, GestureOutcome, NoopListener,
    RepeatSettings,
};
pub use recorder::{
    CaptureEngine, CaptureError, CaptureOptions, Recorder, RecorderEvent, RecorderState,
};
pub use storage::{
    key_to_filename, FileMacroStore, MacroStore, StorageError, StorageResult,
};
