//! Gesture orchestration: arms the classifier on modifier presses, confines
//! the stroke to one monitor, and plays (or hands back) the resulting key.

use crate::config::GestureConfig;
use crate::engine::Player;
use crate::geometry::{Desktop, Monitor};
use crate::gesture::{GestureClassifier, GestureKey, Modifiers};
use crate::input::{HookError, InputHook, RawInput, RawInputKind};
use crate::storage::MacroStore;
use crate::EventTimeline;
use crossbeam_channel::{select, Receiver};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What a finished gesture is used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GestureMode {
    /// Look the key up and replay the macro.
    #[default]
    Play,
    /// Hand the key to the listener so a new macro can be recorded for it.
    RecordMapping,
}

/// Repeat configuration read when a gesture triggers playback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RepeatSettings {
    pub repeat_count: u32,
    pub infinite: bool,
}

impl Default for RepeatSettings {
    fn default() -> Self {
        Self {
            repeat_count: 1,
            infinite: false,
        }
    }
}

impl RepeatSettings {
    /// Count as understood by [`Player::play`] (`0` = until stopped).
    pub fn count(&self) -> u32 {
        if self.infinite {
            0
        } else {
            self.repeat_count.max(1)
        }
    }
}

/// Presentation callbacks. Every method has a no-op default.
pub trait GestureListener: Send + Sync {
    fn gesture_list_changed(&self) {}

    fn macro_record_requested(&self, _key: &GestureKey) {}

    /// Absolute screen point of the stroke being drawn.
    fn overlay_point(&self, _x: i32, _y: i32) {}

    fn overlay_cleared(&self) {}

    fn repeat_settings(&self) -> RepeatSettings {
        RepeatSettings::default()
    }
}

pub struct NoopListener;

impl GestureListener for NoopListener {}

/// Result of one armed gesture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GestureOutcome {
    Cancelled,
    Unmapped(GestureKey),
    Played(GestureKey),
    /// Mapped, but the player was busy.
    PlayRejected(GestureKey),
    RecordRequested(GestureKey),
}

struct ArmedSession {
    start_monitor: Option<Monitor>,
    anchor: (i32, i32),
}

pub struct GestureOrchestrator {
    config: GestureConfig,
    classifier: GestureClassifier,
    desktop: Arc<dyn Desktop>,
    store: Arc<dyn MacroStore>,
    player: Arc<Player>,
    listener: Arc<dyn GestureListener>,
    mode: GestureMode,
    held: HashSet<String>,
    session: Option<ArmedSession>,
    armed: Arc<AtomicBool>,
    last_cursor: Option<(i32, i32)>,
}

impl GestureOrchestrator {
    pub fn new(
        config: GestureConfig,
        desktop: Arc<dyn Desktop>,
        store: Arc<dyn MacroStore>,
        player: Arc<Player>,
        listener: Arc<dyn GestureListener>,
    ) -> Self {
        Self {
            classifier: GestureClassifier::new(config.clone()),
            config,
            desktop,
            store,
            player,
            listener,
            mode: GestureMode::Play,
            held: HashSet::new(),
            session: None,
            armed: Arc::new(AtomicBool::new(false)),
            last_cursor: None,
        }
    }

    pub fn mode(&self) -> GestureMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: GestureMode) {
        if self.mode != mode {
            info!(?mode, "Gesture mode changed");
            self.mode = mode;
        }
    }

    pub fn is_armed(&self) -> bool {
        self.armed.load(Ordering::SeqCst)
    }

    /// Shared flag for callers that gate on an armed gesture from other threads.
    pub fn armed_flag(&self) -> Arc<AtomicBool> {
        self.armed.clone()
    }

    /// Store a recording under `key` and notify the listener.
    pub fn save_mapping(&self, key: &GestureKey, timeline: &EventTimeline) -> bool {
        let saved = self.store.save(key.as_str(), timeline);
        if saved {
            self.listener.gesture_list_changed();
        }
        saved
    }

    pub fn delete_mapping(&self, key: &str) -> bool {
        let deleted = self.store.delete(key);
        if deleted {
            self.listener.gesture_list_changed();
        }
        deleted
    }

    fn modifier_of(&self, key: &str) -> Option<Modifiers> {
        let is = |keys: &Vec<String>| keys.iter().any(|k| k == key);
        if is(&self.config.ctrl_keys) {
            Some(Modifiers::CTRL)
        } else if is(&self.config.shift_keys) {
            Some(Modifiers::SHIFT)
        } else if is(&self.config.alt_keys) {
            Some(Modifiers::ALT)
        } else {
            None
        }
    }

    fn held_mask(&self) -> Modifiers {
        self.held
            .iter()
            .filter_map(|k| self.modifier_of(k))
            .fold(Modifiers::empty(), |acc, m| acc | m)
    }

    /// Feed one raw input. Returns an outcome when a gesture ends.
    pub fn handle(&mut self, input: &RawInput) -> Option<GestureOutcome> {
        match &input.kind {
            RawInputKind::KeyDown { key } => self.on_key_down(key),
            RawInputKind::KeyUp { key } => self.on_key_up(key),
            RawInputKind::MouseMove { x, y } => {
                self.on_move(*x, *y);
                None
            }
            RawInputKind::MouseDown { x, y, .. }
            | RawInputKind::MouseUp { x, y, .. }
            | RawInputKind::Wheel { x, y, .. } => {
                self.last_cursor = Some((*x, *y));
                None
            }
        }
    }

    fn on_key_down(&mut self, key: &str) -> Option<GestureOutcome> {
        if key == self.config.cancel_key && self.session.is_some() {
            return Some(self.cancel());
        }

        let modifier = self.modifier_of(key)?;
        let before = self.held_mask();
        self.held.insert(key.to_string());

        if self.session.is_some() {
            self.classifier.add_modifiers(modifier);
        } else if before.is_empty() {
            self.arm(self.held_mask());
        }
        None
    }

    fn on_key_up(&mut self, key: &str) -> Option<GestureOutcome> {
        self.modifier_of(key)?;
        self.held.remove(key);
        if self.held_mask().is_empty() && self.session.is_some() {
            return Some(self.finish());
        }
        None
    }

    fn on_move(&mut self, x: i32, y: i32) {
        self.last_cursor = Some((x, y));
        let Some(session) = &self.session else {
            return;
        };

        let point = match session.start_monitor {
            Some(monitor) if !monitor.contains(x, y) => return,
            Some(monitor) => monitor.to_relative(x, y),
            None => (x, y),
        };
        self.classifier.feed(point);
        self.listener.overlay_point(x, y);
    }

    fn arm(&mut self, modifiers: Modifiers) {
        if self.player.is_playing() {
            debug!("Playback running, not arming gesture");
            return;
        }

        let anchor = match self.desktop.cursor_position().or(self.last_cursor) {
            Some(pos) => pos,
            None => {
                warn!("Cursor position unknown, gesture not armed");
                return;
            }
        };

        let start_monitor = self.desktop.monitor_at(anchor.0, anchor.1);
        let start = match start_monitor {
            Some(monitor) => monitor.to_relative(anchor.0, anchor.1),
            None => {
                warn!(?anchor, "Cursor outside every monitor, using absolute gesture points");
                anchor
            }
        };

        self.classifier.arm(start, modifiers);
        self.session = Some(ArmedSession {
            start_monitor,
            anchor,
        });
        self.armed.store(true, Ordering::SeqCst);
        self.listener.overlay_point(anchor.0, anchor.1);
        info!(?anchor, prefix = modifiers.prefix(), "Gesture armed");
    }

    fn cancel(&mut self) -> GestureOutcome {
        self.classifier.cancel();
        self.session = None;
        self.armed.store(false, Ordering::SeqCst);
        self.listener.overlay_cleared();
        info!("Gesture cancelled");
        GestureOutcome::Cancelled
    }

    fn finish(&mut self) -> GestureOutcome {
        let session = self.session.take();
        self.armed.store(false, Ordering::SeqCst);
        self.listener.overlay_cleared();

        let (Some(session), Some(key)) = (session, self.classifier.disarm()) else {
            return GestureOutcome::Cancelled;
        };

        match self.mode {
            GestureMode::RecordMapping => {
                info!(%key, "Gesture captured for a new mapping");
                self.listener.macro_record_requested(&key);
                GestureOutcome::RecordRequested(key)
            }
            GestureMode::Play => {
                let Some(timeline) = self.store.load(key.as_str()) else {
                    info!(%key, "No macro mapped to gesture");
                    return GestureOutcome::Unmapped(key);
                };
                let repeat = self.listener.repeat_settings().count();
                let (base_x, base_y) = session.anchor;
                if self.player.play(timeline, repeat, base_x, base_y) {
                    info!(%key, repeat, base_x, base_y, "Gesture triggered playback");
                    GestureOutcome::Played(key)
                } else {
                    GestureOutcome::PlayRejected(key)
                }
            }
        }
    }

    /// Install `hook` and dispatch its input until `shutdown` fires or closes.
    pub fn run(
        &mut self,
        hook: &dyn InputHook,
        shutdown: &Receiver<()>,
        mut on_outcome: impl FnMut(&GestureOutcome),
    ) -> Result<(), HookError> {
        let stream = hook.install()?;
        let events = stream.events().clone();
        info!(mode = ?self.mode, "Gesture listener running");

        loop {
            select! {
                recv(events) -> msg => match msg {
                    Ok(input) => {
                        if let Some(outcome) = self.handle(&input) {
                            on_outcome(&outcome);
                        }
                    }
                    Err(_) => {
                        warn!("Input hook closed");
                        break;
                    }
                },
                recv(shutdown) -> _ => break,
            }
        }

        if self.session.is_some() {
            self.cancel();
        }
        info!("Gesture listener stopped");
        Ok(())
    }
}
