//! Process-wide global input listener.
//!
//! `rdev::listen` blocks its thread forever and cannot be stopped, so one
//! listener thread is started lazily and shared. Each [`RdevHook::install`]
//! adds a subscriber; dropping the returned stream removes it again.

use crate::error::{PlatformError, PlatformResult};
use crossbeam_channel::{bounded, Receiver, Sender};
use rdev::{listen, Event, EventType};
use sigil_core::{HookError, HookStream, InputHook, MouseButton, RawInput, RawInputKind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

/// Per-subscriber queue depth.
const SUBSCRIBER_CAPACITY: usize = 4096;

/// How long `rdev::listen` gets to fail before the listener counts as running.
const STARTUP_PROBE: Duration = Duration::from_millis(150);

static GLOBAL_LISTENER: OnceLock<Arc<GlobalListener>> = OnceLock::new();

struct GlobalListener {
    subscribers: Mutex<Vec<(u64, Sender<RawInput>)>>,
    next_id: AtomicU64,
    /// rdev reports button events without a position.
    last_cursor: Mutex<Option<(i32, i32)>>,
    started: Instant,
    failure: Mutex<Option<String>>,
}

impl GlobalListener {
    fn start() -> Arc<Self> {
        crate::display::ensure_physical_pixels();
        let listener = Arc::new(Self {
            subscribers: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
            last_cursor: Mutex::new(None),
            started: Instant::now(),
            failure: Mutex::new(None),
        });

        let (failed_tx, failed_rx) = bounded::<String>(1);
        let shared = listener.clone();
        thread::spawn(move || {
            info!("Global input listener thread starting");
            let callback_state = shared.clone();
            if let Err(e) = listen(move |event| callback_state.dispatch(event)) {
                let message = format!("{:?}", e);
                error!(error = %message, "Global input listener failed");
                *shared.failure.lock().unwrap_or_else(|p| p.into_inner()) = Some(message.clone());
                let _ = failed_tx.send(message);
            }
            info!("Global input listener thread exiting");
        });

        if let Ok(message) = failed_rx.recv_timeout(STARTUP_PROBE) {
            debug!(error = %message, "Listener failed during startup check");
        }
        listener
    }

    fn check(&self) -> PlatformResult<()> {
        match &*self.failure.lock().unwrap_or_else(|p| p.into_inner()) {
            Some(message) => Err(PlatformError::Listener(message.clone())),
            None => Ok(()),
        }
    }

    fn subscribe(self: &Arc<Self>) -> (Subscription, Receiver<RawInput>) {
        let (tx, rx) = bounded(SUBSCRIBER_CAPACITY);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push((id, tx));
        debug!(id, "Input subscriber added");
        let subscription = Subscription {
            id,
            listener: self.clone(),
        };
        (subscription, rx)
    }

    fn unsubscribe(&self, id: u64) {
        let mut subs = self.subscribers.lock().unwrap_or_else(|p| p.into_inner());
        subs.retain(|(sub_id, _)| *sub_id != id);
        debug!(id, remaining = subs.len(), "Input subscriber removed");
    }

    fn cursor(&self) -> Option<(i32, i32)> {
        *self.last_cursor.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn dispatch(&self, event: Event) {
        let Some(kind) = self.convert(event.event_type) else {
            return;
        };
        let raw = RawInput::new(self.started.elapsed().as_secs_f64(), kind);

        let subs = self.subscribers.lock().unwrap_or_else(|p| p.into_inner());
        for (id, tx) in subs.iter() {
            if tx.try_send(raw.clone()).is_err() {
                debug!(id, "Subscriber queue full, dropping input");
            }
        }
    }

    fn convert(&self, event_type: EventType) -> Option<RawInputKind> {
        match event_type {
            EventType::MouseMove { x, y } => {
                let (x, y) = (x.round() as i32, y.round() as i32);
                *self.last_cursor.lock().unwrap_or_else(|p| p.into_inner()) = Some((x, y));
                Some(RawInputKind::MouseMove { x, y })
            }
            EventType::ButtonPress(button) => {
                let button = map_button(button)?;
                let (x, y) = self.cursor().unwrap_or_default();
                Some(RawInputKind::MouseDown { x, y, button })
            }
            EventType::ButtonRelease(button) => {
                let button = map_button(button)?;
                let (x, y) = self.cursor().unwrap_or_default();
                Some(RawInputKind::MouseUp { x, y, button })
            }
            // Horizontal scrolling is not recorded.
            EventType::Wheel { delta_y, .. } if delta_y != 0 => {
                let (x, y) = self.cursor().unwrap_or_default();
                let delta = i32::try_from(delta_y).unwrap_or(if delta_y > 0 { i32::MAX } else { i32::MIN });
                Some(RawInputKind::Wheel { x, y, delta })
            }
            EventType::Wheel { .. } => None,
            EventType::KeyPress(key) => Some(RawInputKind::KeyDown { key: key_name(key) }),
            EventType::KeyRelease(key) => Some(RawInputKind::KeyUp { key: key_name(key) }),
        }
    }
}

/// Removes its subscriber when dropped.
struct Subscription {
    id: u64,
    listener: Arc<GlobalListener>,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.listener.unsubscribe(self.id);
    }
}

fn global_listener() -> Arc<GlobalListener> {
    GLOBAL_LISTENER.get_or_init(GlobalListener::start).clone()
}

/// Last cursor position seen by the listener, if it is running.
pub fn last_cursor_position() -> Option<(i32, i32)> {
    GLOBAL_LISTENER.get().and_then(|l| l.cursor())
}

fn map_button(button: rdev::Button) -> Option<MouseButton> {
    match button {
        rdev::Button::Left => Some(MouseButton::Left),
        rdev::Button::Right => Some(MouseButton::Right),
        rdev::Button::Middle => Some(MouseButton::Middle),
        rdev::Button::Unknown(code) => {
            debug!(code, "Ignoring unknown mouse button");
            None
        }
    }
}

/// Stable name for an rdev key: letters and digits as themselves, everything
/// else as its rdev variant name (`ControlLeft`, `F9`, `UpArrow`, ...).
pub fn key_name(key: rdev::Key) -> String {
    let name = format!("{:?}", key);
    if let Some(rest) = name.strip_prefix("Key") {
        if rest.len() == 1 {
            return rest.to_lowercase();
        }
    }
    if let Some(rest) = name.strip_prefix("Num") {
        if rest.len() == 1 && rest.chars().all(|c| c.is_ascii_digit()) {
            return rest.to_string();
        }
    }
    name
}

/// [`InputHook`] backed by the shared rdev listener.
#[derive(Debug, Default, Clone, Copy)]
pub struct RdevHook;

impl RdevHook {
    pub fn new() -> Self {
        Self
    }
}

impl InputHook for RdevHook {
    fn install(&self) -> Result<HookStream, HookError> {
        let listener = global_listener();
        listener.check().map_err(|e| HookError::Registration(e.to_string()))?;

        let (subscription, events) = listener.subscribe();
        Ok(HookStream::new(events, subscription))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_names() {
        assert_eq!(key_name(rdev::Key::KeyA), "a");
        assert_eq!(key_name(rdev::Key::Num7), "7");
        assert_eq!(key_name(rdev::Key::ControlLeft), "ControlLeft");
        assert_eq!(key_name(rdev::Key::F10), "F10");
        assert_eq!(key_name(rdev::Key::NumLock), "NumLock");
        assert_eq!(key_name(rdev::Key::Unknown(42)), "Unknown(42)");
    }

    #[test]
    fn test_button_mapping() {
        assert_eq!(map_button(rdev::Button::Right), Some(MouseButton::Right));
        assert_eq!(map_button(rdev::Button::Unknown(4)), None);
    }
}
