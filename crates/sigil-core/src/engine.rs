//! Replay engine: plays an [`EventTimeline`] on a dedicated worker thread.

use crate::config::{CursorRelativePolicy, PlaybackConfig, StopPolicy};
use crate::{CoordMode, Event, EventKind, EventTimeline, KeyPhase, MouseButton, MouseEvent, MousePhase};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Player state, readable from any thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlayerState {
    Idle,
    Playing,
}

const IDLE: u8 = 0;
const PLAYING: u8 = 1;

/// Events emitted by the player.
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerEvent {
    Started { repeat_count: u32 },
    IterationCompleted { iteration: u32 },
    /// An actuation failed; the rest of this pass was skipped.
    IterationAborted { iteration: u32, message: String },
    /// All requested passes ran.
    Completed,
    /// Stopped on request before all passes ran.
    Stopped,
}

/// A single OS-level input action.
#[derive(Debug, Clone, PartialEq)]
pub enum Actuation {
    MoveTo { x: i32, y: i32 },
    Button { button: MouseButton, phase: KeyPhase },
    DoubleClick { button: MouseButton },
    Wheel { delta: i32 },
    Key { key: String, phase: KeyPhase },
}

/// Injects actuations into the OS (implemented by sigil-platform).
pub trait ActionExecutor: Send + Sync {
    fn execute(&self, action: &Actuation) -> Result<(), String>;
}

enum PassOutcome {
    Finished,
    Stopped,
    Aborted(String),
}

struct Shared {
    executor: Arc<dyn ActionExecutor>,
    config: PlaybackConfig,
    state: AtomicU8,
    stop_requested: AtomicBool,
    stop_tx: Sender<()>,
    stop_rx: Receiver<()>,
    event_tx: Sender<PlayerEvent>,
}

impl Shared {
    fn emit(&self, event: PlayerEvent) {
        if let Err(e) = self.event_tx.try_send(event) {
            debug!("Dropped player event: {}", e);
        }
    }

    fn should_stop(&self) -> bool {
        self.stop_requested.load(Ordering::SeqCst)
    }

    /// Sleep for `duration`, waking early on stop only under [`StopPolicy::Interrupt`].
    fn sleep(&self, duration: Duration) {
        match self.config.stop_policy {
            StopPolicy::FinishDelay => thread::sleep(duration),
            StopPolicy::Interrupt => {
                let deadline = Instant::now() + duration;
                while !self.should_stop() {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        break;
                    }
                    match self.stop_rx.recv_timeout(remaining) {
                        Ok(()) | Err(RecvTimeoutError::Timeout) => {}
                        Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
            }
        }
    }
}

/// Clears the playing flag however the worker exits.
struct PlayingGuard(Arc<Shared>);

impl Drop for PlayingGuard {
    fn drop(&mut self) {
        self.0.state.store(IDLE, Ordering::SeqCst);
        debug!("Player worker exited");
    }
}

/// Replays timelines, one at a time.
pub struct Player {
    shared: Arc<Shared>,
    event_rx: Receiver<PlayerEvent>,
    thread: Mutex<Option<JoinHandle<()>>>,
    seed: Option<u64>,
}

impl Player {
    pub fn new(executor: Arc<dyn ActionExecutor>, config: PlaybackConfig) -> Self {
        let (stop_tx, stop_rx) = bounded(1);
        let (event_tx, event_rx) = bounded(256);
        Self {
            shared: Arc::new(Shared {
                executor,
                config,
                state: AtomicU8::new(IDLE),
                stop_requested: AtomicBool::new(false),
                stop_tx,
                stop_rx,
                event_tx,
            }),
            event_rx,
            thread: Mutex::new(None),
            seed: None,
        }
    }

    /// Fix the jitter RNG seed, making jittered replays reproducible.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn state(&self) -> PlayerState {
        match self.shared.state.load(Ordering::SeqCst) {
            PLAYING => PlayerState::Playing,
            _ => PlayerState::Idle,
        }
    }

    pub fn is_playing(&self) -> bool {
        self.state() == PlayerState::Playing
    }

    pub fn events(&self) -> Receiver<PlayerEvent> {
        self.event_rx.clone()
    }

    /// Start playing `timeline` `repeat_count` times (`0` = until stopped).
    ///
    /// `base` anchors monitor-relative (and cursor-relative) positions.
    /// Returns false if a playback is already running.
    pub fn play(&self, timeline: EventTimeline, repeat_count: u32, base_x: i32, base_y: i32) -> bool {
        if self
            .shared
            .state
            .compare_exchange(IDLE, PLAYING, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            warn!("Playback already running, ignoring play request");
            return false;
        }

        let mut slot = self.thread.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(previous) = slot.take() {
            let _ = previous.join();
        }

        self.shared.stop_requested.store(false, Ordering::SeqCst);
        while self.shared.stop_rx.try_recv().is_ok() {}

        let mut events = timeline.into_events();
        events.sort_unstable_by(|a, b| a.time.total_cmp(&b.time));

        let shared = self.shared.clone();
        let rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        info!(events = events.len(), repeat_count, base_x, base_y, "Playback starting");
        *slot = Some(thread::spawn(move || {
            let _guard = PlayingGuard(shared.clone());
            let mut worker = Worker {
                shared: &shared,
                base: (base_x, base_y),
                rng,
            };
            worker.run(&events, repeat_count);
        }));
        true
    }

    /// Request a cooperative stop. Returns false when nothing is playing.
    pub fn stop(&self) -> bool {
        if !self.is_playing() {
            return false;
        }
        self.shared.stop_requested.store(true, Ordering::SeqCst);
        let _ = self.shared.stop_tx.try_send(());
        info!("Playback stop requested");
        true
    }

    /// Block until the current playback finishes or `timeout` elapses.
    /// Returns true if the player is idle.
    pub fn wait(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while self.is_playing() {
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(Duration::from_millis(5));
        }
        true
    }
}

impl Drop for Player {
    fn drop(&mut self) {
        self.stop();
        let slot = self.thread.get_mut().unwrap_or_else(|e| e.into_inner());
        if let Some(handle) = slot.take() {
            let _ = handle.join();
        }
    }
}

struct Worker<'a> {
    shared: &'a Shared,
    base: (i32, i32),
    rng: StdRng,
}

impl Worker<'_> {
    fn run(&mut self, events: &[Event], repeat_count: u32) {
        self.shared.emit(PlayerEvent::Started { repeat_count });

        let mut completed = 0u32;
        while (repeat_count == 0 || completed < repeat_count) && !self.shared.should_stop() {
            let iteration = completed + 1;
            match self.run_pass(events) {
                PassOutcome::Finished => {
                    self.shared.emit(PlayerEvent::IterationCompleted { iteration });
                }
                PassOutcome::Stopped => break,
                PassOutcome::Aborted(message) => {
                    self.shared
                        .emit(PlayerEvent::IterationAborted { iteration, message });
                }
            }
            completed = iteration;

            let more = repeat_count == 0 || completed < repeat_count;
            if more && !self.shared.should_stop() {
                self.shared.sleep(self.shared.config.settle());
            }
        }

        if self.shared.should_stop() {
            info!(completed, "Playback stopped");
            self.shared.emit(PlayerEvent::Stopped);
        } else {
            info!(completed, "Playback completed");
            self.shared.emit(PlayerEvent::Completed);
        }
    }

    fn run_pass(&mut self, events: &[Event]) -> PassOutcome {
        // Last replayed position, for chained cursor-relative reconstruction.
        let mut cursor: Option<(i32, i32)> = None;

        for (index, event) in events.iter().enumerate() {
            if self.shared.should_stop() {
                return PassOutcome::Stopped;
            }

            let result = match &event.kind {
                EventKind::Delay {
                    seconds,
                    random_range,
                } => {
                    let secs = jittered_delay(*seconds, *random_range, &mut self.rng);
                    debug!(index, secs, "Delay");
                    match Duration::try_from_secs_f64(secs) {
                        Ok(duration) => {
                            self.shared.sleep(duration);
                            Ok(())
                        }
                        Err(e) => Err(format!("unusable delay of {secs}s: {e}")),
                    }
                }
                EventKind::Keyboard { key, phase } => self.execute(&Actuation::Key {
                    key: key.clone(),
                    phase: *phase,
                }),
                EventKind::Mouse(mouse) => self.play_mouse(mouse, &mut cursor),
            };

            if let Err(message) = result {
                error!(index, error = %message, "Actuation failed, aborting this pass");
                return PassOutcome::Aborted(message);
            }
        }

        PassOutcome::Finished
    }

    fn play_mouse(&mut self, mouse: &MouseEvent, cursor: &mut Option<(i32, i32)>) -> Result<(), String> {
        let resolved = resolve_target(mouse, self.base, *cursor, self.shared.config.cursor_relative);
        *cursor = Some(resolved);

        let (x, y) = match mouse.random_range {
            Some(range) if !mouse.is_wheel() => jitter_point(resolved, range, &mut self.rng),
            _ => resolved,
        };

        self.execute(&Actuation::MoveTo { x, y })?;
        let button = mouse.button.unwrap_or(MouseButton::Left);
        match mouse.phase {
            MousePhase::Move => Ok(()),
            MousePhase::Down => self.execute(&Actuation::Button {
                button,
                phase: KeyPhase::Down,
            }),
            MousePhase::Up => self.execute(&Actuation::Button {
                button,
                phase: KeyPhase::Up,
            }),
            MousePhase::Double => self.execute(&Actuation::DoubleClick { button }),
            MousePhase::Wheel => match mouse.wheel_delta {
                Some(delta) if delta != 0 => self.execute(&Actuation::Wheel { delta }),
                _ => Ok(()),
            },
        }
    }

    fn execute(&self, action: &Actuation) -> Result<(), String> {
        debug!(?action, "Actuating");
        self.shared.executor.execute(action)
    }
}

/// Screen position a stored mouse event should land on.
pub fn resolve_target(
    mouse: &MouseEvent,
    base: (i32, i32),
    previous: Option<(i32, i32)>,
    policy: CursorRelativePolicy,
) -> (i32, i32) {
    let (px, py) = mouse.position;
    match mouse.coord_mode {
        CoordMode::Absolute => (px, py),
        CoordMode::MonitorRelative => (base.0 + px, base.1 + py),
        CoordMode::CursorRelative => {
            let origin = match policy {
                CursorRelativePolicy::Anchored => base,
                CursorRelativePolicy::Chained => previous.unwrap_or(base),
            };
            (origin.0 + px, origin.1 + py)
        }
    }
}

/// Uniform draw from `[max(0, base - range), base + range]`.
pub fn jittered_delay<R: Rng>(base: f64, range: Option<f64>, rng: &mut R) -> f64 {
    let base = base.max(0.0);
    match range {
        Some(range) if range > 0.0 => {
            let low = (base - range).max(0.0);
            let high = base + range;
            if high.is_finite() {
                rng.gen_range(low..=high)
            } else {
                high
            }
        }
        _ => base,
    }
}

/// Perturb each axis by an integer drawn from `[-range, range]`.
pub fn jitter_point<R: Rng>((x, y): (i32, i32), range: u32, rng: &mut R) -> (i32, i32) {
    let r = i32::try_from(range).unwrap_or(i32::MAX);
    if r == 0 {
        return (x, y);
    }
    (
        x.saturating_add(rng.gen_range(-r..=r)),
        y.saturating_add(rng.gen_range(-r..=r)),
    )
}
