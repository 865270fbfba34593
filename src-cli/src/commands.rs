//! Subcommand implementations wiring the engines to the OS.

use anyhow::{bail, Context, Result};
use crossbeam_channel::{bounded, never, select};
use sigil_core::{
    ActionExecutor, CaptureEngine, CaptureOptions, Desktop, EventKind, EventTimeline,
    FileMacroStore, GestureKey, GestureListener, GestureMode, GestureOrchestrator,
    GestureOutcome, InputHook, MacroStore, Player, PlayerEvent, RawInputKind, RecorderEvent,
    RepeatSettings, SigilConfig,
};
use sigil_platform::{list_monitors, EnigoInjector, NoopInjector, RdevHook, SystemDesktop};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct CaptureRequest {
    pub options: CaptureOptions,
    pub wait_for_hotkey: bool,
}

pub enum Edit {
    InsertDelay { index: usize, seconds: f64 },
    SetDelay { index: usize, seconds: f64 },
    DelayJitter { index: usize, range: Option<f64> },
    PositionJitter { index: usize, range: Option<u32> },
    Remove { index: usize },
}

/// Shared collaborators for one invocation.
pub struct App {
    config: &'static SigilConfig,
    hook: Arc<dyn InputHook>,
    desktop: Arc<dyn Desktop>,
    store: Arc<FileMacroStore>,
    dry_run: bool,
}

impl App {
    pub fn new(config: &'static SigilConfig, dry_run: bool) -> Result<Self> {
        Ok(Self {
            config,
            hook: Arc::new(RdevHook::new()),
            desktop: Arc::new(SystemDesktop::new()),
            store: Arc::new(FileMacroStore::open_default(&config.storage)),
            dry_run,
        })
    }

    fn executor(&self) -> Result<Arc<dyn ActionExecutor>> {
        if self.dry_run {
            return Ok(Arc::new(NoopInjector));
        }
        let injector = EnigoInjector::new().context("failed to initialize input injection")?;
        Ok(Arc::new(injector))
    }

    fn player(&self) -> Result<Arc<Player>> {
        Ok(Arc::new(Player::new(self.executor()?, self.config.playback.clone())))
    }

    fn repeat_settings(&self) -> RepeatSettings {
        RepeatSettings {
            repeat_count: self.config.playback.repeat_count,
            infinite: self.config.playback.infinite,
        }
    }

    fn load(&self, key: &str) -> Result<EventTimeline> {
        match self.store.load(key) {
            Some(timeline) => Ok(timeline),
            None => bail!("no macro stored under {key:?}"),
        }
    }
}

/// Block until `wanted` is pressed.
fn wait_for_key(hook: &dyn InputHook, wanted: &str) -> Result<()> {
    let stream = hook.install().context("failed to install input hook")?;
    for input in stream.events().iter() {
        if matches!(&input.kind, RawInputKind::KeyDown { key } if key == wanted) {
            return Ok(());
        }
    }
    bail!("input hook closed while waiting for {wanted}")
}

/// Capture until the stop hotkey. Returns the finalized timeline.
fn capture(app: &App, request: &CaptureRequest) -> Result<EventTimeline> {
    let cfg = &app.config.capture;
    if request.wait_for_hotkey {
        println!("Press {} to start recording", cfg.start_hotkey);
        wait_for_key(app.hook.as_ref(), &cfg.start_hotkey)?;
    }

    let mut engine = CaptureEngine::new(app.hook.clone(), app.desktop.clone(), cfg.clone());
    let events = engine.events();
    if !engine.start(request.options) {
        bail!("could not start capture (input hook unavailable)");
    }
    println!("Recording... press {} to stop", cfg.stop_hotkey);

    for event in events.iter() {
        match event {
            RecorderEvent::HotkeyPressed { key } if key == cfg.stop_hotkey => break,
            RecorderEvent::EventCaptured { event_count } => debug!(event_count, "Captured"),
            other => debug!(?other, "Recorder event"),
        }
    }

    let timeline = engine.stop();
    println!(
        "Captured {} events ({:.2}s of delays)",
        timeline.len(),
        timeline.duration()
    );
    Ok(timeline)
}

pub fn record(app: &App, key: &str, request: CaptureRequest) -> Result<()> {
    let timeline = capture(app, &request)?;
    if !app.store.save(key, &timeline) {
        bail!("failed to save macro {key:?}");
    }
    println!("Saved {key}");
    Ok(())
}

pub fn play(
    app: &App,
    key: &str,
    repeat: Option<u32>,
    infinite: bool,
    at: Option<(i32, i32)>,
) -> Result<()> {
    let timeline = app.load(key)?;
    let repeat = if infinite {
        0
    } else {
        repeat.unwrap_or(app.config.playback.repeat_count)
    };
    let (base_x, base_y) = at
        .or_else(|| app.desktop.cursor_position())
        .unwrap_or_default();

    let player = app.player()?;
    let player_events = player.events();
    let stop_key = app.config.capture.stop_hotkey.clone();
    let cancel_key = app.config.gesture.cancel_key.clone();

    let stream = match app.hook.install() {
        Ok(stream) => Some(stream),
        Err(e) => {
            warn!(error = %e, "Stop hotkey unavailable");
            None
        }
    };
    let keys = stream
        .as_ref()
        .map(|s| s.events().clone())
        .unwrap_or_else(never);

    if !player.play(timeline, repeat, base_x, base_y) {
        bail!("player is busy");
    }
    println!("Playing {key} (press {stop_key} or {cancel_key} to stop)");

    loop {
        select! {
            recv(keys) -> msg => match msg {
                Ok(input) => {
                    if let RawInputKind::KeyDown { key } = &input.kind {
                        if *key == stop_key || *key == cancel_key {
                            player.stop();
                        }
                    }
                }
                Err(_) => break,
            },
            recv(player_events) -> msg => match msg {
                Ok(event) => {
                    if report(event) {
                        return Ok(());
                    }
                }
                Err(_) => return Ok(()),
            },
        }
    }

    warn!("Input hook closed, stop hotkey no longer available");
    for event in player_events.iter() {
        if report(event) {
            break;
        }
    }
    Ok(())
}

/// Print a player event. Returns true once playback is over.
fn report(event: PlayerEvent) -> bool {
    match event {
        PlayerEvent::Completed => {
            println!("Done");
            true
        }
        PlayerEvent::Stopped => {
            println!("Stopped");
            true
        }
        PlayerEvent::IterationAborted { iteration, message } => {
            warn!(iteration, error = %message, "Pass aborted");
            false
        }
        PlayerEvent::IterationCompleted { iteration } => {
            debug!(iteration, "Pass completed");
            false
        }
        PlayerEvent::Started { repeat_count } => {
            debug!(repeat_count, "Playback started");
            false
        }
    }
}

struct CliListener {
    repeat: RepeatSettings,
}

impl GestureListener for CliListener {
    fn gesture_list_changed(&self) {
        info!("Gesture list changed");
    }

    fn macro_record_requested(&self, key: &GestureKey) {
        println!("Gesture {key} captured");
    }

    fn repeat_settings(&self) -> RepeatSettings {
        self.repeat
    }
}

fn orchestrator(app: &App, player: Arc<Player>) -> GestureOrchestrator {
    GestureOrchestrator::new(
        app.config.gesture.clone(),
        app.desktop.clone(),
        app.store.clone(),
        player,
        Arc::new(CliListener {
            repeat: app.repeat_settings(),
        }),
    )
}

pub fn listen(app: &App) -> Result<()> {
    let player = app.player()?;
    let mut orchestrator = orchestrator(app, player.clone());
    let (_shutdown_tx, shutdown_rx) = bounded::<()>(1);
    let stop_key = app.config.capture.stop_hotkey.clone();

    // Stop hotkey for running playbacks, on its own subscription.
    let stop_stream = app.hook.install().context("failed to install input hook")?;
    let stop_player = player.clone();
    std::thread::spawn(move || {
        for input in stop_stream.events().iter() {
            if matches!(&input.kind, RawInputKind::KeyDown { key } if *key == stop_key) {
                stop_player.stop();
            }
        }
    });

    println!(
        "Listening for gestures ({} mapped). Hold Ctrl/Shift/Alt and draw.",
        app.store.list_keys().len()
    );
    orchestrator
        .run(app.hook.as_ref(), &shutdown_rx, |outcome| match outcome {
            GestureOutcome::Played(key) => println!("{key}: playing"),
            GestureOutcome::Unmapped(key) => println!("{key}: no macro"),
            GestureOutcome::PlayRejected(key) => println!("{key}: player busy"),
            GestureOutcome::Cancelled => println!("cancelled"),
            GestureOutcome::RecordRequested(_) => {}
        })
        .context("gesture listener failed")?;
    Ok(())
}

pub fn map(app: &App, request: CaptureRequest) -> Result<()> {
    let player = app.player()?;
    let mut orchestrator = orchestrator(app, player);
    orchestrator.set_mode(GestureMode::RecordMapping);

    let (shutdown_tx, shutdown_rx) = bounded::<()>(1);
    let mut captured: Option<GestureKey> = None;
    println!("Draw the gesture to map (hold Ctrl/Shift/Alt and move the mouse)");
    orchestrator
        .run(app.hook.as_ref(), &shutdown_rx, |outcome| {
            if let GestureOutcome::RecordRequested(key) = outcome {
                captured = Some(key.clone());
                let _ = shutdown_tx.try_send(());
            }
        })
        .context("gesture listener failed")?;

    let Some(key) = captured else {
        bail!("no gesture captured");
    };
    if app.store.load(key.as_str()).is_some() {
        println!("{key} already has a macro; it will be replaced");
    }

    let timeline = capture(app, &request)?;
    if !orchestrator.save_mapping(&key, &timeline) {
        bail!("failed to save macro {key}");
    }
    println!("Mapped {key}");
    Ok(())
}

pub fn list(app: &App) -> Result<()> {
    let mappings = app.store.get_ordered_mappings();
    if mappings.is_empty() {
        println!("No macros stored in {}", app.store.root().display());
        return Ok(());
    }
    for (key, file) in &mappings {
        match app.store.load(key) {
            Some(timeline) => println!(
                "{key:<20} {file:<24} {:>4} events {:>7.2}s",
                timeline.len(),
                timeline.duration()
            ),
            None => println!("{key:<20} {file:<24} unreadable"),
        }
    }
    Ok(())
}

pub fn show(app: &App, key: &str) -> Result<()> {
    let timeline = app.load(key)?;
    for (index, event) in timeline.iter().enumerate() {
        let detail = match &event.kind {
            EventKind::Keyboard { key, phase } => format!("key {key} {phase:?}"),
            EventKind::Mouse(m) => {
                let mut s = format!("mouse {:?} {:?} at {:?} ({:?})", m.phase, m.button, m.position, m.coord_mode);
                if let Some(delta) = m.wheel_delta {
                    s.push_str(&format!(" delta {delta}"));
                }
                if let Some(range) = m.random_range {
                    s.push_str(&format!(" ±{range}px"));
                }
                s
            }
            EventKind::Delay { seconds, random_range } => match random_range {
                Some(range) => format!("delay {seconds:.3}s ±{range:.3}s"),
                None => format!("delay {seconds:.3}s"),
            },
        };
        println!("{index:>4} {:>9.4} {detail}", event.time);
    }
    Ok(())
}

pub fn edit(app: &App, key: &str, edit: Edit) -> Result<()> {
    let mut timeline = app.load(key)?;
    let applied = match edit {
        Edit::InsertDelay { index, seconds } => timeline.insert_delay(index, seconds),
        Edit::SetDelay { index, seconds } => timeline.set_delay(index, seconds),
        Edit::DelayJitter { index, range } => timeline.set_delay_jitter(index, range),
        Edit::PositionJitter { index, range } => timeline.set_position_jitter(index, range),
        Edit::Remove { index } => timeline.remove(index).is_some(),
    };
    if !applied {
        bail!("edit not applicable (index out of range or wrong event type)");
    }
    if !app.store.save(key, &timeline) {
        bail!("failed to save macro {key:?}");
    }
    println!("Updated {key} ({} events)", timeline.len());
    Ok(())
}

pub fn promote(app: &App, key: &str) -> Result<()> {
    if !app.store.get_ordered_mappings().contains_key(key) {
        bail!("no macro stored under {key:?}");
    }
    if !app.store.reorder(&[key.to_string()]) {
        bail!("failed to save gesture order");
    }
    println!("Moved {key} to the front");
    Ok(())
}

pub fn delete(app: &App, key: &str) -> Result<()> {
    if !app.store.delete(key) {
        bail!("no macro stored under {key:?}");
    }
    println!("Deleted {key}");
    Ok(())
}

pub fn monitors() -> Result<()> {
    let monitors = list_monitors().context("failed to enumerate monitors")?;
    for (i, m) in monitors.iter().enumerate() {
        println!(
            "{i}: {}x{} at ({}, {}){}",
            m.width,
            m.height,
            m.x,
            m.y,
            if m.is_primary { " primary" } else { "" }
        );
    }
    Ok(())
}

pub fn show_config(config: &SigilConfig, path: &Path, write: bool) -> Result<()> {
    if write {
        sigil_core::config::save_yaml(path, config)
            .with_context(|| format!("failed to write {}", path.display()))?;
        println!("Wrote {}", path.display());
        return Ok(());
    }
    println!("# {}", path.display());
    print!("{}", serde_yaml::to_string(config)?);
    Ok(())
}
