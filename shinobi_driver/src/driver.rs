// Real-time main loop.
//
// `start_driver` loads (or creates) the game on the caller's thread, then
// spawns the driver thread, which owns the `Engine` for its whole life. The
// engine is single-threaded by construction; everything else talks to it
// through an `mpsc` channel of `DriverEvent`s.
//
// The loop uses `recv_timeout(frame)` as its frame timer: it wakes for each
// event or at least once per frame, and after every wake it advances the
// engine to the wall clock. A wake-up gap longer than
// `suspend_threshold_ms` means the process was suspended (laptop lid, ^Z,
// debugger); the engine then resumes at the new time with every overdue
// timer firing once, instead of replaying every missed tick.
//
// The game is autosaved every `save_interval_ms` and once more on shutdown.
// Saves include the engine's random stream, so restarting with the same
// seed continues the session instead of replaying it.
// An engine halt ends the loop; the last good state is still saved.
//
// See also: `save.rs` for the file format helpers, `shinobi_sim::engine`
// for `advance` vs. `resume_at`.

use crate::error::DriverError;
use crate::save;
use log::{debug, error, info, warn};
use shinobi_sim::command::Command;
use shinobi_sim::config::GameConfig;
use shinobi_sim::engine::Engine;
use shinobi_sim::persist;
use shinobi_sim::prng::GameRng;
use shinobi_sim::state::GameState;
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Events for the driver thread.
#[derive(Debug)]
pub enum DriverEvent {
    Command(Command),
    Shutdown,
}

pub struct DriverConfig {
    pub save_path: PathBuf,
    pub game: GameConfig,
    pub seed: u64,
    /// Longest the loop sleeps between engine advances.
    pub frame_ms: u64,
    pub save_interval_ms: u64,
    /// A gap between frames longer than this is treated as a suspension.
    pub suspend_threshold_ms: u64,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            save_path: PathBuf::from("shinobi_save.json"),
            game: GameConfig::default(),
            seed: 0,
            frame_ms: 100,
            save_interval_ms: 30_000,
            suspend_threshold_ms: 5_000,
        }
    }
}

/// Where the driver left the game.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DriverSummary {
    pub clock_ms: u64,
    pub game_time: u64,
    pub points: u64,
    pub units: usize,
    pub commands_applied: usize,
    pub commands_rejected: usize,
}

/// Handle for a running driver thread.
pub struct DriverHandle {
    events: Sender<DriverEvent>,
    thread: Option<JoinHandle<Result<DriverSummary, DriverError>>>,
}

impl DriverHandle {
    /// A sender for feeding commands from another thread.
    pub fn sender(&self) -> Sender<DriverEvent> {
        self.events.clone()
    }

    /// Queue a command. Returns false if the driver has already stopped.
    pub fn send(&self, command: Command) -> bool {
        self.events.send(DriverEvent::Command(command)).is_ok()
    }

    /// Ask the driver to save and stop, and wait for it.
    pub fn stop(mut self) -> Result<DriverSummary, DriverError> {
        let _ = self.events.send(DriverEvent::Shutdown);
        match self.thread.take() {
            Some(thread) => thread.join().map_err(|_| DriverError::ThreadPanicked)?,
            None => Err(DriverError::ThreadPanicked),
        }
    }
}

/// Load the save named in `config` (or start fresh) and run the driver on
/// a background thread.
pub fn start_driver(config: DriverConfig) -> Result<DriverHandle, DriverError> {
    let json = save::load_from_path(&config.save_path)?;
    let mut rng = GameRng::new(config.seed);
    let state = persist::load_or_default(json.as_deref(), &config.game, &mut rng, 0)?;
    // Keep the engine's stream apart from the draws used to build defaults.
    // A save carries its own stream, which takes precedence.
    let seed = rng.next_u64();
    info!(
        "starting at game time {} with {} unit(s) and {} point(s)",
        state.game_time,
        state.units.len(),
        state.points
    );

    let (events, rx) = mpsc::channel();
    let thread = thread::spawn(move || run_driver(config, state, seed, rx));
    Ok(DriverHandle {
        events,
        thread: Some(thread),
    })
}

fn run_driver(
    config: DriverConfig,
    state: GameState,
    seed: u64,
    rx: Receiver<DriverEvent>,
) -> Result<DriverSummary, DriverError> {
    let start_ms = state.clock_ms;
    let mut engine = Engine::from_state(config.game.clone(), state, seed, start_ms);
    engine.store_mut().subscribe(
        |s: &GameState| s.points,
        |points: &u64| debug!("points now {points}"),
    );

    let frame = Duration::from_millis(config.frame_ms.max(1));
    let save_interval = Duration::from_millis(config.save_interval_ms);
    let suspend_threshold = Duration::from_millis(config.suspend_threshold_ms);
    let started = Instant::now();
    let mut last_frame = started;
    let mut last_save = started;
    let mut summary = DriverSummary {
        clock_ms: start_ms,
        game_time: 0,
        points: 0,
        units: 0,
        commands_applied: 0,
        commands_rejected: 0,
    };

    loop {
        match rx.recv_timeout(frame) {
            Ok(DriverEvent::Command(command)) => match engine.apply(command) {
                Ok(()) => summary.commands_applied += 1,
                Err(err) => {
                    warn!("{err}");
                    summary.commands_rejected += 1;
                }
            },
            Ok(DriverEvent::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {}
        }

        let now = Instant::now();
        let gap = now.duration_since(last_frame);
        last_frame = now;
        let target = start_ms + now.duration_since(started).as_millis() as u64;
        let stepped = if gap > suspend_threshold {
            info!("woke up after {}ms, catching up", gap.as_millis());
            engine.resume_at(target)
        } else {
            engine.advance(target)
        };
        if let Err(err) = stepped {
            error!("stopping driver: {err}");
            break;
        }

        if now.duration_since(last_save) >= save_interval {
            if let Err(err) = save::save_to_path(&config.save_path, &engine.save_state()) {
                warn!("autosave failed: {err}");
            }
            last_save = now;
        }
    }

    let state = engine.save_state();
    save::save_to_path(&config.save_path, &state)?;
    info!("saved to {} at game time {}", config.save_path.display(), state.game_time);
    summary.clock_ms = engine.now_ms();
    summary.game_time = state.game_time;
    summary.points = state.points;
    summary.units = state.units.len();
    match engine.halt_reason() {
        Some(reason) => Err(shinobi_sim::error::EngineError::Halted {
            reason: reason.to_string(),
        }
        .into()),
        None => Ok(summary),
    }
}
