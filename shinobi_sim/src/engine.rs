// The engine: virtual clock, timers, update channel, and effects.
//
// `Engine` owns the `Store`, the `TimerQueue`, the PRNG, and the per-unit
// behavior machines. It is a discrete-event executor over a millisecond
// clock: `advance(until_ms)` pops due timers in `(at_ms, sequence)` order,
// lets each timer's handler queue reducers, and drains the queue before the
// next timer fires.
//
// ## Update channel
//
// Effects (tick scheduler, generators, behavior machines) never touch the
// state. They push reducers into `pending`, a FIFO; the engine applies them
// one at a time through `Store::update`, so each reducer reads the result of
// the previous one. After every accepted update the fresh snapshot is
// published to the behavior machines, which may queue further reducers;
// those run in the same drain. Decisions taken from a snapshot can go stale
// before their reducer runs, so every reducer re-validates against the
// state it receives.
//
// ## Errors
//
// A reducer error halts the engine: it is logged, the queue is cleared,
// and every later `advance` returns `EngineError::Halted`. Races are not
// errors; reducers that hit a missing id go through `tolerate_missing` and
// become no-ops. Player commands are applied directly (not queued) so the
// caller learns about `SimError::Rejected` synchronously; a rejection leaves
// the engine running.
//
// ## Suspension
//
// `advance` fires each timer at its own scheduled time. `resume_at` models
// a host that was suspended: every overdue timer fires once, late, at the
// resume time. Recurring timers reschedule from the time they actually
// fired, and generators size their batch from the real elapsed time.
//
// ## Saves
//
// Timers and the PRNG live in the engine, not in `GameState`. `save_state`
// stamps the current random stream into the snapshot it returns, and
// `from_state` continues that stream, so a resumed game never replays ids it
// already minted. Expiry timers for pooled tasks are rebuilt from each
// task's `created_at`; overdue ones fire on the first advance.
//
// See also: `event.rs` for the timer queue, `store.rs` for the snapshot
// owner, `behavior.rs` for the machines, `command.rs` for player commands.

use crate::behavior::Behaviors;
use crate::command::{self, Command};
use crate::config::GameConfig;
use crate::error::{EngineError, SimError, SimResult};
use crate::event::{TimerKind, TimerQueue};
use crate::hex::AStarRouteFinder;
use crate::prng::GameRng;
use crate::state::GameState;
use crate::store::Store;
use crate::{task, tick, training};
use log::{debug, error};
use std::collections::VecDeque;
use std::sync::Arc;

/// What a reducer may read besides the state: the clock, the config, and
/// the engine's random stream.
pub struct ReduceCtx<'a> {
    pub now_ms: u64,
    pub config: &'a GameConfig,
    pub rng: &'a mut GameRng,
}

/// A queued state transition.
pub type Reducer = Box<dyn FnOnce(&Arc<GameState>, &mut ReduceCtx<'_>) -> SimResult<Arc<GameState>>>;

/// Handle given to effects: schedule timers and queue reducers.
pub struct Effects<'a> {
    now_ms: u64,
    config: &'a GameConfig,
    rng: &'a mut GameRng,
    timers: &'a mut TimerQueue,
    pending: &'a mut VecDeque<Reducer>,
}

impl<'a> Effects<'a> {
    pub fn now_ms(&self) -> u64 {
        self.now_ms
    }

    pub fn config(&self) -> &'a GameConfig {
        self.config
    }

    pub fn rng(&mut self) -> &mut GameRng {
        &mut *self.rng
    }

    pub fn schedule_in(&mut self, delay_ms: u64, kind: TimerKind) {
        self.timers.schedule(self.now_ms.saturating_add(delay_ms), kind);
    }

    pub fn dispatch<R>(&mut self, reducer: R)
    where
        R: FnOnce(&Arc<GameState>, &mut ReduceCtx<'_>) -> SimResult<Arc<GameState>> + 'static,
    {
        self.pending.push_back(Box::new(reducer));
    }
}

#[cfg(test)]
impl<'a> Effects<'a> {
    pub(crate) fn for_test(
        now_ms: u64,
        config: &'a GameConfig,
        rng: &'a mut GameRng,
        timers: &'a mut TimerQueue,
        pending: &'a mut VecDeque<Reducer>,
    ) -> Self {
        Self {
            now_ms,
            config,
            rng,
            timers,
            pending,
        }
    }
}

/// Turn a `MissingId` from a raced reducer into "no change".
pub fn tolerate_missing(
    state: &Arc<GameState>,
    result: SimResult<Arc<GameState>>,
) -> SimResult<Arc<GameState>> {
    match result {
        Err(err) if err.is_missing_id() => {
            debug!("reducer raced a removal, skipping: {err}");
            Ok(Arc::clone(state))
        }
        other => other,
    }
}

/// Counters from one `advance`/`resume_at` call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StepResult {
    pub timers_fired: usize,
    pub updates_applied: usize,
}

pub struct Engine {
    config: GameConfig,
    store: Store,
    timers: TimerQueue,
    rng: GameRng,
    now_ms: u64,
    behaviors: Behaviors,
    pending: VecDeque<Reducer>,
    routes: AStarRouteFinder,
    last_tick_ms: u64,
    last_task_generation_ms: u64,
    last_training_generation_ms: u64,
    halted: Option<String>,
}

impl Engine {
    /// Start a fresh game.
    pub fn new(config: GameConfig, seed: u64) -> SimResult<Self> {
        let mut rng = GameRng::new(seed);
        let state = GameState::initial(&config, &mut rng, 0)?;
        Ok(Self::with_rng(config, state, rng, 0))
    }

    /// Resume from a loaded state, with the clock starting at `now_ms`.
    /// The random stream saved with the state is continued; `seed` only
    /// applies to states that carry none.
    pub fn from_state(config: GameConfig, mut state: GameState, seed: u64, now_ms: u64) -> Self {
        let rng = state.rng.take().unwrap_or_else(|| GameRng::new(seed));
        Self::with_rng(config, state, rng, now_ms)
    }

    fn with_rng(config: GameConfig, state: GameState, rng: GameRng, now_ms: u64) -> Self {
        let mut timers = TimerQueue::new();
        timers.schedule(now_ms + config.tick_interval_ms, TimerKind::Tick);
        timers.schedule(
            now_ms + config.task_generation_interval_ms,
            TimerKind::TaskGeneration,
        );
        timers.schedule(
            now_ms + config.trainee_generation_interval_ms,
            TimerKind::TrainingGeneration,
        );
        for pooled in state.tasks.list() {
            timers.schedule(
                task::expires_at(pooled, &config).max(now_ms),
                TimerKind::TaskExpire { task_id: pooled.id },
            );
        }
        let mut engine = Self {
            config,
            store: Store::new(state),
            timers,
            rng,
            now_ms,
            behaviors: Behaviors::new(),
            pending: VecDeque::new(),
            routes: AStarRouteFinder,
            last_tick_ms: now_ms,
            last_task_generation_ms: now_ms,
            last_training_generation_ms: now_ms,
            halted: None,
        };
        // Machines for units already in the state start here; anything they
        // queue runs on the first advance.
        engine.publish();
        engine
    }

    pub fn state(&self) -> Arc<GameState> {
        self.store.get()
    }

    /// The current snapshot with the engine's random stream attached, for
    /// writing to a save.
    pub fn save_state(&self) -> GameState {
        let mut state = (*self.store.get()).clone();
        state.rng = Some(self.rng.clone());
        state
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// For subscribing to projections.
    pub fn store_mut(&mut self) -> &mut Store {
        &mut self.store
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    pub fn now_ms(&self) -> u64 {
        self.now_ms
    }

    pub fn pending_timers(&self) -> usize {
        self.timers.len()
    }

    pub fn next_timer_at(&self) -> Option<u64> {
        self.timers.peek_at()
    }

    pub fn machine_count(&self) -> usize {
        self.behaviors.len()
    }

    pub fn halt_reason(&self) -> Option<&str> {
        self.halted.as_deref()
    }

    /// Run the clock forward to `until_ms`, firing each due timer at its
    /// scheduled time.
    pub fn advance(&mut self, until_ms: u64) -> Result<StepResult, EngineError> {
        self.run(until_ms, false)
    }

    /// Wake up at `now_ms` after a suspension: every overdue timer fires
    /// once, at `now_ms`.
    pub fn resume_at(&mut self, now_ms: u64) -> Result<StepResult, EngineError> {
        self.run(now_ms, true)
    }

    fn run(&mut self, until_ms: u64, late: bool) -> Result<StepResult, EngineError> {
        self.ensure_running()?;
        let mut result = StepResult {
            timers_fired: 0,
            updates_applied: self.drain()?,
        };
        if late {
            self.now_ms = self.now_ms.max(until_ms);
        }
        while let Some(timer) = self.timers.pop_due(until_ms) {
            self.now_ms = self.now_ms.max(timer.at_ms);
            self.fire(timer.kind);
            result.timers_fired += 1;
            result.updates_applied += self.drain()?;
        }
        self.now_ms = self.now_ms.max(until_ms);
        Ok(result)
    }

    /// Apply a player command immediately.
    pub fn apply(&mut self, command: Command) -> SimResult<()> {
        if let Some(reason) = &self.halted {
            return Err(SimError::Rejected(format!("engine halted: {reason}")));
        }
        let routes = &self.routes;
        let mut ctx = ReduceCtx {
            now_ms: self.now_ms,
            config: &self.config,
            rng: &mut self.rng,
        };
        match self
            .store
            .update(|state| command::apply(state, &command, &mut ctx, routes))
        {
            Ok(changed) => {
                debug!("applied {command:?}");
                if changed {
                    self.publish();
                }
                self.drain()
                    .map(|_| ())
                    .map_err(|err| SimError::Assertion(err.to_string()))
            }
            Err(err @ SimError::Rejected(_)) => {
                debug!("{err}");
                Err(err)
            }
            Err(err) => {
                self.halt(&err);
                Err(err)
            }
        }
    }

    fn ensure_running(&self) -> Result<(), EngineError> {
        match &self.halted {
            Some(reason) => Err(EngineError::Halted {
                reason: reason.clone(),
            }),
            None => Ok(()),
        }
    }

    fn halt(&mut self, err: &SimError) -> EngineError {
        error!("halting engine at {}ms: {err}", self.now_ms);
        let reason = err.to_string();
        self.halted = Some(reason.clone());
        self.pending.clear();
        EngineError::Halted { reason }
    }

    /// Dispatch one due timer.
    fn fire(&mut self, kind: TimerKind) {
        let now = self.now_ms;
        let mut fx = Effects {
            now_ms: now,
            config: &self.config,
            rng: &mut self.rng,
            timers: &mut self.timers,
            pending: &mut self.pending,
        };
        match kind {
            TimerKind::Tick => {
                let elapsed = now - self.last_tick_ms;
                self.last_tick_ms = now;
                fx.dispatch(move |state, ctx| tick::step(state, elapsed, ctx));
                fx.schedule_in(fx.config().tick_interval_ms, TimerKind::Tick);
            }
            TimerKind::TaskGeneration => {
                let elapsed = now - self.last_task_generation_ms;
                self.last_task_generation_ms = now;
                task::on_generation(&mut fx, elapsed);
                fx.schedule_in(
                    fx.config().task_generation_interval_ms,
                    TimerKind::TaskGeneration,
                );
            }
            TimerKind::TaskExpire { task_id } => {
                fx.dispatch(move |state, _| task::expire_task(state, task_id));
            }
            TimerKind::TrainingGeneration => {
                let elapsed = now - self.last_training_generation_ms;
                self.last_training_generation_ms = now;
                training::on_generation(&mut fx, elapsed);
                fx.schedule_in(
                    fx.config().trainee_generation_interval_ms,
                    TimerKind::TrainingGeneration,
                );
            }
            TimerKind::BehaviorTimeout { unit_id, epoch } => {
                self.behaviors.on_timeout(unit_id, epoch, &mut fx);
            }
        }
    }

    /// Apply queued reducers in FIFO order until the queue is empty.
    fn drain(&mut self) -> Result<usize, EngineError> {
        let mut applied = 0;
        while let Some(reducer) = self.pending.pop_front() {
            let mut ctx = ReduceCtx {
                now_ms: self.now_ms,
                config: &self.config,
                rng: &mut self.rng,
            };
            match self.store.update(|state| reducer(state, &mut ctx)) {
                Ok(true) => {
                    applied += 1;
                    self.publish();
                }
                Ok(false) => {}
                Err(err) => return Err(self.halt(&err)),
            }
        }
        Ok(applied)
    }

    /// Show the current snapshot to the behavior machines.
    fn publish(&mut self) {
        let state = self.store.get();
        let mut fx = Effects {
            now_ms: self.now_ms,
            config: &self.config,
            rng: &mut self.rng,
            timers: &mut self.timers,
            pending: &mut self.pending,
        };
        self.behaviors.on_state(&state, &mut fx);
    }
}
