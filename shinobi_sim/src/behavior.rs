// Per-unit behavior state machines.
//
// Every unit in the published state gets a `UnitMachine`. The engine shows
// each new snapshot to `Behaviors::on_state`, which creates machines for new
// units, drops machines for removed ones, and notices behavior changes.
// Machines never write the state themselves; they schedule timers and queue
// reducers through `Effects`.
//
// Cycle: Idle -> Available -> AssignedTask -> Idle (success) or Injured
// (failure) -> Idle. Idle, Injured and AssignedTask end on a timeout.
// Available ends when the unit claims a task from the shared pool.
//
// ## Epochs
//
// Entering a phase bumps the machine's epoch and the phase's timeout timer
// carries it. Timers are never cancelled, so a timer from an earlier phase
// (or for a unit that no longer exists) arrives with a stale epoch and is
// dropped.
//
// ## Claiming
//
// An Available machine looks at the pool whenever the `tasks` collection
// changes identity or the unit's busy flag flips. If the pool is non-empty
// it picks a task uniformly at random from that snapshot and queues
// `claim_task`. Several machines may pick the same task from the same
// snapshot; the claim reducer re-checks the latest state, so only the first
// one applied takes it and the others become no-ops. A losing unit stays
// Available and tries again on the next pool change, which the winner's
// claim itself causes.
//
// See also: `engine.rs` for the publish/drain loop, `balance.rs` for the
// success and experience curves, `event.rs` for timers.

use crate::balance;
use crate::engine::{Effects, ReduceCtx, tolerate_missing};
use crate::error::{SimError, SimResult};
use crate::event::TimerKind;
use crate::ir::Ir;
use crate::state::{Behavior, BehaviorKind, GameState, MessageKind, Task, Unit};
use crate::types::{TaskId, UnitId};
use log::{debug, info, trace};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Tracking for one unit.
#[derive(Clone, Debug)]
struct UnitMachine {
    kind: BehaviorKind,
    epoch: u64,
    /// Pool snapshot last evaluated while Available.
    observed_pool: Option<Arc<Ir<Task>>>,
    observed_busy: bool,
}

/// All unit machines, keyed by unit id.
#[derive(Debug, Default)]
pub struct Behaviors {
    machines: BTreeMap<UnitId, UnitMachine>,
    next_epoch: u64,
}

impl Behaviors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.machines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.machines.is_empty()
    }

    /// Current epoch of a unit's machine.
    pub fn epoch(&self, unit_id: UnitId) -> Option<u64> {
        self.machines.get(&unit_id).map(|m| m.epoch)
    }

    /// React to a freshly published snapshot.
    pub fn on_state(&mut self, state: &GameState, fx: &mut Effects<'_>) {
        let before = self.machines.len();
        self.machines.retain(|id, _| state.units.contains(*id));
        if self.machines.len() != before {
            debug!("dropped {} machine(s) for removed units", before - self.machines.len());
        }

        for unit in state.units.list() {
            let kind = unit.behavior.kind();
            let entering = match self.machines.get(&unit.id) {
                Some(machine) => machine.kind != kind,
                None => true,
            };
            if entering {
                let epoch = self.next_epoch;
                self.next_epoch += 1;
                self.machines.insert(
                    unit.id,
                    UnitMachine {
                        kind,
                        epoch,
                        observed_pool: None,
                        observed_busy: false,
                    },
                );
                enter(unit, epoch, fx);
            }
            if kind == BehaviorKind::Available {
                if let Some(machine) = self.machines.get_mut(&unit.id) {
                    consider_pool(machine, unit, state, fx);
                }
            }
        }
    }

    /// A behavior timeout fired.
    pub fn on_timeout(&mut self, unit_id: UnitId, epoch: u64, fx: &mut Effects<'_>) {
        let Some(machine) = self.machines.get(&unit_id) else {
            trace!("timeout for vanished unit {unit_id}");
            return;
        };
        if machine.epoch != epoch {
            trace!("stale timeout for {unit_id} (epoch {epoch}, now {})", machine.epoch);
            return;
        }
        match machine.kind {
            BehaviorKind::Idle => {
                fx.dispatch(move |state, ctx| tolerate_missing(state, finish_idle(state, unit_id, ctx)));
            }
            BehaviorKind::Injured => {
                fx.dispatch(move |state, ctx| {
                    tolerate_missing(state, finish_injury(state, unit_id, ctx))
                });
            }
            BehaviorKind::AssignedTask => {
                fx.dispatch(move |state, ctx| {
                    tolerate_missing(state, resolve_task(state, unit_id, ctx))
                });
            }
            BehaviorKind::Available => {}
        }
    }
}

/// Schedule the timeout for the phase a unit just entered. Time already
/// spent in the phase (e.g. before a save) counts against the timeout.
fn enter(unit: &Unit, epoch: u64, fx: &mut Effects<'_>) {
    let config = fx.config();
    let timeout = match unit.behavior {
        Behavior::Idle { .. } => config.idle_timeout_ms,
        Behavior::Injured { .. } => config.injured_timeout_ms,
        Behavior::AssignedTask { .. } => config.assigned_task_timeout_ms,
        Behavior::Available { .. } => {
            trace!("{} is available", unit.name);
            return;
        }
    };
    let spent = fx.now_ms().saturating_sub(unit.behavior.since());
    fx.schedule_in(
        timeout.saturating_sub(spent),
        TimerKind::BehaviorTimeout {
            unit_id: unit.id,
            epoch,
        },
    );
}

fn consider_pool(machine: &mut UnitMachine, unit: &Unit, state: &GameState, fx: &mut Effects<'_>) {
    let busy = unit.activity.is_some();
    let pool_unchanged = machine
        .observed_pool
        .as_ref()
        .is_some_and(|seen| Arc::ptr_eq(seen, &state.tasks));
    if pool_unchanged && machine.observed_busy == busy {
        return;
    }
    machine.observed_pool = Some(Arc::clone(&state.tasks));
    machine.observed_busy = busy;
    if busy {
        return;
    }
    let Some(&task_id) = fx.rng().pick(state.tasks.ids()) else {
        return;
    };
    let unit_id = unit.id;
    trace!("{} goes for task {task_id}", unit.name);
    fx.dispatch(move |state, ctx| tolerate_missing(state, claim_task(state, unit_id, task_id, ctx)));
}

// ---------------------------------------------------------------------------
// Reducers
// ---------------------------------------------------------------------------

fn set_unit(state: &Arc<GameState>, unit: Unit) -> SimResult<Arc<GameState>> {
    let mut next = (**state).clone();
    next.units = Arc::new(state.units.replace(unit)?);
    Ok(Arc::new(next))
}

/// Move the unit onto `task_id` if both are still eligible.
pub fn claim_task(
    state: &Arc<GameState>,
    unit_id: UnitId,
    task_id: TaskId,
    ctx: &mut ReduceCtx<'_>,
) -> SimResult<Arc<GameState>> {
    let (Some(unit), Some(task)) = (state.units.try_get(unit_id), state.tasks.try_get(task_id))
    else {
        return Ok(Arc::clone(state));
    };
    if unit.behavior.kind() != BehaviorKind::Available || unit.activity.is_some() {
        return Ok(Arc::clone(state));
    }
    debug!("{} took on \"{}\" (level {})", unit.name, task.name, task.level);
    let unit = Unit {
        behavior: Behavior::AssignedTask {
            task: task.clone(),
            since: ctx.now_ms,
        },
        ..unit.clone()
    };
    let mut next = (**state).clone();
    next.tasks = Arc::new(state.tasks.remove(task_id)?);
    next.units = Arc::new(state.units.replace(unit)?);
    Ok(Arc::new(next))
}

/// Idle timeout: back to Available.
pub fn finish_idle(
    state: &Arc<GameState>,
    unit_id: UnitId,
    ctx: &mut ReduceCtx<'_>,
) -> SimResult<Arc<GameState>> {
    let unit = state.units.get(unit_id)?;
    if unit.behavior.kind() != BehaviorKind::Idle {
        return Ok(Arc::clone(state));
    }
    let unit = Unit {
        behavior: Behavior::Available { since: ctx.now_ms },
        ..unit.clone()
    };
    set_unit(state, unit)
}

/// Injury timeout: back to Idle.
pub fn finish_injury(
    state: &Arc<GameState>,
    unit_id: UnitId,
    ctx: &mut ReduceCtx<'_>,
) -> SimResult<Arc<GameState>> {
    let unit = state.units.get(unit_id)?;
    if unit.behavior.kind() != BehaviorKind::Injured {
        return Ok(Arc::clone(state));
    }
    let mut unit = unit.clone();
    unit.behavior = Behavior::Idle { since: ctx.now_ms };
    unit.push_message(MessageKind::TurnedIdle, ctx.now_ms);
    set_unit(state, unit)
}

/// Assigned-task timeout: draw the outcome and pay out.
pub fn resolve_task(
    state: &Arc<GameState>,
    unit_id: UnitId,
    ctx: &mut ReduceCtx<'_>,
) -> SimResult<Arc<GameState>> {
    let unit = state.units.get(unit_id)?;
    let Behavior::AssignedTask { task, .. } = &unit.behavior else {
        return Err(SimError::Assertion(format!(
            "resolving a task for {} ({unit_id}) who is {:?}",
            unit.name,
            unit.behavior.kind()
        )));
    };
    let chance = balance::task_success_chance(unit.level, task.level);
    let now = ctx.now_ms;
    let mut next = (**state).clone();
    let mut unit = unit.clone();
    let task = task.clone();

    if ctx.rng.random_bool(chance) {
        let gain = balance::task_experience_gain(unit.level, task.level, ctx.rng);
        info!(
            "{} completed \"{}\": +{} points, +{gain} xp",
            unit.name, task.name, task.points
        );
        next.points += task.points;
        unit.experience += gain;
        unit.push_message(MessageKind::TaskSucceeded, now);
        unit.behavior = Behavior::Idle { since: now };
    } else {
        info!("{} failed \"{}\" and is injured", unit.name, task.name);
        unit.push_message(MessageKind::TaskFailed, now);
        unit.behavior = Behavior::Injured { since: now };
    }
    next.units = Arc::new(state.units.replace(unit)?);
    Ok(Arc::new(next))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GameConfig;
    use crate::event::TimerQueue;
    use crate::prng::GameRng;
    use crate::task::make_task;
    use crate::types::Nature;
    use std::collections::VecDeque;

    fn unit(rng: &mut GameRng, level: u32, behavior: Behavior) -> Unit {
        Unit {
            id: UnitId::new(rng),
            name: "Agni".into(),
            level,
            experience: 0,
            nature: Nature::Fire,
            behavior,
            messages: VecDeque::new(),
            village_id: None,
            activity: None,
        }
    }

    fn state_with(rng: &mut GameRng, units: Vec<Unit>, tasks: Vec<Task>) -> Arc<GameState> {
        let mut state = GameState::initial(&GameConfig::default(), rng, 0).unwrap();
        state.units = Arc::new(Ir::from_items(units).unwrap());
        state.tasks = Arc::new(Ir::from_items(tasks).unwrap());
        Arc::new(state)
    }

    #[test]
    fn claim_removes_task_once() {
        let config = GameConfig::default();
        let mut rng = GameRng::new(1);
        let a = unit(&mut rng, 1, Behavior::Available { since: 0 });
        let b = unit(&mut rng, 1, Behavior::Available { since: 0 });
        let task = make_task(&mut rng, 0);
        let (a_id, b_id, task_id) = (a.id, b.id, task.id);
        let state = state_with(&mut rng, vec![a, b], vec![task]);
        let mut ctx = ReduceCtx {
            now_ms: 50,
            config: &config,
            rng: &mut rng,
        };

        let first = claim_task(&state, a_id, task_id, &mut ctx).unwrap();
        assert!(first.tasks.is_empty());
        assert_eq!(first.units.get(a_id).unwrap().behavior.kind(), BehaviorKind::AssignedTask);

        let second = claim_task(&first, b_id, task_id, &mut ctx).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.units.get(b_id).unwrap().behavior.kind(), BehaviorKind::Available);
    }

    #[test]
    fn busy_or_unavailable_units_do_not_claim() {
        let config = GameConfig::default();
        let mut rng = GameRng::new(2);
        let idle = unit(&mut rng, 1, Behavior::Idle { since: 0 });
        let task = make_task(&mut rng, 0);
        let (idle_id, task_id) = (idle.id, task.id);
        let state = state_with(&mut rng, vec![idle], vec![task]);
        let mut ctx = ReduceCtx {
            now_ms: 0,
            config: &config,
            rng: &mut rng,
        };
        let same = claim_task(&state, idle_id, task_id, &mut ctx).unwrap();
        assert!(Arc::ptr_eq(&same, &state));
    }

    #[test]
    fn injury_heals_to_idle_with_message() {
        let config = GameConfig::default();
        let mut rng = GameRng::new(3);
        let hurt = unit(&mut rng, 1, Behavior::Injured { since: 0 });
        let id = hurt.id;
        let state = state_with(&mut rng, vec![hurt], vec![]);
        let mut ctx = ReduceCtx {
            now_ms: 10_000,
            config: &config,
            rng: &mut rng,
        };
        let next = finish_injury(&state, id, &mut ctx).unwrap();
        let healed = next.units.get(id).unwrap();
        assert_eq!(healed.behavior, Behavior::Idle { since: 10_000 });
        assert_eq!(healed.messages.back().unwrap().kind, MessageKind::TurnedIdle);

        let available = finish_idle(&next, id, &mut ctx).unwrap();
        assert_eq!(
            available.units.get(id).unwrap().behavior.kind(),
            BehaviorKind::Available
        );
    }

    #[test]
    fn resolution_pays_or_injures() {
        let config = GameConfig::default();
        let mut rng = GameRng::new(4);
        let mut successes = 0;
        for _ in 0..200 {
            let task = make_task(&mut rng, 0);
            let points = task.points;
            let worker = unit(&mut rng, 1, Behavior::AssignedTask { task, since: 0 });
            let id = worker.id;
            let state = state_with(&mut rng, vec![worker], vec![]);
            let mut ctx = ReduceCtx {
                now_ms: 5_000,
                config: &config,
                rng: &mut rng,
            };
            let next = resolve_task(&state, id, &mut ctx).unwrap();
            let after = next.units.get(id).unwrap();
            match after.behavior {
                Behavior::Idle { since: 5_000 } => {
                    successes += 1;
                    assert_eq!(next.points, state.points + points);
                    assert!(after.experience > 0);
                    assert_eq!(after.messages.back().unwrap().kind, MessageKind::TaskSucceeded);
                }
                Behavior::Injured { since: 5_000 } => {
                    assert_eq!(next.points, state.points);
                    assert_eq!(after.experience, 0);
                    assert_eq!(after.messages.back().unwrap().kind, MessageKind::TaskFailed);
                }
                ref other => panic!("unexpected behavior {other:?}"),
            }
        }
        // Level 1 against levels 0..=3 succeeds well over half the time.
        assert!(successes > 100, "only {successes} successes");
    }

    #[test]
    fn resolving_a_unit_not_on_a_task_is_an_assertion() {
        let config = GameConfig::default();
        let mut rng = GameRng::new(5);
        let idle = unit(&mut rng, 1, Behavior::Idle { since: 0 });
        let id = idle.id;
        let state = state_with(&mut rng, vec![idle], vec![]);
        let mut ctx = ReduceCtx {
            now_ms: 0,
            config: &config,
            rng: &mut rng,
        };
        assert!(matches!(
            resolve_task(&state, id, &mut ctx),
            Err(SimError::Assertion(_))
        ));
        // A unit removed before its timeout fired is a benign race.
        let gone = UnitId::new(ctx.rng);
        let out = tolerate_missing(&state, resolve_task(&state, gone, &mut ctx)).unwrap();
        assert!(Arc::ptr_eq(&out, &state));
    }

    #[test]
    fn machines_follow_units_and_epochs_invalidate_timers() {
        let config = GameConfig::default();
        let mut rng = GameRng::new(6);
        let idle = unit(&mut rng, 1, Behavior::Idle { since: 0 });
        let id = idle.id;
        let state = state_with(&mut rng, vec![idle], vec![]);

        let mut behaviors = Behaviors::new();
        let mut timers = TimerQueue::new();
        let mut pending = VecDeque::new();
        let mut fx = Effects::for_test(0, &config, &mut rng, &mut timers, &mut pending);
        behaviors.on_state(&state, &mut fx);
        assert_eq!(behaviors.len(), 1);
        let first_epoch = behaviors.epoch(id).unwrap();

        // Same behavior kind again: no re-entry.
        behaviors.on_state(&state, &mut fx);
        assert_eq!(behaviors.epoch(id), Some(first_epoch));

        let mut injured = (*state).clone();
        injured.units = Arc::new(
            injured
                .units
                .update(id, |u| Unit {
                    behavior: Behavior::Injured { since: 0 },
                    ..u.clone()
                })
                .unwrap(),
        );
        behaviors.on_state(&injured, &mut fx);
        assert_ne!(behaviors.epoch(id), Some(first_epoch));

        // The idle timer from the earlier epoch is ignored.
        behaviors.on_timeout(id, first_epoch, &mut fx);
        drop(fx);
        assert_eq!(timers.len(), 2);
        assert!(pending.is_empty());

        let mut empty = injured.clone();
        empty.units = Arc::new(Ir::new());
        let mut fx = Effects::for_test(0, &config, &mut rng, &mut timers, &mut pending);
        behaviors.on_state(&empty, &mut fx);
        assert!(behaviors.is_empty());
    }
}
