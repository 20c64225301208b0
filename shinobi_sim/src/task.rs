// Task pool: creation, refill, throttling, and expiration.
//
// A recurring generator timer refills the shared pool. Each firing builds a
// batch sized from the real time since the previous firing (see
// `balance::batch_size`), gives every new task its own expiration timer, and
// queues one reducer that adds as many of them as the pool has room for.
// Room is computed inside the reducer from the latest state, so the cap
// (`task_pool_base + task_pool_per_unit * units`) holds even when units were
// dismissed between firing and applying.
//
// Expiration timers are never cancelled. When one fires for a task that has
// since been claimed (or never made it into a full pool), the reducer finds
// the task gone and returns the state unchanged. Timers are not saved, so
// an engine built from a loaded state reschedules expiry for every pooled
// task from its `created_at` (see `expires_at`).
//
// See also: `behavior.rs` for how units claim tasks, `balance.rs` for the
// point curve.

use crate::balance;
use crate::config::GameConfig;
use crate::engine::Effects;
use crate::error::SimResult;
use crate::event::TimerKind;
use crate::prng::GameRng;
use crate::state::{GameState, Task};
use crate::types::TaskId;
use log::{debug, info};
use std::sync::Arc;

/// Task levels and their relative generation weights.
pub const TASK_LEVEL_WEIGHTS: [(u32, u32); 4] = [(0, 10), (1, 5), (2, 2), (3, 1)];

pub fn task_name(level: u32) -> &'static str {
    match level {
        0 => "Help out around the village",
        1 => "Calm village troublemaker",
        2 => "Dangerous animal outside the village",
        3 => "Scouting mission",
        _ => "Unnamed task",
    }
}

pub fn make_task(rng: &mut GameRng, now_ms: u64) -> Task {
    let level = rng.pick_weighted(&TASK_LEVEL_WEIGHTS).unwrap_or(0);
    Task {
        id: TaskId::new(rng),
        name: task_name(level).to_string(),
        level,
        points: balance::task_points(level, rng),
        created_at: now_ms,
    }
}

/// Engine time at which an unclaimed `task` leaves the pool.
pub fn expires_at(task: &Task, config: &GameConfig) -> u64 {
    task.created_at.saturating_add(config.task_lifetime_ms)
}

/// Most tasks the pool may hold with `unit_count` units recruited.
pub fn pool_capacity(config: &GameConfig, unit_count: usize) -> usize {
    config.task_pool_base + config.task_pool_per_unit * unit_count
}

/// Generator timer handler.
pub fn on_generation(fx: &mut Effects<'_>, elapsed_ms: u64) {
    let config = fx.config();
    let count = balance::batch_size(
        elapsed_ms,
        config.task_generation_interval_ms,
        config.task_lifetime_ms,
    );
    let now = fx.now_ms();
    let batch: Vec<Task> = (0..count).map(|_| make_task(fx.rng(), now)).collect();
    for task in &batch {
        fx.schedule_in(
            config.task_lifetime_ms,
            TimerKind::TaskExpire { task_id: task.id },
        );
    }
    debug!("task generator fired after {elapsed_ms}ms, batch of {count}");
    fx.dispatch(move |state, ctx| add_tasks(state, batch, ctx.config));
}

/// Add as many of `batch` as fit under the pool cap.
pub fn add_tasks(
    state: &Arc<GameState>,
    batch: Vec<Task>,
    config: &GameConfig,
) -> SimResult<Arc<GameState>> {
    let room = pool_capacity(config, state.units.len()).saturating_sub(state.tasks.len());
    if room == 0 || batch.is_empty() {
        return Ok(Arc::clone(state));
    }
    let fitting: Vec<Task> = batch.into_iter().take(room).collect();
    info!("{} new task(s) posted", fitting.len());
    let mut next = (**state).clone();
    next.tasks = Arc::new(state.tasks.add_many(fitting)?);
    Ok(Arc::new(next))
}

/// Remove `task_id` if it is still in the pool.
pub fn expire_task(state: &Arc<GameState>, task_id: TaskId) -> SimResult<Arc<GameState>> {
    if !state.tasks.contains(task_id) {
        return Ok(Arc::clone(state));
    }
    debug!("task {task_id} expired unclaimed");
    let mut next = (**state).clone();
    next.tasks = Arc::new(state.tasks.remove(task_id)?);
    Ok(Arc::new(next))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(rng: &mut GameRng) -> Arc<GameState> {
        Arc::new(GameState::initial(&GameConfig::default(), rng, 0).unwrap())
    }

    #[test]
    fn names_follow_level() {
        assert_eq!(task_name(0), "Help out around the village");
        assert_eq!(task_name(3), "Scouting mission");
        assert_eq!(task_name(7), "Unnamed task");
        let mut rng = GameRng::new(1);
        for _ in 0..200 {
            let task = make_task(&mut rng, 0);
            assert!(task.level <= 3);
            assert_eq!(task.name, task_name(task.level));
        }
    }

    #[test]
    fn low_levels_dominate() {
        let mut rng = GameRng::new(2);
        let tasks: Vec<Task> = (0..1800).map(|_| make_task(&mut rng, 0)).collect();
        let level0 = tasks.iter().filter(|t| t.level == 0).count();
        let level3 = tasks.iter().filter(|t| t.level == 3).count();
        assert!(level0 > 800, "level 0 count {level0}");
        assert!(level3 < 200, "level 3 count {level3}");
    }

    #[test]
    fn add_respects_pool_cap() {
        let mut rng = GameRng::new(3);
        let config = GameConfig::default();
        let start = state(&mut rng);
        let batch: Vec<Task> = (0..10).map(|_| make_task(&mut rng, 0)).collect();
        let next = add_tasks(&start, batch, &config).unwrap();
        assert_eq!(next.tasks.len(), pool_capacity(&config, 0));

        // A full pool hands back the same snapshot.
        let more: Vec<Task> = (0..2).map(|_| make_task(&mut rng, 0)).collect();
        let same = add_tasks(&next, more, &config).unwrap();
        assert!(Arc::ptr_eq(&same, &next));
    }

    #[test]
    fn expiry_counts_from_creation() {
        let mut rng = GameRng::new(5);
        let config = GameConfig::default();
        let task = make_task(&mut rng, 12_000);
        assert_eq!(task.created_at, 12_000);
        assert_eq!(expires_at(&task, &config), 12_000 + config.task_lifetime_ms);

        let mut ancient = task.clone();
        ancient.created_at = u64::MAX - 1;
        assert_eq!(expires_at(&ancient, &config), u64::MAX);
    }

    #[test]
    fn expire_is_a_no_op_for_claimed_tasks() {
        let mut rng = GameRng::new(4);
        let config = GameConfig::default();
        let task = make_task(&mut rng, 0);
        let id = task.id;
        let with_task = add_tasks(&state(&mut rng), vec![task], &config).unwrap();

        let expired = expire_task(&with_task, id).unwrap();
        assert!(!expired.tasks.contains(id));
        let again = expire_task(&expired, id).unwrap();
        assert!(Arc::ptr_eq(&again, &expired));
    }
}
