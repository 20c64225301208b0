// Trainee pipeline: generation, expiry sweep, graduation.
//
// Trainees show up on a recurring timer and wait for the player to pay
// their graduation cost. Batch size follows the same elapsed-time rule as
// the task pool, with the graduation window as the upper bound; a batch is
// back-dated one interval per trainee so a catch-up batch looks like it
// arrived over time. The pipeline is capped at `max_trainees` plus any
// upgrade bonuses.
//
// The generation reducer also runs the expiry sweep: once more than one
// graduation window has passed since the last sweep, trainees older than
// the window leave the pipeline.
//
// Graduation (a player command) spends points and turns the trainee into
// an Available unit.

use crate::balance;
use crate::config::GameConfig;
use crate::engine::{Effects, ReduceCtx};
use crate::error::{SimError, SimResult};
use crate::prng::GameRng;
use crate::state::{Behavior, GameState, TrainingUnit, Unit};
use crate::types::{Jutsu, Nature, TraineeId, UnitId};
use log::{debug, info};
use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;

const FIRE_NAMES: [&str; 11] = [
    "Aarush", "Agni", "Aithne", "Blaze", "Brand", "Brigid", "Calida", "Ember", "Mehri", "Nina",
    "Nomalanga",
];

const WATER_NAMES: [&str; 10] = [
    "Aalto", "Adrian", "Aenon", "Bach", "Barbeau", "Bardo", "Beck", "Calder", "Carlow", "Cary",
];

const FALLBACK_NAME: &str = "John";

pub fn trainee_name(affinity: Nature, rng: &mut GameRng) -> String {
    let pool: &[&str] = match affinity {
        Nature::Fire => &FIRE_NAMES,
        Nature::Water => &WATER_NAMES,
        _ => &[],
    };
    rng.pick(pool).copied().unwrap_or(FALLBACK_NAME).to_string()
}

/// A new trainee of level `base_level` plus up to `level_bonus` extra.
pub fn make_trainee(
    rng: &mut GameRng,
    base_level: u32,
    level_bonus: u32,
    created_at: u64,
) -> TrainingUnit {
    let affinity = *rng.pick(&Nature::ALL).unwrap_or(&Nature::Fire);
    let jutsu = *rng.pick(&Jutsu::ALL).unwrap_or(&Jutsu::Ninjutsu);
    let level = base_level + rng.range_u64_inclusive(0, u64::from(level_bonus)) as u32;
    TrainingUnit {
        id: TraineeId::new(rng),
        name: trainee_name(affinity, rng),
        level,
        created_at,
        affinity,
        jutsu,
    }
}

/// Upgrade ids owned by at least one village.
fn owned_upgrades(state: &GameState) -> BTreeSet<&str> {
    state
        .villages
        .list()
        .flat_map(|v| v.upgrades.keys().map(String::as_str))
        .collect()
}

/// Pipeline capacity after upgrade bonuses.
pub fn trainee_cap(state: &GameState, config: &GameConfig) -> usize {
    let owned = owned_upgrades(state);
    let bonus: u32 = config
        .upgrades
        .iter()
        .filter(|u| owned.contains(u.id.as_str()))
        .map(|u| u.trainee_cap_bonus)
        .sum();
    config.max_trainees + bonus as usize
}

/// Highest trainee level bonus granted by owned upgrades.
pub fn trainee_level_bonus(state: &GameState, config: &GameConfig) -> u32 {
    let owned = owned_upgrades(state);
    config
        .upgrades
        .iter()
        .filter(|u| owned.contains(u.id.as_str()))
        .map(|u| u.trainee_level_bonus)
        .max()
        .unwrap_or(0)
}

/// Generator timer handler.
pub fn on_generation(fx: &mut Effects<'_>, elapsed_ms: u64) {
    let config = fx.config();
    let count = balance::batch_size(
        elapsed_ms,
        config.trainee_generation_interval_ms,
        config.graduation_window_ms,
    );
    debug!("trainee generator fired after {elapsed_ms}ms, batch of {count}");
    fx.dispatch(move |state, ctx| generate_trainees(state, count, ctx));
}

/// Sweep expired trainees, then add up to `count` new ones under the cap.
pub fn generate_trainees(
    state: &Arc<GameState>,
    count: usize,
    ctx: &mut ReduceCtx<'_>,
) -> SimResult<Arc<GameState>> {
    let config = ctx.config;
    let now = ctx.now_ms;
    let mut next = (**state).clone();

    if now.saturating_sub(state.last_training_sweep_at) > config.graduation_window_ms {
        let window = config.graduation_window_ms;
        let expired: Vec<TraineeId> = state
            .units_in_training
            .list()
            .filter(|t| now.saturating_sub(t.created_at) > window)
            .map(|t| t.id)
            .collect();
        if !expired.is_empty() {
            debug!("{} trainee(s) left the pipeline ungraduated", expired.len());
            next.units_in_training = Arc::new(next.units_in_training.remove_many(&expired)?);
        }
        next.last_training_sweep_at = now;
    }

    let room = trainee_cap(&next, config).saturating_sub(next.units_in_training.len());
    let level_bonus = trainee_level_bonus(&next, config);
    let interval = config.trainee_generation_interval_ms;
    let arrivals: Vec<TrainingUnit> = (0..count.min(room))
        .map(|i| {
            let created_at = now.saturating_sub(interval * i as u64);
            make_trainee(ctx.rng, config.base_trainee_level, level_bonus, created_at)
        })
        .collect();
    if !arrivals.is_empty() {
        info!("{} new trainee(s) arrived", arrivals.len());
        next.units_in_training = Arc::new(next.units_in_training.add_many(arrivals)?);
    }

    if next == **state {
        return Ok(Arc::clone(state));
    }
    Ok(Arc::new(next))
}

/// Spend the graduation cost and turn the trainee into a unit.
pub fn graduate(
    state: &Arc<GameState>,
    trainee_id: TraineeId,
    ctx: &mut ReduceCtx<'_>,
) -> SimResult<Arc<GameState>> {
    let trainee = state
        .units_in_training
        .try_get(trainee_id)
        .ok_or_else(|| SimError::Rejected(format!("no trainee {trainee_id}")))?;
    let cost = balance::graduation_cost(trainee.level);
    if state.points < cost {
        return Err(SimError::Rejected(format!(
            "graduating {} costs {cost} points, have {}",
            trainee.name, state.points
        )));
    }
    let unit = Unit {
        id: UnitId::new(ctx.rng),
        name: trainee.name.clone(),
        level: trainee.level,
        experience: 0,
        nature: trainee.affinity,
        behavior: Behavior::Available { since: ctx.now_ms },
        messages: VecDeque::new(),
        village_id: None,
        activity: None,
    };
    info!("{} graduated for {cost} points", unit.name);

    let mut next = (**state).clone();
    next.points -= cost;
    next.points_spent += cost;
    next.units_in_training = Arc::new(state.units_in_training.remove(trainee_id)?);
    next.units = Arc::new(state.units.add(unit)?);
    Ok(Arc::new(next))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::TaggedMap;
    use crate::state::Village;
    use crate::types::VillageId;

    fn setup(seed: u64) -> (GameConfig, GameRng, Arc<GameState>) {
        let config = GameConfig::default();
        let mut rng = GameRng::new(seed);
        let state = Arc::new(GameState::initial(&config, &mut rng, 0).unwrap());
        (config, rng, state)
    }

    #[test]
    fn names_come_from_affinity_lists() {
        let mut rng = GameRng::new(1);
        for _ in 0..50 {
            assert!(FIRE_NAMES.contains(&trainee_name(Nature::Fire, &mut rng).as_str()));
            assert!(WATER_NAMES.contains(&trainee_name(Nature::Water, &mut rng).as_str()));
        }
        assert_eq!(trainee_name(Nature::Earth, &mut rng), FALLBACK_NAME);
    }

    #[test]
    fn catch_up_batch_is_back_dated_and_capped() {
        let (config, mut rng, state) = setup(2);
        let mut ctx = ReduceCtx {
            now_ms: 5_000,
            config: &config,
            rng: &mut rng,
        };
        let next = generate_trainees(&state, 3, &mut ctx).unwrap();
        // One starting trainee plus three new ones.
        assert_eq!(next.units_in_training.len(), 4);
        let created: Vec<u64> = next.units_in_training.list().skip(1).map(|t| t.created_at).collect();
        assert_eq!(created, vec![5_000, 0, 0]);

        let mut ctx = ReduceCtx {
            now_ms: 6_000,
            config: &config,
            rng: &mut rng,
        };
        let full = generate_trainees(&next, 10, &mut ctx).unwrap();
        assert_eq!(full.units_in_training.len(), config.max_trainees);
        let mut ctx = ReduceCtx {
            now_ms: 7_000,
            config: &config,
            rng: &mut rng,
        };
        let same = generate_trainees(&full, 1, &mut ctx).unwrap();
        assert!(Arc::ptr_eq(&same, &full));
    }

    #[test]
    fn sweep_drops_trainees_older_than_window() {
        let (config, mut rng, state) = setup(3);
        let old = state.units_in_training.ids()[0];
        let mut ctx = ReduceCtx {
            now_ms: config.graduation_window_ms + 1,
            config: &config,
            rng: &mut rng,
        };
        let next = generate_trainees(&state, 1, &mut ctx).unwrap();
        assert!(!next.units_in_training.contains(old));
        assert_eq!(next.units_in_training.len(), 1);
        assert_eq!(next.last_training_sweep_at, config.graduation_window_ms + 1);
    }

    #[test]
    fn upgrades_raise_cap_and_level() {
        let (config, _, state) = setup(4);
        assert_eq!(trainee_cap(&state, &config), config.max_trainees);
        let mut upgrades = TaggedMap::new();
        upgrades.insert("recruitment".to_string(), 1);
        upgrades.insert("higher-level-recruitment".to_string(), 2);
        let mut rng = GameRng::new(5);
        let village = Village {
            id: VillageId::new(&mut rng),
            nature: Nature::Wind,
            base_difficulty: 1,
            upgrades,
            points_given: 0,
            experience_given: 0,
            population: 10,
            mission_ids: Vec::new(),
            ambient_carry: 0.0,
        };
        let mut next = (*state).clone();
        next.villages = Arc::new(next.villages.add(village).unwrap());
        assert_eq!(trainee_cap(&next, &config), config.max_trainees + 2);
        assert_eq!(trainee_level_bonus(&next, &config), 2);
    }

    #[test]
    fn graduation_spends_points() {
        let (config, mut rng, state) = setup(6);
        let trainee = state.units_in_training.list().next().unwrap().clone();
        let cost = balance::graduation_cost(trainee.level);
        let mut ctx = ReduceCtx {
            now_ms: 100,
            config: &config,
            rng: &mut rng,
        };
        assert!(matches!(
            graduate(&state, trainee.id, &mut ctx),
            Err(SimError::Rejected(_))
        ));

        let mut rich = (*state).clone();
        rich.points = cost + 4;
        let next = graduate(&Arc::new(rich), trainee.id, &mut ctx).unwrap();
        assert_eq!(next.points, 4);
        assert_eq!(next.points_spent, cost);
        assert!(next.units_in_training.is_empty());
        let unit = next.units.list().next().unwrap();
        assert_eq!(unit.name, trainee.name);
        assert_eq!(unit.level, trainee.level);
        assert_eq!(unit.behavior, Behavior::Available { since: 100 });
    }
}
