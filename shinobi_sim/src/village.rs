// Villages: upgrades, membership, missions, and village tasks.
//
// Units affiliate with a village to earn ambient points for it (see
// `tick.rs`) and to take on village work. Village work is an `Activity`
// the tick scheduler advances; it either comes from one of the village's
// missions or is started ad hoc at the configured mission difficulty.
// Rewards and durations scale with `balance::activity_rate`.
//
// Missions are rolled in pairs. Rerolling replaces every unassigned mission
// and keeps the ones a unit is already working on; a mission retires when
// its activity completes.
//
// Upgrades come from the config catalog. A purchase needs the points, must
// not repeat an owned upgrade, and requires every prerequisite to be owned
// by the same village.
//
// All functions here are reducers for player commands: illegal requests
// come back as `SimError::Rejected` with the state untouched.

use crate::balance;
use crate::config::{GameConfig, UpgradeSpec};
use crate::engine::ReduceCtx;
use crate::error::{SimError, SimResult};
use crate::prng::GameRng;
use crate::state::{Activity, GameState, Mission, Rarity, Unit, Village};
use crate::types::{MissionId, UnitId, VillageId};
use log::info;
use std::sync::Arc;

fn rejected<T>(reason: String) -> SimResult<T> {
    Err(SimError::Rejected(reason))
}

fn find_village(state: &GameState, village_id: VillageId) -> SimResult<&Village> {
    state
        .villages
        .try_get(village_id)
        .ok_or_else(|| SimError::Rejected(format!("no village {village_id}")))
}

fn find_unit(state: &GameState, unit_id: UnitId) -> SimResult<&Unit> {
    state
        .units
        .try_get(unit_id)
        .ok_or_else(|| SimError::Rejected(format!("no unit {unit_id}")))
}

// ---------------------------------------------------------------------------
// Upgrades
// ---------------------------------------------------------------------------

/// Why `spec` cannot be bought for `village` right now, if it can't.
pub fn purchase_blocker(village: &Village, spec: &UpgradeSpec, points: u64) -> Option<String> {
    if village.upgrades.contains_key(&spec.id) {
        return Some(format!("{} already owned", spec.name));
    }
    if let Some(missing) = spec.requires.iter().find(|r| !village.upgrades.contains_key(*r)) {
        return Some(format!("{} requires {missing}", spec.name));
    }
    if points < spec.cost {
        return Some(format!("{} costs {}, have {points}", spec.name, spec.cost));
    }
    None
}

/// Catalog entries the village could buy with `points`.
pub fn available_upgrades<'a>(
    village: &Village,
    points: u64,
    config: &'a GameConfig,
) -> Vec<&'a UpgradeSpec> {
    config
        .upgrades
        .iter()
        .filter(|spec| purchase_blocker(village, spec, points).is_none())
        .collect()
}

pub fn purchase_upgrade(
    state: &Arc<GameState>,
    village_id: VillageId,
    upgrade_id: &str,
    ctx: &mut ReduceCtx<'_>,
) -> SimResult<Arc<GameState>> {
    let village = find_village(state, village_id)?;
    let Some(spec) = ctx.config.upgrade(upgrade_id) else {
        return rejected(format!("unknown upgrade {upgrade_id:?}"));
    };
    if let Some(reason) = purchase_blocker(village, spec, state.points) {
        return rejected(reason);
    }
    info!("village {village_id} bought {} for {}", spec.name, spec.cost);

    let game_time = state.game_time;
    let id = spec.id.clone();
    let mut next = (**state).clone();
    next.points -= spec.cost;
    next.points_spent += spec.cost;
    next.villages = Arc::new(state.villages.update(village_id, |v| {
        let mut v = v.clone();
        v.upgrades.insert(id, game_time);
        v
    })?);
    Ok(Arc::new(next))
}

// ---------------------------------------------------------------------------
// Membership
// ---------------------------------------------------------------------------

pub fn join_village(
    state: &Arc<GameState>,
    unit_id: UnitId,
    village_id: VillageId,
) -> SimResult<Arc<GameState>> {
    let village = find_village(state, village_id)?;
    let unit = find_unit(state, unit_id)?;
    if unit.village_id == Some(village_id) {
        return Ok(Arc::clone(state));
    }
    if matches!(unit.activity, Some(Activity::VillageTask { .. })) {
        return rejected(format!("{} is busy with village work", unit.name));
    }
    let members = state.village_members(village_id).count();
    if members >= village.population as usize {
        return rejected(format!("village {village_id} is full"));
    }
    let mut next = (**state).clone();
    next.units = Arc::new(state.units.update(unit_id, |u| Unit {
        village_id: Some(village_id),
        ..u.clone()
    })?);
    Ok(Arc::new(next))
}

pub fn leave_village(state: &Arc<GameState>, unit_id: UnitId) -> SimResult<Arc<GameState>> {
    let unit = find_unit(state, unit_id)?;
    if unit.village_id.is_none() {
        return Ok(Arc::clone(state));
    }
    if matches!(unit.activity, Some(Activity::VillageTask { .. })) {
        return rejected(format!("{} is busy with village work", unit.name));
    }
    let mut next = (**state).clone();
    next.units = Arc::new(state.units.update(unit_id, |u| Unit {
        village_id: None,
        ..u.clone()
    })?);
    Ok(Arc::new(next))
}

// ---------------------------------------------------------------------------
// Missions and village tasks
// ---------------------------------------------------------------------------

pub fn make_missions(
    village_id: VillageId,
    count: usize,
    difficulty: u32,
    rng: &mut GameRng,
) -> Vec<Mission> {
    (0..count)
        .map(|_| Mission {
            id: MissionId::new(rng),
            rarity: Rarity::Common,
            village_id,
            difficulty,
            assigned: None,
        })
        .collect()
}

/// Replace the village's unassigned missions with a fresh roll.
pub fn reroll_missions(
    state: &Arc<GameState>,
    village_id: VillageId,
    ctx: &mut ReduceCtx<'_>,
) -> SimResult<Arc<GameState>> {
    let village = find_village(state, village_id)?;
    let live: Vec<MissionId> = village
        .mission_ids
        .iter()
        .copied()
        .filter(|id| state.missions.contains(*id))
        .collect();
    let current = state.missions.subset(&live)?;
    let (kept, dropped): (Vec<&Mission>, Vec<&Mission>) =
        current.list().partition(|m| m.assigned.is_some());
    let kept: Vec<MissionId> = kept.iter().map(|m| m.id).collect();
    let dropped: Vec<MissionId> = dropped.iter().map(|m| m.id).collect();
    let rolled = make_missions(
        village_id,
        ctx.config.missions_per_roll,
        ctx.config.mission_difficulty,
        ctx.rng,
    );
    let mut mission_ids = kept;
    mission_ids.extend(rolled.iter().map(|m| m.id));

    let mut next = (**state).clone();
    next.missions = Arc::new(state.missions.remove_many(&dropped)?.add_many(rolled)?);
    next.villages = Arc::new(state.villages.update(village_id, |v| Village {
        mission_ids,
        ..v.clone()
    })?);
    Ok(Arc::new(next))
}

/// Build a village task activity for a unit of `unit_level`.
pub fn village_task_activity(
    village: &Village,
    difficulty: u32,
    unit_level: u32,
    mission_id: Option<MissionId>,
    now_ms: u64,
    rng: &mut GameRng,
) -> Activity {
    let rate = balance::activity_rate(village.base_difficulty, difficulty, unit_level);
    Activity::VillageTask {
        village_id: village.id,
        mission_id,
        since: now_ms,
        ticks: 0,
        ticks_required: balance::village_task_ticks(rate, rng),
        points: balance::village_task_points(rate, rng),
        difficulty,
    }
}

fn check_can_work(unit: &Unit, village_id: VillageId) -> SimResult<()> {
    if unit.village_id != Some(village_id) {
        return rejected(format!("{} is not a member of village {village_id}", unit.name));
    }
    if !unit.is_free() {
        return rejected(format!("{} is busy", unit.name));
    }
    Ok(())
}

/// Put an affiliated unit to work for its village.
pub fn start_village_task(
    state: &Arc<GameState>,
    unit_id: UnitId,
    village_id: VillageId,
    ctx: &mut ReduceCtx<'_>,
) -> SimResult<Arc<GameState>> {
    let village = find_village(state, village_id)?;
    let unit = find_unit(state, unit_id)?;
    check_can_work(unit, village_id)?;
    let activity = village_task_activity(
        village,
        ctx.config.mission_difficulty,
        unit.level,
        None,
        ctx.now_ms,
        ctx.rng,
    );
    let mut next = (**state).clone();
    next.units = Arc::new(state.units.update(unit_id, |u| Unit {
        activity: Some(activity),
        ..u.clone()
    })?);
    Ok(Arc::new(next))
}

/// Assign a mission to an affiliated unit and start its activity.
pub fn assign_mission(
    state: &Arc<GameState>,
    mission_id: MissionId,
    unit_id: UnitId,
    ctx: &mut ReduceCtx<'_>,
) -> SimResult<Arc<GameState>> {
    let mission = state
        .missions
        .try_get(mission_id)
        .ok_or_else(|| SimError::Rejected(format!("no mission {mission_id}")))?;
    if mission.assigned.is_some() {
        return rejected(format!("mission {mission_id} is already assigned"));
    }
    let village = find_village(state, mission.village_id)?;
    let unit = find_unit(state, unit_id)?;
    check_can_work(unit, village.id)?;
    let activity = village_task_activity(
        village,
        mission.difficulty,
        unit.level,
        Some(mission_id),
        ctx.now_ms,
        ctx.rng,
    );

    let mut next = (**state).clone();
    next.missions = Arc::new(state.missions.update(mission_id, |m| Mission {
        assigned: Some(unit_id),
        ..m.clone()
    })?);
    next.units = Arc::new(state.units.update(unit_id, |u| Unit {
        activity: Some(activity),
        ..u.clone()
    })?);
    Ok(Arc::new(next))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::Behavior;
    use crate::types::Nature;
    use std::collections::VecDeque;

    struct Fixture {
        config: GameConfig,
        rng: GameRng,
        state: Arc<GameState>,
        village: VillageId,
        unit: UnitId,
    }

    fn fixture(seed: u64) -> Fixture {
        let config = GameConfig::default();
        let mut rng = GameRng::new(seed);
        let mut state = GameState::initial(&config, &mut rng, 0).unwrap();
        let unit = Unit {
            id: UnitId::new(&mut rng),
            name: "Brigid".into(),
            level: 1,
            experience: 0,
            nature: Nature::Fire,
            behavior: Behavior::Idle { since: 0 },
            messages: VecDeque::new(),
            village_id: None,
            activity: None,
        };
        let unit_id = unit.id;
        state.units = Arc::new(state.units.add(unit).unwrap());
        let village = state.home_village().unwrap().id;
        Fixture {
            config,
            rng,
            state: Arc::new(state),
            village,
            unit: unit_id,
        }
    }

    fn ctx<'a>(f: &'a mut Fixture) -> (Arc<GameState>, ReduceCtx<'a>) {
        (
            Arc::clone(&f.state),
            ReduceCtx {
                now_ms: 0,
                config: &f.config,
                rng: &mut f.rng,
            },
        )
    }

    #[test]
    fn upgrade_prerequisites_and_cost() {
        let mut f = fixture(1);
        let village = f.village;
        let (state, mut ctx) = ctx(&mut f);
        let mut rich = (*state).clone();
        rich.points = 500;
        let rich = Arc::new(rich);

        let err = purchase_upgrade(&rich, village, "higher-level-recruitment", &mut ctx).unwrap_err();
        assert!(err.to_string().contains("requires recruitment"));

        let bought = purchase_upgrade(&rich, village, "recruitment", &mut ctx).unwrap();
        assert_eq!(bought.points, 490);
        assert_eq!(bought.points_spent, 10);
        assert!(bought.villages.get(village).unwrap().upgrades.contains_key("recruitment"));

        let again = purchase_upgrade(&bought, village, "recruitment", &mut ctx);
        assert!(matches!(again, Err(SimError::Rejected(_))));
        let higher = purchase_upgrade(&bought, village, "higher-level-recruitment", &mut ctx).unwrap();
        assert_eq!(higher.points, 390);

        assert!(purchase_upgrade(&state, village, "recruitment", &mut ctx).is_err());
        assert!(purchase_upgrade(&rich, village, "moat", &mut ctx).is_err());
    }

    #[test]
    fn available_upgrades_follow_points_and_prereqs() {
        let f = fixture(2);
        let village = f.state.villages.get(f.village).unwrap();
        assert!(available_upgrades(village, 5, &f.config).is_empty());
        let ids: Vec<_> = available_upgrades(village, 1_000, &f.config)
            .into_iter()
            .map(|u| u.id.as_str())
            .collect();
        assert_eq!(ids, ["recruitment"]);
    }

    #[test]
    fn membership_respects_population() {
        let mut f = fixture(3);
        let (unit, village) = (f.unit, f.village);
        let mut small = (*f.state).clone();
        small.villages = Arc::new(
            small
                .villages
                .update(village, |v| Village {
                    population: 0,
                    ..v.clone()
                })
                .unwrap(),
        );
        assert!(join_village(&Arc::new(small), unit, village).is_err());

        let (state, _) = ctx(&mut f);
        let joined = join_village(&state, unit, village).unwrap();
        assert_eq!(joined.units.get(unit).unwrap().village_id, Some(village));
        let left = leave_village(&joined, unit).unwrap();
        assert_eq!(left.units.get(unit).unwrap().village_id, None);
    }

    #[test]
    fn reroll_keeps_assigned_missions() {
        let mut f = fixture(4);
        let (unit, village) = (f.unit, f.village);
        let (state, mut ctx) = ctx(&mut f);
        let state = join_village(&state, unit, village).unwrap();
        let rolled = reroll_missions(&state, village, &mut ctx).unwrap();
        let ids = rolled.villages.get(village).unwrap().mission_ids.clone();
        assert_eq!(ids.len(), 2);
        assert_eq!(rolled.missions.len(), 2);

        let assigned = assign_mission(&rolled, ids[0], unit, &mut ctx).unwrap();
        assert_eq!(assigned.missions.get(ids[0]).unwrap().assigned, Some(unit));
        assert!(matches!(
            assigned.units.get(unit).unwrap().activity,
            Some(Activity::VillageTask { mission_id: Some(m), .. }) if m == ids[0]
        ));

        let rerolled = reroll_missions(&assigned, village, &mut ctx).unwrap();
        let new_ids = &rerolled.villages.get(village).unwrap().mission_ids;
        assert_eq!(new_ids.len(), 3);
        assert_eq!(new_ids[0], ids[0]);
        assert!(!rerolled.missions.contains(ids[1]));
        assert_eq!(rerolled.missions.len(), 3);
    }

    #[test]
    fn village_work_needs_membership_and_free_unit() {
        let mut f = fixture(5);
        let (unit, village) = (f.unit, f.village);
        let (state, mut ctx) = ctx(&mut f);
        assert!(start_village_task(&state, unit, village, &mut ctx).is_err());

        let member = join_village(&state, unit, village).unwrap();
        let working = start_village_task(&member, unit, village, &mut ctx).unwrap();
        match &working.units.get(unit).unwrap().activity {
            Some(Activity::VillageTask {
                ticks,
                ticks_required,
                points,
                ..
            }) => {
                assert_eq!(*ticks, 0);
                // Level 1 at base difficulty 1: rate 1.0.
                assert!((13..=17).contains(ticks_required));
                assert!((4..=6).contains(points));
            }
            other => panic!("expected a village task, got {other:?}"),
        }
        assert!(start_village_task(&working, unit, village, &mut ctx).is_err());
        assert!(leave_village(&working, unit).is_err());
    }

    #[test]
    fn injured_unit_cannot_start_village_work() {
        let mut f = fixture(6);
        let (unit, village) = (f.unit, f.village);
        let (state, mut ctx) = ctx(&mut f);
        let member = join_village(&state, unit, village).unwrap();
        let mut hurt = (*member).clone();
        hurt.units = Arc::new(
            member
                .units
                .update(unit, |u| Unit {
                    behavior: Behavior::Injured { since: 0 },
                    ..u.clone()
                })
                .unwrap(),
        );
        let hurt = Arc::new(hurt);
        let err = start_village_task(&hurt, unit, village, &mut ctx).unwrap_err();
        assert!(matches!(err, SimError::Rejected(_)));
    }
}
