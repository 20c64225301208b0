// Tick scheduler reducer.
//
// The engine fires a recurring `Tick` timer and queues `step` with the real
// time elapsed since the previous tick. One step:
//
// 1. Advances every unit activity by one tick, or completes it if its
//    progress already reached the requirement. Completion is therefore seen
//    one tick after the last increment; it pays exactly once and is never
//    pro-rated for the extra tick.
// 2. Pays ambient production for each village with affiliated units. The
//    rate is per second of elapsed time, so a late tick pays for the whole
//    gap. Fractions accumulate in the village's `ambient_carry` and only
//    whole points are paid out.
// 3. Increments `game_time` and stamps `clock_ms` with the engine time.
//
// Collections that the step does not touch keep their `Arc` identity.
//
// See also: `village.rs` and `command.rs` for how activities start,
// `balance.rs` for `ambient_rate`.

use crate::balance;
use crate::engine::ReduceCtx;
use crate::error::SimResult;
use crate::ir::Ir;
use crate::state::{Activity, GameState, Unit, Village, WorldHex};
use crate::types::{UnitId, VillageId};
use log::{debug, info};
use std::sync::Arc;

pub fn step(
    state: &Arc<GameState>,
    elapsed_ms: u64,
    ctx: &mut ReduceCtx<'_>,
) -> SimResult<Arc<GameState>> {
    let mut next = (**state).clone();
    advance_activities(&mut next, ctx)?;
    pay_ambient(&mut next, elapsed_ms, ctx)?;
    next.game_time += 1;
    next.clock_ms = next.clock_ms.max(ctx.now_ms);
    Ok(Arc::new(next))
}

fn advance_activities(next: &mut GameState, ctx: &mut ReduceCtx<'_>) -> SimResult<()> {
    let working: Vec<UnitId> = next
        .units
        .list()
        .filter(|u| u.activity.is_some())
        .map(|u| u.id)
        .collect();
    if working.is_empty() {
        return Ok(());
    }
    let mut units: Ir<Unit> = (*next.units).clone();
    for unit_id in working {
        let unit = units.get(unit_id)?;
        let Some(activity) = &unit.activity else {
            continue;
        };
        let (ticks, required) = activity.progress();
        if ticks < required {
            let mut activity = activity.clone();
            match &mut activity {
                Activity::VillageTask { ticks, .. } | Activity::Exploration { ticks, .. } => {
                    *ticks += 1;
                }
            }
            units = units.update(unit_id, |u| Unit {
                activity: Some(activity),
                ..u.clone()
            })?;
            continue;
        }

        let mut unit = unit.clone();
        let gain = match unit.activity.take() {
            Some(Activity::VillageTask {
                village_id,
                mission_id,
                points,
                ..
            }) => {
                let (low, high) = ctx.config.activity_experience_range;
                let gain = ctx.rng.range_u64_inclusive(low.min(high), low.max(high));
                info!("{} finished village work: +{points} points, +{gain} xp", unit.name);
                next.points += points;
                credit_village(next, village_id, points, gain)?;
                if let Some(mission_id) = mission_id {
                    if next.missions.contains(mission_id) {
                        next.missions = Arc::new(next.missions.remove(mission_id)?);
                    }
                    if let Some(village) = next.villages.try_get(village_id) {
                        let mission_ids = village
                            .mission_ids
                            .iter()
                            .copied()
                            .filter(|id| *id != mission_id)
                            .collect();
                        next.villages = Arc::new(next.villages.update(village_id, |v| Village {
                            mission_ids,
                            ..v.clone()
                        })?);
                    }
                }
                gain
            }
            Some(Activity::Exploration { target, .. }) => {
                info!("{} explored {target}", unit.name);
                if next.world.contains(target) {
                    next.world = Arc::new(next.world.update(target, |h| WorldHex {
                        explored: true,
                        ..h.clone()
                    })?);
                }
                ctx.config.exploration_experience
            }
            None => 0,
        };
        unit.experience += gain;
        units = units.replace(unit)?;
    }
    next.units = Arc::new(units);
    Ok(())
}

fn credit_village(
    next: &mut GameState,
    village_id: VillageId,
    points: u64,
    experience: u64,
) -> SimResult<()> {
    if !next.villages.contains(village_id) {
        return Ok(());
    }
    next.villages = Arc::new(next.villages.update(village_id, |v| Village {
        points_given: v.points_given + points,
        experience_given: v.experience_given + experience,
        ..v.clone()
    })?);
    Ok(())
}

fn pay_ambient(next: &mut GameState, elapsed_ms: u64, ctx: &ReduceCtx<'_>) -> SimResult<()> {
    let config = ctx.config;
    let seconds = elapsed_ms as f64 / 1000.0;
    let village_ids: Vec<VillageId> = next.villages.ids().to_vec();
    let mut units: Option<Ir<Unit>> = None;

    for village_id in village_ids {
        let members: Vec<(UnitId, u32)> = next
            .village_members(village_id)
            .map(|u| (u.id, u.level))
            .collect();
        if members.is_empty() {
            continue;
        }
        let rate: f64 = members
            .iter()
            .map(|&(_, level)| {
                balance::ambient_rate(
                    config.ambient_points_per_second,
                    config.ambient_level_multiplier,
                    level,
                )
            })
            .sum();
        let village = next.villages.get(village_id)?;
        let carry = village.ambient_carry + rate * seconds;
        let paid = carry.floor().max(0.0);
        let xp = config.ambient_experience_per_tick;
        let xp_total = xp * members.len() as u64;
        next.points += paid as u64;
        next.villages = Arc::new(next.villages.update(village_id, |v| Village {
            ambient_carry: carry - paid,
            points_given: v.points_given + paid as u64,
            experience_given: v.experience_given + xp_total,
            ..v.clone()
        })?);

        if xp > 0 {
            let mut current = units.take().unwrap_or_else(|| (*next.units).clone());
            for (unit_id, _) in &members {
                current = current.update(*unit_id, |u| Unit {
                    experience: u.experience + xp,
                    ..u.clone()
                })?;
            }
            units = Some(current);
        }
        debug!(
            "village {village_id}: {} member(s) yielded {paid} point(s), carry {:.3}",
            members.len(),
            carry - paid
        );
    }
    if let Some(units) = units {
        next.units = Arc::new(units);
    }
    Ok(())
}
