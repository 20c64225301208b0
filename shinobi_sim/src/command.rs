// Player commands.
//
// `Command` is the only way a player (or the driver's stdin reader) mutates
// the game. `Engine::apply` runs `apply` as a reducer through the store, so
// the command sees the latest state and either produces a new snapshot or
// fails with `SimError::Rejected`, leaving the state untouched. Commands
// serialize as JSON objects tagged by `"command"`, e.g.
// `{"command":"join_village","unit_id":"..","village_id":".."}`.
//
// Most variants delegate to `training.rs` or `village.rs`. Exploration,
// dismissal and the UI selection commands live here.

use crate::engine::ReduceCtx;
use crate::error::{SimError, SimResult};
use crate::hex::{Axial, HexId, RouteFinder};
use crate::state::{Activity, ActivePanel, GameState, Mission, Unit, UiState};
use crate::types::{MissionId, TraineeId, UnitId, VillageId};
use crate::{training, village};
use log::info;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    GraduateTrainee {
        trainee_id: TraineeId,
    },
    DismissUnit {
        unit_id: UnitId,
    },
    JoinVillage {
        unit_id: UnitId,
        village_id: VillageId,
    },
    LeaveVillage {
        unit_id: UnitId,
    },
    StartVillageTask {
        unit_id: UnitId,
        village_id: VillageId,
    },
    AssignMission {
        mission_id: MissionId,
        unit_id: UnitId,
    },
    RerollMissions {
        village_id: VillageId,
    },
    PurchaseUpgrade {
        village_id: VillageId,
        upgrade_id: String,
    },
    StartExploration {
        unit_id: UnitId,
        target: HexId,
    },
    SetActivePanel {
        panel: Option<ActivePanel>,
    },
    SelectHex {
        hex: Option<HexId>,
    },
}

/// Apply `command` to `state`.
pub fn apply(
    state: &Arc<GameState>,
    command: &Command,
    ctx: &mut ReduceCtx<'_>,
    routes: &dyn RouteFinder,
) -> SimResult<Arc<GameState>> {
    match command {
        Command::GraduateTrainee { trainee_id } => training::graduate(state, *trainee_id, ctx),
        Command::DismissUnit { unit_id } => dismiss_unit(state, *unit_id),
        Command::JoinVillage {
            unit_id,
            village_id,
        } => village::join_village(state, *unit_id, *village_id),
        Command::LeaveVillage { unit_id } => village::leave_village(state, *unit_id),
        Command::StartVillageTask {
            unit_id,
            village_id,
        } => village::start_village_task(state, *unit_id, *village_id, ctx),
        Command::AssignMission {
            mission_id,
            unit_id,
        } => village::assign_mission(state, *mission_id, *unit_id, ctx),
        Command::RerollMissions { village_id } => village::reroll_missions(state, *village_id, ctx),
        Command::PurchaseUpgrade {
            village_id,
            upgrade_id,
        } => village::purchase_upgrade(state, *village_id, upgrade_id, ctx),
        Command::StartExploration { unit_id, target } => {
            start_exploration(state, *unit_id, *target, ctx, routes)
        }
        Command::SetActivePanel { panel } => Ok(with_ui(state, UiState {
            active_panel: *panel,
            ..state.ui.clone()
        })),
        Command::SelectHex { hex } => Ok(with_ui(state, UiState {
            selected_hex: *hex,
            ..state.ui.clone()
        })),
    }
}

fn with_ui(state: &Arc<GameState>, ui: UiState) -> Arc<GameState> {
    if ui == state.ui {
        return Arc::clone(state);
    }
    let mut next = (**state).clone();
    next.ui = ui;
    Arc::new(next)
}

/// Remove a unit. Missions it held go back to the village's board.
pub fn dismiss_unit(state: &Arc<GameState>, unit_id: UnitId) -> SimResult<Arc<GameState>> {
    let Some(unit) = state.units.try_get(unit_id) else {
        return rejected(format!("no unit {unit_id}"));
    };
    info!("{} was dismissed", unit.name);
    let mut next = (**state).clone();
    next.units = Arc::new(state.units.remove(unit_id)?);
    let held: Vec<MissionId> = state
        .missions
        .list()
        .filter(|m| m.assigned == Some(unit_id))
        .map(|m| m.id)
        .collect();
    let mut missions = (*state.missions).clone();
    for mission_id in &held {
        missions = missions.update(*mission_id, |m| Mission {
            assigned: None,
            ..m.clone()
        })?;
    }
    if !held.is_empty() {
        next.missions = Arc::new(missions);
    }
    Ok(Arc::new(next))
}

fn rejected<T>(reason: String) -> SimResult<T> {
    Err(SimError::Rejected(reason))
}

/// Send a free unit from the home hex to explore `target`.
pub fn start_exploration(
    state: &Arc<GameState>,
    unit_id: UnitId,
    target: HexId,
    ctx: &mut ReduceCtx<'_>,
    routes: &dyn RouteFinder,
) -> SimResult<Arc<GameState>> {
    let Some(unit) = state.units.try_get(unit_id) else {
        return rejected(format!("no unit {unit_id}"));
    };
    if !unit.is_free() {
        return rejected(format!("{} is busy", unit.name));
    }
    let Some(hex) = state.world.try_get(target) else {
        return rejected(format!("{target} is off the map"));
    };
    if hex.explored {
        return rejected(format!("{target} is already explored"));
    }
    let world = &state.world;
    let route = routes.route(Axial::ORIGIN, target, &|h| world.contains(h));
    if route.is_empty() {
        return rejected(format!("no route to {target}"));
    }
    let hops = route.len().saturating_sub(1) as u64;
    let ticks_required = (hops * ctx.config.exploration_ticks_per_hex).max(1);
    info!("{} sets out for {target}, {hops} hex(es) away", unit.name);

    let activity = Activity::Exploration {
        target,
        route,
        since: ctx.now_ms,
        ticks: 0,
        ticks_required,
    };
    let mut next = (**state).clone();
    next.units = Arc::new(state.units.update(unit_id, |u| Unit {
        activity: Some(activity),
        ..u.clone()
    })?);
    Ok(Arc::new(next))
}
