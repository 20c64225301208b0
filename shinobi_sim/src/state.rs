// The game state snapshot and its entities.
//
// `GameState` is never mutated once published. Reducers clone the struct
// (cheap: every collection sits behind an `Arc`), swap in the collections
// they changed, and wrap the result in a new `Arc`. Untouched collections
// stay pointer-identical to the previous snapshot, which is what projected
// subscriptions and the behavior machines key their change detection on.
//
// Entity overview:
// - `Unit`:         a recruited shinobi with a behavior and an optional activity.
// - `TrainingUnit`: a trainee in the recruitment pipeline.
// - `Task`:         a claimable item in the shared task pool.
// - `Village`:      affiliation target with upgrades and missions.
// - `Mission`:      village-scoped work a specific unit can be assigned.
// - `WorldHex`:     a hex of the explorable world map.
//
// Fields added to records after the first release carry `#[serde(default)]`
// so older saves keep loading. Top-level fields are backfilled by
// `persist.rs` instead.
//
// See also: `ir.rs` for the collection type, `persist.rs` for the save
// codec, `store.rs` for who owns the current snapshot.

use crate::config::GameConfig;
use crate::error::SimResult;
use crate::hex::{self, Axial, HexId};
use crate::ir::{Ir, Keyed};
use crate::map::TaggedMap;
use crate::prng::GameRng;
use crate::types::*;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;

/// Units remember this many recent messages.
pub const MESSAGE_LOG_LEN: usize = 10;

// ---------------------------------------------------------------------------
// Units
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Unit {
    pub id: UnitId,
    pub name: String,
    pub level: u32,
    #[serde(default)]
    pub experience: u64,
    pub nature: Nature,
    pub behavior: Behavior,
    #[serde(default)]
    pub messages: VecDeque<UnitMessage>,
    #[serde(default)]
    pub village_id: Option<VillageId>,
    #[serde(default)]
    pub activity: Option<Activity>,
}

impl Unit {
    /// Append a message, dropping the oldest beyond `MESSAGE_LOG_LEN`.
    pub fn push_message(&mut self, kind: MessageKind, at_ms: u64) {
        self.messages.push_back(UnitMessage { kind, at_ms });
        while self.messages.len() > MESSAGE_LOG_LEN {
            self.messages.pop_front();
        }
    }

    /// Free for new work: no activity, not holding a pool task, and not
    /// recovering from an injury.
    pub fn is_free(&self) -> bool {
        self.activity.is_none()
            && matches!(self.behavior, Behavior::Idle { .. } | Behavior::Available { .. })
    }
}

impl Keyed for Unit {
    type Id = UnitId;
    const KIND: &'static str = "unit";
    fn id(&self) -> UnitId {
        self.id
    }
}

/// Where a unit is in its behavior cycle. `since` is engine time in ms.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Behavior {
    Idle { since: u64 },
    Available { since: u64 },
    AssignedTask { task: Task, since: u64 },
    Injured { since: u64 },
}

/// The variant of a `Behavior`, without payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BehaviorKind {
    Idle,
    Available,
    AssignedTask,
    Injured,
}

impl Behavior {
    pub fn kind(&self) -> BehaviorKind {
        match self {
            Behavior::Idle { .. } => BehaviorKind::Idle,
            Behavior::Available { .. } => BehaviorKind::Available,
            Behavior::AssignedTask { .. } => BehaviorKind::AssignedTask,
            Behavior::Injured { .. } => BehaviorKind::Injured,
        }
    }

    pub fn since(&self) -> u64 {
        match self {
            Behavior::Idle { since }
            | Behavior::Available { since }
            | Behavior::AssignedTask { since, .. }
            | Behavior::Injured { since } => *since,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MessageKind {
    TurnedIdle,
    TaskFailed,
    TaskSucceeded,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitMessage {
    pub kind: MessageKind,
    pub at_ms: u64,
}

/// Long-running work advanced by the tick scheduler.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Activity {
    VillageTask {
        village_id: VillageId,
        #[serde(default)]
        mission_id: Option<MissionId>,
        since: u64,
        ticks: u64,
        ticks_required: u64,
        points: u64,
        difficulty: u32,
    },
    Exploration {
        target: HexId,
        route: Vec<Axial>,
        since: u64,
        ticks: u64,
        ticks_required: u64,
    },
}

impl Activity {
    /// `(ticks, ticks_required)`.
    pub fn progress(&self) -> (u64, u64) {
        match self {
            Activity::VillageTask {
                ticks,
                ticks_required,
                ..
            }
            | Activity::Exploration {
                ticks,
                ticks_required,
                ..
            } => (*ticks, *ticks_required),
        }
    }
}

// ---------------------------------------------------------------------------
// Pool and pipeline
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub name: String,
    pub level: u32,
    pub points: u64,
    /// Engine time (ms) the task was generated; its expiry counts from here.
    #[serde(default)]
    pub created_at: u64,
}

impl Keyed for Task {
    type Id = TaskId;
    const KIND: &'static str = "task";
    fn id(&self) -> TaskId {
        self.id
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrainingUnit {
    pub id: TraineeId,
    pub name: String,
    pub level: u32,
    pub created_at: u64,
    pub affinity: Nature,
    pub jutsu: Jutsu,
}

impl Keyed for TrainingUnit {
    type Id = TraineeId;
    const KIND: &'static str = "trainee";
    fn id(&self) -> TraineeId {
        self.id
    }
}

// ---------------------------------------------------------------------------
// Villages, missions, world
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Village {
    pub id: VillageId,
    pub nature: Nature,
    pub base_difficulty: u32,
    /// Owned upgrade id -> game time of purchase.
    #[serde(default)]
    pub upgrades: TaggedMap<String, u64>,
    #[serde(default)]
    pub points_given: u64,
    #[serde(default)]
    pub experience_given: u64,
    pub population: u32,
    #[serde(default)]
    pub mission_ids: Vec<MissionId>,
    /// Fractional ambient points not yet paid out.
    #[serde(default)]
    pub ambient_carry: f64,
}

impl Keyed for Village {
    type Id = VillageId;
    const KIND: &'static str = "village";
    fn id(&self) -> VillageId {
        self.id
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Rarity {
    Common,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Mission {
    pub id: MissionId,
    pub rarity: Rarity,
    pub village_id: VillageId,
    pub difficulty: u32,
    #[serde(default)]
    pub assigned: Option<UnitId>,
}

impl Keyed for Mission {
    type Id = MissionId;
    const KIND: &'static str = "mission";
    fn id(&self) -> MissionId {
        self.id
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HexKind {
    Village,
    Forest,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorldHex {
    pub id: HexId,
    pub kind: HexKind,
    pub explored: bool,
}

impl Keyed for WorldHex {
    type Id = HexId;
    const KIND: &'static str = "hex";
    fn id(&self) -> HexId {
        self.id
    }
}

// ---------------------------------------------------------------------------
// UI selection
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActivePanel {
    Units,
    Training,
    Tasks,
    Village,
    World,
}

/// View selection. Persisted, but no simulation logic reads it.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct UiState {
    pub active_panel: Option<ActivePanel>,
    pub selected_hex: Option<HexId>,
}

// ---------------------------------------------------------------------------
// GameState
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GameState {
    pub points: u64,
    pub points_spent: u64,
    pub game_time: u64,
    /// Engine time (ms) of the most recent tick; a resumed game restarts
    /// its clock here.
    pub clock_ms: u64,
    pub units: Arc<Ir<Unit>>,
    pub units_in_training: Arc<Ir<TrainingUnit>>,
    pub tasks: Arc<Ir<Task>>,
    pub villages: Arc<Ir<Village>>,
    pub missions: Arc<Ir<Mission>>,
    pub world: Arc<Ir<WorldHex>>,
    pub last_training_sweep_at: u64,
    pub ui: UiState,
    /// The engine's random stream as of the save. Only `Engine::save_state`
    /// fills this in; live snapshots carry `None`.
    #[serde(default)]
    pub rng: Option<GameRng>,
}

impl GameState {
    /// A fresh game: one village at the world origin, one trainee, and an
    /// unexplored forest around the village.
    pub fn initial(config: &GameConfig, rng: &mut GameRng, now_ms: u64) -> SimResult<Self> {
        let village = Village {
            id: VillageId::new(rng),
            nature: *rng.pick(&Nature::ALL).unwrap_or(&Nature::Fire),
            base_difficulty: config.village_base_difficulty,
            upgrades: TaggedMap::new(),
            points_given: 0,
            experience_given: 0,
            population: config.village_population,
            mission_ids: Vec::new(),
            ambient_carry: 0.0,
        };
        let trainee = crate::training::make_trainee(rng, config.base_trainee_level, 0, now_ms);
        let world = hex::spiral(Axial::ORIGIN, config.world_radius)
            .into_iter()
            .map(|id| {
                let home = id == Axial::ORIGIN;
                WorldHex {
                    id,
                    kind: if home { HexKind::Village } else { HexKind::Forest },
                    explored: home,
                }
            });

        Ok(Self {
            points: config.starting_points,
            points_spent: 0,
            game_time: 0,
            clock_ms: now_ms,
            units: Arc::new(Ir::new()),
            units_in_training: Arc::new(Ir::from_items([trainee])?),
            tasks: Arc::new(Ir::new()),
            villages: Arc::new(Ir::from_items([village])?),
            missions: Arc::new(Ir::new()),
            world: Arc::new(Ir::from_items(world)?),
            last_training_sweep_at: now_ms,
            ui: UiState::default(),
            rng: None,
        })
    }

    /// The home village (first in the collection), if any.
    pub fn home_village(&self) -> Option<&Village> {
        self.villages.list().next()
    }

    /// Units currently affiliated with `village_id`.
    pub fn village_members(&self, village_id: VillageId) -> impl Iterator<Item = &Unit> + '_ {
        self.units
            .list()
            .filter(move |u| u.village_id == Some(village_id))
    }
}
