// shinobi_sim: reactive game-state engine for the shinobi village idle game.
//
// Everything here is headless and deterministic: a single `GameState`
// snapshot held by a `Store`, a virtual millisecond clock driving recurring
// timers, and reducers that turn one snapshot into the next. The companion
// crate `shinobi_driver` maps wall-clock time onto the engine and owns file
// I/O; nothing in this crate reads the system clock.
//
// Module overview:
// - `engine.rs`:   Engine: timer dispatch, FIFO update channel, effects, commands.
// - `store.rs`:    Store: current snapshot, `update`, projected subscriptions.
// - `state.rs`:    GameState and its entities (units, trainees, villages, ...).
// - `ir.rs`:       Ir: ordered unique-key copy-on-write record container.
// - `map.rs`:      TaggedMap: ordered map with a tagged persisted form.
// - `merge.rs`:    deep_merge over JSON trees (partial updates, save backfill).
// - `behavior.rs`: Per-unit behavior state machines.
// - `tick.rs`:     Per-tick activity progress and ambient production.
// - `task.rs`:     Task creation, batch sizing, pool throttling, expiration.
// - `training.rs`: Trainee pipeline: generation, expiry sweep, graduation.
// - `village.rs`:  Village upgrades, membership, missions, village tasks.
// - `hex.rs`:      Axial hex coordinates, world layout, A* route finding.
// - `balance.rs`:  Success chance, experience, cost and reward formulas.
// - `command.rs`:  Player commands and their reducers.
// - `event.rs`:    TimerQueue (min-heap by `(at_ms, sequence)`).
// - `persist.rs`:  Save codec with default backfill.
// - `config.rs`:   GameConfig: every tunable number.
// - `error.rs`:    Error types.
// - `types.rs`:    Entity IDs and small shared enums.
//
// **Critical constraint: determinism.** All randomness comes from the seeded
// `GameRng` owned by the engine. Iteration over collections always follows
// an explicit order (IR id order or `BTreeMap`), never hash order.

pub mod balance;
pub mod behavior;
pub mod command;
pub mod config;
pub mod engine;
pub mod error;
pub mod event;
pub mod hex;
pub mod ir;
pub mod map;
pub mod merge;
pub mod persist;
pub use shinobi_prng as prng;
pub mod state;
pub mod store;
pub mod task;
pub mod tick;
pub mod training;
pub mod types;
pub mod village;
