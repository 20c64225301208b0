// Data-driven game configuration.
//
// Every tunable number the sim reads lives in `GameConfig`: behavior
// timeouts, generator intervals, pool caps, ambient rates, upgrade catalog.
// Loaded from JSON (the driver's `--config` flag) with struct-level
// `#[serde(default)]`, so a config file only needs the fields it changes.
//
// All durations are milliseconds of engine (virtual) time.
//
// See also: `engine.rs` which owns the config, `village.rs` for how the
// upgrade catalog is applied, `balance.rs` for the formulas that are not
// worth exposing as knobs.

use serde::{Deserialize, Serialize};

/// A purchasable village upgrade.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UpgradeSpec {
    pub id: String,
    pub name: String,
    pub cost: u64,
    /// Upgrade ids that must already be owned by the village.
    #[serde(default)]
    pub requires: Vec<String>,
    /// Extra trainee pipeline slots while any village owns this upgrade.
    #[serde(default)]
    pub trainee_cap_bonus: u32,
    /// Trainees may roll up to this many levels above the base level.
    #[serde(default)]
    pub trainee_level_bonus: u32,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    // -- behavior machine --
    pub idle_timeout_ms: u64,
    pub injured_timeout_ms: u64,
    pub assigned_task_timeout_ms: u64,

    // -- tick scheduler --
    pub tick_interval_ms: u64,
    /// Points per second yielded by one village-affiliated level-0 unit.
    pub ambient_points_per_second: f64,
    /// Per-level multiplier on ambient production.
    pub ambient_level_multiplier: f64,
    pub ambient_experience_per_tick: u64,
    /// Inclusive experience range granted when a village task completes.
    pub activity_experience_range: (u64, u64),

    // -- task pool --
    pub task_generation_interval_ms: u64,
    pub task_lifetime_ms: u64,
    /// Pool cap = `task_pool_base + task_pool_per_unit * units`.
    pub task_pool_base: usize,
    pub task_pool_per_unit: usize,

    // -- trainee pipeline --
    pub trainee_generation_interval_ms: u64,
    /// Trainees older than this are swept from the pipeline.
    pub graduation_window_ms: u64,
    pub max_trainees: usize,
    pub base_trainee_level: u32,

    // -- villages --
    pub starting_points: u64,
    pub village_population: u32,
    pub village_base_difficulty: u32,
    pub missions_per_roll: usize,
    pub mission_difficulty: u32,
    pub upgrades: Vec<UpgradeSpec>,

    // -- world --
    pub world_radius: u32,
    pub exploration_ticks_per_hex: u64,
    pub exploration_experience: u64,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            idle_timeout_ms: 3_000,
            injured_timeout_ms: 10_000,
            assigned_task_timeout_ms: 5_000,

            tick_interval_ms: 1_000,
            ambient_points_per_second: 1.0,
            ambient_level_multiplier: 1.25,
            ambient_experience_per_tick: 1,
            activity_experience_range: (1, 5),

            task_generation_interval_ms: 5_000,
            task_lifetime_ms: 30_000,
            task_pool_base: 3,
            task_pool_per_unit: 2,

            trainee_generation_interval_ms: 10_000,
            graduation_window_ms: 60_000,
            max_trainees: 5,
            base_trainee_level: 1,

            starting_points: 0,
            village_population: 10,
            village_base_difficulty: 1,
            missions_per_roll: 2,
            mission_difficulty: 1,
            upgrades: vec![
                UpgradeSpec {
                    id: "recruitment".into(),
                    name: "Recruitment".into(),
                    cost: 10,
                    requires: Vec::new(),
                    trainee_cap_bonus: 2,
                    trainee_level_bonus: 0,
                },
                UpgradeSpec {
                    id: "higher-level-recruitment".into(),
                    name: "Higher Level Recruitment".into(),
                    cost: 100,
                    requires: vec!["recruitment".into()],
                    trainee_cap_bonus: 0,
                    trainee_level_bonus: 2,
                },
            ],

            world_radius: 2,
            exploration_ticks_per_hex: 10,
            exploration_experience: 10,
        }
    }
}

impl GameConfig {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn upgrade(&self, id: &str) -> Option<&UpgradeSpec> {
        self.upgrades.iter().find(|u| u.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_round_trips() {
        let config = GameConfig::default();
        let restored = GameConfig::from_json(&config.to_json().unwrap()).unwrap();
        assert_eq!(restored.idle_timeout_ms, 3_000);
        assert_eq!(restored.activity_experience_range, (1, 5));
        assert_eq!(restored.upgrades, config.upgrades);
    }

    #[test]
    fn partial_config_keeps_defaults() {
        let config = GameConfig::from_json(r#"{"tick_interval_ms": 250}"#).unwrap();
        assert_eq!(config.tick_interval_ms, 250);
        assert_eq!(config.task_lifetime_ms, 30_000);
        assert_eq!(config.upgrades.len(), 2);
    }

    #[test]
    fn upgrade_catalog_lookup() {
        let config = GameConfig::default();
        let higher = config.upgrade("higher-level-recruitment").unwrap();
        assert_eq!(higher.cost, 100);
        assert_eq!(higher.requires, vec!["recruitment".to_string()]);
        assert!(config.upgrade("moat").is_none());
    }
}
