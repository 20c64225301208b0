// Save and config files.
//
// Saves are written to a sibling temp file and renamed over the target, so
// a crash mid-write leaves the previous save intact. A missing save file is
// a first run, not an error. Decoding (and the fall back to a fresh game on
// a bad save) is `shinobi_sim::persist`'s job.

use crate::error::DriverError;
use log::{debug, info};
use shinobi_sim::config::GameConfig;
use shinobi_sim::persist;
use shinobi_sim::state::GameState;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

pub fn save_to_path(path: &Path, state: &GameState) -> Result<(), DriverError> {
    let json = persist::to_json(state)?;
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir)?;
    }
    let tmp = temp_path(path);
    fs::write(&tmp, json)?;
    fs::rename(&tmp, path)?;
    debug!("saved game to {}", path.display());
    Ok(())
}

/// The save file's contents, or `None` when there is no save yet.
pub fn load_from_path(path: &Path) -> Result<Option<String>, DriverError> {
    match fs::read_to_string(path) {
        Ok(json) => {
            info!("loading save from {}", path.display());
            Ok(Some(json))
        }
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err.into()),
    }
}

/// Read a `GameConfig` from JSON; fields the file omits keep their defaults.
pub fn load_config(path: &Path) -> Result<GameConfig, DriverError> {
    let json = fs::read_to_string(path)?;
    Ok(GameConfig::from_json(&json)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use shinobi_sim::prng::GameRng;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("shinobi-save-{name}-{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn save_then_load() {
        let dir = scratch_dir("roundtrip");
        let path = dir.join("nested").join("save.json");
        assert!(load_from_path(&path).unwrap().is_none());

        let config = GameConfig::default();
        let mut state = GameState::initial(&config, &mut GameRng::new(1), 0).unwrap();
        state.points = 42;
        save_to_path(&path, &state).unwrap();
        assert!(!temp_path(&path).exists());

        let json = load_from_path(&path).unwrap().unwrap();
        let loaded =
            persist::load_or_default(Some(&json), &config, &mut GameRng::new(2), 0).unwrap();
        assert_eq!(loaded, state);
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn partial_config_file() {
        let dir = scratch_dir("config");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.json");
        fs::write(&path, r#"{"tick_interval_ms": 250, "max_trainees": 2}"#).unwrap();
        let config = load_config(&path).unwrap();
        assert_eq!(config.tick_interval_ms, 250);
        assert_eq!(config.max_trainees, 2);
        assert_eq!(config.idle_timeout_ms, GameConfig::default().idle_timeout_ms);
        assert!(load_config(&dir.join("missing.json")).is_err());
        let _ = fs::remove_dir_all(&dir);
    }
}
