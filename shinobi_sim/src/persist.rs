// Save codec.
//
// A save is the `GameState` as a JSON tree keyed by top-level field name.
// Collections keep their tagged forms (`{"@type":"IR",..}` for `Ir`,
// `{"@type":"Map",..}` for `TaggedMap`); everything else is plain serde.
//
// Loading is lenient about age. The saved tree is deep-merged onto the tree
// of a freshly built default state before typed decoding, so top-level
// fields added since the save was written (or saved as `null`) come from
// the default. Tagged nodes merge atomically: a saved collection replaces
// the default one wholesale. Fields added inside records are covered by
// `#[serde(default)]` on the record types.
//
// Loading is strict about shape: a non-object root, a tag this codec does
// not know, or a collection whose index and records disagree fails with
// `DeserializationError`. `load_or_default` turns any such failure into a
// logged warning and a fresh game.
//
// This module never touches the filesystem; the driver owns save files.

use crate::config::GameConfig;
use crate::error::{DeserializationError, SimResult};
use crate::ir::IR_TAG;
use crate::map::MAP_TAG;
use crate::merge::{TAG_KEY, deep_merge};
use crate::prng::GameRng;
use crate::state::GameState;
use log::{info, warn};
use serde_json::Value;

pub fn serialize(state: &GameState) -> Result<Value, serde_json::Error> {
    serde_json::to_value(state)
}

pub fn to_json(state: &GameState) -> Result<String, serde_json::Error> {
    serde_json::to_string(state)
}

/// Reject tags other than the two collection forms, anywhere in the tree.
fn validate_tags(value: &Value) -> Result<(), DeserializationError> {
    match value {
        Value::Object(map) => {
            if let Some(tag) = map.get(TAG_KEY) {
                match tag.as_str() {
                    Some(IR_TAG) | Some(MAP_TAG) => {}
                    _ => return Err(DeserializationError::UnknownTag(tag.to_string())),
                }
            }
            map.values().try_for_each(validate_tags)
        }
        Value::Array(items) => items.iter().try_for_each(validate_tags),
        _ => Ok(()),
    }
}

/// Decode a save tree, filling anything it lacks from `defaults`.
pub fn deserialize(value: Value, defaults: &GameState) -> Result<GameState, DeserializationError> {
    let Value::Object(mut saved) = value else {
        return Err(DeserializationError::NotAnObject);
    };
    saved.retain(|_, v| !v.is_null());
    let saved = Value::Object(saved);
    validate_tags(&saved)?;
    let base = serde_json::to_value(defaults)?;
    Ok(serde_json::from_value(deep_merge(base, saved))?)
}

pub fn from_json(json: &str, defaults: &GameState) -> Result<GameState, DeserializationError> {
    deserialize(serde_json::from_str(json)?, defaults)
}

/// Decode `json` if there is any, otherwise (or on failure) start fresh.
pub fn load_or_default(
    json: Option<&str>,
    config: &GameConfig,
    rng: &mut GameRng,
    now_ms: u64,
) -> SimResult<GameState> {
    let defaults = GameState::initial(config, rng, now_ms)?;
    let Some(json) = json.filter(|j| !j.trim().is_empty()) else {
        info!("no save found, starting a new game");
        return Ok(defaults);
    };
    match serde_json::from_str::<Value>(json) {
        Ok(Value::Null) => {
            info!("empty save, starting a new game");
            Ok(defaults)
        }
        Ok(value) => match deserialize(value, &defaults) {
            Ok(state) => Ok(state),
            Err(err) => {
                warn!("could not load save, starting a new game: {err}");
                Ok(defaults)
            }
        },
        Err(err) => {
            warn!("save is not valid JSON, starting a new game: {err}");
            Ok(defaults)
        }
    }
}
