// Deep merge over JSON trees.
//
// Used for partial record updates (`Ir::patch`) and for backfilling an
// older save onto a freshly built default state. The rules are total:
//
// - object onto object: merge key by key, recursing into shared keys;
// - anything else: the patch value replaces the base value.
//
// Objects carrying an `"@type"` tag (persisted IRs and maps) are atomic. A
// tagged patch replaces the base wholesale, and a tagged base is replaced
// wholesale by whatever the patch holds, so a saved collection never gets
// default entries spliced into it.

use serde_json::Value;

/// Key marking a tagged (atomic) node in persisted trees.
pub const TAG_KEY: &str = "@type";

pub fn is_tagged(value: &Value) -> bool {
    value.as_object().is_some_and(|o| o.contains_key(TAG_KEY))
}

/// Merge `patch` onto `base`, consuming both.
pub fn deep_merge(base: Value, patch: Value) -> Value {
    if is_tagged(&base) || is_tagged(&patch) {
        return patch;
    }
    match (base, patch) {
        (Value::Object(mut base), Value::Object(patch)) => {
            for (key, patch_value) in patch {
                let merged = match base.remove(&key) {
                    Some(base_value) => deep_merge(base_value, patch_value),
                    None => patch_value,
                };
                base.insert(key, merged);
            }
            Value::Object(base)
        }
        (_, patch) => patch,
    }
}
