//! Glue between raw invocations (CLI words, IPC payloads) and the registry.

use crate::errors::{SpoolError, SpoolResult};
use crate::registry::{parse_args, Context, Outcome, RawArgs, Registry};

/// Merge two argument maps; a key present in both is an error
pub fn merge_args(mut base: RawArgs, extra: RawArgs) -> SpoolResult<RawArgs> {
    for (key, value) in extra {
        if base.contains_key(&key) {
            return Err(SpoolError::duplicate_argument(&key));
        }
        base.insert(key, value);
    }
    Ok(base)
}

/// Flatten a JSON argument object into raw strings.
///
/// Scalars are stringified so they go through the same coercion as CLI
/// input. `null`, arrays and objects are refused; omit a key to fall back
/// to its default.
pub fn args_from_json(map: &serde_json::Map<String, serde_json::Value>) -> SpoolResult<RawArgs> {
    let mut args = RawArgs::new();
    for (key, value) in map {
        let raw = match value {
            serde_json::Value::String(s) => s.clone(),
            serde_json::Value::Bool(b) => b.to_string(),
            serde_json::Value::Number(n) => n.to_string(),
            other => return Err(SpoolError::malformed_argument(&format!("{key}={other}"))),
        };
        args.insert(key.clone(), raw);
    }
    Ok(args)
}

/// Resolve `path`, fold residual segments into `args`, and invoke the entry
pub fn call<S: AsRef<str>>(
    registry: &Registry,
    path: &[S],
    args: RawArgs,
    context: &Context,
) -> anyhow::Result<Outcome> {
    let resolved = registry.resolve(path, Some(context))?;
    let residual = parse_args(&resolved.residual)?;
    let args = merge_args(args, residual)?;
    registry.invoke(&resolved.entry, &args, Some(context))
}

/// JSON form of an outcome; groups are rendered as their member listing
#[must_use]
pub fn render(outcome: &Outcome) -> serde_json::Value {
    match outcome {
        Outcome::Value(value) => value.to_json(),
        Outcome::Group(group) => serde_json::json!({
            "type": "group",
            "name": group.name(),
            "commands": group.describe(),
        }),
    }
}
