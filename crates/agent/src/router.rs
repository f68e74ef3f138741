//! Triage: build the router's instructions and turn its structured output
//! into exactly one handoff decision.

use serde_json::Value;
use switchboard_core::{
    Category, ClassificationError, ContextError, HandoffDecision, ResponderDirectory,
    ResponderName,
};

/// Instructions for the first point of contact. The target roster is spelled
/// out so the provider can only pick from known responders.
pub fn triage_instructions(targets: &[ResponderName]) -> String {
    let roster =
        targets.iter().map(ResponderName::as_str).collect::<Vec<_>>().join(", ");
    format!(
        "You are the first point of contact for a support desk. Classify the \
         user's request as exactly one category (billing, technical, or general) \
         and delegate it to exactly one responder. Reply with a JSON object of \
         the form {{\"category\": \"...\", \"target\": \"...\"}} where target is \
         exactly one of: {roster}. Never name more than one target."
    )
}

/// Parse the router's structured output into a handoff decision.
///
/// Everything that is not exactly one known target with a resolvable
/// category is a classification failure: zero targets, several targets, an
/// unknown responder, a missing category, or a payload that is not an
/// object at all.
pub fn parse_decision(
    output: &Value,
    directory: &ResponderDirectory,
) -> Result<HandoffDecision, ClassificationError> {
    let object = output.as_object().ok_or_else(|| {
        ClassificationError::Malformed("classification output is not a JSON object".to_string())
    })?;

    let target = match object.get("target") {
        None | Some(Value::Null) => return Err(ClassificationError::MissingTarget),
        Some(Value::String(name)) => ResponderName(name.clone()),
        Some(Value::Array(names)) => match names.as_slice() {
            [] => return Err(ClassificationError::MissingTarget),
            [Value::String(name)] => ResponderName(name.clone()),
            _ => return Err(ClassificationError::AmbiguousTarget { count: names.len() }),
        },
        Some(other) => {
            return Err(ClassificationError::Malformed(format!(
                "target field must be a string, got {other}"
            )));
        }
    };

    if directory.get(&target).is_none() {
        return Err(ClassificationError::UnknownTarget(target));
    }

    let category = match object.get("category") {
        None | Some(Value::Null) => {
            return Err(ClassificationError::UnresolvedCategory("field is missing".to_string()));
        }
        Some(Value::String(value)) => value.parse::<Category>().map_err(|error| match error {
            ContextError::UnknownCategory(raw) => ClassificationError::UnresolvedCategory(raw),
            other => ClassificationError::Context(other),
        })?,
        Some(other) => {
            return Err(ClassificationError::UnresolvedCategory(format!(
                "field must be a string, got {other}"
            )));
        }
    };

    Ok(HandoffDecision { target, category })
}
