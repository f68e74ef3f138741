use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Primitive kind a required field must carry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Text,
    Flag,
}

impl FieldKind {
    fn matches(&self, value: &Value) -> bool {
        match self {
            Self::Text => value.is_string(),
            Self::Flag => value.is_boolean(),
        }
    }

    fn expected(&self) -> &'static str {
        match self {
            Self::Text => "string",
            Self::Flag => "boolean",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub kind: FieldKind,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ContractViolation {
    #[error("structured answer must be a JSON object, got {found}")]
    NotAnObject { found: String },
    #[error("structured answer is missing required field `{field}`")]
    MissingField { field: String },
    #[error("field `{field}` must be a {expected}")]
    WrongKind { field: String, expected: &'static str },
}

/// Shape a structured answer must conform to before it is considered a
/// candidate at all. Contracts are declared once per responder at startup.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputContract {
    required: Vec<FieldSpec>,
}

impl OutputContract {
    pub fn object(required: &[(&str, FieldKind)]) -> Self {
        Self {
            required: required
                .iter()
                .map(|(name, kind)| FieldSpec { name: (*name).to_string(), kind: *kind })
                .collect(),
        }
    }

    /// Default responder answer shape: a single free-text `response` field.
    pub fn answer() -> Self {
        Self::object(&[("response", FieldKind::Text)])
    }

    pub fn required_fields(&self) -> &[FieldSpec] {
        &self.required
    }

    pub fn validate(&self, value: &Value) -> Result<(), ContractViolation> {
        let object = value.as_object().ok_or_else(|| ContractViolation::NotAnObject {
            found: json_kind(value).to_string(),
        })?;

        for spec in &self.required {
            match object.get(&spec.name) {
                None => {
                    return Err(ContractViolation::MissingField { field: spec.name.clone() });
                }
                Some(field_value) if !spec.kind.matches(field_value) => {
                    return Err(ContractViolation::WrongKind {
                        field: spec.name.clone(),
                        expected: spec.kind.expected(),
                    });
                }
                Some(_) => {}
            }
        }
        Ok(())
    }

    /// Extract the first required text field, the human-readable answer for
    /// validated candidates.
    pub fn text_of<'a>(&self, value: &'a Value) -> Option<&'a str> {
        self.required
            .iter()
            .find(|spec| spec.kind == FieldKind::Text)
            .and_then(|spec| value.get(&spec.name))
            .and_then(Value::as_str)
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{ContractViolation, FieldKind, OutputContract};

    #[test]
    fn answer_contract_accepts_conforming_payload() {
        let contract = OutputContract::answer();
        let candidate = json!({"response": "Your invoice is attached."});

        assert_eq!(contract.validate(&candidate), Ok(()));
        assert_eq!(contract.text_of(&candidate), Some("Your invoice is attached."));
    }

    #[test]
    fn missing_field_is_reported_by_name() {
        let contract = OutputContract::answer();
        let error = contract.validate(&json!({"reply": "hi"})).expect_err("must fail");
        assert_eq!(error, ContractViolation::MissingField { field: "response".to_string() });
    }

    #[test]
    fn wrong_kind_is_reported_with_expectation() {
        let contract =
            OutputContract::object(&[("violation_detected", FieldKind::Flag), ("reasoning", FieldKind::Text)]);
        let error = contract
            .validate(&json!({"violation_detected": "yes", "reasoning": "contains sorry"}))
            .expect_err("must fail");
        assert_eq!(
            error,
            ContractViolation::WrongKind { field: "violation_detected".to_string(), expected: "boolean" }
        );
    }

    #[test]
    fn non_object_payload_is_rejected() {
        let contract = OutputContract::answer();
        let error = contract.validate(&json!("just text")).expect_err("must fail");
        assert_eq!(error, ContractViolation::NotAnObject { found: "string".to_string() });
    }
}
