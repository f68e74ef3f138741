use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::capability::CapabilityName;
use crate::context::Category;
use crate::contract::{FieldKind, OutputContract};

#[derive(Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResponderName(pub String);

impl ResponderName {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ResponderName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ResponderName {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Configuration for one post-hoc policy check. The judging logic lives in
/// the runtime; this is the startup-time declaration attached to a responder.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardrailSpec {
    pub name: String,
    pub instructions: String,
}

impl GuardrailSpec {
    pub fn new(name: impl Into<String>, instructions: impl Into<String>) -> Self {
        Self { name: name.into(), instructions: instructions.into() }
    }

    /// Shape the judge must return: a detection flag plus its reasoning.
    pub fn judge_contract() -> OutputContract {
        OutputContract::object(&[
            ("violation_detected", FieldKind::Flag),
            ("reasoning", FieldKind::Text),
        ])
    }
}

/// Immutable behavior unit defined once at process start.
#[derive(Clone, Debug)]
pub struct Responder {
    name: ResponderName,
    instructions: String,
    output_contract: OutputContract,
    capabilities: Vec<CapabilityName>,
    guardrails: Vec<GuardrailSpec>,
}

impl Responder {
    pub fn new(
        name: impl Into<String>,
        instructions: impl Into<String>,
        output_contract: OutputContract,
    ) -> Self {
        Self {
            name: ResponderName(name.into()),
            instructions: instructions.into(),
            output_contract,
            capabilities: Vec::new(),
            guardrails: Vec::new(),
        }
    }

    pub fn with_capabilities(mut self, capabilities: Vec<CapabilityName>) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn with_guardrails(mut self, guardrails: Vec<GuardrailSpec>) -> Self {
        self.guardrails = guardrails;
        self
    }

    pub fn name(&self) -> &ResponderName {
        &self.name
    }

    pub fn instructions(&self) -> &str {
        &self.instructions
    }

    pub fn output_contract(&self) -> &OutputContract {
        &self.output_contract
    }

    pub fn capabilities(&self) -> &[CapabilityName] {
        &self.capabilities
    }

    pub fn guardrails(&self) -> &[GuardrailSpec] {
        &self.guardrails
    }
}

/// The triage result: exactly one downstream target plus the category the
/// classification resolved. Zero or several targets never construct a value
/// of this type; the parser rejects them upstream.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandoffDecision {
    pub target: ResponderName,
    pub category: Category,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DirectoryError {
    #[error("responder `{0}` is already registered")]
    Duplicate(ResponderName),
    #[error("directory has no responder named `{0}`")]
    Unknown(ResponderName),
    #[error("directory must contain at least one downstream responder")]
    Empty,
}

/// Static lookup table of responders, fixed for the process lifetime.
///
/// The handoff step is a table lookup against this directory, never dynamic
/// dispatch to an open-ended peer set.
#[derive(Clone, Debug)]
pub struct ResponderDirectory {
    router: Responder,
    responders: BTreeMap<ResponderName, Responder>,
}

impl ResponderDirectory {
    pub fn new(router: Responder, responders: Vec<Responder>) -> Result<Self, DirectoryError> {
        if responders.is_empty() {
            return Err(DirectoryError::Empty);
        }
        let mut table = BTreeMap::new();
        for responder in responders {
            let name = responder.name().clone();
            if name == *router.name() || table.contains_key(&name) {
                return Err(DirectoryError::Duplicate(name));
            }
            table.insert(name, responder);
        }
        Ok(Self { router, responders: table })
    }

    pub fn router(&self) -> &Responder {
        &self.router
    }

    pub fn get(&self, name: &ResponderName) -> Option<&Responder> {
        self.responders.get(name)
    }

    pub fn resolve(&self, name: &ResponderName) -> Result<&Responder, DirectoryError> {
        self.get(name).ok_or_else(|| DirectoryError::Unknown(name.clone()))
    }

    pub fn names(&self) -> Vec<ResponderName> {
        self.responders.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.responders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.responders.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use crate::contract::OutputContract;

    use super::{DirectoryError, Responder, ResponderDirectory, ResponderName};

    fn responder(name: &str) -> Responder {
        Responder::new(name, format!("You are the {name} specialist."), OutputContract::answer())
    }

    #[test]
    fn directory_resolves_registered_responders() {
        let directory = ResponderDirectory::new(
            responder("triage"),
            vec![responder("billing"), responder("technical")],
        )
        .expect("directory builds");

        assert_eq!(directory.len(), 2);
        assert_eq!(directory.router().name(), &ResponderName::from("triage"));
        assert!(directory.resolve(&"billing".into()).is_ok());
        assert_eq!(
            directory.resolve(&"legal".into()).expect_err("unknown"),
            DirectoryError::Unknown("legal".into())
        );
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let error = ResponderDirectory::new(
            responder("triage"),
            vec![responder("billing"), responder("billing")],
        )
        .expect_err("duplicate");
        assert_eq!(error, DirectoryError::Duplicate("billing".into()));
    }

    #[test]
    fn router_name_cannot_be_shadowed() {
        let error =
            ResponderDirectory::new(responder("triage"), vec![responder("triage")])
                .expect_err("shadowing the router is rejected");
        assert_eq!(error, DirectoryError::Duplicate("triage".into()));
    }

    #[test]
    fn empty_directory_is_rejected() {
        let error = ResponderDirectory::new(responder("triage"), Vec::new()).expect_err("empty");
        assert_eq!(error, DirectoryError::Empty);
    }
}
