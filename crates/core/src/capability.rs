use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::context::{Category, SessionContext};

#[derive(Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CapabilityName(pub String);

impl CapabilityName {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CapabilityName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CapabilityName {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Enablement rule evaluated against the session context on every dispatch.
///
/// Rules are explicit tags rather than stored closures so a capability is
/// constructed once at startup and only the evaluation happens per request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnablementRule {
    Always,
    RequirePrivileged,
    RequireCategory(Category),
}

impl EnablementRule {
    pub fn evaluate(&self, context: &SessionContext) -> bool {
        match self {
            Self::Always => true,
            Self::RequirePrivileged => context.is_privileged(),
            Self::RequireCategory(category) => context.category() == Some(*category),
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("capability `{capability}` failed: {message}")]
pub struct CapabilityFailure {
    pub capability: CapabilityName,
    pub message: String,
}

impl CapabilityFailure {
    pub fn new(capability: CapabilityName, message: impl Into<String>) -> Self {
        Self { capability, message: message.into() }
    }
}

/// Side-effectful action a responder may invoke.
///
/// Handlers read the context but cannot mutate it; identity and category
/// stay under the controller's control.
#[async_trait]
pub trait CapabilityHandler: Send + Sync {
    async fn invoke(&self, context: &SessionContext) -> Result<Value, CapabilityFailure>;
}

#[derive(Clone)]
pub struct Capability {
    name: CapabilityName,
    description: String,
    rule: EnablementRule,
    handler: Arc<dyn CapabilityHandler>,
}

impl Capability {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        rule: EnablementRule,
        handler: Arc<dyn CapabilityHandler>,
    ) -> Self {
        Self {
            name: CapabilityName(name.into()),
            description: description.into(),
            rule,
            handler,
        }
    }

    pub fn name(&self) -> &CapabilityName {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn rule(&self) -> EnablementRule {
        self.rule
    }

    pub fn is_enabled(&self, context: &SessionContext) -> bool {
        self.rule.evaluate(context)
    }

    pub async fn invoke(&self, context: &SessionContext) -> Result<Value, CapabilityFailure> {
        self.handler.invoke(context).await
    }
}

impl std::fmt::Debug for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Capability")
            .field("name", &self.name)
            .field("rule", &self.rule)
            .finish_non_exhaustive()
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("capability `{0}` is already registered")]
    Duplicate(CapabilityName),
    #[error("capability `{0}` is not registered")]
    Unknown(CapabilityName),
}

/// Startup-time table of all capabilities known to the process.
#[derive(Clone, Debug, Default)]
pub struct CapabilityRegistry {
    capabilities: BTreeMap<CapabilityName, Capability>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, capability: Capability) -> Result<(), RegistryError> {
        let name = capability.name().clone();
        if self.capabilities.contains_key(&name) {
            return Err(RegistryError::Duplicate(name));
        }
        self.capabilities.insert(name, capability);
        Ok(())
    }

    pub fn get(&self, name: &CapabilityName) -> Option<&Capability> {
        self.capabilities.get(name)
    }

    pub fn contains(&self, name: &CapabilityName) -> bool {
        self.capabilities.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.capabilities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.capabilities.is_empty()
    }

    /// Compute the capability view for one responder invocation.
    ///
    /// Rules are re-evaluated against the context at this instant; nothing is
    /// cached across requests or across retries of the same request. Declared
    /// capabilities whose rule currently fails are absent from the view
    /// entirely, so a disabled capability is invisible to the provider rather
    /// than refused at call time.
    pub fn gated_view(
        &self,
        declared: &[CapabilityName],
        context: &SessionContext,
    ) -> Result<GatedView, RegistryError> {
        let mut enabled = Vec::new();
        for name in declared {
            let capability =
                self.get(name).ok_or_else(|| RegistryError::Unknown(name.clone()))?;
            if capability.is_enabled(context) {
                enabled.push(capability.clone());
            }
        }
        Ok(GatedView { enabled })
    }
}

/// Capabilities exposed to the provider for a single invocation.
#[derive(Clone, Debug, Default)]
pub struct GatedView {
    enabled: Vec<Capability>,
}

impl GatedView {
    pub fn get(&self, name: &CapabilityName) -> Option<&Capability> {
        self.enabled.iter().find(|capability| capability.name() == name)
    }

    pub fn contains(&self, name: &CapabilityName) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Capability> {
        self.enabled.iter()
    }

    pub fn names(&self) -> Vec<CapabilityName> {
        self.enabled.iter().map(|capability| capability.name().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.enabled.len()
    }

    pub fn is_empty(&self) -> bool {
        self.enabled.is_empty()
    }
}
