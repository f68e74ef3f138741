use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use switchboard_core::{CapabilityName, ProviderError, SessionContext};

/// Capability surface advertised to the provider for a single invocation.
/// Only capabilities in the current gated view ever appear here.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilitySpec {
    pub name: CapabilityName,
    pub description: String,
}

/// One completed capability round-trip, carried back to the provider so it
/// can produce its final structured answer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CapabilityExchange {
    pub capability: CapabilityName,
    pub arguments: Value,
    pub result: Value,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProviderRequest {
    pub instructions: String,
    pub input: String,
    pub capabilities: Vec<CapabilitySpec>,
    pub exchanges: Vec<CapabilityExchange>,
}

impl ProviderRequest {
    pub fn new(instructions: impl Into<String>, input: impl Into<String>) -> Self {
        Self {
            instructions: instructions.into(),
            input: input.into(),
            capabilities: Vec::new(),
            exchanges: Vec::new(),
        }
    }

    pub fn with_capabilities(mut self, capabilities: Vec<CapabilitySpec>) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn push_exchange(&mut self, exchange: CapabilityExchange) {
        self.exchanges.push(exchange);
    }

    pub fn capability_names(&self) -> Vec<CapabilityName> {
        self.capabilities.iter().map(|spec| spec.name.clone()).collect()
    }
}

/// Reply from one provider invocation: either the structured answer itself
/// or a request to invoke one of the advertised capabilities first.
#[derive(Clone, Debug, PartialEq)]
pub enum ProviderReply {
    Structured(Value),
    InvokeCapability { capability: CapabilityName, arguments: Value },
}

/// The external collaborator that turns instructions and input into a
/// structured answer. Classification, responder execution, and guardrail
/// judging all go through this seam; its calls are the only points where a
/// request suspends.
#[async_trait]
pub trait InferenceProvider: Send + Sync {
    async fn invoke(
        &self,
        request: ProviderRequest,
        context: &SessionContext,
    ) -> Result<ProviderReply, ProviderError>;
}
