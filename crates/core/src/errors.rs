use thiserror::Error;

use crate::capability::{CapabilityFailure, CapabilityName, RegistryError};
use crate::context::ContextError;
use crate::contract::ContractViolation;
use crate::lifecycle::LifecycleError;
use crate::responder::ResponderName;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProviderErrorKind {
    Transport,
    Timeout,
    Model,
}

/// Failure reported by the external inference provider at any step.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("provider {kind:?} error: {message}")]
pub struct ProviderError {
    pub kind: ProviderErrorKind,
    pub message: String,
}

impl ProviderError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self { kind: ProviderErrorKind::Transport, message: message.into() }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self { kind: ProviderErrorKind::Timeout, message: message.into() }
    }

    pub fn model(message: impl Into<String>) -> Self {
        Self { kind: ProviderErrorKind::Model, message: message.into() }
    }
}

/// Router output that cannot be turned into exactly one handoff. Fatal for
/// the request and never retried.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ClassificationError {
    #[error("classification output is malformed: {0}")]
    Malformed(String),
    #[error("classification output names no handoff target")]
    MissingTarget,
    #[error("classification output names {count} handoff targets, expected exactly one")]
    AmbiguousTarget { count: usize },
    #[error("classification names unknown responder `{0}`")]
    UnknownTarget(ResponderName),
    #[error("classification produced no resolvable category: {0}")]
    UnresolvedCategory(String),
    #[error("classification attempted to invoke capability `{0}`")]
    UnexpectedCapabilityCall(CapabilityName),
    #[error(transparent)]
    Context(#[from] ContextError),
}

/// Typed reason a request terminated in the failed phase. Every fatal
/// condition surfaces through one of these variants on the terminal event;
/// none are swallowed.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RequestError {
    #[error(transparent)]
    Classification(#[from] ClassificationError),
    #[error("responder `{responder}` invoked capability `{capability}` outside its gated view")]
    CapabilityViolation { responder: ResponderName, capability: CapabilityName },
    #[error("candidate answer violates its output shape: {0}")]
    OutputShape(#[from] ContractViolation),
    #[error("guardrail `{guardrail}` still failing after retry budget: {reason}")]
    GuardrailExhausted { guardrail: String, reason: String },
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error(transparent)]
    CapabilityFailed(#[from] CapabilityFailure),
    #[error("capability exchange exceeded the configured limit of {limit} rounds")]
    ExchangeOverflow { limit: u32 },
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error("request lifecycle violation: {0}")]
    Lifecycle(#[from] LifecycleError),
    #[error("request was cancelled before completion")]
    Canceled,
}

impl RequestError {
    /// True for conditions the retry loop may absorb; everything else is
    /// fatal the moment it occurs.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Canceled)
    }
}

#[cfg(test)]
mod tests {
    use super::{ClassificationError, ProviderError, RequestError};
    use crate::context::{Category, ContextError};
    use crate::contract::ContractViolation;

    #[test]
    fn classification_errors_convert_into_request_errors() {
        let error: RequestError = ClassificationError::AmbiguousTarget { count: 2 }.into();
        assert!(matches!(
            error,
            RequestError::Classification(ClassificationError::AmbiguousTarget { count: 2 })
        ));
        assert!(error.is_fatal());
    }

    #[test]
    fn context_conflict_flows_through_classification() {
        let error: ClassificationError =
            ContextError::CategoryAlreadyAssigned { existing: Category::Billing }.into();
        assert_eq!(
            error.to_string(),
            "category already assigned as billing for this request"
        );
    }

    #[test]
    fn messages_name_the_failing_piece() {
        let shape: RequestError =
            ContractViolation::MissingField { field: "response".to_string() }.into();
        assert!(shape.to_string().contains("`response`"));

        let provider: RequestError = ProviderError::timeout("deadline exceeded").into();
        assert!(provider.to_string().contains("Timeout"));

        let violation = RequestError::CapabilityViolation {
            responder: "billing".into(),
            capability: "refund".into(),
        };
        assert!(violation.to_string().contains("outside its gated view"));
    }
}
