pub mod capability;
pub mod config;
pub mod context;
pub mod contract;
pub mod errors;
pub mod event;
pub mod lifecycle;
pub mod responder;

pub use capability::{
    Capability, CapabilityFailure, CapabilityHandler, CapabilityName, CapabilityRegistry,
    EnablementRule, GatedView, RegistryError,
};
pub use context::{Category, ContextError, SessionContext};
pub use contract::{ContractViolation, FieldKind, FieldSpec, OutputContract};
pub use errors::{ClassificationError, ProviderError, ProviderErrorKind, RequestError};
pub use event::{Event, EventKind, EventSink, InMemoryEventSink, RequestId};
pub use lifecycle::{
    LifecycleAction, LifecycleContext, LifecycleError, LifecycleEvent, RequestMachine,
    RequestPhase, TransitionOutcome,
};
pub use responder::{
    DirectoryError, GuardrailSpec, HandoffDecision, Responder, ResponderDirectory, ResponderName,
};
