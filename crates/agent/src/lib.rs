//! Request orchestration runtime.
//!
//! This crate drives one request end-to-end over the domain model in
//! `switchboard-core`:
//! 1. **Classification** (`router`) - the triage responder picks exactly one
//!    downstream target and resolves the request category
//! 2. **Delegation + execution** (`controller`) - table lookup of the target,
//!    provider invocation with the gated capability view
//! 3. **Validation** (`guardrails`) - post-hoc policy checks over candidate
//!    answers, with a bounded retry loop
//! 4. **Event emission** (`controller`) - one ordered event per transition,
//!    streamed live to the caller
//!
//! # Key Types
//!
//! - `HandoffController` - the per-request state machine driver
//! - `InferenceProvider` - pluggable seam to the external model backend
//! - `RequestHandle` - caller-facing events/result/cancel surface
//!
//! # Safety Principle
//!
//! The provider is strictly a collaborator. It never sees a capability the
//! gated view excluded, and nothing it produces reaches the caller without
//! passing the responder's output contract and guardrails.

pub mod controller;
pub mod guardrails;
pub mod provider;
pub mod router;
pub mod support;

pub use controller::{
    Disposition, EventStream, HandoffController, RequestHandle, RequestOutcome, SetupError,
};
pub use guardrails::{apology_guardrail, GuardrailValidator, GuardrailVerdict};
pub use provider::{
    CapabilityExchange, CapabilitySpec, InferenceProvider, ProviderReply, ProviderRequest,
};
pub use router::{parse_decision, triage_instructions};
pub use support::{support_directory, support_registry};
