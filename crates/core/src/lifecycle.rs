//! Deterministic request lifecycle machine.
//!
//! One request moves through classification, delegation, execution, and
//! validation as a strictly sequential path; the only revisited edge is the
//! bounded Executing <-> Validating retry loop. The transition function is
//! pure so a replayed event sequence always lands in the same phase.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestPhase {
    Started,
    Classifying,
    Delegating,
    Executing,
    Validating,
    Accepted,
    Retrying,
    Failed,
    Done,
}

impl RequestPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleEvent {
    /// Request submitted; the router is about to be invoked.
    Submitted,
    /// Router produced exactly one resolvable handoff decision.
    Routed,
    /// Router output was malformed, ambiguous, or named an unknown target.
    RoutingRejected,
    /// Target responder resolved and invoked with its gated view.
    Dispatched,
    /// Responder returned a candidate conforming to its output shape.
    CandidateReady,
    /// Responder output failed its shape, a capability was violated, or the
    /// provider reported an unrecoverable error.
    ExecutionRejected,
    /// Every guardrail passed.
    GuardrailsPassed,
    /// A guardrail failed; the retry budget decides where this lands.
    GuardrailRejected,
    /// Guardrail judging itself failed (provider or judge-shape error).
    ValidationRejected,
    /// Retry dispatched back to the same responder.
    RetryDispatched,
    /// Terminal event emitted and control returned to the caller.
    Closed,
}

/// Follow-up work the controller performs after a transition.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LifecycleAction {
    InvokeRouter,
    ResolveResponder,
    InvokeResponder,
    RunGuardrails,
    ScheduleRetry,
    EmitOutcome,
}

/// Per-request data consulted by context-dependent transitions.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleContext {
    pub retry_budget: u32,
    pub retries_used: u32,
}

impl LifecycleContext {
    pub fn with_budget(retry_budget: u32) -> Self {
        Self { retry_budget, retries_used: 0 }
    }

    pub fn budget_remaining(&self) -> bool {
        self.retries_used < self.retry_budget
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub from: RequestPhase,
    pub to: RequestPhase,
    pub event: LifecycleEvent,
    pub actions: Vec<LifecycleAction>,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum LifecycleError {
    #[error("invalid transition from {phase:?} on event {event:?}")]
    InvalidTransition { phase: RequestPhase, event: LifecycleEvent },
    #[error("request already reached terminal phase")]
    AlreadyDone,
}

/// Transition table for one request.
#[derive(Clone, Debug, Default)]
pub struct RequestMachine;

impl RequestMachine {
    pub fn initial_phase(&self) -> RequestPhase {
        RequestPhase::Started
    }

    pub fn apply(
        &self,
        current: &RequestPhase,
        event: &LifecycleEvent,
        context: &LifecycleContext,
    ) -> Result<TransitionOutcome, LifecycleError> {
        use LifecycleAction::{
            EmitOutcome, InvokeResponder, InvokeRouter, ResolveResponder, RunGuardrails,
            ScheduleRetry,
        };
        use LifecycleEvent::{
            CandidateReady, Closed, Dispatched, ExecutionRejected, GuardrailRejected,
            GuardrailsPassed, RetryDispatched, Routed, RoutingRejected, Submitted,
            ValidationRejected,
        };
        use RequestPhase::{
            Accepted, Classifying, Delegating, Done, Executing, Failed, Retrying, Started,
            Validating,
        };

        if current.is_terminal() {
            return Err(LifecycleError::AlreadyDone);
        }

        let (to, actions) = match (current, event) {
            (Started, Submitted) => (Classifying, vec![InvokeRouter]),
            (Classifying, Routed) => (Delegating, vec![ResolveResponder]),
            (Classifying, RoutingRejected) => (Failed, vec![EmitOutcome]),
            (Delegating, Dispatched) => (Executing, vec![InvokeResponder]),
            (Executing, CandidateReady) => (Validating, vec![RunGuardrails]),
            (Executing, ExecutionRejected) => (Failed, vec![EmitOutcome]),
            (Validating, GuardrailsPassed) => (Accepted, vec![EmitOutcome]),
            (Validating, GuardrailRejected) if context.budget_remaining() => {
                (Retrying, vec![ScheduleRetry])
            }
            (Validating, GuardrailRejected) => (Failed, vec![EmitOutcome]),
            (Validating, ValidationRejected) => (Failed, vec![EmitOutcome]),
            (Retrying, RetryDispatched) => (Executing, vec![InvokeResponder]),
            (Accepted, Closed) | (Failed, Closed) => (Done, Vec::new()),
            _ => {
                return Err(LifecycleError::InvalidTransition {
                    phase: current.clone(),
                    event: event.clone(),
                });
            }
        };

        Ok(TransitionOutcome { from: current.clone(), to, event: event.clone(), actions })
    }
}
