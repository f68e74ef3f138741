use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::capability::CapabilityName;
use crate::context::Category;
use crate::responder::ResponderName;

#[derive(Clone, Debug, Hash, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestId(pub String);

impl RequestId {
    pub fn fresh() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One record per controller transition. The ordered per-request sequence is
/// append-only and serves as the authoritative audit trail of that request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub request_id: RequestId,
    pub occurred_at: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: EventKind,
}

impl Event {
    pub fn new(request_id: RequestId, kind: EventKind) -> Self {
        Self { request_id, occurred_at: Utc::now(), kind }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.kind, EventKind::RequestAccepted { .. } | EventKind::RequestFailed { .. })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventKind {
    RequestStarted {
        identity: String,
        message: String,
    },
    ClassificationResult {
        category: Category,
        target: ResponderName,
    },
    Handoff {
        from: ResponderName,
        to: ResponderName,
    },
    CapabilityInvoked {
        responder: ResponderName,
        capability: CapabilityName,
    },
    CandidateProduced {
        responder: ResponderName,
        attempt: u32,
    },
    GuardrailResult {
        guardrail: String,
        passed: bool,
        reason: String,
    },
    RetryScheduled {
        attempt: u32,
        reason: String,
    },
    RequestAccepted {
        answer: String,
    },
    RequestFailed {
        error: String,
    },
}

impl EventKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::RequestStarted { .. } => "request_started",
            Self::ClassificationResult { .. } => "classification_result",
            Self::Handoff { .. } => "handoff",
            Self::CapabilityInvoked { .. } => "capability_invoked",
            Self::CandidateProduced { .. } => "candidate_produced",
            Self::GuardrailResult { .. } => "guardrail_result",
            Self::RetryScheduled { .. } => "retry_scheduled",
            Self::RequestAccepted { .. } => "request_accepted",
            Self::RequestFailed { .. } => "request_failed",
        }
    }
}

/// Embedder hook for keeping an audit copy of the stream.
pub trait EventSink: Send + Sync {
    fn record(&self, event: Event);
}

#[derive(Clone, Default)]
pub struct InMemoryEventSink {
    events: Arc<Mutex<Vec<Event>>>,
}

impl InMemoryEventSink {
    pub fn events(&self) -> Vec<Event> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn kinds(&self) -> Vec<&'static str> {
        self.events().iter().map(|event| event.kind.name()).collect()
    }
}

impl EventSink for InMemoryEventSink {
    fn record(&self, event: Event) {
        match self.events.lock() {
            Ok(mut events) => events.push(event),
            Err(poisoned) => poisoned.into_inner().push(event),
        }
    }
}
