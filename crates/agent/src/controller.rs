//! The handoff controller: drives one request from submission through
//! classification, delegation, execution, validation, and final result,
//! emitting one event per transition into a live, ordered stream.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use switchboard_core::config::PolicyConfig;
use switchboard_core::{
    CapabilityName, CapabilityRegistry, ClassificationError, Event, EventKind, EventSink,
    HandoffDecision, LifecycleContext, LifecycleEvent, RequestError, RequestId, RequestMachine,
    RequestPhase, Responder, ResponderDirectory, ResponderName, SessionContext,
    TransitionOutcome,
};

use crate::guardrails::GuardrailValidator;
use crate::provider::{
    CapabilityExchange, CapabilitySpec, InferenceProvider, ProviderReply, ProviderRequest,
};
use crate::router::parse_decision;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SetupError {
    #[error("responder `{responder}` declares unregistered capability `{capability}`")]
    UnknownCapability { responder: ResponderName, capability: CapabilityName },
}

/// How one request ended.
#[derive(Clone, Debug, PartialEq)]
pub enum Disposition {
    Accepted { answer: String },
    Failed { error: RequestError },
}

/// Final result of a request, returning the session context to the host so
/// the next request can reuse it. Exactly one outcome exists per request.
#[derive(Clone, Debug, PartialEq)]
pub struct RequestOutcome {
    pub request_id: RequestId,
    pub context: SessionContext,
    pub disposition: Disposition,
}

/// Ordered, live, finite view of one request's events. Terminates after the
/// terminal event; it cannot be restarted.
pub struct EventStream {
    receiver: mpsc::UnboundedReceiver<Event>,
}

impl EventStream {
    pub async fn next(&mut self) -> Option<Event> {
        self.receiver.recv().await
    }

    /// Collect every remaining event until the stream closes.
    pub async fn drain(mut self) -> Vec<Event> {
        let mut events = Vec::new();
        while let Some(event) = self.next().await {
            events.push(event);
        }
        events
    }
}

pub struct RequestHandle {
    request_id: RequestId,
    events: Option<EventStream>,
    result: oneshot::Receiver<RequestOutcome>,
    task: JoinHandle<()>,
}

impl RequestHandle {
    pub fn request_id(&self) -> &RequestId {
        &self.request_id
    }

    /// Take the event stream. Yields `None` on the second call; the stream
    /// is single-consumer and not restartable.
    pub fn events(&mut self) -> Option<EventStream> {
        self.events.take()
    }

    /// Stop the request at its next suspension point. No further events are
    /// emitted and no further capabilities are invoked.
    pub fn cancel(&self) {
        self.task.abort();
    }

    /// Resolve the final outcome. Reports [`RequestError::Canceled`] if the
    /// request was cancelled before reaching the terminal phase.
    pub async fn result(self) -> Result<RequestOutcome, RequestError> {
        self.result.await.map_err(|_| RequestError::Canceled)
    }
}

pub struct HandoffController {
    directory: Arc<ResponderDirectory>,
    registry: Arc<CapabilityRegistry>,
    provider: Arc<dyn InferenceProvider>,
    policy: PolicyConfig,
    sink: Option<Arc<dyn EventSink>>,
}

impl HandoffController {
    /// Build a controller over a fixed responder directory and capability
    /// registry. Fails fast when a responder declares a capability the
    /// registry does not know, so gating cannot hit unknown names mid-request.
    pub fn new(
        directory: Arc<ResponderDirectory>,
        registry: Arc<CapabilityRegistry>,
        provider: Arc<dyn InferenceProvider>,
        policy: PolicyConfig,
    ) -> Result<Self, SetupError> {
        let mut roster = vec![directory.router().clone()];
        for name in directory.names() {
            if let Some(responder) = directory.get(&name) {
                roster.push(responder.clone());
            }
        }
        for responder in &roster {
            for capability in responder.capabilities() {
                if !registry.contains(capability) {
                    return Err(SetupError::UnknownCapability {
                        responder: responder.name().clone(),
                        capability: capability.clone(),
                    });
                }
            }
        }

        Ok(Self { directory, registry, provider, policy, sink: None })
    }

    /// Attach an audit sink that receives a copy of every emitted event.
    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Submit one request. The context is taken by value: a context instance
    /// is exclusively owned by its in-flight request and handed back in the
    /// outcome, so two concurrent requests can never share one.
    pub fn start_request(
        &self,
        message: impl Into<String>,
        context: SessionContext,
    ) -> RequestHandle {
        let message = message.into();
        let request_id = RequestId::fresh();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (result_tx, result_rx) = oneshot::channel();

        let driver = Driver {
            directory: Arc::clone(&self.directory),
            registry: Arc::clone(&self.registry),
            provider: Arc::clone(&self.provider),
            policy: self.policy.clone(),
            machine: RequestMachine,
            sink: self.sink.clone(),
            request_id: request_id.clone(),
            events: event_tx,
        };

        let task = tokio::spawn(async move {
            let outcome = driver.drive(message, context).await;
            let _ = result_tx.send(outcome);
        });

        RequestHandle {
            request_id,
            events: Some(EventStream { receiver: event_rx }),
            result: result_rx,
            task,
        }
    }
}

struct Driver {
    directory: Arc<ResponderDirectory>,
    registry: Arc<CapabilityRegistry>,
    provider: Arc<dyn InferenceProvider>,
    policy: PolicyConfig,
    machine: RequestMachine,
    sink: Option<Arc<dyn EventSink>>,
    request_id: RequestId,
    events: mpsc::UnboundedSender<Event>,
}

impl Driver {
    async fn drive(self, message: String, mut context: SessionContext) -> RequestOutcome {
        let mut phase = self.machine.initial_phase();
        let mut lifecycle = LifecycleContext::with_budget(self.policy.retry_budget);

        self.emit(EventKind::RequestStarted {
            identity: context.identity().to_string(),
            message: message.clone(),
        });

        let disposition =
            match self.run(&message, &mut context, &mut phase, &mut lifecycle).await {
                Ok(answer) => {
                    self.emit(EventKind::RequestAccepted { answer: answer.clone() });
                    Disposition::Accepted { answer }
                }
                Err(error) => {
                    warn!(
                        event_name = "request.failed",
                        request_id = %self.request_id,
                        error = %error,
                        "request terminated with a typed failure"
                    );
                    self.emit(EventKind::RequestFailed { error: error.to_string() });
                    Disposition::Failed { error }
                }
            };

        if matches!(phase, RequestPhase::Accepted | RequestPhase::Failed) {
            if let Ok(outcome) = self.machine.apply(&phase, &LifecycleEvent::Closed, &lifecycle) {
                phase = outcome.to;
            }
        }
        debug!(
            event_name = "request.done",
            request_id = %self.request_id,
            terminal_phase = ?phase,
            "request lifecycle closed"
        );

        RequestOutcome { request_id: self.request_id.clone(), context, disposition }
    }

    async fn run(
        &self,
        message: &str,
        context: &mut SessionContext,
        phase: &mut RequestPhase,
        lifecycle: &mut LifecycleContext,
    ) -> Result<String, RequestError> {
        self.apply(phase, lifecycle, LifecycleEvent::Submitted)?;

        // Classification: the router must produce exactly one handoff
        // decision, and the category is written into the context exactly once
        // as its side effect.
        let decision = match self.classify(message, context).await {
            Ok(decision) => decision,
            Err(error) => {
                self.apply(phase, lifecycle, LifecycleEvent::RoutingRejected)?;
                return Err(error);
            }
        };

        self.emit(EventKind::ClassificationResult {
            category: decision.category,
            target: decision.target.clone(),
        });
        let responder = match self.directory.resolve(&decision.target) {
            Ok(responder) => responder,
            Err(_) => {
                self.apply(phase, lifecycle, LifecycleEvent::RoutingRejected)?;
                return Err(ClassificationError::UnknownTarget(decision.target).into());
            }
        };
        self.apply(phase, lifecycle, LifecycleEvent::Routed)?;
        self.emit(EventKind::Handoff {
            from: self.directory.router().name().clone(),
            to: responder.name().clone(),
        });
        self.apply(phase, lifecycle, LifecycleEvent::Dispatched)?;

        let mut attempt: u32 = 0;
        let mut retry_note: Option<String> = None;
        loop {
            attempt += 1;
            let candidate =
                match self.execute(responder, retry_note.as_deref(), message, context).await {
                    Ok(candidate) => candidate,
                    Err(error) => {
                        self.apply(phase, lifecycle, LifecycleEvent::ExecutionRejected)?;
                        return Err(error);
                    }
                };

            let answer = responder
                .output_contract()
                .text_of(&candidate)
                .map(str::to_string)
                .unwrap_or_else(|| candidate.to_string());
            self.emit(EventKind::CandidateProduced {
                responder: responder.name().clone(),
                attempt,
            });
            self.apply(phase, lifecycle, LifecycleEvent::CandidateReady)?;

            match self.validate(responder, &answer, context).await {
                Ok(None) => {
                    self.apply(phase, lifecycle, LifecycleEvent::GuardrailsPassed)?;
                    return Ok(answer);
                }
                Ok(Some((guardrail, reason))) => {
                    let outcome =
                        self.apply(phase, lifecycle, LifecycleEvent::GuardrailRejected)?;
                    if outcome.to != RequestPhase::Retrying {
                        return Err(RequestError::GuardrailExhausted { guardrail, reason });
                    }
                    lifecycle.retries_used += 1;
                    self.emit(EventKind::RetryScheduled { attempt, reason: reason.clone() });
                    self.apply(phase, lifecycle, LifecycleEvent::RetryDispatched)?;
                    retry_note = Some(format!(
                        "Your previous answer was rejected by the `{guardrail}` policy \
                         check: {reason}. Produce a compliant answer."
                    ));
                }
                Err(error) => {
                    self.apply(phase, lifecycle, LifecycleEvent::ValidationRejected)?;
                    return Err(error);
                }
            }
        }
    }

    async fn classify(
        &self,
        message: &str,
        context: &mut SessionContext,
    ) -> Result<HandoffDecision, RequestError> {
        let router = self.directory.router();
        let request = ProviderRequest::new(router.instructions().to_string(), message.to_string());
        let reply = self.provider.invoke(request, context).await?;

        let output = match reply {
            ProviderReply::Structured(value) => value,
            ProviderReply::InvokeCapability { capability, .. } => {
                return Err(ClassificationError::UnexpectedCapabilityCall(capability).into());
            }
        };

        let decision = parse_decision(&output, &self.directory)?;
        context
            .assign_category(decision.category)
            .map_err(ClassificationError::from)?;

        info!(
            event_name = "request.classified",
            request_id = %self.request_id,
            category = %decision.category,
            target = %decision.target,
            "triage resolved a handoff target"
        );
        Ok(decision)
    }

    /// Run the responder once. The gated view is computed here, at dispatch
    /// time, and therefore recomputed on every retry.
    async fn execute(
        &self,
        responder: &Responder,
        retry_note: Option<&str>,
        message: &str,
        context: &SessionContext,
    ) -> Result<serde_json::Value, RequestError> {
        let view = self.registry.gated_view(responder.capabilities(), context)?;
        debug!(
            event_name = "request.capability_view",
            request_id = %self.request_id,
            responder = %responder.name(),
            enabled = view.len(),
            declared = responder.capabilities().len(),
            "gated capability view computed"
        );

        let mut instructions = responder.instructions().to_string();
        if let Some(note) = retry_note {
            instructions.push_str("\n\n");
            instructions.push_str(note);
        }

        let specs = view
            .iter()
            .map(|capability| CapabilitySpec {
                name: capability.name().clone(),
                description: capability.description().to_string(),
            })
            .collect();
        let mut request =
            ProviderRequest::new(instructions, message.to_string()).with_capabilities(specs);

        let mut rounds: u32 = 0;
        loop {
            match self.provider.invoke(request.clone(), context).await? {
                ProviderReply::Structured(value) => {
                    responder.output_contract().validate(&value)?;
                    return Ok(value);
                }
                ProviderReply::InvokeCapability { capability, arguments } => {
                    // The provider may only call what the gated view exposed
                    // for this invocation; anything else is a violation, not
                    // a refusal.
                    let Some(enabled) = view.get(&capability) else {
                        return Err(RequestError::CapabilityViolation {
                            responder: responder.name().clone(),
                            capability,
                        });
                    };
                    if rounds == self.policy.capability_rounds {
                        return Err(RequestError::ExchangeOverflow {
                            limit: self.policy.capability_rounds,
                        });
                    }
                    rounds += 1;

                    let result = enabled.invoke(context).await?;
                    self.emit(EventKind::CapabilityInvoked {
                        responder: responder.name().clone(),
                        capability: capability.clone(),
                    });
                    request.push_exchange(CapabilityExchange { capability, arguments, result });
                }
            }
        }
    }

    /// Judge the candidate against the responder's guardrails in declaration
    /// order, short-circuiting on the first failure. Returns the failing
    /// guardrail and its reason, or `None` when every guardrail passed.
    async fn validate(
        &self,
        responder: &Responder,
        answer: &str,
        context: &SessionContext,
    ) -> Result<Option<(String, String)>, RequestError> {
        for spec in responder.guardrails() {
            let validator = GuardrailValidator::new(spec.clone());
            let verdict = validator.judge(self.provider.as_ref(), answer, context).await?;
            self.emit(EventKind::GuardrailResult {
                guardrail: verdict.guardrail.clone(),
                passed: verdict.passed,
                reason: verdict.reason.clone(),
            });
            if !verdict.passed {
                return Ok(Some((verdict.guardrail, verdict.reason)));
            }
        }
        Ok(None)
    }

    fn apply(
        &self,
        phase: &mut RequestPhase,
        lifecycle: &LifecycleContext,
        event: LifecycleEvent,
    ) -> Result<TransitionOutcome, RequestError> {
        let outcome = self.machine.apply(phase, &event, lifecycle)?;
        debug!(
            event_name = "request.transition",
            request_id = %self.request_id,
            from = ?outcome.from,
            to = ?outcome.to,
            "lifecycle transition applied"
        );
        *phase = outcome.to.clone();
        Ok(outcome)
    }

    fn emit(&self, kind: EventKind) {
        let event = Event::new(self.request_id.clone(), kind);
        info!(
            event_name = event.kind.name(),
            request_id = %event.request_id,
            "request event emitted"
        );
        if let Some(sink) = &self.sink {
            sink.record(event.clone());
        }
        let _ = self.events.send(event);
    }
}
