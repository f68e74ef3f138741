//! End-to-end request lifecycle coverage over a scripted provider.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};

use switchboard_agent::{
    Disposition, HandoffController, InferenceProvider, ProviderReply, ProviderRequest,
    support_directory, support_registry,
};
use switchboard_core::config::PolicyConfig;
use switchboard_core::{
    Category, ClassificationError, InMemoryEventSink, ProviderError, RequestError, SessionContext,
};

enum Scripted {
    Reply(ProviderReply),
    Fail(ProviderError),
}

/// Deterministic provider: answers are drained in submission order, and
/// every request it saw is recorded for later assertions.
#[derive(Default)]
struct ScriptedProvider {
    script: Mutex<VecDeque<Scripted>>,
    seen: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedProvider {
    fn push_structured(&self, value: Value) {
        self.script
            .lock()
            .unwrap()
            .push_back(Scripted::Reply(ProviderReply::Structured(value)));
    }

    fn push_capability_call(&self, capability: &str) {
        self.script.lock().unwrap().push_back(Scripted::Reply(ProviderReply::InvokeCapability {
            capability: capability.into(),
            arguments: Value::Null,
        }));
    }

    fn push_failure(&self, error: ProviderError) {
        self.script.lock().unwrap().push_back(Scripted::Fail(error));
    }

    fn seen(&self) -> Vec<ProviderRequest> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl InferenceProvider for ScriptedProvider {
    async fn invoke(
        &self,
        request: ProviderRequest,
        _context: &SessionContext,
    ) -> Result<ProviderReply, ProviderError> {
        self.seen.lock().unwrap().push(request);
        match self.script.lock().unwrap().pop_front() {
            Some(Scripted::Reply(reply)) => Ok(reply),
            Some(Scripted::Fail(error)) => Err(error),
            None => Err(ProviderError::model("provider script exhausted")),
        }
    }
}

fn controller(
    provider: Arc<ScriptedProvider>,
) -> (HandoffController, InMemoryEventSink) {
    let sink = InMemoryEventSink::default();
    let controller = HandoffController::new(
        Arc::new(support_directory().expect("directory builds")),
        Arc::new(support_registry().expect("registry builds")),
        provider,
        PolicyConfig { retry_budget: 1, capability_rounds: 4 },
    )
    .expect("controller builds")
    .with_sink(Arc::new(sink.clone()));
    (controller, sink)
}

fn classification(category: &str, target: &str) -> Value {
    json!({"category": category, "target": target})
}

fn guardrail_pass() -> Value {
    json!({"violation_detected": false, "reasoning": "no apology language present"})
}

fn guardrail_fail() -> Value {
    json!({"violation_detected": true, "reasoning": "the answer contains 'sorry'"})
}

#[tokio::test]
async fn scenario_a_privileged_billing_request_uses_refund_and_is_accepted() {
    let provider = Arc::new(ScriptedProvider::default());
    provider.push_structured(classification("billing", "billing"));
    provider.push_capability_call("refund");
    provider.push_structured(json!({"response": "Refund initiated for your last charge."}));
    provider.push_structured(guardrail_pass());

    let (controller, sink) = controller(Arc::clone(&provider));
    let mut handle =
        controller.start_request("please refund my last charge", SessionContext::new("Ana", true));
    let stream = handle.events().expect("stream is available once");

    let outcome = handle.result().await.expect("request completes");
    assert_eq!(
        outcome.disposition,
        Disposition::Accepted { answer: "Refund initiated for your last charge.".to_string() }
    );
    assert_eq!(outcome.context.category(), Some(Category::Billing));

    assert_eq!(
        sink.kinds(),
        vec![
            "request_started",
            "classification_result",
            "handoff",
            "capability_invoked",
            "candidate_produced",
            "guardrail_result",
            "request_accepted",
        ]
    );

    // The live stream observes the same ordered sequence as the audit copy.
    let streamed: Vec<_> = stream.drain().await.iter().map(|event| event.kind.name()).collect();
    assert_eq!(streamed, sink.kinds());

    // The refund capability was visible to the billing responder because the
    // caller is privileged; restart_service stayed hidden (category billing).
    let responder_request = &provider.seen()[1];
    let names = responder_request.capability_names();
    assert!(names.contains(&"refund".into()));
    assert!(names.contains(&"general_info".into()));
    assert!(!names.contains(&"restart_service".into()));
}

#[tokio::test]
async fn scenario_b_unprivileged_billing_request_never_sees_refund() {
    let provider = Arc::new(ScriptedProvider::default());
    provider.push_structured(classification("billing", "billing"));
    provider.push_structured(json!({"response": "A credit has been noted on your account."}));
    provider.push_structured(guardrail_pass());

    let (controller, _sink) = controller(Arc::clone(&provider));
    let handle =
        controller.start_request("I want a refund", SessionContext::new("Bo", false));
    let outcome = handle.result().await.expect("request completes");

    assert!(matches!(outcome.disposition, Disposition::Accepted { .. }));
    let names = provider.seen()[1].capability_names();
    assert_eq!(names, vec!["general_info".into()]);
}

#[tokio::test]
async fn scenario_c_guardrail_failure_then_pass_emits_retry_sequence() {
    let provider = Arc::new(ScriptedProvider::default());
    provider.push_structured(classification("general", "general"));
    provider.push_structured(json!({"response": "Sorry, I cannot help with that."}));
    provider.push_structured(guardrail_fail());
    provider.push_structured(json!({"response": "Here is what I can do instead."}));
    provider.push_structured(guardrail_pass());

    let (controller, sink) = controller(Arc::clone(&provider));
    let handle = controller.start_request("help me", SessionContext::new("Cam", false));
    let outcome = handle.result().await.expect("request completes");

    assert_eq!(
        outcome.disposition,
        Disposition::Accepted { answer: "Here is what I can do instead.".to_string() }
    );
    assert_eq!(
        sink.kinds(),
        vec![
            "request_started",
            "classification_result",
            "handoff",
            "candidate_produced",
            "guardrail_result",
            "retry_scheduled",
            "candidate_produced",
            "guardrail_result",
            "request_accepted",
        ]
    );

    // The retry re-invokes the same responder with the failure reason noted.
    let retry_request = &provider.seen()[3];
    assert!(retry_request.instructions.contains("no_apology"));
    assert!(retry_request.instructions.contains("sorry"));
}

#[tokio::test]
async fn scenario_d_two_targets_fail_classification_without_delegation() {
    let provider = Arc::new(ScriptedProvider::default());
    provider.push_structured(json!({
        "category": "billing",
        "target": ["billing", "technical"],
    }));

    let (controller, sink) = controller(Arc::clone(&provider));
    let handle = controller.start_request("hello", SessionContext::new("Dee", false));
    let outcome = handle.result().await.expect("request completes");

    assert_eq!(
        outcome.disposition,
        Disposition::Failed {
            error: ClassificationError::AmbiguousTarget { count: 2 }.into(),
        }
    );

    let kinds = sink.kinds();
    assert_eq!(kinds, vec!["request_started", "request_failed"]);
    // Only the router was ever invoked; no responder execution happened.
    assert_eq!(provider.seen().len(), 1);
}

#[tokio::test]
async fn retry_budget_of_one_never_allows_a_third_attempt() {
    let provider = Arc::new(ScriptedProvider::default());
    provider.push_structured(classification("general", "general"));
    provider.push_structured(json!({"response": "Sorry about that."}));
    provider.push_structured(guardrail_fail());
    provider.push_structured(json!({"response": "So sorry, again."}));
    provider.push_structured(guardrail_fail());

    let (controller, sink) = controller(Arc::clone(&provider));
    let handle = controller.start_request("help", SessionContext::new("Eve", false));
    let outcome = handle.result().await.expect("request completes");

    assert!(matches!(
        outcome.disposition,
        Disposition::Failed { error: RequestError::GuardrailExhausted { .. } }
    ));
    // 1 classification + 2 executions + 2 guardrail judgments, never more.
    assert_eq!(provider.seen().len(), 5);
    assert_eq!(
        sink.kinds(),
        vec![
            "request_started",
            "classification_result",
            "handoff",
            "candidate_produced",
            "guardrail_result",
            "retry_scheduled",
            "candidate_produced",
            "guardrail_result",
            "request_failed",
        ]
    );
}

#[tokio::test]
async fn invoking_a_gated_out_capability_is_a_violation_not_a_success() {
    let provider = Arc::new(ScriptedProvider::default());
    provider.push_structured(classification("billing", "billing"));
    // Bo is not privileged, so refund is outside the gated view.
    provider.push_capability_call("refund");

    let (controller, sink) = controller(Arc::clone(&provider));
    let handle = controller.start_request("refund me", SessionContext::new("Bo", false));
    let outcome = handle.result().await.expect("request completes");

    assert_eq!(
        outcome.disposition,
        Disposition::Failed {
            error: RequestError::CapabilityViolation {
                responder: "billing".into(),
                capability: "refund".into(),
            },
        }
    );
    assert!(!sink.kinds().contains(&"capability_invoked"));
    assert_eq!(sink.kinds().last().copied(), Some("request_failed"));
}

#[tokio::test]
async fn candidate_violating_the_output_shape_fails_the_request() {
    let provider = Arc::new(ScriptedProvider::default());
    provider.push_structured(classification("general", "general"));
    provider.push_structured(json!({"reply": "wrong field name"}));

    let (controller, sink) = controller(Arc::clone(&provider));
    let handle = controller.start_request("hello", SessionContext::new("Fay", false));
    let outcome = handle.result().await.expect("request completes");

    assert!(matches!(
        outcome.disposition,
        Disposition::Failed { error: RequestError::OutputShape(_) }
    ));
    assert_eq!(sink.kinds().last().copied(), Some("request_failed"));
}

#[tokio::test]
async fn provider_failure_during_execution_is_surfaced_typed() {
    let provider = Arc::new(ScriptedProvider::default());
    provider.push_structured(classification("general", "general"));
    provider.push_failure(ProviderError::timeout("deadline exceeded"));

    let (controller, _sink) = controller(Arc::clone(&provider));
    let handle = controller.start_request("hello", SessionContext::new("Gil", false));
    let outcome = handle.result().await.expect("request completes");

    assert_eq!(
        outcome.disposition,
        Disposition::Failed { error: ProviderError::timeout("deadline exceeded").into() }
    );
}

#[tokio::test]
async fn gating_is_request_fresh_across_consecutive_requests() {
    let provider = Arc::new(ScriptedProvider::default());
    // Request 1: triaged technical, restart_service becomes visible.
    provider.push_structured(classification("technical", "technical"));
    provider.push_structured(json!({"response": "Restart scheduled."}));
    provider.push_structured(guardrail_pass());
    // Request 2: same session, triaged billing, restart_service hidden again.
    provider.push_structured(classification("billing", "billing"));
    provider.push_structured(json!({"response": "Invoice resent."}));
    provider.push_structured(guardrail_pass());

    let (controller, _sink) = controller(Arc::clone(&provider));

    let handle = controller.start_request("my service is down", SessionContext::new("Hal", false));
    let outcome = handle.result().await.expect("first request completes");
    assert!(matches!(outcome.disposition, Disposition::Accepted { .. }));
    assert!(provider.seen()[1].capability_names().contains(&"restart_service".into()));

    let mut context = outcome.context;
    context.begin_request();
    let handle = controller.start_request("resend my invoice", context);
    let outcome = handle.result().await.expect("second request completes");
    assert!(matches!(outcome.disposition, Disposition::Accepted { .. }));
    assert!(!provider.seen()[4].capability_names().contains(&"restart_service".into()));
}

#[tokio::test]
async fn identical_inputs_with_a_deterministic_provider_are_idempotent() {
    let run = |answer: &'static str| async move {
        let provider = Arc::new(ScriptedProvider::default());
        provider.push_structured(classification("billing", "billing"));
        provider.push_structured(json!({"response": answer}));
        provider.push_structured(guardrail_pass());

        let (controller, sink) = controller(provider);
        let handle =
            controller.start_request("refund please", SessionContext::new("Ana", true));
        let outcome = handle.result().await.expect("request completes");
        (outcome.disposition, outcome.context.category(), sink.kinds())
    };

    let first = run("The refund is on its way.").await;
    let second = run("The refund is on its way.").await;
    assert_eq!(first, second);
}

#[tokio::test]
async fn cancellation_stops_events_and_reports_a_typed_error() {
    struct StalledProvider;

    #[async_trait]
    impl InferenceProvider for StalledProvider {
        async fn invoke(
            &self,
            _request: ProviderRequest,
            _context: &SessionContext,
        ) -> Result<ProviderReply, ProviderError> {
            std::future::pending::<()>().await;
            unreachable!("pending future never resolves")
        }
    }

    let controller = HandoffController::new(
        Arc::new(support_directory().expect("directory builds")),
        Arc::new(support_registry().expect("registry builds")),
        Arc::new(StalledProvider),
        PolicyConfig { retry_budget: 1, capability_rounds: 4 },
    )
    .expect("controller builds");

    let mut handle = controller.start_request("hello", SessionContext::new("Ida", false));
    let mut stream = handle.events().expect("stream is available once");

    let first = stream.next().await.expect("request_started arrives before cancel");
    assert_eq!(first.kind.name(), "request_started");

    handle.cancel();

    // The stream closes without a terminal event and the result is typed.
    let remaining = stream.drain().await;
    assert!(remaining.iter().all(|event| !event.is_terminal()));
    assert_eq!(handle.result().await.expect_err("cancelled"), RequestError::Canceled);
}
