//! Post-hoc policy checks over candidate answers.
//!
//! A guardrail is a bounded, non-recursive secondary classification: one
//! provider invocation with fixed instructions, the candidate text as input,
//! and no capabilities. Guardrails cannot trigger handoffs or further
//! guardrails.

use serde_json::Value;
use switchboard_core::{
    GuardrailSpec, ProviderError, RequestError, SessionContext,
};

use crate::provider::{InferenceProvider, ProviderReply, ProviderRequest};

/// Outcome of judging one candidate against one guardrail.
#[derive(Clone, Debug, PartialEq)]
pub struct GuardrailVerdict {
    pub guardrail: String,
    pub passed: bool,
    pub reason: String,
    pub findings: Value,
}

pub struct GuardrailValidator {
    spec: GuardrailSpec,
}

impl GuardrailValidator {
    pub fn new(spec: GuardrailSpec) -> Self {
        Self { spec }
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    pub async fn judge(
        &self,
        provider: &dyn InferenceProvider,
        candidate: &str,
        context: &SessionContext,
    ) -> Result<GuardrailVerdict, RequestError> {
        let request = ProviderRequest::new(self.spec.instructions.clone(), candidate.to_string());
        let reply = provider.invoke(request, context).await?;

        let findings = match reply {
            ProviderReply::Structured(value) => value,
            ProviderReply::InvokeCapability { capability, .. } => {
                return Err(ProviderError::model(format!(
                    "guardrail judge `{}` attempted to invoke capability `{capability}`",
                    self.spec.name
                ))
                .into());
            }
        };

        GuardrailSpec::judge_contract().validate(&findings)?;

        let violation_detected = findings["violation_detected"].as_bool().unwrap_or(false);
        let reason = findings["reasoning"].as_str().unwrap_or_default().to_string();

        Ok(GuardrailVerdict {
            guardrail: self.spec.name.clone(),
            passed: !violation_detected,
            reason,
            findings,
        })
    }
}

/// The stock content-policy check: flag answers containing apology language.
pub fn apology_guardrail() -> GuardrailSpec {
    GuardrailSpec::new(
        "no_apology",
        "Inspect the given text and determine whether it contains any apology \
         language (such as the word 'sorry'). Return a JSON object with keys: \
         violation_detected (true if any apology is found, else false) and \
         reasoning (a brief justification).",
    )
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use switchboard_core::{ProviderError, RequestError, SessionContext};

    use super::{apology_guardrail, GuardrailValidator};
    use crate::provider::{InferenceProvider, ProviderReply, ProviderRequest};

    struct FixedJudge(Value);

    #[async_trait]
    impl InferenceProvider for FixedJudge {
        async fn invoke(
            &self,
            _request: ProviderRequest,
            _context: &SessionContext,
        ) -> Result<ProviderReply, ProviderError> {
            Ok(ProviderReply::Structured(self.0.clone()))
        }
    }

    #[tokio::test]
    async fn detection_flag_maps_to_failed_verdict() {
        let validator = GuardrailValidator::new(apology_guardrail());
        let provider = FixedJudge(json!({
            "violation_detected": true,
            "reasoning": "the answer opens with 'sorry'",
        }));
        let context = SessionContext::new("Ana", true);

        let verdict = validator
            .judge(&provider, "Sorry, the refund already went out.", &context)
            .await
            .expect("judge succeeds");

        assert!(!verdict.passed);
        assert_eq!(verdict.guardrail, "no_apology");
        assert!(verdict.reason.contains("sorry"));
    }

    #[tokio::test]
    async fn clean_answer_passes() {
        let validator = GuardrailValidator::new(apology_guardrail());
        let provider = FixedJudge(json!({
            "violation_detected": false,
            "reasoning": "no apology language present",
        }));
        let context = SessionContext::new("Ana", true);

        let verdict = validator
            .judge(&provider, "Your refund is on its way.", &context)
            .await
            .expect("judge succeeds");
        assert!(verdict.passed);
    }

    #[tokio::test]
    async fn malformed_judge_output_is_a_shape_error() {
        let validator = GuardrailValidator::new(apology_guardrail());
        let provider = FixedJudge(json!({"has_apology": true}));
        let context = SessionContext::new("Ana", true);

        let error = validator
            .judge(&provider, "any answer", &context)
            .await
            .expect_err("must fail");
        assert!(matches!(error, RequestError::OutputShape(_)));
    }

    #[tokio::test]
    async fn judge_requesting_a_capability_is_provider_misbehavior() {
        struct CapabilityHungryJudge;

        #[async_trait]
        impl InferenceProvider for CapabilityHungryJudge {
            async fn invoke(
                &self,
                _request: ProviderRequest,
                _context: &SessionContext,
            ) -> Result<ProviderReply, ProviderError> {
                Ok(ProviderReply::InvokeCapability {
                    capability: "refund".into(),
                    arguments: Value::Null,
                })
            }
        }

        let validator = GuardrailValidator::new(apology_guardrail());
        let context = SessionContext::new("Ana", true);
        let error = validator
            .judge(&CapabilityHungryJudge, "any answer", &context)
            .await
            .expect_err("must fail");
        assert!(matches!(error, RequestError::Provider(_)));
    }
}
