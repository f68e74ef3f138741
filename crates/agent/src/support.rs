//! The stock support-desk configuration: three specialist responders behind
//! a triage router, and the capabilities they share.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use switchboard_core::{
    Capability, CapabilityFailure, CapabilityHandler, CapabilityName, CapabilityRegistry,
    Category, DirectoryError, EnablementRule, FieldKind, OutputContract, RegistryError, Responder,
    ResponderDirectory, SessionContext,
};

use crate::guardrails::apology_guardrail;
use crate::router::triage_instructions;

struct RefundHandler;

#[async_trait]
impl CapabilityHandler for RefundHandler {
    async fn invoke(&self, context: &SessionContext) -> Result<Value, CapabilityFailure> {
        Ok(json!({
            "message": format!(
                "Refund for {} initiated; expect 3-5 business days.",
                context.identity()
            ),
        }))
    }
}

struct RestartServiceHandler;

#[async_trait]
impl CapabilityHandler for RestartServiceHandler {
    async fn invoke(&self, context: &SessionContext) -> Result<Value, CapabilityFailure> {
        Ok(json!({
            "message": format!("Service for {} restarted successfully.", context.identity()),
        }))
    }
}

struct GeneralInfoHandler;

#[async_trait]
impl CapabilityHandler for GeneralInfoHandler {
    async fn invoke(&self, _context: &SessionContext) -> Result<Value, CapabilityFailure> {
        Ok(json!({
            "message": "How else can I assist - billing, technical, or general?",
        }))
    }
}

/// Register the shared capability set: `refund` for privileged callers,
/// `restart_service` for requests triaged as technical, `general_info`
/// unconditionally.
pub fn support_registry() -> Result<CapabilityRegistry, RegistryError> {
    let mut registry = CapabilityRegistry::new();
    registry.register(Capability::new(
        "refund",
        "Initiate a refund for the caller's most recent charge.",
        EnablementRule::RequirePrivileged,
        Arc::new(RefundHandler),
    ))?;
    registry.register(Capability::new(
        "restart_service",
        "Restart the caller's service instance.",
        EnablementRule::RequireCategory(Category::Technical),
        Arc::new(RestartServiceHandler),
    ))?;
    registry.register(Capability::new(
        "general_info",
        "Offer general assistance and next steps.",
        EnablementRule::Always,
        Arc::new(GeneralInfoHandler),
    ))?;
    Ok(registry)
}

fn shared_capabilities() -> Vec<CapabilityName> {
    vec!["refund".into(), "restart_service".into(), "general_info".into()]
}

/// Build the triage router and the three specialists. Every specialist
/// declares the full shared capability set; the gated view decides what is
/// actually visible per invocation.
pub fn support_directory() -> Result<ResponderDirectory, DirectoryError> {
    let specialists = vec![
        Responder::new(
            "billing",
            "You are the billing specialist. Handle refunds, invoices, and \
             subscription questions. Reply with a JSON object {\"response\": \"...\"}.",
            OutputContract::answer(),
        )
        .with_capabilities(shared_capabilities())
        .with_guardrails(vec![apology_guardrail()]),
        Responder::new(
            "technical",
            "You are the technical specialist. Assist with restarts, connectivity, \
             and error reports. Reply with a JSON object {\"response\": \"...\"}.",
            OutputContract::answer(),
        )
        .with_capabilities(shared_capabilities())
        .with_guardrails(vec![apology_guardrail()]),
        Responder::new(
            "general",
            "You are the general support responder. Answer any general inquiry. \
             Reply with a JSON object {\"response\": \"...\"}.",
            OutputContract::answer(),
        )
        .with_capabilities(shared_capabilities())
        .with_guardrails(vec![apology_guardrail()]),
    ];

    let targets: Vec<_> = specialists.iter().map(|responder| responder.name().clone()).collect();
    let router = Responder::new(
        "triage",
        triage_instructions(&targets),
        OutputContract::object(&[("category", FieldKind::Text), ("target", FieldKind::Text)]),
    );

    ResponderDirectory::new(router, specialists)
}

#[cfg(test)]
mod tests {
    use switchboard_core::{Category, EnablementRule, SessionContext};

    use super::{support_directory, support_registry};

    #[test]
    fn registry_holds_the_three_shared_capabilities() {
        let registry = support_registry().expect("registry builds");
        assert_eq!(registry.len(), 3);
        assert_eq!(
            registry.get(&"refund".into()).expect("refund").rule(),
            EnablementRule::RequirePrivileged
        );
        assert_eq!(
            registry.get(&"restart_service".into()).expect("restart").rule(),
            EnablementRule::RequireCategory(Category::Technical)
        );
        assert_eq!(
            registry.get(&"general_info".into()).expect("info").rule(),
            EnablementRule::Always
        );
    }

    #[test]
    fn directory_routes_to_three_specialists() {
        let directory = support_directory().expect("directory builds");
        assert_eq!(directory.len(), 3);
        assert_eq!(directory.router().name().as_str(), "triage");
        for name in ["billing", "technical", "general"] {
            let responder = directory.resolve(&name.into()).expect("specialist exists");
            assert_eq!(responder.guardrails().len(), 1);
            assert_eq!(responder.guardrails()[0].name, "no_apology");
            assert_eq!(responder.capabilities().len(), 3);
        }
    }

    #[test]
    fn router_declares_no_capabilities() {
        let directory = support_directory().expect("directory builds");
        assert!(directory.router().capabilities().is_empty());
    }

    #[tokio::test]
    async fn refund_handler_names_the_caller() {
        let registry = support_registry().expect("registry builds");
        let context = SessionContext::new("Ana", true);
        let payload = registry
            .get(&"refund".into())
            .expect("refund")
            .invoke(&context)
            .await
            .expect("handler succeeds");
        assert!(payload["message"].as_str().expect("message").contains("Ana"));
    }
}
