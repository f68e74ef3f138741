//! OpenAI-compatible `chat/completions` client for the inference provider
//! seam. Any endpoint speaking that protocol works; the base URL, model,
//! and API-key env var come from configuration.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};

use switchboard_agent::{InferenceProvider, ProviderReply, ProviderRequest};
use switchboard_core::config::{ConfigError, ProviderConfig};
use switchboard_core::{ProviderError, SessionContext};

pub struct HttpCompletionsProvider {
    client: Client,
    base_url: String,
    model: String,
    api_key: SecretString,
}

impl HttpCompletionsProvider {
    pub fn from_config(config: &ProviderConfig) -> Result<Self, ConfigError> {
        let api_key = config.api_key.clone().ok_or_else(|| {
            ConfigError::Validation(format!(
                "no API key available: set the `{}` environment variable",
                config.api_key_env
            ))
        })?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|error| {
                ConfigError::Validation(format!("failed to build http client: {error}"))
            })?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key,
        })
    }

    fn body(&self, request: &ProviderRequest, context: &SessionContext) -> Value {
        let system = format!(
            "{}\n\nCaller identity: {}. Privileged caller: {}.",
            request.instructions,
            context.identity(),
            context.is_privileged()
        );
        let mut messages = vec![
            json!({"role": "system", "content": system}),
            json!({"role": "user", "content": request.input}),
        ];

        for (index, exchange) in request.exchanges.iter().enumerate() {
            let call_id = format!("call-{index}");
            messages.push(json!({
                "role": "assistant",
                "content": Value::Null,
                "tool_calls": [{
                    "id": call_id,
                    "type": "function",
                    "function": {
                        "name": exchange.capability.as_str(),
                        "arguments": exchange.arguments.to_string(),
                    },
                }],
            }));
            messages.push(json!({
                "role": "tool",
                "tool_call_id": call_id,
                "content": exchange.result.to_string(),
            }));
        }

        let mut body = json!({
            "model": self.model,
            "messages": messages,
            "response_format": {"type": "json_object"},
        });
        if !request.capabilities.is_empty() {
            let tools: Vec<Value> = request
                .capabilities
                .iter()
                .map(|spec| {
                    json!({
                        "type": "function",
                        "function": {
                            "name": spec.name.as_str(),
                            "description": spec.description,
                            "parameters": {"type": "object", "properties": {}},
                        },
                    })
                })
                .collect();
            body["tools"] = Value::Array(tools);
        }
        body
    }
}

#[async_trait]
impl InferenceProvider for HttpCompletionsProvider {
    async fn invoke(
        &self,
        request: ProviderRequest,
        context: &SessionContext,
    ) -> Result<ProviderReply, ProviderError> {
        let body = self.body(&request, context);
        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(self.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|error| {
                if error.is_timeout() {
                    ProviderError::timeout(error.to_string())
                } else {
                    ProviderError::transport(error.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(ProviderError::model(format!("provider returned {status}: {detail}")));
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|error| ProviderError::transport(error.to_string()))?;
        reply_from_message(&payload["choices"][0]["message"])
    }
}

/// Map one completion message to the provider reply contract: a tool call
/// becomes a capability invocation request, anything else must carry JSON
/// content.
fn reply_from_message(message: &Value) -> Result<ProviderReply, ProviderError> {
    if let Some(tool_calls) = message["tool_calls"].as_array() {
        let call = tool_calls
            .first()
            .ok_or_else(|| ProviderError::model("empty tool_calls array"))?;
        let name = call["function"]["name"]
            .as_str()
            .ok_or_else(|| ProviderError::model("tool call is missing a function name"))?;
        let arguments = call["function"]["arguments"]
            .as_str()
            .and_then(|raw| serde_json::from_str(raw).ok())
            .unwrap_or(Value::Null);
        return Ok(ProviderReply::InvokeCapability { capability: name.into(), arguments });
    }

    let content = message["content"]
        .as_str()
        .ok_or_else(|| ProviderError::model("completion message has no content"))?;
    Ok(ProviderReply::Structured(parse_json_content(content)?))
}

fn parse_json_content(content: &str) -> Result<Value, ProviderError> {
    let trimmed = content.trim();
    let stripped = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .map(str::trim)
        .unwrap_or(trimmed);

    serde_json::from_str(stripped).map_err(|error| {
        ProviderError::model(format!("completion content is not valid JSON: {error}"))
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use switchboard_agent::ProviderReply;

    use super::{parse_json_content, reply_from_message};

    #[test]
    fn content_message_parses_to_structured_reply() {
        let message = json!({"content": "{\"response\": \"All set.\"}"});
        let reply = reply_from_message(&message).expect("parses");
        assert_eq!(reply, ProviderReply::Structured(json!({"response": "All set."})));
    }

    #[test]
    fn fenced_json_content_is_unwrapped() {
        let value = parse_json_content("```json\n{\"response\": \"ok\"}\n```").expect("parses");
        assert_eq!(value, json!({"response": "ok"}));
    }

    #[test]
    fn tool_call_maps_to_capability_invocation() {
        let message = json!({
            "content": null,
            "tool_calls": [{
                "id": "call-0",
                "type": "function",
                "function": {"name": "refund", "arguments": "{}"},
            }],
        });
        let reply = reply_from_message(&message).expect("parses");
        assert_eq!(
            reply,
            ProviderReply::InvokeCapability { capability: "refund".into(), arguments: json!({}) }
        );
    }

    #[test]
    fn non_json_content_is_a_model_error() {
        let message = json!({"content": "plain prose, no JSON"});
        let error = reply_from_message(&message).expect_err("must fail");
        assert!(error.message.contains("not valid JSON"));
    }
}
