//! Handlers backed by the platform's internal chatbot endpoint.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::{
    hook::{
        Credential, FailureSurface, Handler, HookContext, HookError, HookResult, Invocation,
        PLATFORM_API,
    },
    models::{
        FormSpec, HookResponse, LookupOption, LookupResult, Message, MessageKind,
        form::{ObjectSchema, UiElement, string_enum},
    },
    outbound::{RestApi, Scheme},
};

const MODELS: [&str; 4] = [
    "anthropic.claude-v2",
    "anthropic.claude-v2:1",
    "anthropic.claude-instant-v1",
    "amazon.titan-text-express-v1",
];
const LOOKUP_MODEL: &str = "anthropic.claude-v2";

#[derive(Debug, Deserialize)]
struct Conversation {
    #[serde(default)]
    messages: Vec<Turn>,
}

#[derive(Debug, Deserialize)]
struct Turn {
    role: String,
    #[serde(default)]
    content: String,
}

#[derive(Debug, Deserialize)]
struct Prompt {
    #[serde(default)]
    model: Option<String>,
    prompt: String,
}

/// Sends one user turn and returns the model's reply.
async fn ask(api: &RestApi<'_>, model: &str, prompt: &str) -> Result<String, HookError> {
    let conversation: Conversation = api
        .post_json(
            "internal/chatbot",
            Scheme::Bearer,
            json!({
                "model": model,
                "messages": [{ "role": "user", "content": prompt }]
            }),
        )
        .await?;
    conversation
        .messages
        .into_iter()
        .find(|turn| turn.role == "system")
        .map(|turn| turn.content)
        .ok_or_else(|| {
            HookError::MalformedUpstream("chatbot reply has no system message".to_string())
        })
}

fn prompt_form(with_model: bool) -> HookResponse {
    let mut schema = ObjectSchema::new();
    let mut elements = Vec::new();
    if with_model {
        let models = MODELS.iter().map(|model| Value::from(*model)).collect();
        schema = schema.property("model", string_enum(models));
        elements.push(UiElement::control("model"));
    }
    schema = schema.templated("prompt");
    elements.push(UiElement::templated("prompt"));

    HookResponse::form(
        FormSpec::new()
            .schema(schema.build())
            .ui_schema(UiElement::vertical(elements)),
    )
}

/// Posts the configured prompt to a model and shows the reply as a message.
pub struct ChatbotMessage;

#[async_trait]
impl Handler for ChatbotMessage {
    fn name(&self) -> &'static str {
        "chatbot_message"
    }

    fn description(&self) -> &'static str {
        "Ask a language model and show its answer on the annotation"
    }

    fn required_credentials(&self) -> &'static [Credential] {
        PLATFORM_API
    }

    fn failure_surface(&self) -> FailureSurface {
        FailureSurface::Messages
    }

    async fn handle(&self, invocation: &Invocation, ctx: &HookContext<'_>) -> HookResult {
        if invocation.is_configure() {
            return Ok(Some(prompt_form(true)));
        }
        let request = &invocation.request;

        let Some(payload) = request.payloads.first() else {
            return Err(HookError::MissingInput("payloads".to_string()));
        };
        let prompt: Prompt = serde_json::from_value(payload.clone())
            .map_err(|err| HookError::InvalidInput(err.to_string()))?;
        let model = prompt.model.as_deref().unwrap_or(LOOKUP_MODEL);

        let api = RestApi::from_request(ctx.transport, request)?;
        let reply = ask(&api, model, &prompt.prompt).await?;

        Ok(Some(HookResponse::Messages(vec![Message::new(MessageKind::Info, reply)])))
    }
}

/// Fills a lookup field with the comma-separated answer to a prompt.
pub struct AiLookup;

#[async_trait]
impl Handler for AiLookup {
    fn name(&self) -> &'static str {
        "ai_lookup"
    }

    fn description(&self) -> &'static str {
        "Lookup options suggested by a language model"
    }

    fn required_credentials(&self) -> &'static [Credential] {
        PLATFORM_API
    }

    async fn handle(&self, invocation: &Invocation, ctx: &HookContext<'_>) -> HookResult {
        if invocation.is_configure() {
            return Ok(Some(prompt_form(false)));
        }
        let request = &invocation.request;
        let prompt: Prompt = request.payload_as()?;

        let api = RestApi::from_request(ctx.transport, request)?;
        let reply = ask(
            &api,
            LOOKUP_MODEL,
            &format!(
                "{}. Separate each entry with comma. Do not add any additional text.",
                prompt.prompt
            ),
        )
        .await?;

        let options = reply
            .split(',')
            .map(str::trim)
            .filter(|option| !option.is_empty())
            .map(|option| LookupOption {
                value: Value::from(option),
                label: Value::from(option),
            })
            .collect();
        Ok(Some(LookupResult::first_selected(options).into()))
    }
}
