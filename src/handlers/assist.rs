use async_trait::async_trait;
use reqwest::Method;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::{
    hook::{Credential, Handler, HookContext, HookResult, Invocation, PLATFORM_API},
    models::{
        FormSpec, HookResponse,
        form::{ObjectSchema, UiElement, string},
    },
    outbound::{RestApi, Scheme},
};

/// Free-form question box answered by the platform assistant.
pub struct Assist;

#[derive(Debug, Deserialize)]
struct Chat {
    #[serde(default)]
    results: Vec<ChatResult>,
}

#[derive(Debug, Deserialize)]
struct ChatResult {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    message: Option<String>,
}

impl Chat {
    fn answer(&self) -> Option<&str> {
        self.results
            .iter()
            .find(|result| result.kind != "prompt")
            .and_then(|result| result.message.as_deref())
    }

    fn prompt(&self) -> Option<&str> {
        self.results
            .iter()
            .find(|result| result.kind == "prompt")
            .and_then(|result| result.message.as_deref())
    }
}

#[async_trait]
impl Handler for Assist {
    fn name(&self) -> &'static str {
        "assist"
    }

    fn description(&self) -> &'static str {
        "Ask the platform assistant anything"
    }

    fn required_credentials(&self) -> &'static [Credential] {
        PLATFORM_API
    }

    async fn handle(&self, invocation: &Invocation, ctx: &HookContext<'_>) -> HookResult {
        if invocation.is_configure() {
            return Ok(Some(super::no_settings()));
        }
        let request = &invocation.request;

        let Some(question) = request.form_str("prompt") else {
            return Ok(Some(ask_form(None, None, request.hook.clone())));
        };

        let api = RestApi::from_request(ctx.transport, request)?;
        let response = api
            .send(
                Method::POST,
                "internal/assist/chat",
                Scheme::Bearer,
                Some(json!({ "prompt": question })),
            )
            .await?;
        if response.status != 200 {
            return Ok(Some(HookResponse::error("O wee, there was some error :(")));
        }

        let chat: Chat = response.json()?;
        let Some(answer) = chat.answer() else {
            return Ok(Some(HookResponse::error("O wee, copilot does not know :(")));
        };
        let prompt = chat.prompt().unwrap_or(question);

        Ok(Some(ask_form(Some(answer), Some(prompt), request.hook.clone())))
    }
}

fn ask_form(answer: Option<&str>, prompt: Option<&str>, hook: Option<Value>) -> HookResponse {
    let mut elements: Vec<UiElement> = answer.map(UiElement::prompt_result).into_iter().collect();
    elements.push(UiElement::control("prompt").multiline());

    HookResponse::form(
        FormSpec::new()
            .width(700)
            .hook(hook)
            .default_value(json!({ "prompt": prompt }))
            .schema(ObjectSchema::new().property("prompt", string()).build())
            .ui_schema(UiElement::group(elements).label("🌟 Ask anything!")),
    )
}
