use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::{
    hook::{
        FailureSurface, Handler, HookContext, HookError, HookResult, Invocation, PLATFORM_API,
        ids::last_segment_id, normalize::collect_messages,
    },
    models::{
        FormSpec, HookResponse, Message, MessageKind,
        form::{ObjectSchema, UiElement},
    },
    outbound::{RestApi, Scheme},
};

const DEFAULT_LOCALE: &str = "en";
const DATAPOINT_FIELD: &str = "datapoint";

/// Shows a warning in the locale of the user who last touched the annotation.
pub struct TranslatedMessage;

#[derive(Debug, Deserialize)]
struct User {
    #[serde(default)]
    ui_settings: UiSettings,
}

#[derive(Debug, Default, Deserialize)]
struct UiSettings {
    #[serde(default)]
    locale: Option<String>,
}

#[async_trait]
impl Handler for TranslatedMessage {
    fn name(&self) -> &'static str {
        "translated_message"
    }

    fn description(&self) -> &'static str {
        "Warning message translated to the reviewing user's locale"
    }

    fn required_credentials(&self) -> &'static [crate::hook::Credential] {
        PLATFORM_API
    }

    fn failure_surface(&self) -> FailureSurface {
        FailureSurface::Messages
    }

    async fn handle(&self, invocation: &Invocation, ctx: &HookContext<'_>) -> HookResult {
        let request = &invocation.request;
        if invocation.is_configure() {
            return Ok(Some(configure_form(request.setting("locales"))));
        }

        let Some(user_id) = request
            .annotation
            .as_ref()
            .and_then(|annotation| annotation.modified_by.as_deref())
            .and_then(last_segment_id)
        else {
            return Err(HookError::MissingInput("annotation.modified_by".to_string()));
        };

        let api = RestApi::from_request(ctx.transport, request)?;
        let user: User = api.get_json(&format!("users/{user_id}"), Scheme::Bearer).await?;
        let locale = user.ui_settings.locale.as_deref().unwrap_or(DEFAULT_LOCALE);

        Ok(Some(collect_messages(
            request.payloads.iter().map(|payload| message_for(payload, locale)),
        )))
    }
}

fn configure_form(locales: Option<&Value>) -> HookResponse {
    let locales: Vec<&str> = locales
        .and_then(Value::as_array)
        .map(|locales| locales.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();
    if locales.is_empty() {
        return HookResponse::info(
            "Configure the locales to translate to in the extension settings (settings.locales).",
        );
    }

    let fields: Vec<&str> = locales.into_iter().chain([DATAPOINT_FIELD]).collect();
    let schema = fields
        .iter()
        .fold(ObjectSchema::new(), |schema, field| schema.templated(*field))
        .build();
    let layout =
        UiElement::vertical(fields.iter().map(|field| UiElement::templated(field)).collect());

    HookResponse::form(FormSpec::new().schema(schema).ui_schema(layout))
}

fn message_for(payload: &Value, locale: &str) -> Option<Message> {
    let content = payload
        .get(locale)
        .and_then(Value::as_str)
        .filter(|content| !content.is_empty())?;
    let id = payload
        .get(DATAPOINT_FIELD)
        .filter(|id| is_truthy(id))
        .cloned()
        .unwrap_or_else(|| Value::from("all"));
    Some(Message::new(MessageKind::Warning, content).with_id(id))
}

/// `null`, `false`, zero and `""` select no datapoint.
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|number| number != 0.0),
        Value::String(text) => !text.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
