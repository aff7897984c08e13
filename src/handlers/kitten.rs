use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD};
use serde_json::{Value, json};

use crate::{
    hook::{Handler, HookContext, HookResult, Invocation},
    models::{FormSpec, HookResponse, form::UiElement},
    outbound::OutboundRequest,
};

/// Shows a random cat picture.
pub struct Kitten;

#[async_trait]
impl Handler for Kitten {
    fn name(&self) -> &'static str {
        "kitten"
    }

    fn description(&self) -> &'static str {
        "A picture of a kitten"
    }

    async fn handle(&self, invocation: &Invocation, ctx: &HookContext<'_>) -> HookResult {
        if invocation.is_configure() {
            return Ok(Some(super::no_settings()));
        }

        let image = ctx
            .transport
            .send(OutboundRequest::get(ctx.services.kitten_url.as_str()))
            .await?
            .error_for_status()?;

        Ok(Some(HookResponse::form(
            FormSpec::new()
                .default_value(json!({
                    "src": format!("data:image/jpg;base64,{}", STANDARD.encode(&image.body)),
                    "text": "My sweetest kitten"
                }))
                .schema(Value::Object(Default::default()))
                .ui_schema(UiElement::vertical(vec![UiElement::image()])),
        )))
    }
}
