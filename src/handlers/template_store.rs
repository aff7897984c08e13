use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::{
    hook::{Handler, HookContext, HookResult, Invocation},
    models::HookResponse,
};

const TEMPLATE_ID: &str = "custom";
const TEMPLATE_VERSION: &str = "0.1";

/// A one-entry extension store answering the host's template catalog calls.
pub struct TemplateStore;

#[derive(Debug, Deserialize)]
struct StoreCall {
    #[serde(default)]
    name: Option<String>,
}

fn hook_template() -> Value {
    json!({
        "events": [],
        "config": {
            "code": "exports.rossum_hook_request_handler = async ({ payload }) => {};",
            "runtime": "nodejs22.x"
        },
        "description": "Custom added extension.",
        "name": "Custom added extension",
        "type": "function",
        "guide": "",
        "extension_image_url": "https://surypavel.github.io/r8store/static/thermo.webp",
        "store_description": concat!(
            "Check for sender_address of a current annotation and check the weather ",
            "(temperature). This shows how you can communicate with external APIs."
        ),
        "hook_integrations": []
    })
}

#[async_trait]
impl Handler for TemplateStore {
    fn name(&self) -> &'static str {
        "template_store"
    }

    fn description(&self) -> &'static str {
        "Serve a custom extension template to the store"
    }

    async fn handle(&self, invocation: &Invocation, _ctx: &HookContext<'_>) -> HookResult {
        if invocation.is_configure() {
            return Ok(Some(super::no_settings()));
        }
        let call: StoreCall = invocation.request.payload_as()?;

        let reply = match call.name.as_deref() {
            Some("get_hook_template_list") => {
                json!([{ "id": TEMPLATE_ID, "hook_template": hook_template() }])
            }
            Some("get_hook_template_version") => json!([TEMPLATE_VERSION]),
            Some("checkout_hook_template") => hook_template(),
            _ => return Ok(None),
        };
        Ok(Some(HookResponse::Template(reply)))
    }
}
