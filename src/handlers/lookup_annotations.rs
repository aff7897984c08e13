use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::{
    hook::{Credential, Handler, HookContext, HookResult, Invocation, PLATFORM_API},
    models::{HookResponse, LookupOption, LookupResult},
    outbound::{RestApi, Scheme},
};

const SEARCH_PATH: &str = "annotations/search?page_size=100";

/// Lookup field whose options are annotations still in the review pipeline.
pub struct LookupAnnotations;

#[derive(Debug, Deserialize)]
struct LookupPayload {
    value_key: String,
    label_key: String,
}

fn open_annotations() -> Value {
    json!({
        "query": {
            "$and": [
                { "status": { "$in": ["to_review", "reviewing", "importing", "failed_import"] } },
                { "status": { "$nin": ["purged", "created", "split"] } }
            ]
        }
    })
}

#[async_trait]
impl Handler for LookupAnnotations {
    fn name(&self) -> &'static str {
        "lookup_annotations"
    }

    fn description(&self) -> &'static str {
        "Lookup options from annotations awaiting review"
    }

    fn required_credentials(&self) -> &'static [Credential] {
        PLATFORM_API
    }

    async fn handle(&self, invocation: &Invocation, ctx: &HookContext<'_>) -> HookResult {
        if invocation.is_configure() {
            return Ok(Some(super::no_settings()));
        }

        let payload: LookupPayload = invocation.request.payload_as()?;
        let api = RestApi::from_request(ctx.transport, &invocation.request)?;
        let data: Value = api
            .search_json(SEARCH_PATH, Scheme::Bearer, open_annotations())
            .await?;
        if let Some(message) = data.get("message") {
            let message = match message {
                Value::String(text) => text.clone(),
                other => other.to_string(),
            };
            return Ok(Some(HookResponse::error(message)));
        }

        let options = data
            .get("results")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default()
            .iter()
            .filter_map(|annotation| {
                Some(LookupOption {
                    value: annotation.get(&payload.value_key)?.clone(),
                    label: annotation.get(&payload.label_key)?.clone(),
                })
            })
            .collect();
        Ok(Some(LookupResult::first_selected(options).into()))
    }
}

#[cfg(test)]
mod tests {
    use reqwest::Method;
    use serde_json::json;

    use crate::{handlers::support, outbound::testing::RecordingTransport};

    const SEARCH: &str = "https://acme.example/api/v1/annotations/search?page_size=100";

    fn execute() -> serde_json::Value {
        json!({
            "base_url": "https://acme.example",
            "rossum_authorization_token": "tok",
            "payload": { "value_key": "id", "label_key": "status" }
        })
    }

    #[tokio::test]
    async fn open_annotations_become_options() {
        let transport = RecordingTransport::new().respond(
            Method::POST,
            SEARCH,
            200,
            json!({ "results": [
                { "id": 11, "status": "to_review" },
                { "id": 12, "status": "importing" }
            ] }),
        );
        let response = support::run("lookup_annotations", &transport, execute()).await;

        assert_eq!(
            response,
            json!({
                "options": [
                    { "value": 11, "label": "to_review" },
                    { "value": 12, "label": "importing" }
                ],
                "value": 11
            })
        );
        let call = &transport.calls()[0];
        assert_eq!(call.url, SEARCH);
        assert_eq!(call.authorization.as_deref(), Some("Bearer tok"));
        assert!(!call.mutating);
        assert_eq!(
            call.body.as_ref().unwrap()["query"]["$and"][1]["status"]["$nin"],
            json!(["purged", "created", "split"])
        );
    }

    #[tokio::test]
    async fn message_in_the_answer_is_an_error() {
        let transport = RecordingTransport::new().respond(
            Method::POST,
            SEARCH,
            200,
            json!({ "message": "Search is unavailable." }),
        );
        let response = support::run("lookup_annotations", &transport, execute()).await;

        assert_eq!(
            response,
            json!({ "intent": { "error": { "message": "Search is unavailable." } } })
        );
    }

    #[tokio::test]
    async fn no_annotations_select_nothing() {
        let transport =
            RecordingTransport::new().respond(Method::POST, SEARCH, 200, json!({ "results": [] }));
        let response = support::run("lookup_annotations", &transport, execute()).await;

        assert_eq!(response, json!({ "options": [], "value": null }));
    }
}
