use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::{
    hook::{Credential, Handler, HookContext, HookResult, Invocation, PLATFORM_API},
    models::{TerminalIntent, response::Status},
    outbound::{RestApi, Scheme},
};

const FILENAME: &str = "export.csv";

/// Downloads an `id,created_at` CSV of the annotations visible to the caller.
pub struct DownloadReport;

#[derive(Debug, Deserialize)]
struct Search {
    #[serde(default)]
    results: Vec<Found>,
}

#[derive(Debug, Deserialize)]
struct Found {
    id: Value,
    #[serde(default)]
    created_at: Option<String>,
}

fn csv(results: &[Found]) -> String {
    results
        .iter()
        .map(|found| {
            let id = match &found.id {
                Value::String(id) => id.clone(),
                other => other.to_string(),
            };
            format!("{id},{}", found.created_at.as_deref().unwrap_or_default())
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[async_trait]
impl Handler for DownloadReport {
    fn name(&self) -> &'static str {
        "download_report"
    }

    fn description(&self) -> &'static str {
        "Export annotation ids and creation dates as CSV"
    }

    fn required_credentials(&self) -> &'static [Credential] {
        PLATFORM_API
    }

    async fn handle(&self, invocation: &Invocation, ctx: &HookContext<'_>) -> HookResult {
        if invocation.is_configure() {
            return Ok(Some(super::no_settings()));
        }

        let api = RestApi::from_request(ctx.transport, &invocation.request)?;
        let search: Search = api
            .search_json("annotations/search", Scheme::Token, json!({}))
            .await?;

        let intent = TerminalIntent::new(Status::Info {
            message: "Export is being downloaded.".to_string(),
        })
        .with_download(FILENAME, csv(&search.results));
        Ok(Some(intent.into()))
    }
}

#[cfg(test)]
mod tests {
    use reqwest::Method;
    use serde_json::json;

    use crate::{handlers::support, outbound::testing::RecordingTransport};

    #[tokio::test]
    async fn search_results_become_a_csv_download() {
        let transport = RecordingTransport::new().respond(
            Method::POST,
            "https://acme.example/api/v1/annotations/search",
            200,
            json!({ "results": [
                { "id": 1, "created_at": "2024-01-01T00:00:00Z" },
                { "id": 2, "created_at": "2024-01-02T00:00:00Z" }
            ] }),
        );
        let response = support::run(
            "download_report",
            &transport,
            json!({ "base_url": "https://acme.example", "rossum_authorization_token": "tok" }),
        )
        .await;

        assert_eq!(
            response,
            json!({ "intent": {
                "info": { "message": "Export is being downloaded." },
                "download": {
                    "filename": "export.csv",
                    "content": "1,2024-01-01T00:00:00Z\n2,2024-01-02T00:00:00Z"
                }
            } })
        );
        let call = &transport.calls()[0];
        assert_eq!(call.authorization.as_deref(), Some("Token tok"));
        assert!(!call.mutating);
    }

    #[tokio::test]
    async fn missing_base_url_fails_without_calls() {
        let transport = RecordingTransport::new();
        let response = support::run(
            "download_report",
            &transport,
            json!({ "rossum_authorization_token": "tok" }),
        )
        .await;

        assert_eq!(response["intent"]["error"]["message"], "Missing base_url.");
        assert!(transport.calls().is_empty());
    }
}
