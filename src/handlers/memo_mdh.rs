//! Field memory kept in a master-data hub dataset, one row per memory key.

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tracing::{info, warn};

use super::hub::Hub;
use crate::{
    hook::{Handler, HookContext, HookError, HookResult, Invocation},
    models::{
        FormSpec, HookResponse,
        form::{ObjectSchema, UiElement},
    },
};

const RETRIEVE: &str = "retrieve";
const LEARN: &str = "learn";
const CONFIGURE: &str = "configure";
const KEY_COLUMN: &str = "memory_key";
const VALUE_COLUMN: &str = "value";
const CREATED_AT_COLUMN: &str = "created_at";
/// Bookkeeping columns that never surface in `struct`.
const RESERVED_COLUMNS: &[&str] = &[KEY_COLUMN, VALUE_COLUMN, CREATED_AT_COLUMN, "_id"];

pub struct MemoMdh;

#[derive(Debug, Default, Deserialize)]
struct MemoPayload {
    #[serde(default)]
    mode: Option<String>,
    #[serde(default)]
    dataset: Option<String>,
    #[serde(default)]
    key: Option<Value>,
    #[serde(default)]
    value: Option<Value>,
    #[serde(default, rename = "struct")]
    fields: Option<Map<String, Value>>,
}

#[async_trait]
impl Handler for MemoMdh {
    fn name(&self) -> &'static str {
        "memo_mdh"
    }

    fn description(&self) -> &'static str {
        "Remembers and recalls field values in a master-data hub dataset"
    }

    async fn handle(&self, invocation: &Invocation, ctx: &HookContext<'_>) -> HookResult {
        let payload: MemoPayload = match &invocation.request.payload {
            Some(payload) if !payload.is_null() => serde_json::from_value(payload.clone())
                .map_err(|err| HookError::InvalidInput(err.to_string()))?,
            _ => MemoPayload::default(),
        };
        let mode = payload
            .mode
            .as_deref()
            .or(invocation.variant())
            .unwrap_or(RETRIEVE);
        if invocation.is_configure() || mode == CONFIGURE {
            return Ok(Some(configure()));
        }

        let hub = Hub::resolve(&invocation.request, ctx).await?;
        let Some(dataset) = payload.dataset.as_deref().filter(|dataset| !dataset.is_empty()) else {
            warn!("memory dataset not specified");
            return Ok(Some(not_found()));
        };
        let Some(key) = payload.key.as_ref().filter(|key| !is_blank(key)) else {
            warn!("memory key not specified");
            return Ok(Some(not_found()));
        };

        if mode == LEARN {
            let value = payload.value.unwrap_or(Value::Null);
            let fields = payload.fields.unwrap_or_default();
            learn(&hub, ctx, dataset, key, value, fields).await;
            return Ok(Some(HookResponse::Template(json!({}))));
        }

        let recalled = match retrieve(&hub, dataset, key).await {
            Ok(Some(memory)) => memory,
            Ok(None) => not_found(),
            Err(err) => {
                warn!(error = %err, dataset, "memory retrieve failed");
                not_found()
            }
        };
        Ok(Some(recalled))
    }
}

fn configure() -> HookResponse {
    HookResponse::form(
        FormSpec::new()
            .schema(ObjectSchema::new().property("dataset", json!({ "type": "string" })).build())
            .ui_schema(UiElement::vertical(vec![UiElement::control("dataset")])),
    )
}

fn not_found() -> HookResponse {
    HookResponse::Template(json!({ "value": null, "struct": null, "found": false }))
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(text) => text.is_empty(),
        _ => false,
    }
}

async fn retrieve(
    hub: &Hub<'_>,
    dataset: &str,
    key: &Value,
) -> Result<Option<HookResponse>, HookError> {
    let pipeline = json!([
        { "$match": { KEY_COLUMN: { "$eq": key } } },
        { "$limit": 1 }
    ]);
    let response = hub.aggregate_response(dataset, pipeline).await?;
    if response.status == 404 {
        return Ok(None);
    }
    let data: Value = response.error_for_status()?.json()?;
    let Some(record) = data
        .get("results")
        .and_then(Value::as_array)
        .and_then(|results| results.first())
        .and_then(Value::as_object)
    else {
        return Ok(None);
    };

    let fields: Map<String, Value> = record
        .iter()
        .filter(|(column, _)| !RESERVED_COLUMNS.contains(&column.as_str()))
        .map(|(column, value)| (column.clone(), value.clone()))
        .collect();
    let fields = if fields.is_empty() {
        Value::Null
    } else {
        Value::Object(fields)
    };
    Ok(Some(HookResponse::Template(json!({
        "value": record.get(VALUE_COLUMN).cloned().unwrap_or(Value::Null),
        "struct": fields,
        "found": true,
    }))))
}

/// Upserts the memory row. Failures are logged, never surfaced.
async fn learn(
    hub: &Hub<'_>,
    ctx: &HookContext<'_>,
    dataset: &str,
    key: &Value,
    value: Value,
    fields: Map<String, Value>,
) {
    let mut record = Map::new();
    record.insert(KEY_COLUMN.to_string(), key.clone());
    record.insert(VALUE_COLUMN.to_string(), value);
    record.insert(CREATED_AT_COLUMN.to_string(), Value::from(Utc::now().to_rfc3339()));
    record.extend(fields);

    if !ctx.commit {
        info!(dataset, "commit disabled, skipping memory upsert");
        return;
    }
    match hub.upsert(dataset, &[Value::Object(record)], KEY_COLUMN).await {
        Ok(()) => info!(dataset, "memory stored"),
        Err(err) => warn!(error = %err, dataset, "memory learn failed"),
    }
}

#[cfg(test)]
mod tests {
    use reqwest::Method;
    use serde_json::{Value, json};

    use crate::{handlers::support, outbound::testing::RecordingTransport};

    const AGGREGATE: &str = "https://mdh.test/api/v1/data/aggregate";

    fn memo(variant: &str, payload: Value) -> Value {
        json!({
            "variant": variant,
            "secrets": { "token": "mdh" },
            "payload": payload
        })
    }

    #[tokio::test]
    async fn retrieve_splits_value_from_struct() {
        let transport = RecordingTransport::new().respond(
            Method::POST,
            AGGREGATE,
            200,
            json!({ "results": [{
                "_id": "x", "memory_key": "vendor:42", "value": "Acme",
                "created_at": "2026-01-01T00:00:00+00:00", "vat": "CZ1"
            }] }),
        );
        let response = support::run(
            "memo_mdh",
            &transport,
            memo("retrieve", json!({ "dataset": "memory", "key": "vendor:42" })),
        )
        .await;

        assert_eq!(
            response,
            json!({ "value": "Acme", "struct": { "vat": "CZ1" }, "found": true })
        );
        let call = &transport.calls()[0];
        assert!(!call.mutating);
        assert_eq!(
            call.body.as_ref().unwrap()["aggregate"],
            json!([{ "$match": { "memory_key": { "$eq": "vendor:42" } } }, { "$limit": 1 }])
        );
    }

    #[tokio::test]
    async fn retrieve_without_struct_columns_reports_null_struct() {
        let transport = RecordingTransport::new().respond(
            Method::POST,
            AGGREGATE,
            200,
            json!({ "results": [{ "memory_key": "k", "value": 3 }] }),
        );
        let response = support::run(
            "memo_mdh",
            &transport,
            memo("retrieve", json!({ "dataset": "memory", "key": "k" })),
        )
        .await;

        assert_eq!(response, json!({ "value": 3, "struct": null, "found": true }));
    }

    #[tokio::test]
    async fn missing_dataset_or_row_is_not_found() {
        let not_found = json!({ "value": null, "struct": null, "found": false });

        let transport = RecordingTransport::new();
        let response = support::run("memo_mdh", &transport, memo("retrieve", json!({ "key": "k" })))
            .await;
        assert_eq!(response, not_found);
        assert!(transport.calls().is_empty());

        // Unrouted calls answer 404.
        let response = support::run(
            "memo_mdh",
            &transport,
            memo("retrieve", json!({ "dataset": "memory", "key": "k" })),
        )
        .await;
        assert_eq!(response, not_found);

        let failing = RecordingTransport::new().respond(Method::POST, AGGREGATE, 500, json!({}));
        let response = support::run(
            "memo_mdh",
            &failing,
            memo("retrieve", json!({ "dataset": "memory", "key": "k" })),
        )
        .await;
        assert_eq!(response, not_found);
    }

    #[tokio::test]
    async fn payload_mode_overrides_the_variant_and_learn_uploads_a_row() {
        let transport = RecordingTransport::new().respond(
            Method::PATCH,
            "https://mdh.test/api/v1/dataset/memory",
            200,
            json!({}),
        );
        let response = support::run(
            "memo_mdh",
            &transport,
            memo(
                "retrieve",
                json!({
                    "mode": "learn", "dataset": "memory", "key": "vendor:42",
                    "value": "Acme", "struct": { "vat": "CZ1" }
                }),
            ),
        )
        .await;

        assert_eq!(response, json!({}));
        let call = &transport.calls()[0];
        assert!(call.mutating);
        let upload = call.upload.as_ref().unwrap();
        assert_eq!(upload.file_name, "memory_data.json");
        assert!(upload.fields.contains(&("update_or_new", "true".to_string())));
        assert!(upload.fields.contains(&("id_keys", "memory_key".to_string())));

        let rows: Value = serde_json::from_slice(&upload.content).unwrap();
        assert_eq!(rows[0]["memory_key"], "vendor:42");
        assert_eq!(rows[0]["value"], "Acme");
        assert_eq!(rows[0]["vat"], "CZ1");
        assert!(rows[0]["created_at"].as_str().unwrap().contains('T'));
    }

    #[tokio::test]
    async fn learn_respects_commit_and_swallows_failures() {
        let transport = RecordingTransport::new();
        let body = memo("learn", json!({ "dataset": "memory", "key": "k", "value": 1 }));

        let skipped = support::run_with("memo_mdh", &transport, body.clone(), false).await;
        assert_eq!(skipped, json!({}));
        assert!(transport.calls().is_empty());

        let failed = support::run("memo_mdh", &transport, body).await;
        assert_eq!(failed, json!({}));
        assert_eq!(transport.mutating_calls(), 1);
    }

    #[tokio::test]
    async fn configure_asks_for_the_dataset() {
        let transport = RecordingTransport::new();
        let response =
            support::run("memo_mdh", &transport, json!({ "variant": "configure" })).await;

        assert_eq!(
            response["intent"]["form"]["schema"]["properties"]["dataset"],
            json!({ "type": "string" })
        );
        assert!(transport.calls().is_empty());
    }
}
