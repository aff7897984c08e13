use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::{
    hook::{Credential, Handler, HookContext, HookResult, Invocation, PLATFORM_API, ids},
    models::{FormSpec, HookResponse, form::UiElement},
    outbound::{RestApi, Scheme},
};

/// Table of every datapoint in the open annotation, optionally narrowed to one id.
pub struct DatapointList;

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    content: Option<Vec<Node>>,
}

#[derive(Debug, Deserialize)]
struct Node {
    #[serde(default)]
    id: Value,
    #[serde(default)]
    schema_id: Option<String>,
    #[serde(default)]
    category: Value,
    #[serde(default)]
    children: Option<Vec<Node>>,
}

#[derive(Debug, PartialEq)]
struct Row {
    schema_id: String,
    id: Value,
    category: Value,
    parent_id: Value,
}

impl Row {
    fn to_json(&self) -> Value {
        json!({
            "schemaId": self.schema_id,
            "id": self.id,
            "category": self.category,
            "parentId": self.parent_id,
        })
    }

    /// The search box yields a string; ids are numbers.
    fn matches(&self, search: &str) -> bool {
        match &self.id {
            Value::String(id) => id == search,
            other => other.to_string() == search.trim(),
        }
    }
}

/// Depth-first, each parent before its children. Top-level nodes get parent 0.
fn flatten(nodes: &[Node], parent_id: &Value, rows: &mut Vec<Row>) {
    for node in nodes {
        rows.push(Row {
            schema_id: node.schema_id.clone().unwrap_or_else(|| "N/A".to_string()),
            id: node.id.clone(),
            category: node.category.clone(),
            parent_id: parent_id.clone(),
        });
        if let Some(children) = &node.children {
            flatten(children, &node.id, rows);
        }
    }
}

#[async_trait]
impl Handler for DatapointList {
    fn name(&self) -> &'static str {
        "datapoint_list"
    }

    fn description(&self) -> &'static str {
        "List the datapoints of the open annotation"
    }

    fn required_credentials(&self) -> &'static [Credential] {
        PLATFORM_API
    }

    async fn handle(&self, invocation: &Invocation, ctx: &HookContext<'_>) -> HookResult {
        if invocation.is_configure() {
            return Ok(Some(super::no_settings()));
        }
        let request = &invocation.request;

        let Some(annotation_id) = request.location_path().and_then(ids::document_id) else {
            return Ok(Some(HookResponse::error(
                "You need to be on the annotation view to run this command.",
            )));
        };

        let api = RestApi::from_request(ctx.transport, request)?;
        let content: Content = api
            .get_json(&format!("annotations/{annotation_id}/content"), Scheme::Bearer)
            .await?;
        let Some(nodes) = content.content else {
            return Ok(Some(HookResponse::error("Failed to fetch the content of this annotation.")));
        };

        let mut rows = Vec::new();
        flatten(&nodes, &Value::from(0), &mut rows);
        let table: Vec<Value> = match request.form_str("search") {
            Some(search) => rows
                .iter()
                .filter(|row| row.matches(search))
                .map(Row::to_json)
                .collect(),
            None => rows.iter().map(Row::to_json).collect(),
        };

        Ok(Some(HookResponse::form(
            FormSpec::new()
                .width(600)
                .default_value(json!({
                    "table": table,
                    "title": { "text": "Document datapoints" }
                }))
                .ui_schema(UiElement::group(vec![
                    UiElement::scoped_typography("title")
                        .option("variant", Value::from("h5"))
                        .option("sx", json!({ "mb": 2 })),
                    UiElement::table("table"),
                ])),
        )))
    }
}
