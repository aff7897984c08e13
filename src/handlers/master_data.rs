//! Lookups against the master-data hub: a dataset browser command, a
//! filtered lookup field and an aggregation-pipeline lookup field.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tracing::{debug, warn};

use super::hub::{Hub, Row};
use crate::{
    hook::{Handler, HookContext, HookError, HookResult, Invocation},
    models::{
        FormSpec, HookResponse, LookupOption, LookupResult,
        form::{
            ObjectSchema, TEMPLATED, UiElement, array_of, dynamic_enum, string, string_enum,
            templated_string,
        },
    },
};

const SHOW_DATA: &str = "command_show_master_data";
const LOOKUP: &str = "queue_lookup";
const AGGREGATE: &str = "queue_lookup_aggregate";
const MAX_LIMIT: u64 = 100;
const OPERATORS: &[&str] = &[
    "$eq",
    "$ne",
    "$gt",
    "$gte",
    "$lt",
    "$lte",
    "$regex",
    FUZZY_CONSERVATIVE,
    FUZZY_DYNAMIC,
];
const FUZZY_CONSERVATIVE: &str = "$fuzzy_conservative";
const FUZZY_DYNAMIC: &str = "$fuzzy_dynamic";

pub struct MasterData;

#[derive(Debug, Deserialize)]
struct Filter {
    match_key: String,
    #[serde(default = "default_operator")]
    operator: String,
    #[serde(default)]
    value: Value,
}

fn default_operator() -> String {
    "$eq".to_string()
}

#[derive(Debug, Default, Deserialize)]
struct Query {
    #[serde(default)]
    filters: Vec<Filter>,
}

#[derive(Debug, Default, Deserialize)]
struct Sort {
    #[serde(default)]
    sort_key: Option<String>,
    #[serde(default)]
    desc: bool,
}

#[derive(Debug, Deserialize)]
struct LookupPayload {
    dataset: String,
    value_key: String,
    label_key: String,
    #[serde(default)]
    queries: Vec<Query>,
    /// Single-query shorthand, used when `queries` is empty.
    #[serde(default)]
    filters: Vec<Filter>,
    #[serde(default)]
    sort: Option<Sort>,
    #[serde(default)]
    limit: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct AggregatePayload {
    dataset: String,
    #[serde(default)]
    queries: Option<Value>,
    #[serde(default)]
    placeholders: Option<Map<String, Value>>,
    #[serde(default)]
    value_key: Option<String>,
    #[serde(default)]
    label_key: Option<String>,
}

#[async_trait]
impl Handler for MasterData {
    fn name(&self) -> &'static str {
        "master_data"
    }

    fn description(&self) -> &'static str {
        "Master-data hub dataset browser and lookup fields"
    }

    async fn handle(&self, invocation: &Invocation, ctx: &HookContext<'_>) -> HookResult {
        let hub = Hub::resolve(&invocation.request, ctx).await?;

        match invocation.variant() {
            Some(SHOW_DATA) => show_data(&hub, invocation).await,
            Some(AGGREGATE) if invocation.is_configure() => configure_aggregate(&hub).await,
            Some(AGGREGATE) => aggregate_lookup(&hub, invocation).await,
            Some(LOOKUP) | None if invocation.is_configure() => {
                configure_lookup(&hub, invocation).await
            }
            Some(LOOKUP) | None => lookup(&hub, invocation).await,
            Some(other) => Err(HookError::InvalidInput(format!("unknown variant `{other}`"))),
        }
    }
}

/// Dataset picker first, then the chosen dataset as a table.
async fn show_data(hub: &Hub<'_>, invocation: &Invocation) -> HookResult {
    let request = &invocation.request;
    if let Some(dataset) = request.form_str("dataset") {
        let rows = hub.rows(dataset).await?;
        let results: Vec<Value> = rows
            .into_iter()
            .map(|mut row| {
                if let Some(id) = row.get("_id").cloned() {
                    row.insert("id".to_string(), id);
                }
                Value::Object(row)
            })
            .collect();

        return Ok(Some(HookResponse::form(
            FormSpec::new()
                .width(600)
                .default_value(json!({ "results": results }))
                .ui_schema(UiElement::group(vec![UiElement::table("results")])),
        )));
    }

    let datasets = dynamic_enum(hub.datasets().await?, "datasets")?;
    Ok(Some(HookResponse::form(
        FormSpec::new()
            .hook_interface(request.hook_interface.clone())
            .schema(ObjectSchema::new().property("dataset", string_enum(datasets)).build()),
    )))
}

async fn configure_lookup(hub: &Hub<'_>, invocation: &Invocation) -> HookResult {
    let chosen = invocation.request.form_str("dataset");

    // The dataset list and the column sample are independent.
    let (datasets, sample) = match chosen {
        Some(dataset) => {
            let (datasets, rows) = tokio::try_join!(hub.datasets(), hub.rows(dataset))?;
            (datasets, Some((dataset, rows)))
        }
        None => (hub.datasets().await?, None),
    };
    let datasets = dynamic_enum(datasets, "datasets")?;

    let column = match sample {
        Some((dataset, rows)) => {
            let columns = rows
                .first()
                .map(|row| row.keys().cloned().collect::<Vec<_>>())
                .unwrap_or_default();
            string_enum(dynamic_enum(columns, &format!("columns in dataset {dataset}"))?)
        }
        None => string(),
    };
    let operators = OPERATORS.iter().copied().map(Value::from).collect();

    let filter = ObjectSchema::new()
        .property("match_key", column.clone())
        .property("operator", string_enum(operators))
        .property("value", json!({ "$ref": "#/definitions/fstring" }));
    let sort = ObjectSchema::new()
        .property("sort_key", column.clone())
        .property("desc", json!({ "type": "boolean" }))
        .build();

    let schema = ObjectSchema::new()
        .definition(TEMPLATED, templated_string())
        .property("dataset", string_enum(datasets))
        .property("value_key", column.clone())
        .property("label_key", column)
        .property(
            "queries",
            array_of(ObjectSchema::new().property("filters", array_of(filter))),
        )
        .property("sort", sort)
        .property("limit", json!({ "type": "integer", "minimum": 1, "maximum": MAX_LIMIT }))
        .build();

    let layout = UiElement::vertical(vec![
        UiElement::control("dataset"),
        UiElement::control("value_key"),
        UiElement::control("label_key"),
        UiElement::control("queries").detail(UiElement::vertical(vec![
            UiElement::control("filters").detail(UiElement::vertical(vec![
                UiElement::control("match_key"),
                UiElement::control("operator"),
                UiElement::templated("value"),
            ])),
        ])),
        UiElement::control("sort"),
        UiElement::control("limit"),
    ]);

    Ok(Some(HookResponse::form(
        FormSpec::new().width(600).schema(schema).ui_schema(layout),
    )))
}

/// Tries each query in turn; the first one with rows answers.
async fn lookup(hub: &Hub<'_>, invocation: &Invocation) -> HookResult {
    let payload: LookupPayload = invocation.request.payload_as()?;
    let limit = lookup_limit(payload.limit.as_ref())?;
    let sort = payload.sort.unwrap_or_default();
    let mut queries = payload.queries;
    if queries.is_empty() {
        queries.push(Query {
            filters: payload.filters,
        });
    }

    let mut rows = Vec::new();
    for query in &queries {
        rows = hub
            .aggregate(&payload.dataset, lookup_pipeline(&query.filters, &sort, limit))
            .await?;
        if !rows.is_empty() {
            break;
        }
    }

    let options = rows
        .iter()
        .filter_map(|row| {
            Some(LookupOption {
                value: Value::from(text_of(row.get(&payload.value_key)?)),
                label: Value::from(text_of(row.get(&payload.label_key)?)),
            })
        })
        .collect();
    Ok(Some(LookupResult::first_selected(options).into()))
}

/// Missing means 100; anything larger is capped at 100.
fn lookup_limit(limit: Option<&Value>) -> Result<u64, HookError> {
    let parsed = match limit {
        None | Some(Value::Null) => return Ok(MAX_LIMIT),
        Some(Value::Number(number)) => number
            .as_i64()
            .or_else(|| number.as_f64().map(|number| number.trunc() as i64)),
        Some(Value::String(text)) => text.trim().parse::<i64>().ok(),
        Some(_) => None,
    };
    let Some(limit) = parsed else {
        return Err(HookError::InvalidInput("limit must be an integer".into()));
    };
    Ok(limit.clamp(1, MAX_LIMIT as i64) as u64)
}

/// Fuzzy filters become one `$search` stage; the rest one `$match`.
fn lookup_pipeline(filters: &[Filter], sort: &Sort, limit: u64) -> Value {
    let (fuzzy, exact): (Vec<&Filter>, Vec<&Filter>) = filters
        .iter()
        .partition(|filter| {
            filter.operator == FUZZY_CONSERVATIVE || filter.operator == FUZZY_DYNAMIC
        });

    let mut pipeline = Vec::new();
    if !fuzzy.is_empty() {
        let must: Vec<Value> = fuzzy
            .iter()
            .map(|filter| {
                let max_edits = if filter.operator == FUZZY_DYNAMIC { 2 } else { 1 };
                json!({
                    "text": {
                        "path": filter.match_key,
                        "query": text_of(&filter.value),
                        "fuzzy": { "maxEdits": max_edits },
                        "matchCriteria": "all",
                    }
                })
            })
            .collect();
        pipeline.push(json!({ "$search": { "compound": { "must": must } } }));
    }
    if !exact.is_empty() {
        let and: Vec<Value> = exact
            .iter()
            .map(|filter| {
                json!({ filter.match_key.as_str(): { filter.operator.as_str(): filter.value } })
            })
            .collect();
        pipeline.push(json!({ "$match": { "$and": and } }));
    }
    if let Some(sort_key) = sort.sort_key.as_deref().filter(|key| !key.is_empty()) {
        let direction = if sort.desc { -1 } else { 1 };
        pipeline.push(json!({ "$sort": { sort_key: direction } }));
    }
    pipeline.push(json!({ "$limit": limit }));
    Value::Array(pipeline)
}

/// Strings as they are; anything else in its JSON spelling.
fn text_of(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

async fn configure_aggregate(hub: &Hub<'_>) -> HookResult {
    let datasets = dynamic_enum(hub.datasets().await?, "datasets")?;
    let schema = ObjectSchema::new()
        .property("dataset", string_enum(datasets))
        .property("queries", string())
        .property("value_key", string())
        .property("label_key", string())
        .build();
    let layout = UiElement::vertical(vec![
        UiElement::control("dataset"),
        UiElement::control("queries").multiline(),
        UiElement::control("value_key"),
        UiElement::control("label_key"),
    ]);
    Ok(Some(HookResponse::form(
        FormSpec::new().width(600).schema(schema).ui_schema(layout),
    )))
}

/// `queries` is a JSON list of `{ aggregate: [...] }` objects; the first one
/// yielding options answers. Rows are read as `{ value, label }`, falling back
/// to `value_key`/`label_key`.
async fn aggregate_lookup(hub: &Hub<'_>, invocation: &Invocation) -> HookResult {
    let payload: AggregatePayload = invocation.request.payload_as()?;
    let queries = parse_queries(payload.queries)?;
    let placeholders = unwrap_formulas(payload.placeholders.unwrap_or_default());

    for (index, query) in queries.iter().enumerate() {
        let Some(aggregate) = query.get("aggregate").filter(|aggregate| is_present(aggregate))
        else {
            debug!(index, "skipping a query without an aggregate pipeline");
            continue;
        };
        let pipeline = substitute(aggregate, &placeholders);

        let data: Value = hub
            .aggregate_response(&payload.dataset, pipeline)
            .await?
            .error_for_status()?
            .json()?;
        if let Some(message) = data.get("message") {
            warn!(index, %message, "aggregate query rejected by the hub");
            continue;
        }

        let rows = data
            .get("results")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();
        let options: Vec<LookupOption> = rows
            .iter()
            .filter_map(Value::as_object)
            .filter_map(|row| {
                aggregate_option(row, payload.value_key.as_deref(), payload.label_key.as_deref())
            })
            .collect();
        if !options.is_empty() {
            return Ok(Some(LookupResult::first_selected(options).into()));
        }
    }
    Ok(Some(LookupResult::first_selected(Vec::new()).into()))
}

fn parse_queries(queries: Option<Value>) -> Result<Vec<Value>, HookError> {
    let queries = match queries {
        None | Some(Value::Null) => None,
        Some(Value::String(text)) if text.trim().is_empty() => None,
        Some(Value::String(text)) => Some(serde_json::from_str(&text).map_err(|err| {
            HookError::InvalidInput(format!("aggregation queries are not JSON: {err}"))
        })?),
        Some(other) => Some(other),
    };
    match queries {
        None => Err(HookError::MissingInput("aggregation queries pipeline".into())),
        Some(Value::Array(queries)) => Ok(queries),
        Some(_) => Err(HookError::InvalidInput("aggregation queries must be a list".into())),
    }
}

/// Placeholders may arrive as `{ "__formula": "..." }`; only the formula is
/// substituted.
fn unwrap_formulas(placeholders: Map<String, Value>) -> Map<String, Value> {
    placeholders
        .into_iter()
        .map(|(name, value)| match value.get("__formula") {
            Some(formula) if value.is_object() => (name, formula.clone()),
            _ => (name, value),
        })
        .collect()
}

/// Replaces every string `"$$name"` with the placeholder of that name.
fn substitute(value: &Value, placeholders: &Map<String, Value>) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, value)| (key.clone(), substitute(value, placeholders)))
                .collect(),
        ),
        Value::Array(items) => {
            Value::Array(items.iter().map(|item| substitute(item, placeholders)).collect())
        }
        Value::String(text) => text
            .strip_prefix("$$")
            .and_then(|name| placeholders.get(name))
            .cloned()
            .unwrap_or_else(|| value.clone()),
        other => other.clone(),
    }
}

fn aggregate_option(
    row: &Row,
    value_key: Option<&str>,
    label_key: Option<&str>,
) -> Option<LookupOption> {
    if let (Some(value), Some(label)) = (row.get("value"), row.get("label")) {
        return Some(LookupOption {
            value: value.clone(),
            label: label.clone(),
        });
    }
    Some(LookupOption {
        value: row.get(value_key?)?.clone(),
        label: row.get(label_key?)?.clone(),
    })
}

fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
        Value::String(text) => !text.is_empty(),
        _ => true,
    }
}
