//! Configuration and input forms: a JSON Schema paired with a UI layout tree.
//!
//! Layout elements address schema properties through `#/properties/<name>`
//! scope pointers. [`FormSpec::validate`] checks that pairing before a form is
//! handed to the host.

use std::collections::BTreeSet;

use serde::Serialize;
use serde_json::{Map, Value, json};
use thiserror::Error;

use crate::hook::HookError;

const SCOPE_PREFIX: &str = "#/properties/";
const DEFINITIONS_PREFIX: &str = "#/definitions/";

/// Name of the shared templated-string definition.
pub const TEMPLATED: &str = "fstring";

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FormSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(rename = "hook_interface", skip_serializing_if = "Option::is_none")]
    pub hook_interface: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hook: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_value: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ui_schema: Option<UiElement>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<Value>,
}

impl FormSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn width(mut self, width: u32) -> Self {
        self.width = Some(width);
        self
    }

    pub fn schema(mut self, schema: Value) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn ui_schema(mut self, layout: UiElement) -> Self {
        self.ui_schema = Some(layout);
        self
    }

    pub fn default_value(mut self, value: Value) -> Self {
        self.default_value = Some(value);
        self
    }

    /// Echoes the host's `hook_interface` so a follow-up submit is routed back.
    pub fn hook_interface(mut self, hook_interface: Option<Value>) -> Self {
        self.hook_interface = hook_interface;
        self
    }

    pub fn hook(mut self, hook: Option<Value>) -> Self {
        self.hook = hook;
        self
    }

    /// Checks that every scope pointer resolves, every required property has a
    /// control, and every `$ref` names an existing definition.
    ///
    /// Display-only forms carry no schema; their scopes resolve against the
    /// top-level keys of `defaultValue`.
    pub fn validate(&self) -> Result<(), FormError> {
        let root = match (&self.schema, &self.default_value) {
            (Some(schema), _) => properties_of(schema),
            (None, Some(Value::Object(defaults))) => defaults
                .keys()
                .map(|key| (key.clone(), Value::Null))
                .collect(),
            (None, _) => Map::new(),
        };

        if let Some(schema) = &self.schema {
            check_refs(schema, schema)?;
        }

        let Some(layout) = &self.ui_schema else {
            return Ok(());
        };
        let layout = serde_json::to_value(layout).unwrap_or(Value::Null);

        let mut controlled = BTreeSet::new();
        walk_layout(&layout, &root, &mut controlled)?;

        if let Some(required) = self
            .schema
            .as_ref()
            .and_then(|schema| schema.get("required"))
            .and_then(Value::as_array)
        {
            for name in required.iter().filter_map(Value::as_str) {
                if !controlled.contains(name) {
                    return Err(FormError::MissingControl(name.to_string()));
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormError {
    #[error("ui scope `{0}` is not a `#/properties/<name>` pointer")]
    MalformedScope(String),
    #[error("ui scope `{0}` does not match any schema property")]
    UnknownScope(String),
    #[error("required property `{0}` has no control")]
    MissingControl(String),
    #[error("schema reference `{0}` does not resolve")]
    UnresolvedRef(String),
}

fn properties_of(schema: &Value) -> Map<String, Value> {
    schema
        .get("properties")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default()
}

fn walk_layout(
    node: &Value,
    properties: &Map<String, Value>,
    controlled: &mut BTreeSet<String>,
) -> Result<(), FormError> {
    if let Some(scope) = node.get("scope").and_then(Value::as_str) {
        let name = scope_name(scope)?;
        let Some(property) = properties.get(name) else {
            return Err(FormError::UnknownScope(scope.to_string()));
        };
        controlled.insert(name.to_string());

        if let Some(detail) = node.get("options").and_then(|options| options.get("detail")) {
            let items = property
                .get("items")
                .map(properties_of)
                .unwrap_or_default();
            walk_layout(detail, &items, &mut BTreeSet::new())?;
        }
    }

    if let Some(children) = node.get("elements").and_then(Value::as_array) {
        for child in children {
            walk_layout(child, properties, controlled)?;
        }
    }
    Ok(())
}

fn scope_name(scope: &str) -> Result<&str, FormError> {
    scope
        .strip_prefix(SCOPE_PREFIX)
        .filter(|name| !name.is_empty() && !name.contains('/'))
        .ok_or_else(|| FormError::MalformedScope(scope.to_string()))
}

fn check_refs(node: &Value, root: &Value) -> Result<(), FormError> {
    match node {
        Value::Object(map) => {
            if let Some(reference) = map.get("$ref").and_then(Value::as_str) {
                let resolved = reference
                    .strip_prefix(DEFINITIONS_PREFIX)
                    .and_then(|name| root.get("definitions").and_then(|defs| defs.get(name)));
                if resolved.is_none() {
                    return Err(FormError::UnresolvedRef(reference.to_string()));
                }
            }
            map.values().try_for_each(|child| check_refs(child, root))
        }
        Value::Array(items) => items.iter().try_for_each(|child| check_refs(child, root)),
        _ => Ok(()),
    }
}

/// A field accepting either a literal string or an interpolation object.
pub fn templated_string() -> Value {
    json!({
        "oneOf": [
            { "type": "string" },
            {
                "type": "object",
                "properties": {
                    "__fstring": { "type": "string" }
                }
            }
        ]
    })
}

pub fn string() -> Value {
    json!({ "type": "string" })
}

pub fn string_enum(values: Vec<Value>) -> Value {
    json!({ "type": "string", "enum": values })
}

pub fn array_of(items: ObjectSchema) -> Value {
    json!({ "type": "array", "items": items.build() })
}

/// Turns runtime-fetched values into enum members; nothing to choose from is an
/// error rather than an unusable form.
pub fn dynamic_enum<I, T>(values: I, what: &str) -> Result<Vec<Value>, HookError>
where
    I: IntoIterator<Item = T>,
    T: Into<Value>,
{
    let values: Vec<Value> = values.into_iter().map(Into::into).collect();
    if values.is_empty() {
        return Err(HookError::EmptyOptions(what.to_string()));
    }
    Ok(values)
}

#[derive(Debug, Clone, Default)]
pub struct ObjectSchema {
    properties: Map<String, Value>,
    required: Vec<String>,
    definitions: Map<String, Value>,
}

impl ObjectSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn property(mut self, name: impl Into<String>, schema: Value) -> Self {
        self.properties.insert(name.into(), schema);
        self
    }

    /// Adds a templated-string property by reference to the shared definition.
    pub fn templated(mut self, name: impl Into<String>) -> Self {
        self.definitions
            .entry(TEMPLATED.to_string())
            .or_insert_with(templated_string);
        self.properties.insert(
            name.into(),
            json!({ "$ref": format!("{DEFINITIONS_PREFIX}{TEMPLATED}") }),
        );
        self
    }

    /// Adds a definition without a property referencing it yet, for nested
    /// item schemas that point back at the root.
    pub fn definition(mut self, name: impl Into<String>, schema: Value) -> Self {
        self.definitions.insert(name.into(), schema);
        self
    }

    pub fn required(mut self, name: impl Into<String>) -> Self {
        self.required.push(name.into());
        self
    }

    pub fn build(self) -> Value {
        let mut schema = Map::new();
        if !self.definitions.is_empty() {
            schema.insert("definitions".into(), Value::Object(self.definitions));
        }
        schema.insert("type".into(), Value::from("object"));
        schema.insert("properties".into(), Value::Object(self.properties));
        if !self.required.is_empty() {
            schema.insert("required".into(), json!(self.required));
        }
        Value::Object(schema)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ElementKind {
    VerticalLayout,
    Group,
    Control,
    FString,
    Table,
    Typography,
    Image,
    PromptResult,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UiElement {
    #[serde(rename = "type")]
    pub kind: ElementKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub options: Map<String, Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub elements: Vec<UiElement>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl UiElement {
    fn new(kind: ElementKind) -> Self {
        Self {
            kind,
            label: None,
            scope: None,
            text: None,
            options: Map::new(),
            elements: Vec::new(),
            extra: Map::new(),
        }
    }

    fn scoped(kind: ElementKind, property: &str) -> Self {
        Self {
            scope: Some(format!("{SCOPE_PREFIX}{property}")),
            ..Self::new(kind)
        }
    }

    pub fn vertical(elements: Vec<UiElement>) -> Self {
        Self {
            elements,
            ..Self::new(ElementKind::VerticalLayout)
        }
    }

    pub fn group(elements: Vec<UiElement>) -> Self {
        Self {
            elements,
            ..Self::new(ElementKind::Group)
        }
    }

    pub fn control(property: &str) -> Self {
        Self::scoped(ElementKind::Control, property)
    }

    pub fn templated(property: &str) -> Self {
        Self::scoped(ElementKind::FString, property)
    }

    pub fn table(property: &str) -> Self {
        Self::scoped(ElementKind::Table, property)
    }

    pub fn typography(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::new(ElementKind::Typography)
        }
    }

    pub fn scoped_typography(property: &str) -> Self {
        Self::scoped(ElementKind::Typography, property)
    }

    pub fn image() -> Self {
        Self::new(ElementKind::Image)
    }

    pub fn prompt_result(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::new(ElementKind::PromptResult)
        }
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn option(mut self, key: &str, value: Value) -> Self {
        self.options.insert(key.to_string(), value);
        self
    }

    pub fn readonly(self) -> Self {
        self.option("readonly", Value::Bool(true))
    }

    pub fn multiline(self) -> Self {
        self.option("multi", Value::Bool(true))
    }

    /// Layout for each item of an array control.
    pub fn detail(self, layout: UiElement) -> Self {
        let layout = serde_json::to_value(layout).unwrap_or(Value::Null);
        self.option("detail", layout)
    }

    /// Presentation attributes the host reads from the element itself
    /// (`variant`, `color`, `fontWeight`, ...).
    pub fn attr(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.extra.insert(key.to_string(), value.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn lookup_form() -> FormSpec {
        let schema = ObjectSchema::new()
            .property("dataset", string_enum(vec![json!("vendors")]))
            .property(
                "filters",
                array_of(
                    ObjectSchema::new()
                        .property("match_key", string())
                        .property("value", json!({ "$ref": "#/definitions/fstring" })),
                ),
            )
            .definition(TEMPLATED, templated_string())
            .required("dataset")
            .build();

        FormSpec::new().schema(schema).ui_schema(UiElement::vertical(vec![
            UiElement::control("dataset"),
            UiElement::control("filters").detail(UiElement::vertical(vec![
                UiElement::control("match_key"),
                UiElement::templated("value"),
            ])),
        ]))
    }

    #[test]
    fn nested_detail_scopes_resolve_against_items() {
        assert_eq!(lookup_form().validate(), Ok(()));
    }

    #[test]
    fn unknown_scope_is_rejected() {
        let form = FormSpec::new()
            .schema(ObjectSchema::new().property("queue", string()).build())
            .ui_schema(UiElement::vertical(vec![UiElement::control("queues")]));
        assert_eq!(
            form.validate(),
            Err(FormError::UnknownScope("#/properties/queues".into()))
        );
    }

    #[test]
    fn required_property_needs_a_control() {
        let form = FormSpec::new()
            .schema(
                ObjectSchema::new()
                    .property("queue", string())
                    .property("note", string())
                    .required("queue")
                    .build(),
            )
            .ui_schema(UiElement::vertical(vec![UiElement::control("note")]));
        assert_eq!(
            form.validate(),
            Err(FormError::MissingControl("queue".into()))
        );
    }

    #[test]
    fn templated_property_is_composed_by_reference() {
        let schema = ObjectSchema::new().templated("en").templated("de").build();
        assert_eq!(schema["properties"]["en"], json!({ "$ref": "#/definitions/fstring" }));
        assert_eq!(schema["definitions"]["fstring"], templated_string());

        let dangling = FormSpec::new().schema(json!({
            "type": "object",
            "properties": { "en": { "$ref": "#/definitions/fstring" } }
        }));
        assert_eq!(
            dangling.validate(),
            Err(FormError::UnresolvedRef("#/definitions/fstring".into()))
        );
    }

    #[test]
    fn display_only_form_resolves_against_default_value() {
        let form = FormSpec::new()
            .default_value(json!({ "results": [] }))
            .ui_schema(UiElement::group(vec![UiElement::table("results")]));
        assert_eq!(form.validate(), Ok(()));

        let broken = FormSpec::new()
            .default_value(json!({ "rows": [] }))
            .ui_schema(UiElement::group(vec![UiElement::table("results")]));
        assert!(broken.validate().is_err());
    }

    #[test]
    fn empty_dynamic_enum_is_an_error() {
        let values: Vec<String> = Vec::new();
        assert!(matches!(
            dynamic_enum(values, "datasets"),
            Err(HookError::EmptyOptions(what)) if what == "datasets"
        ));
        assert_eq!(
            dynamic_enum(["a", "b"], "datasets").unwrap(),
            vec![json!("a"), json!("b")]
        );
    }

    #[test]
    fn presentation_attributes_flatten_onto_the_element() {
        let element = UiElement::typography("12 °C").attr("variant", "h2");
        assert_eq!(
            serde_json::to_value(element).unwrap(),
            json!({ "type": "Typography", "text": "12 °C", "variant": "h2" })
        );
    }
}
