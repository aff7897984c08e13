use serde::{Serialize, Serializer, ser::SerializeMap};
use serde_json::Value;

use super::form::FormSpec;

/// Exactly one of the shapes a host understands.
#[derive(Debug, Clone, PartialEq)]
pub enum HookResponse {
    Form(FormSpec),
    Terminal(TerminalIntent),
    Messages(Vec<Message>),
    Lookup(LookupResult),
    Template(Value),
}

impl HookResponse {
    pub fn form(form: FormSpec) -> Self {
        Self::Form(form)
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::Terminal(TerminalIntent::new(Status::Info {
            message: message.into(),
        }))
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Terminal(TerminalIntent::new(Status::Error {
            message: message.into(),
        }))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Form(_) => "form",
            Self::Terminal(_) => "terminal",
            Self::Messages(_) => "messages",
            Self::Lookup(_) => "lookup",
            Self::Template(_) => "template",
        }
    }

    pub fn is_error(&self) -> bool {
        match self {
            Self::Terminal(intent) => matches!(intent.status, Status::Error { .. }),
            Self::Messages(messages) => messages
                .iter()
                .any(|message| message.kind == MessageKind::Error),
            _ => false,
        }
    }
}

impl Serialize for HookResponse {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        #[derive(Serialize)]
        struct FormIntentRef<'a> {
            form: &'a FormSpec,
        }

        match self {
            Self::Form(form) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("intent", &FormIntentRef { form })?;
                map.end()
            }
            Self::Terminal(intent) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("intent", intent)?;
                map.end()
            }
            Self::Messages(messages) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("messages", messages)?;
                map.end()
            }
            Self::Lookup(lookup) => lookup.serialize(serializer),
            Self::Template(template) => template.serialize(serializer),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TerminalIntent {
    #[serde(flatten)]
    pub status: Status,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect: Option<Redirect>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download: Option<Download>,
}

impl TerminalIntent {
    pub fn new(status: Status) -> Self {
        Self {
            status,
            redirect: None,
            download: None,
        }
    }

    pub fn with_redirect(mut self, url: impl Into<String>) -> Self {
        self.redirect = Some(Redirect { url: url.into() });
        self
    }

    pub fn with_download(
        mut self,
        filename: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        self.download = Some(Download {
            filename: filename.into(),
            content: content.into(),
        });
        self
    }
}

impl From<TerminalIntent> for HookResponse {
    fn from(intent: TerminalIntent) -> Self {
        Self::Terminal(intent)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Info { message: String },
    Error { message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Redirect {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Download {
    pub filename: String,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Info,
    Warning,
    Error,
}

/// An annotation-scoped message; `id` is a datapoint id or `"all"`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Message {
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub content: String,
    pub id: Value,
}

impl Message {
    pub fn new(kind: MessageKind, content: impl Into<String>) -> Self {
        Self {
            kind,
            content: content.into(),
            id: Value::from("all"),
        }
    }

    pub fn with_id(mut self, id: impl Into<Value>) -> Self {
        self.id = id.into();
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LookupResult {
    pub options: Vec<LookupOption>,
    pub value: Value,
}

impl LookupResult {
    /// Preselects the first option, or `null` when there is none.
    pub fn first_selected(options: Vec<LookupOption>) -> Self {
        let value = options
            .first()
            .map(|option| option.value.clone())
            .unwrap_or(Value::Null);
        Self { options, value }
    }
}

impl From<LookupResult> for HookResponse {
    fn from(lookup: LookupResult) -> Self {
        Self::Lookup(lookup)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LookupOption {
    pub value: Value,
    pub label: Value,
}
