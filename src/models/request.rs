use std::collections::BTreeMap;

use secrecy::SecretString;
use serde::{Deserialize, Deserializer, de::DeserializeOwned};
use serde_json::Value;

use crate::hook::HookError;

/// The single argument a host passes to a handler.
///
/// Field names are accepted verbatim from the host; anything the contract does
/// not model is ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HookRequest {
    #[serde(default)]
    pub configure: Option<bool>,
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub variant: Option<String>,
    #[serde(default, deserialize_with = "optional_secret")]
    pub rossum_authorization_token: Option<SecretString>,
    #[serde(default, deserialize_with = "secret_map")]
    pub secrets: BTreeMap<String, SecretString>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub location: Option<Location>,
    #[serde(default)]
    pub annotation: Option<Annotation>,
    #[serde(default)]
    pub payload: Option<Value>,
    #[serde(default, deserialize_with = "nullable_list")]
    pub payloads: Vec<Value>,
    #[serde(default)]
    pub form: Option<Value>,
    #[serde(default)]
    pub settings: Option<Value>,
    #[serde(default)]
    pub hook_interface: Option<Value>,
    #[serde(default)]
    pub hook: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Location {
    pub pathname: Option<String>,
    pub href: Option<String>,
}

impl Location {
    /// The most specific path-like value the host sent.
    pub fn path(&self) -> Option<&str> {
        self.pathname.as_deref().or(self.href.as_deref())
    }
}

impl<'de> Deserialize<'de> for Location {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Path(String),
            Object {
                #[serde(default)]
                pathname: Option<String>,
                #[serde(default)]
                href: Option<String>,
            },
        }

        Ok(match Repr::deserialize(deserializer)? {
            Repr::Path(path) => Location {
                pathname: Some(path),
                href: None,
            },
            Repr::Object { pathname, href } => Location { pathname, href },
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Annotation {
    #[serde(default)]
    pub modified_by: Option<String>,
}

impl HookRequest {
    pub fn token(&self) -> Option<&SecretString> {
        self.rossum_authorization_token.as_ref()
    }

    pub fn secret(&self, name: &str) -> Option<&SecretString> {
        self.secrets.get(name)
    }

    pub fn location_path(&self) -> Option<&str> {
        self.location.as_ref().and_then(Location::path)
    }

    /// A settings key, treating absent settings and `null` values alike.
    pub fn setting(&self, key: &str) -> Option<&Value> {
        self.settings
            .as_ref()
            .and_then(|settings| settings.get(key))
            .filter(|value| !value.is_null())
    }

    pub fn setting_str(&self, key: &str) -> Option<&str> {
        self.setting(key).and_then(Value::as_str)
    }

    pub fn form_str(&self, key: &str) -> Option<&str> {
        self.form
            .as_ref()
            .and_then(|form| form.get(key))
            .and_then(Value::as_str)
            .filter(|value| !value.is_empty())
    }

    /// Decodes `payload` into the handler's own shape.
    pub fn payload_as<T: DeserializeOwned>(&self) -> Result<T, HookError> {
        let Some(payload) = self.payload.clone() else {
            return Err(HookError::MissingInput("payload".to_string()));
        };
        serde_json::from_value(payload).map_err(|err| HookError::InvalidInput(err.to_string()))
    }

    pub fn form_as<T: DeserializeOwned>(&self) -> Result<Option<T>, HookError> {
        self.form
            .clone()
            .filter(|form| !form.is_null())
            .map(serde_json::from_value)
            .transpose()
            .map_err(|err| HookError::InvalidInput(err.to_string()))
    }
}

fn optional_secret<'de, D>(deserializer: D) -> Result<Option<SecretString>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?
        .filter(|value| !value.trim().is_empty())
        .map(SecretString::from))
}

fn nullable_list<'de, D>(deserializer: D) -> Result<Vec<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<Value>>::deserialize(deserializer)?.unwrap_or_default())
}

fn secret_map<'de, D>(deserializer: D) -> Result<BTreeMap<String, SecretString>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<BTreeMap<String, Value>>::deserialize(deserializer)?.unwrap_or_default();
    Ok(raw
        .into_iter()
        .filter_map(|(key, value)| match value {
            Value::String(secret) if !secret.is_empty() => Some((key, SecretString::from(secret))),
            _ => None,
        })
        .collect())
}
