//! Registered extensions. Each one is an independent strategy behind
//! [`Handler`]; the registry is fixed at startup.

mod assign_users;
mod assist;
mod chatbot;
mod datapoint_list;
mod download_report;
mod hub;
mod kitten;
mod lookup_annotations;
mod master_data;
mod memo_mdh;
mod template_store;
mod translated_message;
mod vendor_weather;

use std::{collections::BTreeMap, sync::Arc};

use crate::{
    hook::Handler,
    models::{FormSpec, HookResponse, form::ObjectSchema},
};

pub use assign_users::AssignUsers;
pub use assist::Assist;
pub use chatbot::{AiLookup, ChatbotMessage};
pub use datapoint_list::DatapointList;
pub use download_report::DownloadReport;
pub use kitten::Kitten;
pub use lookup_annotations::LookupAnnotations;
pub use master_data::MasterData;
pub use memo_mdh::MemoMdh;
pub use template_store::TemplateStore;
pub use translated_message::TranslatedMessage;
pub use vendor_weather::VendorWeather;

#[derive(Clone, Default)]
pub struct Registry {
    handlers: BTreeMap<&'static str, Arc<dyn Handler>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builtin() -> Self {
        Self::new()
            .register(TranslatedMessage)
            .register(MasterData)
            .register(MemoMdh)
            .register(LookupAnnotations)
            .register(VendorWeather)
            .register(AssignUsers)
            .register(DatapointList)
            .register(ChatbotMessage)
            .register(AiLookup)
            .register(Assist)
            .register(DownloadReport)
            .register(TemplateStore)
            .register(Kitten)
    }

    pub fn register<H: Handler + 'static>(mut self, handler: H) -> Self {
        self.handlers.insert(handler.name(), Arc::new(handler));
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Handler>> {
        self.handlers.get(name).cloned()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Handler>> {
        self.handlers.values()
    }
}

/// Configure answer for handlers that take no settings.
fn no_settings() -> HookResponse {
    HookResponse::form(FormSpec::new().schema(ObjectSchema::new().build()))
}

#[cfg(test)]
pub(crate) mod support {
    use serde_json::Value;

    use crate::{
        hook::{HookContext, Services, dispatch},
        models::{HookRequest, HookResponse},
        outbound::testing::RecordingTransport,
    };

    pub fn request(value: Value) -> HookRequest {
        serde_json::from_value(value).unwrap()
    }

    /// Invokes `name` from the builtin registry and returns the serialized
    /// response (`Value::Null` for "no response").
    pub async fn run(name: &str, transport: &RecordingTransport, body: Value) -> Value {
        run_with(name, transport, body, true).await
    }

    pub async fn run_with(
        name: &str,
        transport: &RecordingTransport,
        body: Value,
        commit: bool,
    ) -> Value {
        let registry = super::Registry::builtin();
        let handler = registry.get(name).unwrap();
        let services = Services {
            master_data_url: "https://mdh.test/api".into(),
            geocoding_url: "https://geo.test/search".into(),
            weather_url: "https://weather.test/forecast".into(),
            kitten_url: "https://cats.test/cat".into(),
        };
        let ctx = HookContext::new(transport, &services).commit(commit);
        let response: Option<HookResponse> =
            dispatch::invoke(handler.as_ref(), request(body), &ctx).await;
        serde_json::to_value(response).unwrap()
    }
}

#[cfg(test)]
mod tests {
    use reqwest::Method;
    use serde_json::json;

    use super::{Registry, support};
    use crate::outbound::testing::RecordingTransport;

    #[test]
    fn builtin_names_are_unique_and_described() {
        let registry = Registry::builtin();
        assert_eq!(registry.iter().count(), 13);
        for handler in registry.iter() {
            assert!(!handler.description().is_empty(), "{}", handler.name());
        }
        assert!(registry.get("translated_message").is_some());
        assert!(registry.get("nope").is_none());
    }

    /// Every handler, asked to configure with whatever context it needs, must
    /// answer without a single mutating call.
    #[tokio::test]
    async fn configure_mode_never_mutates() {
        let transport = RecordingTransport::new().respond(
            Method::GET,
            "https://acme.example/svc/master-data-hub/api/v2/dataset/",
            200,
            json!({ "datasets": [{ "dataset_name": "vendors" }] }),
        );
        let base = json!({
            "configure": true,
            "base_url": "https://acme.example",
            "rossum_authorization_token": "tok",
            "secrets": { "token": "mdh" },
            "settings": { "locales": ["en", "de"] }
        });

        for handler in Registry::builtin().iter() {
            let response = support::run(handler.name(), &transport, base.clone()).await;
            assert!(
                response["intent"]["form"].is_object(),
                "{} answered {response}",
                handler.name()
            );
        }
        assert_eq!(transport.mutating_calls(), 0);
    }
}
