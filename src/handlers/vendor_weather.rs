use async_trait::async_trait;
use reqwest::Url;
use serde::Deserialize;
use serde_json::Value;

use crate::{
    hook::{Credential, Handler, HookContext, HookError, HookResult, Invocation, PLATFORM_API, ids},
    models::{FormSpec, HookResponse, form::UiElement},
    outbound::{OutboundRequest, RestApi, Scheme, fetch_json},
};

const VENDOR_ADDRESS: &str = "sender_address";

/// Current temperature at the vendor's address of the open document.
pub struct VendorWeather;

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    content: Vec<Datapoint>,
}

#[derive(Debug, Deserialize)]
struct Datapoint {
    #[serde(default)]
    schema_id: Option<String>,
    #[serde(default)]
    content: Option<DatapointValue>,
    #[serde(default)]
    children: Vec<Datapoint>,
}

#[derive(Debug, Deserialize)]
struct DatapointValue {
    #[serde(default)]
    value: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Place {
    lat: String,
    lon: String,
}

#[derive(Debug, Deserialize)]
struct Forecast {
    current: Current,
}

#[derive(Debug, Deserialize)]
struct Current {
    temperature_2m: f64,
}

fn find_by_schema_id<'a>(
    content: &'a [Datapoint],
    schema_id: &str,
    found: &mut Vec<&'a Datapoint>,
) {
    for datapoint in content {
        if datapoint.schema_id.as_deref() == Some(schema_id) {
            found.push(datapoint);
        } else {
            find_by_schema_id(&datapoint.children, schema_id, found);
        }
    }
}

#[async_trait]
impl Handler for VendorWeather {
    fn name(&self) -> &'static str {
        "vendor_weather"
    }

    fn description(&self) -> &'static str {
        "Current temperature at the vendor address of the open document"
    }

    fn required_credentials(&self) -> &'static [Credential] {
        PLATFORM_API
    }

    async fn handle(&self, invocation: &Invocation, ctx: &HookContext<'_>) -> HookResult {
        if invocation.is_configure() {
            return Ok(Some(super::no_settings()));
        }
        let request = &invocation.request;

        let Some(document_id) = request.location_path().and_then(ids::document_id) else {
            return Ok(Some(HookResponse::error("You need to be on the validation screen.")));
        };

        let api = RestApi::from_request(ctx.transport, request)?;
        let content: Content = match api
            .get_json(&format!("annotations/{document_id}/content"), Scheme::Token)
            .await
        {
            Ok(content) => content,
            Err(HookError::Upstream { .. }) => {
                return Ok(Some(HookResponse::error("You need to be on the validation screen.")));
            }
            Err(err) => return Err(err),
        };

        let mut found = Vec::new();
        find_by_schema_id(&content.content, VENDOR_ADDRESS, &mut found);
        let Some(address) = found
            .first()
            .and_then(|datapoint| datapoint.content.as_ref())
            .and_then(|content| content.value.as_deref())
            .filter(|address| !address.trim().is_empty())
        else {
            return Ok(Some(HookResponse::error("This document does not have vendor address.")));
        };

        let geocode = Url::parse_with_params(
            &ctx.services.geocoding_url,
            &[("q", address), ("format", "jsonv2")],
        )
        .map_err(|err| HookError::InvalidInput(err.to_string()))?;
        let places: Vec<Place> = fetch_json(ctx.transport, OutboundRequest::get(geocode)).await?;
        let Some(place) = places.first() else {
            return Ok(Some(HookResponse::error("Vendor could not be found.")));
        };

        let forecast = Url::parse_with_params(
            &ctx.services.weather_url,
            &[
                ("latitude", place.lat.as_str()),
                ("longitude", place.lon.as_str()),
                ("current", "temperature_2m"),
            ],
        )
        .map_err(|err| HookError::InvalidInput(err.to_string()))?;
        let forecast: Forecast = fetch_json(ctx.transport, OutboundRequest::get(forecast)).await?;

        Ok(Some(weather_card(address, forecast.current.temperature_2m)))
    }
}

fn weather_card(address: &str, temperature: f64) -> HookResponse {
    let (icon, verdict) = if temperature <= 0.0 {
        ("❄️", "Not hot. Bring hot chocolate.")
    } else if temperature <= 20.0 {
        ("☁️", "Not great, not terrible.")
    } else {
        ("🌞", "Hot, bring ice cream.")
    };

    let mut reading = UiElement::typography(format!("{icon} {temperature} °C"))
        .attr("variant", "h2")
        .attr("fontWeight", "bold");
    if temperature > 20.0 {
        reading = reading.attr("color", "error");
    }

    HookResponse::form(
        FormSpec::new()
            .schema(Value::Object(Default::default()))
            .ui_schema(UiElement::vertical(vec![
                UiElement::typography(address)
                    .attr("variant", "caption")
                    .attr("color", "text.disabled"),
                reading,
                UiElement::typography(verdict)
                    .attr("variant", "h5")
                    .attr("fontWeight", "semibold")
                    .attr("color", "text.secondary"),
            ])),
    )
}

#[cfg(test)]
mod tests {
    use reqwest::Method;
    use serde_json::{Value, json};

    use crate::{handlers::support, outbound::testing::RecordingTransport};

    fn request(pathname: &str) -> Value {
        json!({
            "base_url": "https://acme.example",
            "rossum_authorization_token": "tok",
            "location": { "pathname": pathname }
        })
    }

    fn document(content: Value) -> RecordingTransport {
        RecordingTransport::new().respond(
            Method::GET,
            "https://acme.example/api/v1/annotations/42/content",
            200,
            json!({ "content": content }),
        )
    }

    #[tokio::test]
    async fn document_without_vendor_address() {
        let transport = document(json!([
            { "schema_id": "basic_info", "children": [
                { "schema_id": "document_id", "content": { "value": "INV-1" } }
            ] }
        ]));
        let response = support::run("vendor_weather", &transport, request("/document/42")).await;

        assert_eq!(
            response,
            json!({
                "intent": { "error": { "message": "This document does not have vendor address." } }
            })
        );
        assert_eq!(transport.calls().len(), 1);
        assert_eq!(transport.calls()[0].authorization.as_deref(), Some("Token tok"));
    }

    #[tokio::test]
    async fn not_on_a_document_asks_to_open_one() {
        let transport = RecordingTransport::new();
        let response = support::run("vendor_weather", &transport, request("/queues/3")).await;

        assert_eq!(
            response["intent"]["error"]["message"],
            "You need to be on the validation screen."
        );
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn nested_address_is_geocoded_and_reported() {
        let transport = document(json!([
            { "schema_id": "vendor_section", "children": [
                { "schema_id": "sender_address", "content": { "value": "Main St 1, Prague" } }
            ] }
        ]))
        .respond(
            Method::GET,
            "https://geo.test/search",
            200,
            json!([{ "lat": "50.08", "lon": "14.42" }]),
        )
        .respond(
            Method::GET,
            "https://weather.test/forecast",
            200,
            json!({ "current": { "temperature_2m": 24.5 } }),
        );

        let response = support::run("vendor_weather", &transport, request("/document/42")).await;

        let elements = &response["intent"]["form"]["uiSchema"]["elements"];
        assert_eq!(elements[0]["text"], "Main St 1, Prague");
        assert_eq!(elements[1]["text"], "🌞 24.5 °C");
        assert_eq!(elements[1]["color"], "error");
        assert_eq!(elements[2]["text"], "Hot, bring ice cream.");

        let calls = transport.calls();
        assert!(calls[1].url.contains("q=Main+St+1%2C+Prague"));
        assert!(calls[2].url.contains("latitude=50.08"));
    }

    #[tokio::test]
    async fn unknown_place_is_reported() {
        let transport = document(json!([
            { "schema_id": "sender_address", "content": { "value": "Nowhere" } }
        ]))
        .respond(Method::GET, "https://geo.test/search", 200, json!([]));

        let response = support::run("vendor_weather", &transport, request("/document/42")).await;

        assert_eq!(response["intent"]["error"]["message"], "Vendor could not be found.");
    }
}
