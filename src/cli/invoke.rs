use std::{fs, io::Read, time::Duration};

use serde_json::{Map, Value};
use tracing::{debug, info};

use super::InvokeArgs;
use crate::{
    config::{self, Config},
    errors::{AppError, Result},
    handlers::Registry,
    hook::{HookContext, Services, dispatch},
    models::HookRequest,
    outbound::HttpTransport,
};

pub async fn execute(args: InvokeArgs) -> Result<()> {
    let config = config::load()?;
    if !config.has_credentials() {
        debug!("no platform credentials configured, relying on the request");
    }
    let registry = Registry::builtin();
    let Some(handler) = registry.get(&args.name) else {
        return Err(AppError::UnknownHandler(args.name));
    };

    let text = read_request(&args)?;
    let mut body = if text.trim().is_empty() {
        Map::new()
    } else {
        match serde_json::from_str::<Value>(&text) {
            Ok(Value::Object(body)) => body,
            Ok(other) => {
                return Err(AppError::RequestParse(format!("expected an object, got {other}")));
            }
            Err(err) => return Err(AppError::RequestParse(err.to_string())),
        }
    };
    fill_from_config(&mut body, &config);
    apply_overrides(&mut body, &args);

    let request: HookRequest = serde_json::from_value(Value::Object(body))
        .map_err(|err| AppError::RequestParse(err.to_string()))?;

    let transport = HttpTransport::new(config.http_timeout_seconds.map(Duration::from_secs))?;
    let services = Services::from(&config);
    let ctx = HookContext::new(&transport, &services).commit(config.commit && !args.dry_run);

    let response = dispatch::invoke(handler.as_ref(), request, &ctx).await;
    match response {
        Some(response) => println!("{}", serde_json::to_string_pretty(&response)?),
        None => println!("(no response)"),
    }
    info!(handler = %args.name, "invoke completed");
    Ok(())
}

fn read_request(args: &InvokeArgs) -> Result<String> {
    match &args.request {
        Some(path) => fs::read_to_string(path)
            .map_err(|_| AppError::RequestRead(path.display().to_string())),
        None => {
            let mut text = String::new();
            std::io::stdin()
                .read_to_string(&mut text)
                .map_err(|_| AppError::RequestRead("stdin".to_string()))?;
            Ok(text)
        }
    }
}

/// Config only fills gaps; whatever the request carries wins.
fn fill_from_config(body: &mut Map<String, Value>, config: &Config) {
    fn is_blank(value: Option<&Value>) -> bool {
        match value {
            None | Some(Value::Null) => true,
            Some(Value::String(text)) => text.trim().is_empty(),
            Some(_) => false,
        }
    }

    if is_blank(body.get("base_url")) {
        if let Some(base_url) = &config.base_url {
            body.insert("base_url".into(), Value::from(base_url.as_str()));
        }
    }
    if is_blank(body.get("rossum_authorization_token")) {
        if let Some(token) = &config.rossum_authorization_token {
            body.insert("rossum_authorization_token".into(), Value::from(token.as_str()));
        }
    }

    if config.secrets.is_empty() {
        return;
    }
    let secrets = body
        .entry("secrets")
        .or_insert_with(|| Value::Object(Map::new()));
    if !secrets.is_object() {
        *secrets = Value::Object(Map::new());
    }
    if let Value::Object(secrets) = secrets {
        for (name, value) in &config.secrets {
            if is_blank(secrets.get(name)) {
                secrets.insert(name.clone(), Value::from(value.as_str()));
            }
        }
    }
}

fn apply_overrides(body: &mut Map<String, Value>, args: &InvokeArgs) {
    if args.configure {
        body.insert("configure".into(), Value::Bool(true));
    }
    if let Some(variant) = &args.variant {
        body.insert("variant".into(), Value::from(variant.as_str()));
    }
}
