//! HTTP host: `POST /hooks/{name}` takes a hook request body and answers with
//! the handler's response.

use std::{sync::Arc, time::Duration};

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tracing::{info, warn};

use super::ServeArgs;
use crate::{
    config,
    errors::{AppError, Result},
    handlers::Registry,
    hook::{HookContext, Services, dispatch},
    models::HookRequest,
    outbound::{HttpTransport, Transport},
};

#[derive(Clone)]
struct AppState {
    registry: Registry,
    transport: Arc<dyn Transport>,
    services: Arc<Services>,
    commit: bool,
}

pub async fn execute(args: ServeArgs) -> Result<()> {
    let config = config::load()?;
    let addr = args.addr.unwrap_or_else(|| config.listen_addr.clone());

    let transport = HttpTransport::new(config.http_timeout_seconds.map(Duration::from_secs))?;
    let state = AppState {
        registry: Registry::builtin(),
        transport: Arc::new(transport),
        services: Arc::new(Services::from(&config)),
        commit: config.commit,
    };

    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|err| AppError::Bind(format!("{addr}: {err}")))?;
    info!(%addr, handlers = state.registry.iter().count(), "serving hooks");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("server stopped");
    Ok(())
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/hooks", get(list_hooks))
        .route("/hooks/{name}", post(invoke_hook))
        .with_state(state)
}

async fn list_hooks(State(state): State<AppState>) -> Json<Value> {
    let hooks: Vec<Value> = state
        .registry
        .iter()
        .map(|handler| {
            json!({
                "name": handler.name(),
                "description": handler.description(),
                "requires": handler
                    .required_credentials()
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>(),
            })
        })
        .collect();
    Json(Value::Array(hooks))
}

async fn invoke_hook(
    State(state): State<AppState>,
    Path(name): Path<String>,
    body: Bytes,
) -> Response {
    let Some(handler) = state.registry.get(&name) else {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({ "detail": format!("unknown handler `{name}`") })),
        )
            .into_response();
    };

    let request: HookRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(err) => {
            warn!(handler = %name, error = %err, "rejected hook request body");
            return (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(json!({ "detail": err.to_string() })),
            )
                .into_response();
        }
    };

    let ctx = HookContext::new(state.transport.as_ref(), &state.services).commit(state.commit);
    match dispatch::invoke(handler.as_ref(), request, &ctx).await {
        Some(response) => Json(response).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "could not listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}
