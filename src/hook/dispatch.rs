use tracing::{Instrument, info, info_span};

use super::{Handler, HookContext, HookError, HookResult, Invocation, Mode, normalize};
use crate::{
    models::{HookRequest, HookResponse},
    outbound::ReadOnly,
};

/// The host invocation interface. Decides the mode once, runs the handler and
/// resolves every outcome to a response or "no response"; nothing escapes.
pub async fn invoke(
    handler: &dyn Handler,
    request: HookRequest,
    ctx: &HookContext<'_>,
) -> Option<HookResponse> {
    let invocation = Invocation::from_request(request);
    let span = info_span!(
        "invoke",
        handler = handler.name(),
        mode = invocation.mode.as_str(),
        variant = invocation.variant().unwrap_or("-"),
        invocation_id = %invocation.id,
    );

    async move {
        let outcome = run(handler, &invocation, ctx).await;
        let response = normalize::finish(outcome, handler.failure_surface());
        info!(
            response = response.as_ref().map_or("none", HookResponse::kind),
            error = response.as_ref().is_some_and(HookResponse::is_error),
            "invocation finished"
        );
        response
    }
    .instrument(span)
    .await
}

async fn run(handler: &dyn Handler, invocation: &Invocation, ctx: &HookContext<'_>) -> HookResult {
    match invocation.mode {
        Mode::Configure => {
            let guard = ReadOnly::new(ctx.transport);
            handler.handle(invocation, &ctx.with_transport(&guard)).await
        }
        Mode::Execute => {
            if let Some(missing) = handler
                .required_credentials()
                .iter()
                .find(|credential| !credential.is_present(&invocation.request))
            {
                return Err(HookError::MissingCredential(missing.to_string()));
            }
            handler.handle(invocation, ctx).await
        }
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use reqwest::Method;
    use serde_json::json;

    use super::invoke;
    use crate::{
        hook::{Credential, Handler, HookContext, HookResult, Invocation, Services},
        models::{FormSpec, HookRequest, HookResponse, form::ObjectSchema},
        outbound::{OutboundRequest, testing::RecordingTransport},
    };

    /// Writes in both modes so the guard and the credential gate are visible.
    struct Careless;

    #[async_trait]
    impl Handler for Careless {
        fn name(&self) -> &'static str {
            "careless"
        }

        fn description(&self) -> &'static str {
            "writes regardless of mode"
        }

        fn required_credentials(&self) -> &'static [Credential] {
            &[Credential::Secret("token")]
        }

        async fn handle(&self, invocation: &Invocation, ctx: &HookContext<'_>) -> HookResult {
            ctx.transport
                .send(OutboundRequest::new(Method::POST, "https://api.test/write").json(json!({})))
                .await?
                .error_for_status()?;
            if invocation.is_configure() {
                return Ok(Some(HookResponse::form(
                    FormSpec::new().schema(ObjectSchema::new().build()),
                )));
            }
            Ok(Some(HookResponse::info("written")))
        }
    }

    fn write_endpoint() -> RecordingTransport {
        RecordingTransport::new().respond(Method::POST, "https://api.test/", 200, json!({}))
    }

    fn request(value: serde_json::Value) -> HookRequest {
        serde_json::from_value(value).unwrap()
    }

    #[tokio::test]
    async fn configure_mode_cannot_mutate() {
        let transport = write_endpoint();
        let services = Services::default();
        let ctx = HookContext::new(&transport, &services);

        let response = invoke(&Careless, request(json!({ "configure": true })), &ctx)
            .await
            .unwrap();

        assert!(response.is_error());
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn missing_credential_short_circuits_execute() {
        let transport = write_endpoint();
        let services = Services::default();
        let ctx = HookContext::new(&transport, &services);

        let response = invoke(&Careless, request(json!({})), &ctx).await.unwrap();

        assert_eq!(
            serde_json::to_value(response).unwrap(),
            json!({ "intent": { "error": { "message": "Missing secrets.token." } } })
        );
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn repeated_execution_repeats_the_side_effect() {
        let transport = write_endpoint();
        let services = Services::default();
        let ctx = HookContext::new(&transport, &services);
        let body = json!({ "secrets": { "token": "t" } });

        let first = invoke(&Careless, request(body.clone()), &ctx).await;
        let second = invoke(&Careless, request(body), &ctx).await;

        assert_eq!(first, second);
        assert_eq!(transport.mutating_calls(), 2);
    }
}
