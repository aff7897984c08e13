use tracing::warn;

use super::{FailureSurface, HookError, HookResult};
use crate::models::{HookResponse, Message, MessageKind};

/// Resolves a handler outcome to a canonical response or "no response".
pub fn finish(outcome: HookResult, surface: FailureSurface) -> Option<HookResponse> {
    match outcome {
        Ok(Some(HookResponse::Form(form))) => match form.validate() {
            Ok(()) => Some(HookResponse::Form(form)),
            Err(err) => {
                warn!(error = %err, "handler returned an inconsistent form");
                Some(render_failure(&HookError::from(err), surface))
            }
        },
        Ok(response) => response,
        Err(err) => {
            warn!(error = %err, "handler failed");
            Some(render_failure(&err, surface))
        }
    }
}

pub fn render_failure(err: &HookError, surface: FailureSurface) -> HookResponse {
    let message = err.user_message();
    match surface {
        FailureSurface::Intent => HookResponse::error(message),
        FailureSurface::Messages => {
            HookResponse::Messages(vec![Message::new(MessageKind::Error, message)])
        }
    }
}

/// Flattens per-item results into one message list, dropping items without
/// content and keeping input order.
pub fn collect_messages<I>(items: I) -> HookResponse
where
    I: IntoIterator<Item = Option<Message>>,
{
    HookResponse::Messages(items.into_iter().flatten().collect())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::models::form::{FormSpec, ObjectSchema, UiElement, string};

    fn message(content: &str) -> Message {
        Message::new(MessageKind::Warning, content)
    }

    #[test]
    fn empty_items_are_dropped_in_order() {
        let with_gap = collect_messages([Some(message("A")), None, Some(message("C"))]);
        let without = collect_messages([Some(message("A")), Some(message("C"))]);
        assert_eq!(with_gap, without);
        assert_eq!(
            serde_json::to_value(&with_gap).unwrap()["messages"][1]["content"],
            json!("C")
        );
    }

    #[test]
    fn no_response_passes_through() {
        assert_eq!(finish(Ok(None), FailureSurface::Intent), None);
    }

    #[test]
    fn errors_follow_the_failure_surface() {
        let as_intent = finish(
            Err(HookError::MissingCredential("base_url".into())),
            FailureSurface::Intent,
        )
        .unwrap();
        assert_eq!(
            serde_json::to_value(as_intent).unwrap(),
            json!({ "intent": { "error": { "message": "Missing base_url." } } })
        );

        let as_messages = finish(
            Err(HookError::Transport("connection reset".into())),
            FailureSurface::Messages,
        )
        .unwrap();
        assert_eq!(
            serde_json::to_value(as_messages).unwrap(),
            json!({ "messages": [{
                "type": "error",
                "content": "Request failed: connection reset",
                "id": "all"
            }] })
        );
    }

    #[test]
    fn inconsistent_form_becomes_an_error() {
        let form = FormSpec::new()
            .schema(ObjectSchema::new().property("queue", string()).build())
            .ui_schema(UiElement::vertical(vec![UiElement::control("users")]));
        let response = finish(Ok(Some(HookResponse::Form(form))), FailureSurface::Intent).unwrap();
        assert!(response.is_error());
    }
}
