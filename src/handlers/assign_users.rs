use async_trait::async_trait;
use reqwest::Method;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::info;

use crate::{
    hook::{Credential, Handler, HookContext, HookResult, Invocation, PLATFORM_API, ids},
    models::{
        FormSpec, HookResponse, TerminalIntent,
        form::{ObjectSchema, UiElement, array_of, string},
        response::Status,
    },
    outbound::{RestApi, Scheme},
};

/// Annotators are user group 2 on the platform.
const ANNOTATORS: &str = "users?page_size=200&deleted=false&groups=2";

/// Adds every annotator not yet on a queue to that queue.
pub struct AssignUsers;

#[derive(Debug, Default, Deserialize)]
struct Submitted {
    #[serde(default)]
    queue: Option<String>,
    #[serde(default)]
    users: Option<Vec<Selected>>,
}

#[derive(Debug, Deserialize)]
struct Selected {
    url: String,
}

#[derive(Debug, Deserialize)]
struct Queue {
    id: u64,
    name: String,
    #[serde(default)]
    users: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct Page<T> {
    #[serde(default = "Vec::new")]
    results: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct User {
    url: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    first_name: String,
    #[serde(default)]
    last_name: String,
    #[serde(default)]
    queues: Vec<String>,
}

impl User {
    fn is_on(&self, queue_id: u64) -> bool {
        self.queues.iter().any(|queue| ids::queue_id(queue) == Some(queue_id))
    }

    fn row(&self) -> Value {
        let email = self
            .email
            .as_deref()
            .filter(|email| !email.is_empty())
            .or(self.username.as_deref())
            .unwrap_or_default();
        json!({
            "email": email,
            "name": format!("{} {}", self.first_name, self.last_name),
            "url": self.url,
        })
    }
}

#[async_trait]
impl Handler for AssignUsers {
    fn name(&self) -> &'static str {
        "assign_users"
    }

    fn description(&self) -> &'static str {
        "Assign all unassigned annotators to a queue"
    }

    fn required_credentials(&self) -> &'static [Credential] {
        PLATFORM_API
    }

    async fn handle(&self, invocation: &Invocation, ctx: &HookContext<'_>) -> HookResult {
        if invocation.is_configure() {
            return Ok(Some(super::no_settings()));
        }
        let request = &invocation.request;
        let submitted: Submitted = request.form_as()?.unwrap_or_default();

        let queue_id = submitted
            .queue
            .as_deref()
            .and_then(ids::queue_id)
            .or_else(|| request.location_path().and_then(ids::queue_id));
        let Some(queue_id) = queue_id else {
            return Ok(Some(select_queue_form(request.hook.clone())));
        };

        let api = RestApi::from_request(ctx.transport, request)?;

        if let Some(selected) = submitted.users {
            let queue: Queue = api.get_json(&format!("queues/{queue_id}"), Scheme::Token).await?;
            let users: Vec<String> = queue
                .users
                .iter()
                .cloned()
                .chain(selected.into_iter().map(|user| user.url))
                .collect();

            let assigned = if ctx.commit {
                let response = api
                    .send(
                        Method::PATCH,
                        &format!("queues/{queue_id}"),
                        Scheme::Token,
                        Some(json!({ "users": users })),
                    )
                    .await?;
                response.status == 200
            } else {
                info!(queue_id, users = users.len(), "commit disabled, skipping queue update");
                true
            };

            if !assigned {
                return Ok(Some(HookResponse::error("Something went wrong.")));
            }
            let intent = TerminalIntent::new(Status::Info {
                message: format!("Users were successfully added to queue: {}.", queue.name),
            })
            .with_redirect(format!("/queues/{}/settings/access", queue.id));
            return Ok(Some(intent.into()));
        }

        let page: Page<User> = api.get_json(ANNOTATORS, Scheme::Token).await?;
        let rows: Vec<Value> = page
            .results
            .iter()
            .filter(|user| !user.is_on(queue_id))
            .map(User::row)
            .collect();
        if rows.is_empty() {
            return Ok(Some(HookResponse::error("All annotators are assigned to this queue.")));
        }

        Ok(Some(confirm_users_form(queue_id, rows, request.hook.clone())))
    }
}

fn select_queue_form(hook: Option<Value>) -> HookResponse {
    HookResponse::form(
        FormSpec::new()
            .width(500)
            .hook(hook)
            .schema(ObjectSchema::new().property("queue", string()).required("queue").build())
            .ui_schema(
                UiElement::group(vec![UiElement::control("queue")])
                    .label("Please select the queue first"),
            ),
    )
}

fn confirm_users_form(queue_id: u64, rows: Vec<Value>, hook: Option<Value>) -> HookResponse {
    let schema = ObjectSchema::new()
        .property(
            "users",
            array_of(
                ObjectSchema::new()
                    .property("email", string())
                    .property("name", string()),
            ),
        )
        .build();
    let users = UiElement::control("users")
        .option("elementLabelProp", Value::from("email"))
        .option("add", Value::Bool(false))
        .detail(UiElement::vertical(vec![
            UiElement::control("email").readonly(),
            UiElement::control("name").readonly(),
        ]));

    HookResponse::form(
        FormSpec::new()
            .width(1000)
            .hook(hook)
            .default_value(json!({ "queue": format!("queues/{queue_id}"), "users": rows }))
            .schema(schema)
            .ui_schema(
                UiElement::group(vec![users])
                    .label("I will be assigning the following users to the queue:"),
            ),
    )
}
