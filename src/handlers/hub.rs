//! Master-data hub client shared by the lookup and memory handlers.

use reqwest::Method;
use secrecy::SecretString;
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tracing::debug;

use crate::{
    hook::{Credential, HookContext, HookError},
    models::HookRequest,
    outbound::{
        Auth, OutboundRequest, OutboundResponse, RestApi, Scheme, Transport, Upload, fetch_json,
    },
};

const DEVELOP_HOSTS: &[&str] = &["https://elis.develop.r8.lol", "https://api.elis.develop.r8.lol"];
const REVIEW_PREFIX: &str = "https://review-ac-elis-backend-";
const REVIEW_SUFFIX: &str = ".review.r8.lol";
const DEV_HEADER: &str = "X-ROSSUM-DEV";
const FIND_LIMIT: u32 = 500;

pub type Row = Map<String, Value>;

/// Where the platform at `base_url` keeps its hub.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Deployment {
    /// Shares the central hub and the caller's token, flagged as dev traffic.
    Develop,
    /// Shares the central hub; the token lives in organization metadata.
    Review,
    /// Serves its own hub under `/svc/master-data-hub/api`.
    Hosted(String),
}

impl Deployment {
    fn of(base_url: &str) -> Self {
        if DEVELOP_HOSTS.iter().any(|host| base_url.starts_with(host)) {
            return Self::Develop;
        }
        let review = base_url.strip_prefix(REVIEW_PREFIX).is_some_and(|rest| {
            let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
            digits > 0 && rest[digits..].starts_with(REVIEW_SUFFIX)
        });
        if review {
            return Self::Review;
        }
        Self::Hosted(format!("{base_url}/svc/master-data-hub/api"))
    }
}

#[derive(Debug, Deserialize)]
struct Organizations {
    #[serde(default)]
    results: Vec<Organization>,
}

#[derive(Debug, Deserialize)]
struct Organization {
    #[serde(default)]
    metadata: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct DatasetList {
    #[serde(default)]
    datasets: Vec<Dataset>,
}

#[derive(Debug, Deserialize)]
struct Dataset {
    dataset_name: String,
}

#[derive(Debug, Deserialize)]
struct Rows {
    #[serde(default)]
    results: Vec<Row>,
}

/// Client for one invocation, bound to the resolved hub token.
pub struct Hub<'a> {
    transport: &'a dyn Transport,
    url: String,
    token: SecretString,
    dev: bool,
}

impl<'a> Hub<'a> {
    /// Picks the hub URL and token for this request.
    ///
    /// A non-empty `settings.url` wins, then the hub implied by `base_url`,
    /// then the configured default. `secrets.token` wins over the derived
    /// token.
    pub async fn resolve(request: &HookRequest, ctx: &HookContext<'a>) -> Result<Self, HookError> {
        let base_url = request
            .base_url
            .as_deref()
            .map(|url| url.trim_end_matches('/'))
            .filter(|url| !url.is_empty());
        let deployment = base_url.map(Deployment::of);

        let derived_url = match &deployment {
            Some(Deployment::Hosted(url)) => url.as_str(),
            Some(Deployment::Develop | Deployment::Review) | None => {
                ctx.services.master_data_url.as_str()
            }
        };
        let url = request
            .setting_str("url")
            .filter(|url| !url.trim().is_empty())
            .unwrap_or(derived_url)
            .trim_end_matches('/')
            .to_string();

        let token = match request.secret("token") {
            Some(token) => Some(token.clone()),
            None if deployment == Some(Deployment::Review) => {
                master_token(ctx.transport, request).await?
            }
            None => request.token().cloned(),
        };
        let Some(token) = token else {
            return Err(HookError::MissingCredential(Credential::Secret("token").to_string()));
        };

        let dev = deployment == Some(Deployment::Develop);
        debug!(%url, dev, "master-data hub resolved");
        Ok(Self {
            transport: ctx.transport,
            url,
            token,
            dev,
        })
    }

    pub async fn datasets(&self) -> Result<Vec<String>, HookError> {
        let list: DatasetList =
            fetch_json(self.transport, self.request(Method::GET, "v2/dataset/")).await?;
        Ok(list.datasets.into_iter().map(|dataset| dataset.dataset_name).collect())
    }

    /// Up to one page of rows, unfiltered.
    pub async fn rows(&self, dataset: &str) -> Result<Vec<Row>, HookError> {
        let body = json!({
            "find": {},
            "projection": {},
            "skip": 0,
            "limit": FIND_LIMIT,
            "sort": {},
            "dataset": dataset,
        });
        let rows: Rows = fetch_json(self.transport, self.search("v1/data/find", body)).await?;
        Ok(rows.results)
    }

    pub async fn aggregate(&self, dataset: &str, pipeline: Value) -> Result<Vec<Row>, HookError> {
        let request = self.search("v1/data/aggregate", aggregate_body(dataset, pipeline));
        let rows: Rows = fetch_json(self.transport, request).await?;
        Ok(rows.results)
    }

    /// Runs a pipeline and hands back the raw response, status unchecked.
    pub async fn aggregate_response(
        &self,
        dataset: &str,
        pipeline: Value,
    ) -> Result<OutboundResponse, HookError> {
        self.transport
            .send(self.search("v1/data/aggregate", aggregate_body(dataset, pipeline)))
            .await
    }

    /// Inserts `records`, replacing rows that share a value in `id_key`.
    pub async fn upsert(
        &self,
        dataset: &str,
        records: &[Value],
        id_key: &str,
    ) -> Result<(), HookError> {
        let upload = Upload {
            file_name: "memory_data.json".to_string(),
            mime: "application/json",
            content: serde_json::to_vec(records)
                .map_err(|err| HookError::InvalidInput(err.to_string()))?,
            fields: vec![
                ("encoding", "utf-8".to_string()),
                ("update_or_new", "true".to_string()),
                ("id_keys", id_key.to_string()),
            ],
        };
        let request = self
            .request(Method::PATCH, &format!("v1/dataset/{dataset}"))
            .upload(upload);
        self.transport.send(request).await?.error_for_status()?;
        Ok(())
    }

    fn request(&self, method: Method, path: &str) -> OutboundRequest {
        let request = OutboundRequest::new(method, format!("{}/{path}", self.url))
            .auth(Auth::Bearer(self.token.clone()));
        if self.dev {
            request.header(DEV_HEADER, "true")
        } else {
            request
        }
    }

    fn search(&self, path: &str, body: Value) -> OutboundRequest {
        self.request(Method::POST, path).json(body).query()
    }
}

fn aggregate_body(dataset: &str, pipeline: Value) -> Value {
    json!({
        "aggregate": pipeline,
        "collation": {},
        "let": {},
        "options": {},
        "dataset": dataset,
    })
}

/// Review stacks keep the hub token in the first organization's metadata.
async fn master_token(
    transport: &dyn Transport,
    request: &HookRequest,
) -> Result<Option<SecretString>, HookError> {
    let api = RestApi::from_request(transport, request)?;
    let organizations: Organizations = api.get_json("organizations", Scheme::Bearer).await?;
    Ok(organizations
        .results
        .into_iter()
        .next()
        .and_then(|organization| {
            organization
                .metadata
                .get("mdh_master_token")
                .and_then(Value::as_str)
                .filter(|token| !token.is_empty())
                .map(SecretString::from)
        }))
}
