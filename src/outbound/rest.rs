use reqwest::Method;
use secrecy::SecretString;
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::{Auth, OutboundRequest, OutboundResponse, Transport, fetch_json};
use crate::{hook::HookError, models::HookRequest};

/// Authorization header family; the platform accepts both depending on the
/// endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Token,
    Bearer,
}

/// The platform REST API at `{base_url}/api/v1`, authenticated with the
/// request's own token.
pub struct RestApi<'a> {
    transport: &'a dyn Transport,
    base_url: String,
    token: SecretString,
}

impl<'a> RestApi<'a> {
    pub fn new(transport: &'a dyn Transport, base_url: &str, token: SecretString) -> Self {
        Self {
            transport,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        }
    }

    pub fn from_request(
        transport: &'a dyn Transport,
        request: &HookRequest,
    ) -> Result<Self, HookError> {
        let Some(base_url) = request.base_url.as_deref().filter(|url| !url.is_empty()) else {
            return Err(HookError::MissingCredential("base_url".to_string()));
        };
        let Some(token) = request.token() else {
            return Err(HookError::MissingCredential("rossum_authorization_token".to_string()));
        };
        Ok(Self::new(transport, base_url, token.clone()))
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/api/v1/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn request(&self, method: Method, path: &str, scheme: Scheme) -> OutboundRequest {
        let auth = match scheme {
            Scheme::Token => Auth::Token(self.token.clone()),
            Scheme::Bearer => Auth::Bearer(self.token.clone()),
        };
        OutboundRequest::new(method, self.url(path)).auth(auth)
    }

    /// Sends without checking the status.
    pub async fn send(
        &self,
        method: Method,
        path: &str,
        scheme: Scheme,
        body: Option<Value>,
    ) -> Result<OutboundResponse, HookError> {
        let mut request = self.request(method, path, scheme);
        request.body = body;
        self.transport.send(request).await
    }

    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        scheme: Scheme,
    ) -> Result<T, HookError> {
        fetch_json(self.transport, self.request(Method::GET, path, scheme)).await
    }

    pub async fn post_json<T: DeserializeOwned>(
        &self,
        path: &str,
        scheme: Scheme,
        body: Value,
    ) -> Result<T, HookError> {
        fetch_json(self.transport, self.request(Method::POST, path, scheme).json(body)).await
    }

    /// POST to a search endpoint; allowed while configuring.
    pub async fn search_json<T: DeserializeOwned>(
        &self,
        path: &str,
        scheme: Scheme,
        body: Value,
    ) -> Result<T, HookError> {
        let request = self.request(Method::POST, path, scheme).json(body).query();
        fetch_json(self.transport, request).await
    }
}
