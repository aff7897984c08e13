//! Side-effecting calls made in execute mode.
//!
//! Handlers never talk to `reqwest` directly: every call goes through a
//! [`Transport`], so the dispatcher can wrap it in [`ReadOnly`] while a handler
//! is configuring and tests can substitute a recording fake.

mod rest;

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, header::AUTHORIZATION, multipart};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

pub use rest::{RestApi, Scheme};

use crate::{
    errors::{AppError, Result as AppResult},
    hook::HookError,
};

const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone)]
pub enum Auth {
    Token(SecretString),
    Bearer(SecretString),
}

impl Auth {
    fn header_value(&self) -> String {
        match self {
            Self::Token(secret) => format!("Token {}", secret.expose_secret()),
            Self::Bearer(secret) => format!("Bearer {}", secret.expose_secret()),
        }
    }
}

/// A single file sent as `multipart/form-data`, next to plain text fields.
#[derive(Debug, Clone)]
pub struct Upload {
    pub file_name: String,
    pub mime: &'static str,
    pub content: Vec<u8>,
    pub fields: Vec<(&'static str, String)>,
}

impl Upload {
    fn into_form(self) -> Result<multipart::Form, HookError> {
        let part = multipart::Part::bytes(self.content)
            .file_name(self.file_name)
            .mime_str(self.mime)
            .map_err(|err| HookError::Transport(err.to_string()))?;
        Ok(self
            .fields
            .into_iter()
            .fold(multipart::Form::new().part("file", part), |form, (name, value)| {
                form.text(name, value)
            }))
    }
}

#[derive(Debug, Clone)]
pub struct OutboundRequest {
    pub method: Method,
    pub url: String,
    pub auth: Option<Auth>,
    pub headers: Vec<(&'static str, String)>,
    pub body: Option<Value>,
    pub upload: Option<Upload>,
    query: bool,
}

impl OutboundRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            auth: None,
            headers: Vec::new(),
            body: None,
            upload: None,
            query: false,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn auth(mut self, auth: Auth) -> Self {
        self.auth = Some(auth);
        self
    }

    pub fn header(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.headers.push((name, value.into()));
        self
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn upload(mut self, upload: Upload) -> Self {
        self.upload = Some(upload);
        self
    }

    /// Marks a POST to a search-style endpoint that only reads.
    pub fn query(mut self) -> Self {
        self.query = true;
        self
    }

    /// Anything but a read changes upstream state.
    pub fn is_mutating(&self) -> bool {
        !self.query && !matches!(self.method, Method::GET | Method::HEAD | Method::OPTIONS)
    }
}

#[derive(Debug, Clone)]
pub struct OutboundResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl OutboundResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn error_for_status(self) -> Result<Self, HookError> {
        if self.is_success() {
            return Ok(self);
        }
        Err(HookError::Upstream {
            status: self.status,
            body: self.text(),
        })
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, HookError> {
        serde_json::from_slice(&self.body)
            .map_err(|err| HookError::MalformedUpstream(err.to_string()))
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: OutboundRequest) -> Result<OutboundResponse, HookError>;
}

#[derive(Clone)]
pub struct HttpTransport {
    http: Client,
}

impl HttpTransport {
    /// `timeout` of `None` leaves outbound calls unbounded.
    pub fn new(timeout: Option<Duration>) -> AppResult<Self> {
        let mut builder = Client::builder().user_agent(USER_AGENT);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder
            .build()
            .map_err(|err| AppError::HttpClient(err.to_string()))?;
        Ok(Self { http })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: OutboundRequest) -> Result<OutboundResponse, HookError> {
        debug!(method = %request.method, url = %request.url, "outbound call");
        let mut builder = self.http.request(request.method, &request.url);
        if let Some(auth) = &request.auth {
            builder = builder.header(AUTHORIZATION, auth.header_value());
        }
        for (name, value) in &request.headers {
            builder = builder.header(*name, value);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }
        if let Some(upload) = request.upload {
            builder = builder.multipart(upload.into_form()?);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let body = response.bytes().await?.to_vec();
        debug!(status, bytes = body.len(), "outbound response");
        Ok(OutboundResponse { status, body })
    }
}

/// Refuses mutating calls; reads pass through.
pub struct ReadOnly<'a> {
    inner: &'a dyn Transport,
}

impl<'a> ReadOnly<'a> {
    pub fn new(inner: &'a dyn Transport) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl Transport for ReadOnly<'_> {
    async fn send(&self, request: OutboundRequest) -> Result<OutboundResponse, HookError> {
        if request.is_mutating() {
            return Err(HookError::SideEffectInConfigure {
                method: request.method.to_string(),
                url: request.url,
            });
        }
        self.inner.send(request).await
    }
}

/// Sends through a trait object and decodes a 2xx JSON body.
pub async fn fetch_json<T: DeserializeOwned>(
    transport: &dyn Transport,
    request: OutboundRequest,
) -> Result<T, HookError> {
    transport.send(request).await?.error_for_status()?.json()
}
