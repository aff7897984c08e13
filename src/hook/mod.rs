//! The handler contract: one request in, at most one response out.

pub mod dispatch;
mod error;
pub mod ids;
pub mod normalize;

use std::fmt;

use async_trait::async_trait;
use ulid::Ulid;

pub use error::HookError;

use crate::{
    config::Config,
    models::{HookRequest, HookResponse},
    outbound::Transport,
};

/// `Ok(None)` means "no UI change" and is distinct from an error.
pub type HookResult = Result<Option<HookResponse>, HookError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Return a form describing the inputs needed next; no side effects.
    Configure,
    Execute,
}

impl Mode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Configure => "configure",
            Self::Execute => "execute",
        }
    }
}

/// A request with its mode decided once, at entry.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub id: Ulid,
    pub mode: Mode,
    pub variant: Option<String>,
    pub request: HookRequest,
}

impl Invocation {
    /// `configure: true` selects configure mode, as do the `variant` and
    /// `action` spellings some hosts send instead.
    pub fn from_request(request: HookRequest) -> Self {
        let flagged = request.configure == Some(true)
            || request.action.as_deref() == Some("configure");
        let variant = request.variant.clone().filter(|variant| !variant.is_empty());

        let (mode, variant) = match variant.as_deref() {
            Some("configure") => (Mode::Configure, None),
            _ if flagged => (Mode::Configure, variant),
            _ => (Mode::Execute, variant),
        };

        Self {
            id: Ulid::new(),
            mode,
            variant,
            request,
        }
    }

    pub fn variant(&self) -> Option<&str> {
        self.variant.as_deref()
    }

    pub fn is_configure(&self) -> bool {
        self.mode == Mode::Configure
    }
}

/// Credentials a handler cannot execute without.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Credential {
    AuthorizationToken,
    BaseUrl,
    Secret(&'static str),
}

impl Credential {
    pub fn is_present(self, request: &HookRequest) -> bool {
        match self {
            Self::AuthorizationToken => request.token().is_some(),
            Self::BaseUrl => request.base_url.as_deref().is_some_and(|url| !url.is_empty()),
            Self::Secret(name) => request.secret(name).is_some(),
        }
    }
}

impl fmt::Display for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AuthorizationToken => f.write_str("rossum_authorization_token"),
            Self::BaseUrl => f.write_str("base_url"),
            Self::Secret(name) => write!(f, "secrets.{name}"),
        }
    }
}

/// The platform API needs both of these.
pub const PLATFORM_API: &[Credential] = &[Credential::BaseUrl, Credential::AuthorizationToken];

/// How a handler reports failures to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureSurface {
    /// `{ intent: { error: { message } } }`
    Intent,
    /// `{ messages: [{ type: "error", ... }] }`
    Messages,
}

/// Third-party service locations handlers may call.
#[derive(Debug, Clone)]
pub struct Services {
    pub master_data_url: String,
    pub geocoding_url: String,
    pub weather_url: String,
    pub kitten_url: String,
}

impl From<&Config> for Services {
    fn from(config: &Config) -> Self {
        Self {
            master_data_url: config.master_data_url.clone(),
            geocoding_url: config.geocoding_url.clone(),
            weather_url: config.weather_url.clone(),
            kitten_url: config.kitten_url.clone(),
        }
    }
}

impl Default for Services {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

/// Per-invocation collaborators. Nothing here outlives the call.
#[derive(Clone, Copy)]
pub struct HookContext<'a> {
    pub transport: &'a dyn Transport,
    pub services: &'a Services,
    /// When false, mutating calls are skipped and reported as done.
    pub commit: bool,
}

impl<'a> HookContext<'a> {
    pub fn new(transport: &'a dyn Transport, services: &'a Services) -> Self {
        Self {
            transport,
            services,
            commit: true,
        }
    }

    pub fn commit(mut self, commit: bool) -> Self {
        self.commit = commit;
        self
    }

    pub fn with_transport<'b>(&self, transport: &'b dyn Transport) -> HookContext<'b>
    where
        'a: 'b,
    {
        HookContext {
            transport,
            services: self.services,
            commit: self.commit,
        }
    }
}

#[async_trait]
pub trait Handler: Send + Sync {
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    /// Checked before execute mode runs; a missing one short-circuits to an
    /// error with no outbound call.
    fn required_credentials(&self) -> &'static [Credential] {
        &[]
    }

    fn failure_surface(&self) -> FailureSurface {
        FailureSurface::Intent
    }

    async fn handle(&self, invocation: &Invocation, ctx: &HookContext<'_>) -> HookResult;
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{Credential, Invocation, Mode};
    use crate::models::HookRequest;

    fn request(value: serde_json::Value) -> HookRequest {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn mode_is_decided_from_flags() {
        assert_eq!(Invocation::from_request(request(json!({}))).mode, Mode::Execute);
        assert_eq!(
            Invocation::from_request(request(json!({ "configure": false }))).mode,
            Mode::Execute
        );
        assert_eq!(
            Invocation::from_request(request(json!({ "configure": true }))).mode,
            Mode::Configure
        );
        assert_eq!(
            Invocation::from_request(request(json!({ "action": "configure" }))).mode,
            Mode::Configure
        );

        let by_variant = Invocation::from_request(request(json!({ "variant": "configure" })));
        assert_eq!(by_variant.mode, Mode::Configure);
        assert_eq!(by_variant.variant(), None);
    }

    #[test]
    fn variant_survives_configure_flag() {
        let invocation = Invocation::from_request(request(json!({
            "configure": true,
            "variant": "queue_lookup"
        })));
        assert!(invocation.is_configure());
        assert_eq!(invocation.variant(), Some("queue_lookup"));
    }

    #[test]
    fn credentials_are_checked_by_name() {
        let req = request(json!({ "secrets": { "token": "x" }, "base_url": "" }));
        assert!(Credential::Secret("token").is_present(&req));
        assert!(!Credential::BaseUrl.is_present(&req));
        assert!(!Credential::AuthorizationToken.is_present(&req));
        assert_eq!(Credential::Secret("token").to_string(), "secrets.token");
    }
}
