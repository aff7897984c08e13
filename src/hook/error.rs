use thiserror::Error;

use crate::models::form::FormError;

/// Longest upstream body excerpt shown to an end user.
const MAX_DIAGNOSTIC_CHARS: usize = 300;

/// Faults raised inside a handler. None of them reach the host: the dispatcher
/// turns each into an error response.
#[derive(Debug, Error)]
pub enum HookError {
    #[error("missing input: {0}")]
    MissingInput(String),

    #[error("missing credential: {0}")]
    MissingCredential(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("upstream returned status {status}")]
    Upstream { status: u16, body: String },

    #[error("outbound request failed: {0}")]
    Transport(String),

    #[error("malformed upstream data: {0}")]
    MalformedUpstream(String),

    #[error("no {0} available")]
    EmptyOptions(String),

    #[error("{method} {url} attempted in configure mode")]
    SideEffectInConfigure { method: String, url: String },

    #[error("invalid form: {0}")]
    InvalidForm(#[from] FormError),
}

impl HookError {
    /// Short, human-readable text for the host UI.
    pub fn user_message(&self) -> String {
        match self {
            Self::MissingInput(what) | Self::MissingCredential(what) => format!("Missing {what}."),
            Self::InvalidInput(detail) => format!("Invalid input: {detail}"),
            Self::Upstream { status, body } => {
                let body = excerpt(body);
                if body.is_empty() {
                    format!("Request failed with status {status}.")
                } else {
                    format!("Request failed with status {status}: {body}")
                }
            }
            Self::Transport(detail) => format!("Request failed: {detail}"),
            Self::MalformedUpstream(detail) => format!("Unexpected response: {detail}"),
            Self::EmptyOptions(what) => format!("No {what} available."),
            Self::SideEffectInConfigure { .. } => {
                "This extension tried to change data while being configured.".to_string()
            }
            Self::InvalidForm(_) => "Extension returned an invalid form.".to_string(),
        }
    }
}

impl From<reqwest::Error> for HookError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.without_url().to_string())
    }
}

fn excerpt(body: &str) -> String {
    let body = body.trim();
    if body.chars().count() <= MAX_DIAGNOSTIC_CHARS {
        return body.to_string();
    }
    let mut out: String = body.chars().take(MAX_DIAGNOSTIC_CHARS).collect();
    out.push('…');
    out
}

#[cfg(test)]
mod tests {
    use super::HookError;

    #[test]
    fn upstream_message_carries_a_bounded_body() {
        let err = HookError::Upstream {
            status: 400,
            body: "x".repeat(1000),
        };
        let message = err.user_message();
        assert!(message.starts_with("Request failed with status 400: xxx"));
        assert!(message.chars().count() < 400);

        let empty = HookError::Upstream {
            status: 502,
            body: "  ".into(),
        };
        assert_eq!(empty.user_message(), "Request failed with status 502.");
    }

    #[test]
    fn missing_credential_names_the_field() {
        let err = HookError::MissingCredential("secrets.token".into());
        assert_eq!(err.user_message(), "Missing secrets.token.");
    }
}
