use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum AppError {
    #[error("could not resolve user home/config directory")]
    #[diagnostic(
        code(hookkit::config::paths),
        help("Set HOME, then retry `hookkit list`.")
    )]
    HomeDirUnavailable,

    #[error("failed to load config: {0}")]
    #[diagnostic(
        code(hookkit::config::load),
        help("Fix the config file syntax or run `hookkit init` to rewrite a template.")
    )]
    ConfigLoad(String),

    #[error("failed to prepare config directory: {0}")]
    #[diagnostic(code(hookkit::config::mkdir))]
    CreateConfigDir(String),

    #[error("failed to write config file: {0}")]
    #[diagnostic(code(hookkit::config::write))]
    WriteConfig(String),

    #[error("failed to serialize config")]
    #[diagnostic(code(hookkit::config::serialize))]
    ConfigSerialize,

    #[error("config file already exists: {0}")]
    #[diagnostic(
        code(hookkit::config::exists),
        help("Pass `--force` to overwrite it.")
    )]
    ConfigExists(String),

    #[error("unknown handler `{0}`")]
    #[diagnostic(
        code(hookkit::registry::unknown),
        help("Run `hookkit list` to see the registered handlers.")
    )]
    UnknownHandler(String),

    #[error("failed to read hook request from {0}")]
    #[diagnostic(code(hookkit::invoke::read))]
    RequestRead(String),

    #[error("hook request is not valid JSON: {0}")]
    #[diagnostic(
        code(hookkit::invoke::parse),
        help("The request must be a JSON object such as `{{\"configure\": true}}`.")
    )]
    RequestParse(String),

    #[error("failed to build HTTP client: {0}")]
    #[diagnostic(code(hookkit::http::client))]
    HttpClient(String),

    #[error("failed to bind {0}")]
    #[diagnostic(
        code(hookkit::serve::bind),
        help("Pick another address with `--addr` or HOOKKIT_LISTEN_ADDR.")
    )]
    Bind(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, AppError>;
