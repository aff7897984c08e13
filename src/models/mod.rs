pub mod form;
pub mod request;
pub mod response;

pub use form::FormSpec;
pub use request::HookRequest;
pub use response::{HookResponse, LookupOption, LookupResult, Message, MessageKind, TerminalIntent};
