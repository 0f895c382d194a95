//! GitHub webhook handling.
//!
//! - Signature verification for webhook payloads (HMAC-SHA256)
//! - Parsing of `push` and `create` events into typed values

pub mod events;
pub mod parser;
pub mod signature;

pub use events::{CreateEvent, PushEvent, RefType, WebhookEvent};
pub use parser::{ParseError, parse_webhook};
pub use signature::{
    SIGNATURE_HEADER, compute_signature, format_signature_header, parse_signature_header,
    verify_signature,
};
