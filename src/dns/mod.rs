//! DNS message helpers
//!
//! Wire encoding and decoding on top of hickory-proto, plus the small set of
//! synthesized replies the proxy sends itself (REFUSED, SERVFAIL, NOTIMP,
//! FORMERR). Forwarded answers are never built here; they come from the
//! upstream as-is.

pub mod reply;
pub mod wire;

pub use hickory_proto::op::{Message, MessageType, OpCode, Query, ResponseCode};
pub use hickory_proto::rr::{Name, RData, Record, RecordType};
pub use reply::{error_response, format_error};
pub use wire::{parse_message, read_request_id, serialize_message};
