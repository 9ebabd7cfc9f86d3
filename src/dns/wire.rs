//! DNS wire format parsing and serialization
//!
//! Thin wrappers over hickory-proto that map its errors into the crate error.

use crate::dns::Message;
use crate::{Error, Result};

/// Parse a DNS message from wire format bytes
///
/// # Example
///
/// ```
/// use dnsfence::dns::wire::{parse_message, serialize_message};
/// use dnsfence::dns::Message;
///
/// let mut message = Message::new();
/// message.set_id(7);
/// let bytes = serialize_message(&message)?;
/// assert_eq!(parse_message(&bytes)?.id(), 7);
/// # Ok::<(), dnsfence::Error>(())
/// ```
pub fn parse_message(data: &[u8]) -> Result<Message> {
    Message::from_vec(data)
        .map_err(|e| Error::DnsProtocol(format!("Failed to parse DNS message: {}", e)))
}

/// Serialize a DNS message to wire format bytes
pub fn serialize_message(message: &Message) -> Result<Vec<u8>> {
    message
        .to_vec()
        .map_err(|e| Error::DnsProtocol(format!("Failed to serialize DNS message: {}", e)))
}

/// Read the message ID from a raw datagram that may not parse
///
/// Returns `None` when the data is shorter than a DNS header.
pub fn read_request_id(data: &[u8]) -> Option<u16> {
    if data.len() < 12 {
        return None;
    }
    Some(u16::from_be_bytes([data[0], data[1]]))
}
