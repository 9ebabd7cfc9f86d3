//! Query type name table
//!
//! Maps configuration mnemonics (`A`, `AAAA`, `MX`, ...) to wire codes using
//! hickory-proto's record type table. The RFC 3597 form `TYPEnnn` is also
//! accepted for types without a mnemonic.

use hickory_proto::rr::RecordType;
use std::str::FromStr;

/// Resolve a query type name to its numeric code
///
/// Names are case-insensitive. Returns `None` for unknown names.
///
/// # Example
///
/// ```
/// use dnsfence::rules::query_type::parse_query_type;
///
/// assert_eq!(parse_query_type("A"), Some(1));
/// assert_eq!(parse_query_type("aaaa"), Some(28));
/// assert_eq!(parse_query_type("TYPE65"), Some(65));
/// assert_eq!(parse_query_type("BOGUS"), None);
/// ```
pub fn parse_query_type(name: &str) -> Option<u16> {
    let upper = name.trim().to_ascii_uppercase();
    if upper.is_empty() {
        return None;
    }

    if let Some(code) = upper.strip_prefix("TYPE") {
        return code.parse::<u16>().ok();
    }

    match RecordType::from_str(&upper) {
        Ok(RecordType::Unknown(_)) | Err(_) => None,
        Ok(rtype) => Some(u16::from(rtype)),
    }
}

/// Display name for a query type code, used in logs
pub fn query_type_name(code: u16) -> String {
    match RecordType::from(code) {
        RecordType::Unknown(v) => format!("TYPE{}", v),
        rtype => rtype.to_string(),
    }
}
