//! Request handler trait
//!
//! Defines the interface between the listeners and request processing.

use crate::dns::Message;
use crate::{Error, Result};
use async_trait::async_trait;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

/// Client connection information
#[derive(Debug, Clone, Copy)]
pub struct ClientInfo {
    /// Client socket address
    pub addr: SocketAddr,
    /// Client IP address
    pub ip: IpAddr,
    /// Client port
    pub port: u16,
}

impl From<SocketAddr> for ClientInfo {
    fn from(addr: SocketAddr) -> Self {
        Self {
            addr,
            ip: addr.ip(),
            port: addr.port(),
        }
    }
}

/// Network protocol type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    /// UDP protocol
    Udp,
    /// TCP protocol
    Tcp,
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Protocol::Udp => write!(f, "udp"),
            Protocol::Tcp => write!(f, "tcp"),
        }
    }
}

impl FromStr for Protocol {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "udp" => Ok(Protocol::Udp),
            "tcp" => Ok(Protocol::Tcp),
            other => Err(Error::invalid_config_value(
                "listen",
                other,
                "protocol must be udp or tcp",
            )),
        }
    }
}

/// Request processing context
///
/// Everything a handler needs about one inbound query.
///
/// # Example
///
/// ```rust
/// use dnsfence::server::{RequestContext, Protocol};
/// use dnsfence::dns::Message;
/// use std::net::SocketAddr;
///
/// let addr: SocketAddr = "127.0.0.1:12345".parse().unwrap();
/// let ctx = RequestContext::with_client(Message::new(), addr, Protocol::Udp);
///
/// assert_eq!(ctx.client_ip(), addr.ip());
/// ```
#[derive(Debug)]
pub struct RequestContext {
    /// DNS query message
    pub message: Message,
    /// Client connection information
    pub client_info: ClientInfo,
    /// Network protocol
    pub protocol: Protocol,
}

impl RequestContext {
    /// Create a new request context for a client
    pub fn with_client(message: Message, client_addr: SocketAddr, protocol: Protocol) -> Self {
        Self {
            message,
            client_info: ClientInfo::from(client_addr),
            protocol,
        }
    }

    /// Client IP address
    pub fn client_ip(&self) -> IpAddr {
        self.client_info.ip
    }

    /// Client socket address
    pub fn client_addr(&self) -> SocketAddr {
        self.client_info.addr
    }
}

/// DNS request handler trait
///
/// Implementations turn a query into the response that is written back to
/// the client. An `Err` is answered with SERVFAIL by the listener.
///
/// # Example
///
/// ```rust
/// use dnsfence::server::{RequestHandler, RequestContext};
/// use dnsfence::dns::{error_response, Message, ResponseCode};
/// use dnsfence::Result;
/// use async_trait::async_trait;
///
/// struct RefuseAll;
///
/// #[async_trait]
/// impl RequestHandler for RefuseAll {
///     async fn handle(&self, ctx: RequestContext) -> Result<Message> {
///         Ok(error_response(&ctx.message, ResponseCode::Refused))
///     }
/// }
/// ```
#[async_trait]
pub trait RequestHandler: Send + Sync {
    /// Handle a DNS request and return a response
    async fn handle(&self, ctx: RequestContext) -> Result<Message>;
}
