//! DNS listeners
//!
//! One task per configured binding, UDP or TCP. Each query runs in its own
//! task tracked by the listener, so shutdown can stop accepting new work and
//! then give in-flight queries a bounded grace period.
//!
//! # Example
//!
//! ```rust,no_run
//! use dnsfence::dns::{error_response, Message, ResponseCode};
//! use dnsfence::server::{RequestContext, RequestHandler, ServerConfig, UdpServer};
//! use std::sync::Arc;
//! use tokio::sync::watch;
//!
//! struct RefuseAll;
//!
//! #[async_trait::async_trait]
//! impl RequestHandler for RefuseAll {
//!     async fn handle(&self, ctx: RequestContext) -> dnsfence::Result<Message> {
//!         Ok(error_response(&ctx.message, ResponseCode::Refused))
//!     }
//! }
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ServerConfig::new("127.0.0.1:5353".parse()?);
//! let server = UdpServer::bind(config, Arc::new(RefuseAll)).await?;
//! let (_tx, rx) = watch::channel(false);
//! server.run(rx).await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod handler;
pub mod launcher;
pub mod tcp;
pub mod udp;

// Re-export commonly used types
pub use config::ServerConfig;
pub use handler::{ClientInfo, Protocol, RequestContext, RequestHandler};
pub use launcher::{BoundServer, RunningServers, ServerLauncher};
pub use tcp::TcpServer;
pub use udp::UdpServer;

use crate::dns::{
    error_response, format_error, parse_message, read_request_id, serialize_message, MessageType,
    ResponseCode,
};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{debug, error, warn};

/// Parse, handle and encode one query
///
/// Returns the encoded reply, or `None` when nothing should be sent back.
/// Unparsable requests with a readable header get FORMERR; handler errors
/// become SERVFAIL.
pub(crate) async fn dispatch(
    handler: &dyn RequestHandler,
    data: &[u8],
    peer: SocketAddr,
    protocol: Protocol,
) -> Option<Vec<u8>> {
    let request = match parse_message(data) {
        Ok(request) => request,
        Err(e) => {
            debug!(%peer, %protocol, error = %e, "malformed request");
            let id = read_request_id(data)?;
            return serialize_message(&format_error(id)).ok();
        }
    };

    if request.message_type() == MessageType::Response {
        debug!(%peer, %protocol, "ignoring response sent to listener");
        return None;
    }

    let req_id = request.id();
    let fallback = error_response(&request, ResponseCode::ServFail);

    let response = match handler
        .handle(RequestContext::with_client(request, peer, protocol))
        .await
    {
        Ok(mut response) => {
            response.set_id(req_id);
            response
        }
        Err(e) => {
            warn!(%peer, %protocol, error = %e, "handler failed, answering SERVFAIL");
            fallback
        }
    };

    match serialize_message(&response) {
        Ok(bytes) => Some(bytes),
        Err(e) => {
            error!(%peer, %protocol, error = %e, "failed to encode response");
            None
        }
    }
}

/// Wait for in-flight tasks, aborting whatever is left after `grace`
pub(crate) async fn drain(tasks: &mut JoinSet<()>, grace: Duration, listener: &str) {
    if tasks.is_empty() {
        return;
    }

    debug!(listener, in_flight = tasks.len(), "draining in-flight queries");
    let finished = tokio::time::timeout(grace, async {
        while tasks.join_next().await.is_some() {}
    })
    .await;

    if finished.is_err() {
        warn!(
            listener,
            remaining = tasks.len(),
            "shutdown grace period elapsed, aborting in-flight queries"
        );
        tasks.abort_all();
        while tasks.join_next().await.is_some() {}
    }
}
