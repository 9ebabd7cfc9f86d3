//! Upstream exchange
//!
//! Sends the client's query to one upstream target over UDP and waits for a
//! reply carrying the same ID. A truncated UDP reply is relayed as-is to UDP
//! clients, which retry over TCP themselves; for TCP clients it is retried
//! once over TCP against the same target. Each attempt is bounded by the
//! configured timeout.

use crate::config::UpstreamConfig;
use crate::dns::{parse_message, serialize_message, Message, MessageType};
use crate::server::Protocol;
use crate::{Error, Result};
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket};
use tokio::time::{timeout_at, Instant};
use tracing::{debug, warn};

/// Upstream client
#[derive(Debug, Clone)]
pub struct Forwarder {
    timeout: Duration,
    udp_buffer_size: usize,
}

impl Forwarder {
    /// Create a forwarder with an exchange timeout and UDP receive buffer
    pub fn new(timeout: Duration, udp_buffer_size: usize) -> Self {
        Self {
            timeout,
            udp_buffer_size,
        }
    }

    /// Create a forwarder from the `upstream` section
    pub fn from_config(config: &UpstreamConfig) -> Self {
        Self::new(config.timeout(), config.udp_buffer_size)
    }

    /// Exchange timeout
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Send `request` to `target` and return its reply
    ///
    /// `client` is the transport the query arrived on. A truncated reply is
    /// only completed over TCP when the client can take it.
    ///
    /// # Errors
    ///
    /// `UpstreamTimeout` when no matching reply arrives in time, `Connection`
    /// on socket errors, `DnsProtocol` when the target sends garbage.
    pub async fn exchange(
        &self,
        request: &Message,
        target: SocketAddr,
        client: Protocol,
    ) -> Result<Message> {
        let data = serialize_message(request)?;
        // Room for whatever the client allowed the upstream to send
        let buffer_size = self.udp_buffer_size.max(request.max_payload() as usize);
        let reply = self
            .exchange_udp(&data, request.id(), target, buffer_size)
            .await?;

        if reply.truncated() && client == Protocol::Tcp {
            debug!(%target, id = request.id(), "truncated UDP reply, retrying over TCP");
            return self.exchange_tcp(&data, request.id(), target).await;
        }

        Ok(reply)
    }

    async fn exchange_udp(
        &self,
        data: &[u8],
        id: u16,
        target: SocketAddr,
        buffer_size: usize,
    ) -> Result<Message> {
        let deadline = Instant::now() + self.timeout;
        let local: SocketAddr = if target.is_ipv4() {
            (Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (Ipv6Addr::UNSPECIFIED, 0).into()
        };

        let socket = UdpSocket::bind(local)
            .await
            .map_err(|e| Error::connection(target.to_string(), e.to_string()))?;
        socket
            .connect(target)
            .await
            .map_err(|e| Error::connection(target.to_string(), e.to_string()))?;

        let sent = socket
            .send(data)
            .await
            .map_err(|e| Error::connection(target.to_string(), e.to_string()))?;
        debug!("Sent {} bytes to upstream {}", sent, target);

        let mut buf = vec![0u8; buffer_size];
        loop {
            let len = match timeout_at(deadline, socket.recv(&mut buf)).await {
                Ok(Ok(len)) => len,
                Ok(Err(e)) => {
                    warn!("Error receiving from upstream {}: {}", target, e);
                    return Err(Error::connection(target.to_string(), e.to_string()));
                }
                Err(_) => {
                    warn!("Timeout waiting for response from upstream {}", target);
                    return Err(self.timed_out(target));
                }
            };

            match parse_message(&buf[..len]) {
                Ok(reply) if is_reply_to(&reply, id) => return Ok(reply),
                Ok(reply) => {
                    debug!(%target, expected = id, got = reply.id(), "ignoring unrelated datagram");
                }
                Err(e) => {
                    // Connected socket: only the target can have sent this
                    warn!(%target, len, error = %e, "malformed reply from upstream");
                    return Err(e);
                }
            }
        }
    }

    async fn exchange_tcp(&self, data: &[u8], id: u16, target: SocketAddr) -> Result<Message> {
        let deadline = Instant::now() + self.timeout;
        let len = u16::try_from(data.len())
            .map_err(|_| Error::DnsProtocol(format!("Query too large for TCP: {}", data.len())))?;

        let exchange = async {
            let mut stream = TcpStream::connect(target).await?;
            let mut framed = Vec::with_capacity(data.len() + 2);
            framed.extend_from_slice(&len.to_be_bytes());
            framed.extend_from_slice(data);
            stream.write_all(&framed).await?;

            let mut len_buf = [0u8; 2];
            stream.read_exact(&mut len_buf).await?;
            let mut reply = vec![0u8; u16::from_be_bytes(len_buf) as usize];
            stream.read_exact(&mut reply).await?;
            Ok::<_, std::io::Error>(reply)
        };

        let bytes = match timeout_at(deadline, exchange).await {
            Ok(Ok(bytes)) => bytes,
            Ok(Err(e)) => {
                warn!("TCP exchange with upstream {} failed: {}", target, e);
                return Err(Error::connection(target.to_string(), e.to_string()));
            }
            Err(_) => {
                warn!("Timeout waiting for TCP response from upstream {}", target);
                return Err(self.timed_out(target));
            }
        };

        let reply = parse_message(&bytes)?;
        if !is_reply_to(&reply, id) {
            return Err(Error::DnsProtocol(format!(
                "Upstream {} answered ID {} to query {}",
                target,
                reply.id(),
                id
            )));
        }
        Ok(reply)
    }

    fn timed_out(&self, target: SocketAddr) -> Error {
        Error::upstream_timeout(target.to_string(), self.timeout.as_millis() as u64)
    }
}

fn is_reply_to(reply: &Message, id: u16) -> bool {
    reply.id() == id && reply.message_type() == MessageType::Response
}
