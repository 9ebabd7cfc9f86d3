//! TCP DNS server implementation
//!
//! Messages are framed with a 2-byte big-endian length. A connection may
//! carry several queries; they are answered in order and the connection is
//! closed after `tcp_idle_timeout` without a new one.

use crate::server::{dispatch, drain, Protocol, RequestHandler, ServerConfig};
use crate::{Error, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

/// TCP DNS server
pub struct TcpServer {
    listener: TcpListener,
    handler: Arc<dyn RequestHandler>,
    config: ServerConfig,
}

impl TcpServer {
    /// Bind a TCP server
    ///
    /// # Errors
    ///
    /// Returns an error if the listener cannot be bound to the configured address.
    pub async fn bind(config: ServerConfig, handler: Arc<dyn RequestHandler>) -> Result<Self> {
        let listener = TcpListener::bind(config.addr)
            .await
            .map_err(|e| Error::connection(config.addr.to_string(), format!("bind failed: {}", e)))?;

        info!("TCP server listening on {}", config.addr);

        Ok(Self {
            listener,
            handler,
            config,
        })
    }

    /// Get the local address the server is bound to
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener.local_addr().map_err(Error::Io)
    }

    /// Serve until `shutdown` flips
    ///
    /// Open connections stop reading new queries on shutdown; queries being
    /// answered get the configured grace period.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let mut tasks = JoinSet::new();
        let name = format!("tcp:{}", self.local_addr()?);
        let config = Arc::new(self.config.clone());

        info!(listener = %name, "TCP server started");

        while !*shutdown.borrow() {
            tokio::select! {
                _ = shutdown.changed() => break,
                Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer_addr)) => {
                        debug!("Accepted connection from {}", peer_addr);

                        let handler = Arc::clone(&self.handler);
                        let config = Arc::clone(&config);
                        let shutdown = shutdown.clone();

                        tasks.spawn(async move {
                            if let Err(e) =
                                handle_connection(stream, peer_addr, handler, &config, shutdown).await
                            {
                                debug!("Connection from {} closed: {}", peer_addr, e);
                            }
                        });
                    }
                    Err(e) => {
                        error!("Error accepting TCP connection: {}", e);
                    }
                }
            }
        }

        info!(listener = %name, "TCP server stopping");
        drop(self.listener);
        drain(&mut tasks, self.config.shutdown_grace, &name).await;
        Ok(())
    }
}

/// Serve queries on one connection until EOF, idle timeout or shutdown
async fn handle_connection(
    mut stream: TcpStream,
    peer_addr: SocketAddr,
    handler: Arc<dyn RequestHandler>,
    config: &ServerConfig,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    loop {
        let mut len_buf = [0u8; 2];
        let read = tokio::select! {
            _ = shutdown.changed() => return Ok(()),
            read = timeout(config.tcp_idle_timeout, stream.read_exact(&mut len_buf)) => read,
        };

        match read {
            Err(_) => {
                debug!("Idle connection from {} closed", peer_addr);
                return Ok(());
            }
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(()),
            Ok(Err(e)) => return Err(Error::Io(e)),
            Ok(Ok(_)) => {}
        }

        let msg_len = u16::from_be_bytes(len_buf) as usize;
        if msg_len == 0 || msg_len > config.max_tcp_size {
            return Err(Error::DnsProtocol(format!(
                "Invalid message length: {} (max {})",
                msg_len, config.max_tcp_size
            )));
        }

        let mut buf = vec![0u8; msg_len];
        timeout(config.tcp_idle_timeout, stream.read_exact(&mut buf))
            .await
            .map_err(|_| Error::DnsProtocol("Timed out reading message body".to_string()))??;

        let Some(reply) = dispatch(handler.as_ref(), &buf, peer_addr, Protocol::Tcp).await else {
            continue;
        };

        let Ok(len) = u16::try_from(reply.len()) else {
            warn!("Response to {} too large for TCP framing: {} bytes", peer_addr, reply.len());
            return Ok(());
        };

        let mut framed = Vec::with_capacity(reply.len() + 2);
        framed.extend_from_slice(&len.to_be_bytes());
        framed.extend_from_slice(&reply);
        stream.write_all(&framed).await?;
        stream.flush().await?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns::{
        error_response, parse_message, serialize_message, Message, Query, RecordType, ResponseCode,
    };
    use crate::server::RequestContext;
    use async_trait::async_trait;
    use hickory_proto::rr::Name;
    use std::str::FromStr;
    use std::time::Duration;

    struct FailAll;

    #[async_trait]
    impl RequestHandler for FailAll {
        async fn handle(&self, ctx: RequestContext) -> Result<Message> {
            Ok(error_response(&ctx.message, ResponseCode::ServFail))
        }
    }

    async fn start(config: ServerConfig) -> (SocketAddr, watch::Sender<bool>, tokio::task::JoinHandle<Result<()>>) {
        let server = TcpServer::bind(config, Arc::new(FailAll)).await.unwrap();
        let addr = server.local_addr().unwrap();
        let (tx, rx) = watch::channel(false);
        (addr, tx, tokio::spawn(server.run(rx)))
    }

    async fn exchange(stream: &mut TcpStream, id: u16) -> Message {
        let mut req = Message::new();
        req.set_id(id);
        req.add_query(Query::query(Name::from_str("example.com.").unwrap(), RecordType::MX));
        let data = serialize_message(&req).unwrap();
        stream.write_all(&(data.len() as u16).to_be_bytes()).await.unwrap();
        stream.write_all(&data).await.unwrap();

        let mut len_buf = [0u8; 2];
        stream.read_exact(&mut len_buf).await.unwrap();
        let mut buf = vec![0u8; u16::from_be_bytes(len_buf) as usize];
        stream.read_exact(&mut buf).await.unwrap();
        parse_message(&buf).unwrap()
    }

    #[tokio::test]
    async fn test_multiple_queries_per_connection() {
        let (addr, tx, task) = start(ServerConfig::new("127.0.0.1:0".parse().unwrap())).await;

        let mut stream = TcpStream::connect(addr).await.unwrap();
        for id in [10, 11, 12] {
            let resp = exchange(&mut stream, id).await;
            assert_eq!(resp.id(), id);
            assert_eq!(resp.response_code(), ResponseCode::ServFail);
        }

        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_idle_connection_is_closed() {
        let config = ServerConfig::new("127.0.0.1:0".parse().unwrap())
            .with_tcp_idle_timeout(Duration::from_millis(100));
        let (addr, _tx, _task) = start(config).await;

        let mut stream = TcpStream::connect(addr).await.unwrap();
        let mut buf = [0u8; 1];
        let n = tokio::time::timeout(Duration::from_secs(2), stream.read(&mut buf))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(n, 0);
    }

    #[tokio::test]
    async fn test_oversized_length_closes_connection() {
        let config = ServerConfig::new("127.0.0.1:0".parse().unwrap()).with_max_tcp_size(64);
        let (addr, _tx, _task) = start(config).await;

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(&1000u16.to_be_bytes()).await.unwrap();
        let mut buf = [0u8; 1];
        let n = tokio::time::timeout(Duration::from_secs(2), stream.read(&mut buf))
            .await
            .unwrap()
            .unwrap_or(0);
        assert_eq!(n, 0);
    }
}
