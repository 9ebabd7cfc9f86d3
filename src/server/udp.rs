//! UDP DNS server implementation
//!
//! One socket per binding; every datagram is handled in its own task.

use crate::server::{dispatch, drain, Protocol, RequestHandler, ServerConfig};
use crate::{Error, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, error, info};

/// UDP DNS server
pub struct UdpServer {
    socket: Arc<UdpSocket>,
    handler: Arc<dyn RequestHandler>,
    config: ServerConfig,
}

impl UdpServer {
    /// Bind a UDP server
    ///
    /// # Errors
    ///
    /// Returns an error if the socket cannot be bound to the configured address.
    pub async fn bind(config: ServerConfig, handler: Arc<dyn RequestHandler>) -> Result<Self> {
        let socket = UdpSocket::bind(config.addr)
            .await
            .map_err(|e| Error::connection(config.addr.to_string(), format!("bind failed: {}", e)))?;

        info!("UDP server listening on {}", config.addr);

        Ok(Self {
            socket: Arc::new(socket),
            handler,
            config,
        })
    }

    /// Get the local address the server is bound to
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.socket.local_addr().map_err(Error::Io)
    }

    /// Serve until `shutdown` flips
    ///
    /// After shutdown no new datagram is read; queries already in flight get
    /// the configured grace period to finish.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let mut buf = vec![0u8; self.config.max_udp_size];
        let mut tasks = JoinSet::new();
        let name = format!("udp:{}", self.local_addr()?);

        info!(listener = %name, "UDP server started");

        while !*shutdown.borrow() {
            tokio::select! {
                _ = shutdown.changed() => break,
                Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
                received = self.socket.recv_from(&mut buf) => match received {
                    Ok((len, peer_addr)) => {
                        debug!("Received {} bytes from {}", len, peer_addr);

                        let request_data = buf[..len].to_vec();
                        let handler = Arc::clone(&self.handler);
                        let socket = Arc::clone(&self.socket);

                        tasks.spawn(async move {
                            let Some(reply) =
                                dispatch(handler.as_ref(), &request_data, peer_addr, Protocol::Udp).await
                            else {
                                return;
                            };
                            if let Err(e) = socket.send_to(&reply, peer_addr).await {
                                error!("Error sending response to {}: {}", peer_addr, e);
                            }
                        });
                    }
                    Err(e) => {
                        // Keep serving; ICMP errors surface here on some platforms
                        error!("Error receiving UDP packet: {}", e);
                    }
                }
            }
        }

        info!(listener = %name, "UDP server stopping");
        drain(&mut tasks, self.config.shutdown_grace, &name).await;
        Ok(())
    }
}
