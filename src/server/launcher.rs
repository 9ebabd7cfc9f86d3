//! Server launcher
//!
//! Binds every configured listener before any of them starts serving, so a
//! bad binding fails startup instead of leaving a half-started process.

use crate::config::{ListenerConfig, ServerSettings};
use crate::server::{Protocol, RequestHandler, ServerConfig, TcpServer, UdpServer};
use crate::Result;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// A bound, not yet serving, listener
pub enum BoundServer {
    /// UDP listener
    Udp(UdpServer),
    /// TCP listener
    Tcp(TcpServer),
}

impl BoundServer {
    /// Protocol and actual local address
    pub fn listener(&self) -> Result<ListenerConfig> {
        Ok(match self {
            BoundServer::Udp(s) => ListenerConfig {
                protocol: Protocol::Udp,
                addr: s.local_addr()?,
            },
            BoundServer::Tcp(s) => ListenerConfig {
                protocol: Protocol::Tcp,
                addr: s.local_addr()?,
            },
        })
    }

    async fn run(self, shutdown: watch::Receiver<bool>) -> Result<()> {
        match self {
            BoundServer::Udp(s) => s.run(shutdown).await,
            BoundServer::Tcp(s) => s.run(shutdown).await,
        }
    }
}

/// Listener tasks started by [`ServerLauncher::launch_all`]
pub struct RunningServers {
    listeners: Vec<ListenerConfig>,
    handles: Vec<JoinHandle<Result<()>>>,
}

impl RunningServers {
    /// Listeners with their actual local addresses
    pub fn listeners(&self) -> &[ListenerConfig] {
        &self.listeners
    }

    /// Wait for every listener task to finish
    pub async fn join(self) {
        for (listener, handle) in self.listeners.iter().zip(self.handles) {
            match handle.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!(%listener, error = %e, "listener failed"),
                Err(e) => error!(%listener, error = %e, "listener task panicked"),
            }
        }
    }
}

/// Starts one listener task per configured binding
pub struct ServerLauncher {
    handler: Arc<dyn RequestHandler>,
    settings: ServerSettings,
}

impl ServerLauncher {
    /// Create a launcher sharing one request handler across listeners
    pub fn new(handler: Arc<dyn RequestHandler>, settings: ServerSettings) -> Self {
        Self { handler, settings }
    }

    /// Bind all listeners
    ///
    /// # Errors
    ///
    /// Returns the first bind failure; sockets bound so far are closed.
    pub async fn bind_all(&self, listeners: &[ListenerConfig]) -> Result<Vec<BoundServer>> {
        let mut bound = Vec::with_capacity(listeners.len());
        for listener in listeners {
            let config = ServerConfig::from_settings(listener.addr, &self.settings);
            let handler = Arc::clone(&self.handler);
            let server = match listener.protocol {
                Protocol::Udp => BoundServer::Udp(UdpServer::bind(config, handler).await?),
                Protocol::Tcp => BoundServer::Tcp(TcpServer::bind(config, handler).await?),
            };
            bound.push(server);
        }
        Ok(bound)
    }

    /// Bind all listeners, then start serving on each
    pub async fn launch_all(
        &self,
        listeners: &[ListenerConfig],
        shutdown: &watch::Receiver<bool>,
    ) -> Result<RunningServers> {
        let bound = self.bind_all(listeners).await?;

        let mut running = RunningServers {
            listeners: Vec::with_capacity(bound.len()),
            handles: Vec::with_capacity(bound.len()),
        };
        for server in bound {
            let listener = server.listener()?;
            info!(%listener, "starting listener");
            running.listeners.push(listener);
            running.handles.push(tokio::spawn(server.run(shutdown.clone())));
        }
        Ok(running)
    }
}
