//! Listener and accept loop.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU16, AtomicUsize, Ordering};

use mssql_engine::Catalog;
use tokio::net::TcpListener;
use tokio::sync::broadcast;

use crate::config::ServerConfig;
use crate::error::Result;
use crate::handler::ConnectionHandler;

/// First SPID handed out; lower ids are reserved for system sessions.
const FIRST_SPID: u16 = 51;

/// A bound TDS server.
///
/// # Example
///
/// ```rust,ignore
/// use mssql_server::{Server, ServerConfig};
///
/// let server = Server::bind(ServerConfig::default()).await?;
/// let handle = server.handle();
/// tokio::spawn(server.run());
/// // ...
/// handle.shutdown();
/// ```
pub struct Server {
    listener: TcpListener,
    addr: SocketAddr,
    config: Arc<ServerConfig>,
    catalog: Arc<Catalog>,
    shutdown_tx: broadcast::Sender<()>,
    active: Arc<AtomicUsize>,
    next_spid: AtomicU16,
}

/// Controls a running server from elsewhere.
#[derive(Debug, Clone)]
pub struct ServerHandle {
    addr: SocketAddr,
    shutdown_tx: broadcast::Sender<()>,
    active: Arc<AtomicUsize>,
}

impl ServerHandle {
    /// The address the server listens on.
    #[must_use]
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Connections currently being served.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Stop accepting and close open connections between requests.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }
}

/// Decrements the live connection count when a connection task ends.
struct ConnectionGuard(Arc<AtomicUsize>);

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Server {
    /// Open the catalog and bind the listener.
    ///
    /// The default database is created if it does not exist yet.
    pub async fn bind(config: ServerConfig) -> Result<Self> {
        let catalog = match &config.data_dir {
            Some(dir) => Catalog::open(dir)?,
            None => Catalog::in_memory()?,
        };
        if !catalog.exists(&config.default_database) {
            catalog.create_database(&config.default_database)?;
        }

        let listener = TcpListener::bind(config.listen_addr).await?;
        let addr = listener.local_addr()?;
        let (shutdown_tx, _) = broadcast::channel(1);

        Ok(Self {
            listener,
            addr,
            config: Arc::new(config),
            catalog: Arc::new(catalog),
            shutdown_tx,
            active: Arc::new(AtomicUsize::new(0)),
            next_spid: AtomicU16::new(FIRST_SPID),
        })
    }

    /// The bound address (useful with port 0).
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// The database catalog shared by all connections.
    #[must_use]
    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    /// A handle for shutdown and introspection.
    #[must_use]
    pub fn handle(&self) -> ServerHandle {
        ServerHandle {
            addr: self.addr,
            shutdown_tx: self.shutdown_tx.clone(),
            active: self.active.clone(),
        }
    }

    /// Accept connections until shutdown.
    pub async fn run(self) -> Result<()> {
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        tracing::info!(
            addr = %self.addr,
            server_name = %self.config.server_name,
            data_dir = ?self.config.data_dir,
            "listening"
        );

        loop {
            tokio::select! {
                result = self.listener.accept() => {
                    match result {
                        Ok((stream, peer)) => self.spawn_connection(stream, peer),
                        Err(e) => {
                            tracing::error!(error = %e, "accept failed");
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    tracing::info!(addr = %self.addr, "shutting down");
                    break;
                }
            }
        }
        Ok(())
    }

    fn spawn_connection(&self, stream: tokio::net::TcpStream, peer: SocketAddr) {
        let max = self.config.max_connections;
        if max > 0 && self.active.load(Ordering::SeqCst) >= max {
            tracing::warn!(peer = %peer, max, "connection limit reached, closing");
            drop(stream);
            return;
        }
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!(peer = %peer, error = %e, "set_nodelay failed");
        }

        let spid = self.next_spid();
        self.active.fetch_add(1, Ordering::SeqCst);
        let guard = ConnectionGuard(self.active.clone());
        let handler = ConnectionHandler::new(
            stream,
            peer,
            spid,
            self.config.clone(),
            self.catalog.clone(),
        );
        let shutdown = self.shutdown_tx.subscribe();
        tracing::debug!(peer = %peer, spid, "accepted connection");

        tokio::spawn(async move {
            let _guard = guard;
            match handler.run(shutdown).await {
                Ok(()) => tracing::debug!(peer = %peer, spid, "connection closed"),
                Err(e) if e.is_disconnect() => {
                    tracing::debug!(peer = %peer, spid, error = %e, "client went away");
                }
                Err(e) => tracing::warn!(peer = %peer, spid, error = %e, "connection failed"),
            }
        });
    }

    fn next_spid(&self) -> u16 {
        loop {
            let spid = self.next_spid.fetch_add(1, Ordering::Relaxed);
            if spid >= FIRST_SPID {
                return spid;
            }
        }
    }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("addr", &self.addr)
            .field("config", &self.config)
            .field("active", &self.active.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}
