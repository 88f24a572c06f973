//! Main network handler

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use crate::config::{Config, LimitsConfig};
use crate::proxy::HttpProxy;
use crate::recording::Upstream;
use crate::Result;

use super::connection_pool::ConnectionPool;
use super::HttpHandler;

/// Accepts inbound connections and hands them to [`HttpHandler`]
pub struct NetworkHandler<U> {
    listen_port: u16,
    proxy: Arc<HttpProxy<U>>,
    limits: Arc<LimitsConfig>,
    connection_pool: ConnectionPool,
    shutdown_tx: broadcast::Sender<()>,
}

impl<U: Upstream + 'static> NetworkHandler<U> {
    /// Create a new network handler
    ///
    /// # Errors
    ///
    /// Returns error if the connection limit is invalid
    pub fn new(config: &Config, proxy: HttpProxy<U>) -> Result<Self> {
        let (shutdown_tx, _) = broadcast::channel(1);

        Ok(Self {
            listen_port: config.listen_port,
            proxy: Arc::new(proxy),
            limits: Arc::new(config.limits.clone()),
            connection_pool: ConnectionPool::new(config.limits.max_connections)?,
            shutdown_tx,
        })
    }

    /// Sender that stops [`run`](Self::run) and [`serve`](Self::serve) when signalled
    #[must_use]
    pub fn shutdown_handle(&self) -> broadcast::Sender<()> {
        self.shutdown_tx.clone()
    }

    /// Bind `0.0.0.0:<listen_port>` and serve until shutdown
    ///
    /// # Errors
    ///
    /// Returns error if the port cannot be bound
    pub async fn run(self) -> Result<()> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.listen_port));
        let listener = TcpListener::bind(addr).await?;
        self.serve(listener).await
    }

    /// Serve connections from an already bound listener until Ctrl-C or a
    /// shutdown signal
    ///
    /// # Errors
    ///
    /// Returns error if the listener address cannot be read
    pub async fn serve(self, listener: TcpListener) -> Result<()> {
        info!(
            addr = %listener.local_addr()?,
            routes = self.proxy.routes().len(),
            "Listening"
        );

        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, peer_addr)) => self.spawn_connection(stream, peer_addr),
                        Err(e) => error!("Accept error: {e}"),
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("Received SIGINT, shutting down");
                    break;
                }
                _ = shutdown_rx.recv() => {
                    info!("Received shutdown signal");
                    break;
                }
            }
        }

        // Close keep-alive connections still being served
        self.shutdown_tx.send(()).ok();

        let stats = self.proxy.stats();
        info!(
            replayed = stats.replayed,
            recorded = stats.recorded,
            open_connections = self.connection_pool.active_connections(),
            "Shutdown complete"
        );
        Ok(())
    }

    fn spawn_connection(&self, stream: tokio::net::TcpStream, peer_addr: SocketAddr) {
        let Some(guard) = self.connection_pool.try_acquire() else {
            warn!(
                %peer_addr,
                active = self.connection_pool.active_connections(),
                max = self.connection_pool.max_connections(),
                "Connection limit reached, rejecting"
            );
            drop(stream);
            return;
        };

        let proxy = Arc::clone(&self.proxy);
        let limits = Arc::clone(&self.limits);
        let shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            let _guard = guard;
            if let Err(e) = HttpHandler::handle_connection(stream, proxy, limits, shutdown_rx).await {
                warn!(%peer_addr, "{e}");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::config::Mode;
    use crate::recording::RecordReplayEngine;
    use crate::storage::{CassetteStore, RecordedRequest, RecordedResponse};
    use std::time::Duration;
    use tempfile::TempDir;

    struct UnreachableUpstream;

    impl Upstream for UnreachableUpstream {
        async fn send(&self, request: &RecordedRequest) -> Result<RecordedResponse> {
            Err(crate::ProxyError::Upstream(request.uri.clone()))
        }
    }

    fn create_handler(temp_dir: &TempDir, max_connections: usize) -> Result<NetworkHandler<UnreachableUpstream>> {
        let mut config = Config::new(5050, temp_dir.path().to_path_buf());
        config.limits.max_connections = max_connections;

        let store = CassetteStore::new(temp_dir.path(), "rec", 1, Arc::new(SystemClock));
        let engine = RecordReplayEngine::new(store, UnreachableUpstream, Mode::Record);
        NetworkHandler::new(&config, HttpProxy::new(&config, engine))
    }

    #[test]
    fn test_network_handler_creation() {
        let temp_dir = TempDir::new().unwrap();
        let handler = create_handler(&temp_dir, 10).unwrap();

        assert_eq!(handler.connection_pool.max_connections(), 10);
        assert_eq!(handler.listen_port, 5050);
    }

    #[test]
    fn test_zero_connections_rejected() {
        let temp_dir = TempDir::new().unwrap();
        assert!(create_handler(&temp_dir, 0).is_err());
    }

    #[tokio::test]
    async fn test_shutdown_signal() {
        let temp_dir = TempDir::new().unwrap();
        let handler = create_handler(&temp_dir, 10).unwrap();
        let shutdown = handler.shutdown_handle();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let handle = tokio::spawn(async move { handler.serve(listener).await });

        tokio::time::sleep(Duration::from_millis(100)).await;
        shutdown.send(()).ok();

        let result = tokio::time::timeout(Duration::from_secs(2), handle).await;
        assert!(result.unwrap().unwrap().is_ok());
    }
}
