//! # Network Listener Module
//!
//! Accept loop for the portal's HTTP surface, plain or TLS.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐    ┌──────────────────┐    ┌─────────────────┐
//! │ Incoming        │───▶│ NetworkListener  │───▶│ WebServer       │
//! │ Connections     │    │                  │    │ (one task per   │
//! └─────────────────┘    │ - Worker permits │    │  connection)    │
//!                        │ - TLS handshake  │    └─────────────────┘
//!                        │ - Graceful drain │
//!                        └──────────────────┘
//! ```
//!
//! A worker permit is taken *before* `accept`, so when every worker is busy new clients
//! wait in the kernel backlog instead of piling up as tasks.

use crate::configuration::Config;
use crate::error_handling::types::NetworkError;
use crate::web_interface::WebServer;
use log::{debug, error, info, warn};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{lookup_host, TcpListener, TcpSocket};
use tokio::sync::Semaphore;
use tokio::time::{sleep, timeout};
use tokio_rustls::TlsAcceptor;
use uuid::Uuid;

const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// A bound listening socket plus the policy for serving it.
pub struct NetworkListener {
    listener: TcpListener,
    tls: Option<TlsAcceptor>,
    workers: usize,
    handshake_timeout: Duration,
}

impl NetworkListener {
    /// Binds `config.host:config.port` with the configured backlog.
    pub async fn bind(config: &Config, tls: Option<TlsAcceptor>) -> Result<Self, NetworkError> {
        let addr = lookup_host(config.listen_addr())
            .await
            .map_err(NetworkError::BindError)?
            .next()
            .ok_or_else(|| {
                NetworkError::BindError(std::io::Error::new(
                    std::io::ErrorKind::AddrNotAvailable,
                    format!("{} resolves to no address", config.listen_addr()),
                ))
            })?;

        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()
        } else {
            TcpSocket::new_v6()
        }
        .map_err(NetworkError::BindError)?;
        socket.set_reuseaddr(true).map_err(NetworkError::BindError)?;
        socket.bind(addr).map_err(|e| {
            error!("[!] Unable to bind {}: {}", addr, e);
            NetworkError::BindError(e)
        })?;
        let listener = socket
            .listen(config.backlog)
            .map_err(NetworkError::BindError)?;

        info!(
            "Listening on {} ({}, {} worker(s), backlog {})",
            listener.local_addr().map_err(NetworkError::BindError)?,
            if tls.is_some() { "https" } else { "http" },
            config.workers,
            config.backlog
        );

        Ok(Self {
            listener,
            tls,
            workers: config.workers,
            handshake_timeout: config.read_timeout(),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, NetworkError> {
        self.listener.local_addr().map_err(NetworkError::BindError)
    }

    /// Serves connections until `shutdown` resolves, then waits for in-flight connections
    /// to finish.
    pub async fn serve<F>(self, server: Arc<WebServer>, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let permits = Arc::new(Semaphore::new(self.workers));
        tokio::pin!(shutdown);

        loop {
            let permit = tokio::select! {
                _ = &mut shutdown => break,
                permit = permits.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let (stream, peer) = tokio::select! {
                _ = &mut shutdown => break,
                accepted = self.listener.accept() => match accepted {
                    Ok(pair) => pair,
                    Err(e) => {
                        // typically EMFILE; back off instead of spinning
                        error!("[!] Accept failed: {}", e);
                        sleep(ACCEPT_BACKOFF).await;
                        continue;
                    }
                },
            };

            let id = Uuid::new_v4();
            debug!(
                "[{}] Accepted {} ({} worker(s) free)",
                id,
                peer,
                permits.available_permits()
            );

            let server = server.clone();
            let tls = self.tls.clone();
            let handshake_timeout = self.handshake_timeout;
            tokio::spawn(async move {
                let _permit = permit;
                match tls {
                    Some(acceptor) => {
                        match timeout(handshake_timeout, acceptor.accept(stream)).await {
                            Ok(Ok(tls_stream)) => {
                                server.handle_connection(tls_stream, peer, id).await
                            }
                            Ok(Err(e)) => warn!("[{}] TLS handshake with {} failed: {}", id, peer, e),
                            Err(_) => warn!("[{}] TLS handshake with {} timed out", id, peer),
                        }
                    }
                    None => server.handle_connection(stream, peer, id).await,
                }
            });
        }

        let busy = self.workers - permits.available_permits();
        info!("Listener stopped, draining {} in-flight connection(s)", busy);
        drop(self.listener);
        if let Ok(all) = u32::try_from(self.workers) {
            let _ = permits.acquire_many(all).await;
        }
        info!("All connections closed");
    }
}
