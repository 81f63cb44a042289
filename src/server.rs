//! Server bootstrap: binds the listen socket, loads the ACL files,
//! wires the bounded worker pools and shutdown broadcast, then accepts
//! connections until told to stop.
//!
//! Grounded on the teacher's `start_server_with_config` accept loop,
//! extended with ACL loading, pool-gated spawns, and a shutdown signal —
//! none of which the original needed since it never bounded its own
//! accept loop concurrency beyond the OS thread pool sizes passed on
//! the command line.

use crate::acl::Acl;
use crate::config::ServerConfig;
use crate::connection::{self, ConnectionContext};
use crate::registry::{Registry, SessionIdGenerator};
use crate::socket::Socket;
use crate::worker::{Shutdown, WorkerPool};
use log::{error, info, warn};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;

pub struct Server {
    listener: TcpListener,
    port: u16,
    config: ServerConfig,
    registry: Arc<Registry>,
    shutdown: Shutdown,
    pool: Arc<WorkerPool>,
}

impl Server {
    pub async fn bind(port: u16, config: ServerConfig) -> std::io::Result<Self> {
        let listener = TcpListener::bind(("0.0.0.0", port)).await?;
        let pool = Arc::new(WorkerPool::new(&config.pool_config));
        Ok(Server {
            listener,
            port,
            config,
            registry: Arc::new(Registry::new()),
            shutdown: Shutdown::new(),
            pool,
        })
    }

    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }

    pub fn shutdown_handle(&self) -> Shutdown {
        self.shutdown.clone()
    }

    /// Accepts connections until [`Shutdown::trigger`] is called on a
    /// clone of this server's shutdown handle (typically from the REPL's
    /// `quit` command or a SIGINT handler installed by the caller).
    pub async fn serve(self) -> std::io::Result<()> {
        let acl = Arc::new(
            Acl::load(
                self.config.acl_config.hosts_file.as_deref(),
                self.config.acl_config.origins_file.as_deref(),
                self.config.acl_config.allow_all_if_unconfigured,
            )
            .await
            .unwrap_or_else(|e| {
                warn!("falling back to a deny-all ACL: {e}");
                Acl::deny_all()
            }),
        );

        let ids = Arc::new(SessionIdGenerator::default());
        let ctx = Arc::new(ConnectionContext {
            config: self.config.web_socket_config.clone(),
            route: self.config.route,
            acl,
            registry: self.registry.clone(),
            shutdown: self.shutdown.clone(),
            listen_port: self.port,
        });

        let tls_acceptor = self.config.tls_config.clone().map(TlsAcceptor::from);
        let mut shutdown_rx = self.shutdown.subscribe();

        info!("listening on 0.0.0.0:{}", self.port);

        loop {
            tokio::select! {
                biased;

                _ = shutdown_rx.recv() => {
                    info!("shutdown signal received, closing listener");
                    self.registry.close_all().await;
                    break;
                }

                accepted = self.listener.accept() => {
                    let (stream, addr) = match accepted {
                        Ok(pair) => pair,
                        Err(e) => {
                            error!("accept failed: {e}");
                            continue;
                        }
                    };

                    let connect_permit = match self.pool.try_acquire_connect() {
                        Ok(permit) => permit,
                        Err(_) => {
                            warn!("connect pool exhausted, dropping {addr}");
                            continue;
                        }
                    };

                    let id = ids.next();
                    let ctx = ctx.clone();
                    let tls_acceptor = tls_acceptor.clone();
                    let pool = self.pool.clone();

                    tokio::spawn(async move {
                        let socket = match tls_acceptor {
                            Some(acceptor) => match acceptor.accept(stream).await {
                                Ok(tls) => Socket::Tls(Box::new(tls)),
                                Err(e) => {
                                    warn!("TLS handshake with {addr} failed: {e}");
                                    return;
                                }
                            },
                            None => Socket::Plain(stream),
                        };

                        // TCP/TLS accept is done; hand the connect-pool slot
                        // back and take an io-pool slot for the rest of the
                        // session's lifetime (WebSocket handshake onward).
                        drop(connect_permit);
                        let io_permit = match pool.try_acquire_io() {
                            Ok(permit) => permit,
                            Err(_) => {
                                warn!("io pool exhausted, dropping {addr} after handshake");
                                return;
                            }
                        };

                        if let Err(e) = connection::run(socket, addr, id, ctx).await {
                            warn!("session {id} ({addr}) ended with error: {e}");
                        }
                        drop(io_permit);
                    });
                }
            }
        }

        Ok(())
    }
}
