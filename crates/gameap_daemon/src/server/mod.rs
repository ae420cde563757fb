//! TLS endpoint of the binary wire protocol.
//!
//! Every connection authenticates first; the mode sent with the credentials then
//! selects the commands, files or status sub-protocol for the rest of the session.

mod commands;
mod files;
mod status;
pub mod tls;

pub use files::EntryType;
pub use status::{BUILD_DATE, VERSION, format_uptime};

use std::io;
use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tracing::{Instrument, debug, debug_span, info, warn};

use gameap_config::DaemonConfig;
use gameap_core::{Executor, StatsReader};
use gameap_protocol::{
    AuthMessage, Mode, ProtocolError, Response, Value, read_end_bytes, read_message,
    read_message_limited, write_message,
};

use crate::cli::shutdown::ShutdownController;

/// Largest auth message body accepted before the peer is authenticated.
pub const MAX_AUTH_MESSAGE_SIZE: usize = 64 * 1024;

#[derive(Error, Debug)]
pub enum WireServerError {
    #[error(transparent)]
    Tls(#[from] tls::TlsError),

    #[error("failed to bind {addr}: {source}")]
    Bind { addr: String, source: io::Error },
}

#[derive(Error, Debug)]
pub enum ConnectionError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("invalid server mode")]
    InvalidMode,

    #[error("connection timed out")]
    Timeout,

    #[error("TLS handshake failed: {0}")]
    Handshake(io::Error),
}

/// Reads one request. A value that cannot be decoded is answered in place and yields `None`.
pub(crate) async fn read_request<S>(stream: &mut S) -> gameap_protocol::Result<Option<Value>>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    match read_message(stream).await {
        Ok(value) => Ok(Some(value)),
        Err(ProtocolError::Io(e)) => Err(ProtocolError::Io(e)),
        Err(e) => {
            debug!(log_type = "wire_server", "Failed to decode message: {}", e);
            write_response(stream, Response::error("Failed to decode message")).await?;
            Ok(None)
        }
    }
}

pub(crate) async fn write_response<S>(stream: &mut S, response: Response) -> gameap_protocol::Result<()>
where
    S: AsyncWrite + Unpin,
{
    write_message(stream, &response.to_value()).await
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Component {
    Commands,
    Files,
    Status,
}

pub struct WireServer {
    cfg: Arc<DaemonConfig>,
    executor: Arc<dyn Executor>,
    stats: Arc<dyn StatsReader>,
    started_at: Instant,
}

impl WireServer {
    pub fn new(
        cfg: Arc<DaemonConfig>,
        executor: Arc<dyn Executor>,
        stats: Arc<dyn StatsReader>,
        started_at: Instant,
    ) -> Self {
        Self {
            cfg,
            executor,
            stats,
            started_at,
        }
    }

    pub async fn run(
        self: Arc<Self>,
        shutdown: Arc<ShutdownController>,
    ) -> Result<(), WireServerError> {
        let acceptor = tls::acceptor(&self.cfg)?;

        let addr = self.cfg.listen_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| WireServerError::Bind {
                addr: addr.clone(),
                source,
            })?;

        info!(log_type = "wire_server", "Listening on {}", addr);

        let mut shutdown_rx = shutdown.subscribe().await;
        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!(log_type = "wire_server", "Server stopped accepting new connections");
                    return Ok(());
                }

                accepted = listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(accepted) => accepted,
                        Err(e) => {
                            warn!(log_type = "wire_server", "Accept error: {}", e);
                            continue;
                        }
                    };

                    let server = Arc::clone(&self);
                    let acceptor = acceptor.clone();
                    let span = debug_span!("connection", %peer, log_type = "wire_server");

                    tokio::spawn(
                        async move {
                            debug!(log_type = "wire_server", "New connection from {}", peer);

                            let handshake = tokio::time::timeout(
                                server.cfg.connection_timeout(),
                                acceptor.accept(stream),
                            )
                            .await;

                            let outcome = match handshake {
                                Ok(Ok(tls_stream)) => server.handle_connection(tls_stream).await,
                                Ok(Err(e)) => Err(ConnectionError::Handshake(e)),
                                Err(_) => Err(ConnectionError::Timeout),
                            };

                            match outcome {
                                Ok(()) => debug!(log_type = "wire_server", "Closing connection from {}", peer),
                                Err(e) => warn!(log_type = "wire_server", "Connection from {} failed: {}", peer, e),
                            }
                        }
                        .instrument(span),
                    );
                }
            }
        }
    }

    fn authenticate(&self, auth: &AuthMessage) -> bool {
        !self.cfg.password_authentication
            || (auth.login == self.cfg.daemon_login && auth.password == self.cfg.daemon_password)
    }

    /// Authenticates the peer, then serves its sub-protocol until EOF.
    pub async fn handle_connection<S>(&self, mut stream: S) -> Result<(), ConnectionError>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        let timeout = self.cfg.connection_timeout();

        let auth_read = read_message_limited(&mut stream, MAX_AUTH_MESSAGE_SIZE);
        let value = match tokio::time::timeout(timeout, auth_read).await {
            Err(_) => return Err(ConnectionError::Timeout),
            Ok(Err(e)) if e.is_eof() => return Ok(()),
            Ok(Err(ProtocolError::Io(e))) => return Err(ProtocolError::Io(e).into()),
            Ok(Err(e)) => {
                debug!(log_type = "wire_server", "Rejected auth message: {}", e);
                write_response(&mut stream, Response::error("Invalid message")).await?;
                return Ok(());
            }
            Ok(Ok(value)) => value,
        };

        let auth = match AuthMessage::from_value(&value) {
            Ok(auth) => auth,
            Err(e) => {
                debug!(log_type = "wire_server", "Invalid auth message: {}", e);
                write_response(&mut stream, Response::error("Invalid message")).await?;
                return Ok(());
            }
        };

        if !self.authenticate(&auth) {
            warn!(
                log_type = "wire_server",
                "Authentication failed for login {:?}", auth.login
            );
            write_response(&mut stream, Response::error("Auth failed")).await?;
            return Ok(());
        }

        write_response(&mut stream, Response::ok("Auth success")).await?;
        read_end_bytes(&mut stream).await?;

        let component = match auth.mode {
            Mode::Commands => Component::Commands,
            Mode::Files => Component::Files,
            Mode::Status => Component::Status,
            Mode::NoAuth | Mode::Auth | Mode::Unknown => {
                write_response(&mut stream, Response::error("Invalid mode")).await?;
                return Err(ConnectionError::InvalidMode);
            }
        };

        debug!(
            log_type = "wire_server",
            "Authenticated, serving {:?}", component
        );

        loop {
            let served = tokio::time::timeout(timeout, async {
                self.serve_one(component, &mut stream).await?;
                read_end_bytes(&mut stream).await
            })
            .await;

            match served {
                Err(_) => return Err(ConnectionError::Timeout),
                Ok(Err(e)) if e.is_eof() => return Ok(()),
                Ok(Err(e)) => return Err(e.into()),
                Ok(Ok(())) => {}
            }
        }
    }

    async fn serve_one<S>(&self, component: Component, stream: &mut S) -> gameap_protocol::Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        match component {
            Component::Commands => commands::handle(self.executor.as_ref(), stream).await,
            Component::Files => files::handle(stream).await,
            Component::Status => {
                status::handle(self.stats.as_ref(), self.started_at, stream).await
            }
        }
    }
}

impl std::fmt::Debug for WireServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WireServer")
            .field("listen", &self.cfg.listen_addr())
            .finish_non_exhaustive()
    }
}
