use std::io::ErrorKind;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, UnixListener};
use tokio::task::JoinSet;
use tokio_stream::StreamExt;
use tokio_util::codec::{FramedRead, LinesCodec, LinesCodecError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use super::monitor::{DiagnosticMonitor, MonitorConfig};
use super::protocol::Request;
use crate::config::ServerConfig;
use crate::error::{DaemonError, Result};
use crate::logging::{level_name, LogControl};
use crate::plugin_registry::PluginManager;

/// Longest accepted request line, terminator excluded.
pub const MAX_LINE_LENGTH: usize = 64 * 1024;

/// Listeners that bound successfully. At least one is present.
pub struct Listeners {
    tcp: Option<TcpListener>,
    unix: Option<(UnixListener, PathBuf)>,
}

impl Listeners {
    pub fn tcp_addr(&self) -> Option<SocketAddr> {
        self.tcp.as_ref().and_then(|l| l.local_addr().ok())
    }

    pub fn unix_path(&self) -> Option<&Path> {
        self.unix.as_ref().map(|(_, path)| path.as_path())
    }
}

pub struct Server {
    config: ServerConfig,
    monitor: MonitorConfig,
    plugins: Arc<PluginManager>,
    log: LogControl,
}

impl Server {
    pub fn new(config: ServerConfig, plugins: Arc<PluginManager>, log: LogControl) -> Self {
        let monitor = MonitorConfig::from_server(&config);
        Self {
            config,
            monitor,
            plugins,
            log,
        }
    }

    pub fn with_monitor_config(mut self, monitor: MonitorConfig) -> Self {
        self.monitor = monitor;
        self
    }

    /// Serve until SIGINT or SIGTERM.
    pub async fn run(self) -> Result<()> {
        let cancel = CancellationToken::new();

        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            let mut sigterm = signal(SignalKind::terminate())?;
            let mut sigint = signal(SignalKind::interrupt())?;
            let token = cancel.clone();

            tokio::spawn(async move {
                tokio::select! {
                    _ = sigterm.recv() => info!("Received SIGTERM"),
                    _ = sigint.recv() => info!("Received SIGINT"),
                }
                token.cancel();
            });
        }

        #[cfg(not(unix))]
        {
            let token = cancel.clone();
            tokio::spawn(async move {
                tokio::signal::ctrl_c().await.ok();
                info!("Received Ctrl+C");
                token.cancel();
            });
        }

        self.start(cancel).await
    }

    /// Bind both listeners, then serve until `cancel` fires.
    pub async fn start(self, cancel: CancellationToken) -> Result<()> {
        let listeners = self.bind().await?;
        self.serve(listeners, cancel).await
    }

    /// A listener that fails to bind is logged and skipped.
    pub async fn bind(&self) -> Result<Listeners> {
        let address = self.config.bind_address();
        let tcp = TcpListener::bind(&address).await.map_err(|e| {
            error!(address = %address, error = %e, "Failed to bind TCP listener");
            e
        });

        let socket_path = self.config.admin_socket.clone();
        let unix = bind_unix(&socket_path)
            .map(|listener| (listener, socket_path.clone()))
            .map_err(|e| {
                error!(path = %socket_path.display(), error = %e, "Failed to bind admin socket");
                e
            });

        match (tcp, unix) {
            (Err(tcp), Err(unix)) => Err(DaemonError::NoListeners {
                tcp: tcp.to_string(),
                unix: unix.to_string(),
            }),
            (tcp, unix) => Ok(Listeners {
                tcp: tcp.ok(),
                unix: unix.ok(),
            }),
        }
    }

    /// Returns once both accept loops and the monitor have finished.
    pub async fn serve(self, listeners: Listeners, cancel: CancellationToken) -> Result<()> {
        let server = Arc::new(self);
        let mut tasks = JoinSet::new();

        if let Some(listener) = listeners.tcp {
            tasks.spawn(Arc::clone(&server).serve_tcp(listener, cancel.clone()));
        }
        if let Some((listener, path)) = listeners.unix {
            tasks.spawn(Arc::clone(&server).serve_unix(listener, path, cancel.clone()));
        }

        let monitor = DiagnosticMonitor::new(server.monitor.clone(), Arc::clone(&server.plugins));
        tasks.spawn(monitor.run(cancel.clone()));

        info!("Argeos server ready");
        while let Some(result) = tasks.join_next().await {
            if let Err(e) = result {
                error!(error = %e, "Server task panicked");
            }
        }

        info!("Argeos server stopped");
        Ok(())
    }

    async fn serve_tcp(self: Arc<Self>, listener: TcpListener, cancel: CancellationToken) {
        if let Ok(addr) = listener.local_addr() {
            info!(%addr, "TCP server listening");
        }

        loop {
            tokio::select! {
                conn = listener.accept() => match conn {
                    Ok((stream, peer)) => {
                        trace!(%peer, "New TCP connection");
                        self.spawn_handler(stream, cancel.clone());
                    }
                    Err(e) => error!(error = %e, "TCP accept error"),
                },
                _ = cancel.cancelled() => break,
            }
        }
        info!("TCP server stopped");
    }

    async fn serve_unix(self: Arc<Self>, listener: UnixListener, path: PathBuf, cancel: CancellationToken) {
        info!(path = %path.display(), "Admin socket listening");

        loop {
            tokio::select! {
                conn = listener.accept() => match conn {
                    Ok((stream, _)) => {
                        trace!("New admin socket connection");
                        self.spawn_handler(stream, cancel.clone());
                    }
                    Err(e) => error!(error = %e, "Admin socket accept error"),
                },
                _ = cancel.cancelled() => break,
            }
        }

        drop(listener);
        remove_socket(&path);
        info!("Admin socket server stopped");
    }

    fn spawn_handler<S>(self: &Arc<Self>, stream: S, cancel: CancellationToken)
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let server = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = server.handle_connection(stream, cancel).await {
                error!(error = %e, "Connection handler error");
            }
        });
    }

    /// One response line per non-blank request line, until the peer closes
    /// or the server shuts down.
    async fn handle_connection<S>(&self, stream: S, cancel: CancellationToken) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let (reader, mut writer) = tokio::io::split(stream);
        let mut lines = FramedRead::new(reader, LinesCodec::new_with_max_length(MAX_LINE_LENGTH));

        loop {
            let line = tokio::select! {
                line = lines.next() => line,
                _ = cancel.cancelled() => break,
            };
            let line = match line {
                Some(Ok(line)) => line,
                Some(Err(LinesCodecError::MaxLineLengthExceeded)) => {
                    warn!(max = MAX_LINE_LENGTH, "Request line too long, closing connection");
                    break;
                }
                Some(Err(LinesCodecError::Io(e))) => return Err(e.into()),
                None => {
                    trace!("Connection closed by peer");
                    break;
                }
            };
            let Some(request) = Request::parse(&line) else {
                continue;
            };

            let mut response = self.handle_request(request).await;
            response.push('\n');
            writer.write_all(response.as_bytes()).await?;
            writer.flush().await?;
        }
        Ok(())
    }

    async fn handle_request(&self, request: Request) -> String {
        match request {
            Request::HealthCheck => {
                let statuses = self.plugins.health_check().await;
                serde_json::to_string(&statuses).unwrap_or_else(|e| {
                    error!(error = %e, "Error encoding health status");
                    String::new()
                })
            }
            Request::Help => self.plugins.supported_commands(),
            Request::DiagnosticDump => {
                info!("Manual diagnostic dump requested");
                self.plugins.diagnostic_dump(&self.config.diagnostic_dir).await
            }
            Request::Debug { level } => {
                let applied = self.log.set_level(&level);
                format!("Log level set to {}", level_name(applied))
            }
            Request::Plugin { command, args } => {
                debug!(command = %command, ?args, "Handling plugin command");
                self.plugins.execute_command(&command, &args).await
            }
        }
    }
}

fn bind_unix(path: &Path) -> std::io::Result<UnixListener> {
    match std::fs::remove_file(path) {
        Ok(()) => debug!(path = %path.display(), "Removed stale admin socket"),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let listener = UnixListener::bind(path)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Err(e) = std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)) {
            drop(listener);
            remove_socket(path);
            return Err(e);
        }
    }

    Ok(listener)
}

/// Already gone is fine.
fn remove_socket(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => debug!(path = %path.display(), "Removed admin socket"),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove admin socket"),
    }
}
