use std::net::{IpAddr, SocketAddr};

use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{info, warn};

use dotchat_gateway::{Dispatcher, Heartbeat};
use dotchat_types::{Endpoints, StartReply, StopReply};

use crate::endpoints;
use crate::routes::{self, RelayState};

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// The listener could not be acquired. Nothing is left running.
    #[error("could not listen on port {port}: {source}")]
    Startup {
        port: u16,
        #[source]
        source: std::io::Error,
    },

    #[error("transport error: {0}")]
    Transport(String),
}

/// Start/stop handle for one relay hub.
///
/// Each start creates a fresh [`Dispatcher`], so independent servers (and
/// restarts of the same server) never share sessions.
pub struct RelayServer {
    host: IpAddr,
    heartbeat: Heartbeat,
    running: Mutex<Option<Running>>,
}

struct Running {
    port: u16,
    dispatcher: Dispatcher,
    shutdown: CancellationToken,
    connections: TaskTracker,
    serve_task: JoinHandle<std::io::Result<()>>,
}

impl RelayServer {
    pub fn new(host: IpAddr) -> Self {
        Self {
            host,
            heartbeat: Heartbeat::default(),
            running: Mutex::new(None),
        }
    }

    /// Override the per-session ping schedule. Takes effect on the next start.
    pub fn with_heartbeat(mut self, heartbeat: Heartbeat) -> Self {
        self.heartbeat = heartbeat;
        self
    }

    /// Listen on `port` (0 picks a free one) and serve `/ws` and `/health`.
    ///
    /// A server that is already running is stopped first. Returns the bound
    /// port and the endpoints clients can use.
    pub async fn start(&self, port: u16) -> Result<(u16, Endpoints), ServerError> {
        let mut running = self.running.lock().await;
        if let Some(previous) = running.take() {
            info!("restarting relay (was on port {})", previous.port);
            previous.shutdown().await?;
        }

        let addr = SocketAddr::new(self.host, port);
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Startup { port, source })?;
        let bound_port = listener
            .local_addr()
            .map_err(|source| ServerError::Startup { port, source })?
            .port();

        let state = RelayState {
            dispatcher: Dispatcher::new(),
            shutdown: CancellationToken::new(),
            connections: TaskTracker::new(),
            heartbeat: self.heartbeat,
        };
        let app = routes::router(state.clone());
        let signal = state.shutdown.clone();
        let serve_task = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move { signal.cancelled().await })
                .await
        });

        info!("dotchat relay listening on {}:{}", self.host, bound_port);
        *running = Some(Running {
            port: bound_port,
            dispatcher: state.dispatcher,
            shutdown: state.shutdown,
            connections: state.connections,
            serve_task,
        });
        drop(running);

        let endpoints = tokio::task::spawn_blocking(move || endpoints::discover(bound_port))
            .await
            .unwrap_or_else(|_| endpoints::loopback(bound_port));
        Ok((bound_port, endpoints))
    }

    /// Stop the relay. Returns once every session is closed and the
    /// listener is released. Stopping a stopped server is a no-op.
    pub async fn stop(&self) -> Result<(), ServerError> {
        let previous = self.running.lock().await.take();
        match previous {
            Some(running) => running.shutdown().await,
            None => Ok(()),
        }
    }

    /// [`RelayServer::start`] shaped for the hosting application.
    pub async fn start_reply(&self, port: u16) -> StartReply {
        match self.start(port).await {
            Ok((port, endpoints)) => StartReply::started(port, endpoints),
            Err(e) => {
                warn!("relay failed to start: {}", e);
                StartReply::failed(e)
            }
        }
    }

    /// [`RelayServer::stop`] shaped for the hosting application.
    pub async fn stop_reply(&self) -> StopReply {
        self.stop().await.into()
    }

    pub async fn is_running(&self) -> bool {
        self.running.lock().await.is_some()
    }

    pub async fn port(&self) -> Option<u16> {
        self.running.lock().await.as_ref().map(|r| r.port)
    }

    /// Live sessions on the running hub, 0 when stopped.
    pub async fn session_count(&self) -> usize {
        let dispatcher = self.running.lock().await.as_ref().map(|r| r.dispatcher.clone());
        match dispatcher {
            Some(d) => d.session_count().await,
            None => 0,
        }
    }
}

impl Running {
    /// Stop accepting, close every session, wait for the connection tasks,
    /// then wait for the listener to be dropped.
    async fn shutdown(self) -> Result<(), ServerError> {
        self.shutdown.cancel();
        let closed = self.dispatcher.close_all().await;

        // Upgrades that complete after this point are tracked too late to be
        // waited on, but they see the cancelled token and close at once.
        self.connections.close();
        self.connections.wait().await;

        let result = match self.serve_task.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(ServerError::Transport(e.to_string())),
            Err(e) => Err(ServerError::Transport(e.to_string())),
        };
        info!("dotchat relay on port {} stopped ({} sessions closed)", self.port, closed);
        result
    }
}
