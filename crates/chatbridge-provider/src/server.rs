//! `Provider`: the accept loop and process entry point.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chatbridge_net::{
    Listener, NetError, StdioListener, TcpLineListener, WebSocketListener, tls_acceptor,
};
use chatbridge_service::Service;
use chatbridge_transport::{MultiTransport, Transport};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::handler::handle_connection;
use crate::{ListenAddr, PasswordGate, ProviderError, ProviderOptions};

/// Shared provider state passed to each connection task.
pub(crate) struct ProviderState {
    pub(crate) options: ProviderOptions,
    pub(crate) service: Arc<Service>,
    pub(crate) transport: Arc<MultiTransport>,
    pub(crate) gate: PasswordGate,
    pub(crate) conns: AtomicUsize,
    pub(crate) stop: CancellationToken,
    /// Cancelled once any connection finishes its handshake.
    pub(crate) established: CancellationToken,
}

impl ProviderState {
    /// Claims a connection slot, or returns false at the cap.
    fn try_open(&self) -> bool {
        let max = self.options.max_conns();
        self.conns
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| (n < max).then_some(n + 1))
            .is_ok()
    }

    /// Releases a slot; true if it was the last one.
    pub(crate) fn release(&self) -> bool {
        self.conns.fetch_sub(1, Ordering::AcqRel) == 1
    }
}

/// Serves one [`Service`] to byte connections.
///
/// ```rust,ignore
/// let transport = Arc::new(MultiTransport::new("dummy"));
/// let service = chatbridge_dummy::new_service(transport.clone());
/// Provider::new(options, service, transport).listen_and_serve().await?;
/// ```
pub struct Provider {
    state: Arc<ProviderState>,
}

impl Provider {
    pub fn new(
        options: ProviderOptions,
        service: Arc<Service>,
        transport: Arc<MultiTransport>,
    ) -> Self {
        let gate = PasswordGate::new(options.password.clone(), options.auto_password);
        Self {
            state: Arc::new(ProviderState {
                options,
                service,
                transport,
                gate,
                conns: AtomicUsize::new(0),
                stop: CancellationToken::new(),
                established: CancellationToken::new(),
            }),
        }
    }

    /// Builds the fan-out transport and the service, advertises, and
    /// serves on `options.addr` until the listener is exhausted and every
    /// connection has closed.
    ///
    /// # Errors
    /// Configuration, advertise and bind errors. Per-connection failures
    /// are published as `error` events instead.
    pub async fn run<F>(
        protocol: &str,
        options: ProviderOptions,
        new_service: F,
    ) -> Result<(), ProviderError>
    where
        F: FnOnce(Arc<dyn Transport>) -> Arc<Service>,
    {
        options.validate()?;
        let transport = Arc::new(MultiTransport::new(protocol));
        let service = new_service(Arc::clone(&transport) as Arc<dyn Transport>);
        transport.advertise()?;
        Self::new(options, service, transport).listen_and_serve().await
    }

    /// Binds the configured address and serves on it.
    pub async fn listen_and_serve(&self) -> Result<(), ProviderError> {
        let options = &self.state.options;
        match options.validate()? {
            ListenAddr::Stdio => self.serve(StdioListener::new()).await,
            ListenAddr::Tcp { addr } => {
                let mut listener = TcpLineListener::bind(&addr).await?;
                if let Some((cert, key)) = options.tls_paths() {
                    listener = listener.with_tls(tls_acceptor(cert, key)?);
                }
                self.serve(listener).await
            }
            ListenAddr::WebSocket { host, path, .. } => {
                let mut listener = WebSocketListener::bind(&host, &path).await?;
                if let Some((cert, key)) = options.tls_paths() {
                    listener = listener.with_tls(tls_acceptor(cert, key)?);
                }
                self.serve(listener).await
            }
        }
    }

    /// Accepts connections from `listener` until it is exhausted, the
    /// provider is stopped or the service closes, then waits for every
    /// connection task to finish.
    ///
    /// Handshakes run on the connection tasks, so a peer that never
    /// finishes one only holds its own slot until the handshake timeout.
    /// With a single connection and auto-exit, accepting stops once a
    /// connection is established.
    pub async fn serve<L: Listener>(&self, mut listener: L) -> Result<(), ProviderError> {
        let state = &self.state;
        let single = state.options.max_conns() == 1 && state.options.auto_exit;
        let mut tasks = JoinSet::new();

        if let Some(addr) = listener.local_addr() {
            tracing::info!(%addr, protocol = %state.service.protocol(), "provider listening");
        }

        loop {
            let incoming = tokio::select! {
                () = state.stop.cancelled() => break,
                () = state.service.done().wait() => break,
                () = state.established.cancelled(), if single => {
                    tracing::info!("single connection with auto-exit, no longer accepting");
                    break;
                }
                accepted = listener.accept() => match accepted {
                    Ok(incoming) => incoming,
                    Err(NetError::Closed) => break,
                    Err(e) => {
                        tracing::warn!(error = %e, "accept failed");
                        continue;
                    }
                },
            };

            if !state.try_open() {
                tracing::warn!(
                    peer = incoming.peer(),
                    max_conns = state.options.max_conns(),
                    "connection refused: too many connections"
                );
                drop(incoming);
                continue;
            }

            tasks.spawn(handle_connection(incoming, Arc::clone(state)));
        }

        listener.shutdown().await?;

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "connection task failed");
            }
        }
        Ok(())
    }

    /// Stops accepting. Open connections keep running.
    pub fn stop(&self) {
        self.state.stop.cancel();
    }

    /// Connections currently open.
    pub fn connections(&self) -> usize {
        self.state.conns.load(Ordering::Acquire)
    }

    pub fn service(&self) -> &Arc<Service> {
        &self.state.service
    }

    pub fn transport(&self) -> &Arc<MultiTransport> {
        &self.state.transport
    }
}
