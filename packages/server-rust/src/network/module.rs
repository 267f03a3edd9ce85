//! Network module with deferred startup lifecycle.
//!
//! Implements the deferred startup pattern: `new()` wires resources,
//! `start()` binds the TCP listener, and `serve()` accepts connections until
//! the shutdown future resolves, then drains.

use std::future::Future;
use std::sync::Arc;

use anyhow::Context as _;
use nado_core::{Codec, MsgPackCodec, Sha256Signer};
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use super::config::NetworkConfig;
use super::connection::{ConnectionId, StreamTransport};
use super::handler::ConnectionHandler;
use super::shutdown::ShutdownController;
use crate::service::admission::AdmissionController;
use crate::service::config::ServerConfig;
use crate::service::middleware::build_dispatch_pipeline;
use crate::service::registry::UnitRegistry;
use crate::service::router::UnitRouter;
use crate::service::scheduler::Scheduler;

/// Owns the listener, the connection handler, and the scheduler.
///
/// Follows the deferred startup pattern:
/// 1. `new()` -- takes the fully wired handler and scheduler
/// 2. `start()` -- binds the TCP listener to the configured address
/// 3. `serve()` -- accepts connections until shutdown is signalled
pub struct NetworkModule<C> {
    config: NetworkConfig,
    listener: Option<TcpListener>,
    handler: ConnectionHandler<C>,
    scheduler: Arc<Scheduler>,
    shutdown: Arc<ShutdownController>,
}

impl NetworkModule<MsgPackCodec> {
    /// Wires the full dispatch stack from `config` around `registry`: admission
    /// controller, scheduler consumers, router, middleware, and handler.
    ///
    /// Must be called inside a tokio runtime; the scheduler consumers start
    /// immediately.
    ///
    /// # Errors
    ///
    /// Returns an error if `config` fails validation.
    pub fn from_config(config: &ServerConfig, registry: UnitRegistry) -> anyhow::Result<Self> {
        config.validate().context("invalid server configuration")?;

        let admission = Arc::new(AdmissionController::new(config.admission)?);
        let scheduler = Arc::new(Scheduler::start(
            config.scheduler.worker_count,
            Arc::clone(&admission),
        ));
        let router = UnitRouter::new(
            registry.freeze(),
            admission,
            Arc::clone(&scheduler),
            config.scheduler.inline_highest_priority,
        );
        let signer = Arc::new(Sha256Signer::new(config.signing_secret.clone()));
        let pipeline = build_dispatch_pipeline(router, signer);
        let handler = ConnectionHandler::new(
            pipeline,
            Arc::new(MsgPackCodec),
            config.network.max_body_size,
        );

        Ok(Self::new(config.network.clone(), handler, scheduler))
    }
}

impl<C: Codec> NetworkModule<C> {
    /// Creates a module without binding any port.
    #[must_use]
    pub fn new(config: NetworkConfig, handler: ConnectionHandler<C>, scheduler: Arc<Scheduler>) -> Self {
        Self {
            config,
            listener: None,
            handler,
            scheduler,
            shutdown: Arc::new(ShutdownController::new()),
        }
    }

    /// Returns a shared reference to the shutdown controller.
    #[must_use]
    pub fn shutdown_controller(&self) -> Arc<ShutdownController> {
        Arc::clone(&self.shutdown)
    }

    /// Returns a shared reference to the scheduler.
    #[must_use]
    pub fn scheduler(&self) -> Arc<Scheduler> {
        Arc::clone(&self.scheduler)
    }

    /// Binds the TCP listener to the configured host and port.
    ///
    /// Returns the actual bound port, which differs from the configured port
    /// when port 0 is used.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound.
    pub async fn start(&mut self) -> anyhow::Result<u16> {
        let addr = self.config.bind_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .with_context(|| format!("failed to bind {addr}"))?;
        let port = listener.local_addr()?.port();

        info!(host = %self.config.host, port, "TCP listener bound");

        self.listener = Some(listener);
        Ok(port)
    }

    /// Accepts connections until `shutdown` resolves.
    ///
    /// After the shutdown signal:
    /// 1. The listener is dropped and state moves to Draining
    /// 2. In-flight connections are awaited up to `drain_timeout`
    /// 3. The scheduler drains its queue and its consumers exit
    ///
    /// # Errors
    ///
    /// Returns an error if `start()` was not called first.
    pub async fn serve(self, shutdown: impl Future<Output = ()> + Send) -> anyhow::Result<()> {
        let Self {
            config,
            listener,
            handler,
            scheduler,
            shutdown: controller,
        } = self;
        let listener = listener.context("start() must be called before serve()")?;

        controller.set_ready();
        info!("accepting connections");

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                () = &mut shutdown => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let id = ConnectionId::next();
                        debug!(conn = %id, %peer, "connection accepted");
                        let guard = controller.in_flight_guard();
                        let handler = handler.clone();
                        tokio::spawn(async move {
                            let _guard = guard;
                            handler.handle(id, StreamTransport::new(stream).with_peer(peer)).await;
                        });
                    }
                    // Per-connection accept failures (e.g. EMFILE) must not stop the server.
                    Err(e) => warn!(error = %e, "accept failed"),
                },
            }
        }

        drop(listener);
        controller.trigger_shutdown();
        info!(in_flight = controller.in_flight_count(), "draining connections");

        if controller.wait_for_drain(config.drain_timeout).await {
            info!("all connections drained");
        } else {
            warn!(
                in_flight = controller.in_flight_count(),
                "drain timeout expired with connections remaining"
            );
        }

        scheduler.shutdown().await;
        Ok(())
    }
}

impl<C> std::fmt::Debug for NetworkModule<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetworkModule")
            .field("config", &self.config)
            .field("bound", &self.listener.is_some())
            .finish_non_exhaustive()
    }
}
