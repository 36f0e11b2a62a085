//! The service lifecycle manager.
//!
//! A process moves through `Created -> Bound -> Serving -> Draining ->
//! Stopped` exactly once. The typestate split between [`ServiceProcess`] and
//! [`BoundProcess`] makes the order explicit: a listener must be bound before
//! anything can be served, and both types are consumed by the step that
//! advances them, so a stopped manager cannot be restarted.
//!
//! ## Shutdown coordination
//!
//! Once the accept loop is running on its background task, the foreground
//! task selects over two events:
//!
//! - a shutdown request on the [`ShutdownSignal`], and
//! - completion of the serving task (a transport failure or panic).
//!
//! Whichever fires first decides the outcome, so the shutdown path runs at
//! most once. On a shutdown request the health service flips to
//! `NOT_SERVING`, the server stops accepting connections, and the manager
//! waits for in-flight RPCs to finish. If a drain timeout is configured and
//! expires, every in-flight request is cancelled, the serving task is aborted
//! and [`Error::DrainTimeout`] is returned.

mod force_stop;

use self::force_stop::ForceStopLayer;
use crate::{
    config::ServiceConfig,
    error::{Error, Result},
    registry::ServiceRegistry,
    signal::{ShutdownSignal, install_os_handlers, shutdown_channel},
    state::LifecycleState,
};
use std::net::SocketAddr;
use std::time::Instant;
use tokio::net::TcpListener;
use tokio::sync::{oneshot, watch};
use tokio::time::timeout;
use tokio_stream::wrappers::TcpListenerStream;
use tokio_util::sync::CancellationToken;
use tonic::transport::Server;
use tonic_health::{ServingStatus, server::HealthReporter};
use tonic_reflection::server::Builder;
use tonic_web::GrpcWebLayer;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::Instrument;

/// Binds, serves and stops one service, installing the OS signal handlers.
///
/// Returns once a termination signal has been received and every in-flight
/// RPC has completed.
///
/// # Errors
///
/// Any [`Error`] variant; all of them are fatal to the process.
pub async fn start(config: ServiceConfig, registry: ServiceRegistry) -> Result<()> {
    ServiceProcess::new(config, registry)
        .bind()
        .await?
        .run()
        .await
}

/// A service that has not opened its listener yet.
#[derive(Debug)]
pub struct ServiceProcess {
    config: ServiceConfig,
    registry: ServiceRegistry,
    state: watch::Sender<LifecycleState>,
}

impl ServiceProcess {
    pub fn new(config: ServiceConfig, registry: ServiceRegistry) -> Self {
        let (state, _) = watch::channel(LifecycleState::Created);
        Self {
            config,
            registry,
            state,
        }
    }

    pub const fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.borrow()
    }

    /// Returns a receiver that observes every later lifecycle transition.
    pub fn subscribe(&self) -> watch::Receiver<LifecycleState> {
        self.state.subscribe()
    }

    /// Opens the TCP listener (`Created -> Bound`).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Bind`] if the address is in use, not available, or
    /// requires privileges the process lacks. No task has been spawned at that
    /// point.
    pub async fn bind(self) -> Result<BoundProcess> {
        let addr = self.config.socket_addr();
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| Error::Bind { addr, source })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| Error::Bind { addr, source })?;

        advance(&self.state, LifecycleState::Bound);
        tracing::debug!(service = %self.config.name, %local_addr, "Listener bound");

        Ok(BoundProcess {
            config: self.config,
            registry: self.registry,
            listener,
            local_addr,
            state: self.state,
        })
    }
}

/// A service whose listener is open but not yet accepting.
#[derive(Debug)]
pub struct BoundProcess {
    config: ServiceConfig,
    registry: ServiceRegistry,
    listener: TcpListener,
    local_addr: SocketAddr,
    state: watch::Sender<LifecycleState>,
}

impl BoundProcess {
    /// The address actually bound, with the OS-assigned port if `0` was
    /// requested.
    pub const fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<LifecycleState> {
        self.state.subscribe()
    }

    /// Serves until SIGINT or SIGTERM, then drains and stops.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::SignalsAlreadyInstalled`] if another service in this
    /// process already owns the signal handlers, otherwise as
    /// [`run_until`](Self::run_until).
    pub async fn run(self) -> Result<()> {
        let (trigger, signal) = shutdown_channel();
        install_os_handlers(trigger)?;
        self.run_until(signal).await
    }

    /// Serves until `signal` fires, then drains and stops.
    ///
    /// # Errors
    ///
    /// - [`Error::Reflection`] if a registered descriptor set is malformed.
    /// - [`Error::Serve`] / [`Error::UnexpectedExit`] if the serving task ends
    ///   on its own.
    /// - [`Error::DrainTimeout`] if draining outlives the configured timeout.
    pub async fn run_until(self, signal: ShutdownSignal) -> Result<()> {
        let span = tracing::info_span!(
            "service",
            name = %self.config.name,
            addr = %self.local_addr
        );
        self.serve(signal).instrument(span).await
    }

    async fn serve(self, signal: ShutdownSignal) -> Result<()> {
        let Self {
            config,
            registry,
            listener,
            local_addr,
            state,
        } = self;
        let (mut routes, names, descriptor_sets) = registry.into_parts();

        let (health_reporter, health_service) = tonic_health::server::health_reporter();
        for name in &names {
            health_reporter
                .set_service_status(name, ServingStatus::Serving)
                .await;
        }

        let reflection = || {
            descriptor_sets.iter().copied().fold(
                Builder::configure()
                    .register_encoded_file_descriptor_set(tonic_health::pb::FILE_DESCRIPTOR_SET),
                |builder, set| builder.register_encoded_file_descriptor_set(set),
            )
        };
        routes
            .add_service(health_service)
            .add_service(reflection().build_v1()?)
            .add_service(reflection().build_v1alpha()?);

        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let force_stop = CancellationToken::new();
        let server = Server::builder()
            .accept_http1(true)
            .layer(
                ServiceBuilder::new()
                    .layer(ForceStopLayer::new(force_stop.clone()))
                    .layer(TraceLayer::new_for_grpc())
                    .layer(
                        CorsLayer::new()
                            .allow_origin(Any)
                            .allow_methods(Any)
                            .allow_headers(Any),
                    )
                    .layer(GrpcWebLayer::new()),
            )
            .add_routes(routes.routes())
            .serve_with_incoming_shutdown(TcpListenerStream::new(listener), async move {
                let _ = stop_rx.await;
            });

        tracing::info!(
            "Starting {} service on port {}",
            config.name,
            local_addr.port()
        );

        let drain = Drain {
            config: &config,
            state: &state,
            health: &health_reporter,
            services: &names,
            force_stop,
        };
        drain
            .supervise(async move { server.await.map_err(Error::serve) }, signal, stop_tx)
            .await
    }
}

/// Everything the shutdown path touches once serving has started.
struct Drain<'a> {
    config: &'a ServiceConfig,
    state: &'a watch::Sender<LifecycleState>,
    health: &'a HealthReporter,
    services: &'a [&'static str],
    /// Cancels every in-flight request once the drain timeout expires.
    force_stop: CancellationToken,
}

impl Drain<'_> {
    /// Runs `serving` in the background and waits for whichever comes first:
    /// a shutdown request or the end of the serving task.
    async fn supervise<F>(
        &self,
        serving: F,
        signal: ShutdownSignal,
        stop: oneshot::Sender<()>,
    ) -> Result<()>
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        let mut task = tokio::spawn(serving);
        advance(self.state, LifecycleState::Serving);
        tracing::info!(monotonic_counter.service_starts = 1_u64, "Serving");

        let cause = tokio::select! {
            cause = signal.recv() => cause,
            joined = &mut task => {
                advance(self.state, LifecycleState::Stopped);
                let err = match joined {
                    Ok(Ok(())) => Error::UnexpectedExit,
                    Ok(Err(e)) => e,
                    Err(e) => Error::serve(e),
                };
                return Err(err);
            }
        };

        tracing::info!(%cause, "Shutting down {} service...", self.config.name);
        advance(self.state, LifecycleState::Draining);
        self.mark_not_serving().await;

        let started = Instant::now();
        // The receiver only disappears if the server already returned, which
        // the join below reports.
        let _ = stop.send(());

        let joined = match self.config.drain_timeout {
            None => (&mut task).await,
            Some(limit) => match timeout(limit, &mut task).await {
                Ok(joined) => joined,
                Err(_) => {
                    self.force_stop.cancel();
                    task.abort();
                    let _ = task.await;
                    advance(self.state, LifecycleState::Stopped);
                    tracing::warn!(
                        "Drain exceeded {:?}, {} service force-stopped",
                        limit,
                        self.config.name
                    );
                    return Err(Error::DrainTimeout { timeout: limit });
                }
            },
        };
        advance(self.state, LifecycleState::Stopped);

        match joined {
            Ok(Ok(())) => {
                let drain_ms = started.elapsed().as_secs_f64() * 1000.0;
                tracing::info!(
                    monotonic_counter.shutdowns = 1_u64,
                    histogram.drain_duration_ms = drain_ms,
                    "{} service shut down successfully",
                    self.config.name
                );
                Ok(())
            }
            Ok(Err(e)) => Err(e),
            Err(e) => Err(Error::serve(e)),
        }
    }

    async fn mark_not_serving(&self) {
        self.health
            .set_service_status("", ServingStatus::NotServing)
            .await;
        for name in self.services {
            self.health
                .set_service_status(name, ServingStatus::NotServing)
                .await;
        }
    }
}

fn advance(state: &watch::Sender<LifecycleState>, next: LifecycleState) {
    let prev = state.send_replace(next);
    debug_assert!(prev < next, "lifecycle moved backwards: {prev} -> {next}");
    tracing::debug!(from = %prev, to = %next, "Lifecycle transition");
}
