//! Error types for the service lifecycle.
//!
//! Every variant is fatal to the process instance that produced it: there is
//! no recoverable category. Binaries surface these through `anyhow` and exit
//! with a non-zero status.
//!
//! ## Error Cases
//! - `Bind`: the listener could not be opened. Nothing has been served yet.
//! - `Reflection`: the reflection service rejected a descriptor set.
//! - `Signal`: an OS signal stream could not be registered.
//! - `SignalsAlreadyInstalled`: the process-wide signal handlers already have
//!   an owner.
//! - `Serve`: the background serving task failed or panicked.
//! - `UnexpectedExit`: the serving task returned before shutdown was
//!   requested.
//! - `DrainTimeout`: in-flight work outlived the configured drain window. The
//!   remaining requests were cancelled and the server was force-stopped.

use core::time::Duration;
use std::net::SocketAddr;

pub type Result<T> = core::result::Result<T, Error>;

/// Unified error type for the service lifecycle.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The TCP listener could not be bound.
    #[error("failed to listen on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// A file descriptor set could not be loaded into the reflection service.
    #[error("failed to build reflection service: {0}")]
    Reflection(#[from] tonic_reflection::server::Error),

    /// Registering an OS signal stream failed.
    #[error("failed to install signal handler: {0}")]
    Signal(#[source] std::io::Error),

    /// OS signal handlers were already installed in this process.
    #[error("OS signal handlers are already owned by another service")]
    SignalsAlreadyInstalled,

    /// The serving task failed with a transport error or panicked.
    #[error("failed to serve: {source}")]
    Serve {
        #[source]
        source: tower::BoxError,
    },

    /// The serving task stopped without a shutdown request.
    #[error("server exited before shutdown was requested")]
    UnexpectedExit,

    /// Draining exceeded the configured timeout; in-flight requests were
    /// cancelled and the accept loop aborted.
    #[error("graceful drain did not finish within {timeout:?}; server was force-stopped")]
    DrainTimeout { timeout: Duration },
}

impl Error {
    pub(crate) fn serve(source: impl Into<tower::BoxError>) -> Self {
        Self::Serve {
            source: source.into(),
        }
    }
}
