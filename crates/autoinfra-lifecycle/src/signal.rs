//! Termination signal plumbing.
//!
//! A shutdown request travels over a single-slot channel: any number of
//! [`ShutdownTrigger`]s may fire, but only the first request that lands in the
//! empty slot is ever delivered, and the one [`ShutdownSignal`] is consumed by
//! the first `recv`. Duplicate requests are dropped rather than queued, so a
//! burst of Ctrl+C presses yields exactly one graceful stop.
//!
//! OS signal streams are process-wide state. [`install_os_handlers`] may claim
//! them once per process; later calls fail with
//! [`Error::SignalsAlreadyInstalled`].

use crate::error::{Error, Result};
use core::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;

static OS_HANDLERS_INSTALLED: AtomicBool = AtomicBool::new(false);

/// What asked the service to stop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShutdownCause {
    /// SIGINT or Ctrl+C.
    Interrupt,
    /// SIGTERM.
    Terminate,
    /// Requested programmatically through a [`ShutdownTrigger`].
    Requested,
}

impl fmt::Display for ShutdownCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Interrupt => write!(f, "interrupt"),
            Self::Terminate => write!(f, "terminate"),
            Self::Requested => write!(f, "requested"),
        }
    }
}

/// Creates a connected trigger/signal pair backed by a capacity-one channel.
pub fn shutdown_channel() -> (ShutdownTrigger, ShutdownSignal) {
    let (tx, rx) = mpsc::channel(1);
    (ShutdownTrigger { tx }, ShutdownSignal { rx })
}

/// Sending half of the shutdown channel. Cheap to clone.
#[derive(Clone, Debug)]
pub struct ShutdownTrigger {
    tx: mpsc::Sender<ShutdownCause>,
}

impl ShutdownTrigger {
    /// Requests shutdown.
    ///
    /// Returns `true` if this request occupied the slot, `false` if a request
    /// is already pending or the signal side has gone away.
    pub fn fire(&self, cause: ShutdownCause) -> bool {
        self.tx.try_send(cause).is_ok()
    }

    /// Returns `true` once the [`ShutdownSignal`] has been dropped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Receiving half of the shutdown channel, consumed on first use.
#[derive(Debug)]
pub struct ShutdownSignal {
    rx: mpsc::Receiver<ShutdownCause>,
}

impl ShutdownSignal {
    /// Waits for the first shutdown request.
    ///
    /// If every trigger is dropped before firing, no request can ever arrive
    /// and this future never completes.
    pub async fn recv(mut self) -> ShutdownCause {
        match self.rx.recv().await {
            Some(cause) => cause,
            None => core::future::pending().await,
        }
    }
}

/// Forwards SIGINT and SIGTERM into `trigger` for the life of the process.
///
/// The signal streams are registered before this returns, so a signal
/// delivered right after the call is not lost. Signals arriving after the
/// first are swallowed, which keeps a second Ctrl+C from killing a draining
/// process.
///
/// # Errors
///
/// - [`Error::SignalsAlreadyInstalled`] if handlers were installed earlier in
///   this process.
/// - [`Error::Signal`] if the OS refused a signal registration.
///
/// Tokio never unregisters a signal. If SIGTERM is refused after SIGINT was
/// registered, SIGINT stays captured with nobody listening (Ctrl+C no longer
/// terminates the process) and the handlers stay claimed, so later calls
/// return [`Error::SignalsAlreadyInstalled`].
///
/// Must be called from within a Tokio runtime.
pub fn install_os_handlers(trigger: ShutdownTrigger) -> Result<()> {
    claim(&OS_HANDLERS_INSTALLED, || forward_signals(trigger))
}

/// A refused signal registration.
#[cfg_attr(not(unix), allow(dead_code))]
struct InstallFailure {
    source: std::io::Error,
    /// Some signal was already registered when this one was refused.
    partial: bool,
}

fn claim(
    flag: &AtomicBool,
    install: impl FnOnce() -> core::result::Result<(), InstallFailure>,
) -> Result<()> {
    if flag.swap(true, Ordering::AcqRel) {
        return Err(Error::SignalsAlreadyInstalled);
    }

    install().map_err(|failure| {
        if !failure.partial {
            flag.store(false, Ordering::Release);
        }
        Error::Signal(failure.source)
    })
}

#[cfg(unix)]
fn forward_signals(trigger: ShutdownTrigger) -> core::result::Result<(), InstallFailure> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut interrupt = signal(SignalKind::interrupt()).map_err(|source| InstallFailure {
        source,
        partial: false,
    })?;
    let mut terminate = signal(SignalKind::terminate()).map_err(|source| InstallFailure {
        source,
        partial: true,
    })?;

    tokio::spawn(async move {
        loop {
            let cause = tokio::select! {
                Some(()) = interrupt.recv() => ShutdownCause::Interrupt,
                Some(()) = terminate.recv() => ShutdownCause::Terminate,
                else => break,
            };
            deliver(&trigger, cause);
        }
    });

    Ok(())
}

#[cfg(not(unix))]
fn forward_signals(trigger: ShutdownTrigger) -> core::result::Result<(), InstallFailure> {
    tokio::spawn(async move {
        loop {
            if let Err(_e) = tokio::signal::ctrl_c().await {
                tracing::error!("Ctrl+C handler failed: {_e}");
                break;
            }
            deliver(&trigger, ShutdownCause::Interrupt);
        }
    });

    Ok(())
}

fn deliver(trigger: &ShutdownTrigger, cause: ShutdownCause) {
    if trigger.fire(cause) {
        tracing::info!(%cause, "Received termination signal");
    } else {
        tracing::debug!(%cause, "Shutdown already requested, ignoring signal");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn first_request_wins() {
        let (trigger, signal) = shutdown_channel();
        assert!(trigger.fire(ShutdownCause::Terminate));
        assert!(!trigger.fire(ShutdownCause::Interrupt));
        assert_eq!(signal.recv().await, ShutdownCause::Terminate);
    }

    #[tokio::test]
    async fn firing_after_signal_dropped_is_harmless() {
        let (trigger, signal) = shutdown_channel();
        drop(signal);
        assert!(trigger.is_closed());
        assert!(!trigger.fire(ShutdownCause::Requested));
    }

    #[tokio::test]
    async fn recv_waits_forever_once_all_triggers_are_gone() {
        let (trigger, signal) = shutdown_channel();
        drop(trigger);
        let res = timeout(Duration::from_millis(50), signal.recv()).await;
        assert!(res.is_err());
    }

    #[test]
    fn refused_first_registration_releases_the_claim() {
        let flag = AtomicBool::new(false);
        let res = claim(&flag, || {
            Err(InstallFailure {
                source: std::io::Error::other("refused"),
                partial: false,
            })
        });
        assert!(matches!(res, Err(Error::Signal(_))));
        assert!(claim(&flag, || Ok(())).is_ok());
    }

    #[test]
    fn partial_registration_keeps_the_claim() {
        let flag = AtomicBool::new(false);
        let res = claim(&flag, || {
            Err(InstallFailure {
                source: std::io::Error::other("terminate refused"),
                partial: true,
            })
        });
        assert!(matches!(res, Err(Error::Signal(_))));
        assert!(matches!(
            claim(&flag, || Ok(())),
            Err(Error::SignalsAlreadyInstalled)
        ));
    }

    #[tokio::test]
    async fn os_handlers_have_a_single_owner() {
        let (first, _signal) = shutdown_channel();
        let (second, _other) = shutdown_channel();
        install_os_handlers(first).unwrap();
        assert!(matches!(
            install_os_handlers(second),
            Err(Error::SignalsAlreadyInstalled)
        ));
    }
}
