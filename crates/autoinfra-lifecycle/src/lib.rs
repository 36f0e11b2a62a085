#![doc = include_str!("../README.md")]

pub mod config;
pub mod error;
pub mod manager;
pub mod registry;
pub mod signal;
pub mod state;

pub use config::ServiceConfig;
pub use error::{Error, Result};
pub use manager::{BoundProcess, ServiceProcess, start};
pub use registry::ServiceRegistry;
pub use signal::{
    ShutdownCause, ShutdownSignal, ShutdownTrigger, install_os_handlers, shutdown_channel,
};
pub use state::LifecycleState;
