//! # `network-service`
//!
//! Hosts the network service endpoint. Listens on port `8082` unless a port is
//! given as the first argument or via `SERVICE_PORT`.
//!
//! ```bash
//! cargo run --bin network-service --release -- 9082
//! ```

use autoinfra_lifecycle::ServiceRegistry;
use autoinfra_services::{config::NETWORK, launch};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    launch(NETWORK, ServiceRegistry::new()).await
}
