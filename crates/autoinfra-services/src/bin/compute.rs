//! # `compute-service`
//!
//! Hosts the compute service endpoint. Listens on port `8080` unless a port is
//! given as the first argument or via `SERVICE_PORT`.
//!
//! ```bash
//! cargo run --bin compute-service --release -- 9080
//! ```

use autoinfra_lifecycle::ServiceRegistry;
use autoinfra_services::{config::COMPUTE, launch};

// Using mimalloc for better performance under contention, especially in musl
// environments.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    launch(COMPUTE, ServiceRegistry::new()).await
}
