//! Registration surface for the RPC services a process hosts.
//!
//! The lifecycle manager does not define any RPC methods itself. Collaborators
//! hand it a [`ServiceRegistry`] populated with generated tonic servers (e.g.
//! `ComputeServer::new(handler)`) and, optionally, the encoded file descriptor
//! sets that let the reflection service describe them.

use core::convert::Infallible;
use core::fmt;
use tonic::body::Body;
use tonic::codegen::{Service, http};
use tonic::server::NamedService;
use tonic::service::RoutesBuilder;

/// Collected RPC services, consumed when the server starts.
#[derive(Default)]
pub struct ServiceRegistry {
    routes: RoutesBuilder,
    names: Vec<&'static str>,
    file_descriptor_sets: Vec<&'static [u8]>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a gRPC service to the server.
    ///
    /// The service's fully qualified name is also reported through the health
    /// service: `SERVING` while the process serves, `NOT_SERVING` once it
    /// starts draining.
    pub fn add_service<S>(&mut self, svc: S) -> &mut Self
    where
        S: Service<http::Request<Body>, Response = http::Response<Body>, Error = Infallible>
            + NamedService
            + Clone
            + Send
            + Sync
            + 'static,
        S::Future: Send + 'static,
    {
        self.names.push(S::NAME);
        self.routes.add_service(svc);
        self
    }

    /// Registers an encoded `FileDescriptorSet` with the reflection service.
    ///
    /// Typically the `FILE_DESCRIPTOR_SET` constant emitted by
    /// `tonic-prost-build`.
    pub fn register_file_descriptor_set(&mut self, encoded: &'static [u8]) -> &mut Self {
        self.file_descriptor_sets.push(encoded);
        self
    }

    /// Fully qualified names of the registered services, in insertion order.
    pub fn service_names(&self) -> &[&'static str] {
        &self.names
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub(crate) fn into_parts(self) -> (RoutesBuilder, Vec<&'static str>, Vec<&'static [u8]>) {
        (self.routes, self.names, self.file_descriptor_sets)
    }
}

impl fmt::Debug for ServiceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceRegistry")
            .field("services", &self.names)
            .field("file_descriptor_sets", &self.file_descriptor_sets.len())
            .finish_non_exhaustive()
    }
}
