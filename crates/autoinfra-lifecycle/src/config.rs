use core::time::Duration;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

/// Runtime configuration for one hosted service.
///
/// A single `ServiceConfig` drives one [`ServiceProcess`] from bind to stop.
/// The listen address defaults to the IPv4 wildcard so the service is
/// reachable on every interface.
///
/// [`ServiceProcess`]: crate::ServiceProcess
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    /// Name used in log spans and shutdown messages (e.g. `"compute"`).
    pub name: String,
    /// Address the listener binds to.
    pub host: IpAddr,
    /// TCP port. `0` asks the OS for an ephemeral port.
    pub port: u16,
    /// Upper bound on the graceful drain. `None` waits for in-flight work
    /// indefinitely.
    pub drain_timeout: Option<Duration>,
}

impl ServiceConfig {
    pub fn new(name: impl Into<String>, port: u16) -> Self {
        Self {
            name: name.into(),
            host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port,
            drain_timeout: None,
        }
    }

    #[must_use]
    pub fn with_host(mut self, host: IpAddr) -> Self {
        self.host = host;
        self
    }

    #[must_use]
    pub fn with_drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = Some(timeout);
        self
    }

    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_wildcard_and_unbounded_drain() {
        let config = ServiceConfig::new("compute", 8080);
        assert_eq!(config.socket_addr(), "0.0.0.0:8080".parse().unwrap());
        assert_eq!(config.drain_timeout, None);
    }

    #[test]
    fn builder_overrides_host_and_drain() {
        let config = ServiceConfig::new("network", 8082)
            .with_host(IpAddr::V4(Ipv4Addr::LOCALHOST))
            .with_drain_timeout(Duration::from_secs(5));
        assert_eq!(config.socket_addr(), "127.0.0.1:8082".parse().unwrap());
        assert_eq!(config.drain_timeout, Some(Duration::from_secs(5)));
    }
}
