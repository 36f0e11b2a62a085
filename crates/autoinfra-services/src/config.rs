use anyhow::bail;
use autoinfra_lifecycle::ServiceConfig;
use clap::Parser;
use core::time::Duration;
use std::net::{IpAddr, Ipv4Addr};

/// Static identity of one service binary.
///
/// Each binary hosts the same lifecycle under a different name and default
/// port so that co-located services do not collide.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceProfile {
    /// Executable name shown in `--help`.
    pub binary: &'static str,
    /// Short service name used in logs (e.g. `"compute"`).
    pub name: &'static str,
    /// Port used when none is given on the command line or in the environment.
    pub default_port: u16,
}

pub const COMPUTE: ServiceProfile = ServiceProfile {
    binary: "compute-service",
    name: "compute",
    default_port: 8080,
};

pub const NETWORK: ServiceProfile = ServiceProfile {
    binary: "network-service",
    name: "network",
    default_port: 8082,
};

/// Command-line and environment configuration shared by every service binary.
///
/// All values may be provided as arguments or environment variables (a `.env`
/// file is loaded first when present).
#[derive(Parser, Debug, Clone)]
#[command(version, about = "Hosts an autoinfra gRPC service until SIGINT or SIGTERM")]
pub struct CliArgs {
    /// TCP port to listen on. Defaults to the service's well-known port.
    ///
    /// Environment variable: `SERVICE_PORT`
    #[arg(env = "SERVICE_PORT")]
    pub port: Option<u16>,

    /// Address to bind. The wildcard address listens on every interface.
    ///
    /// Environment variable: `SERVICE_HOST`
    #[arg(long, env = "SERVICE_HOST", default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
    pub host: IpAddr,

    /// Maximum number of seconds to wait for in-flight requests on shutdown
    /// before the server is force-stopped. Unset waits indefinitely.
    ///
    /// Environment variable: `DRAIN_TIMEOUT_SECS`
    #[arg(long, env = "DRAIN_TIMEOUT_SECS")]
    pub drain_timeout_secs: Option<u64>,
}

impl CliArgs {
    /// Resolves the arguments against `profile` into a [`ServiceConfig`].
    pub fn into_service_config(self, profile: &ServiceProfile) -> anyhow::Result<ServiceConfig> {
        let port = self.port.unwrap_or(profile.default_port);
        let config = ServiceConfig::new(profile.name, port).with_host(self.host);

        match self.drain_timeout_secs {
            None => Ok(config),
            Some(0) => bail!("DRAIN_TIMEOUT_SECS must be greater than 0"),
            Some(secs) => Ok(config.with_drain_timeout(Duration::from_secs(secs))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> CliArgs {
        CliArgs::try_parse_from(args).unwrap()
    }

    #[test]
    fn falls_back_to_profile_port() {
        let compute = parse(&["compute-service"])
            .into_service_config(&COMPUTE)
            .unwrap();
        let network = parse(&["network-service"])
            .into_service_config(&NETWORK)
            .unwrap();

        assert_eq!(compute.socket_addr(), "0.0.0.0:8080".parse().unwrap());
        assert_eq!(network.socket_addr(), "0.0.0.0:8082".parse().unwrap());
        assert_eq!(compute.name, "compute");
        assert_eq!(compute.drain_timeout, None);
    }

    #[test]
    fn positional_port_overrides_default() {
        let config = parse(&["compute-service", "9090", "--host", "127.0.0.1"])
            .into_service_config(&COMPUTE)
            .unwrap();
        assert_eq!(config.socket_addr(), "127.0.0.1:9090".parse().unwrap());
    }

    #[test]
    fn drain_timeout_is_optional_but_nonzero() {
        let config = parse(&["network-service", "--drain-timeout-secs", "15"])
            .into_service_config(&NETWORK)
            .unwrap();
        assert_eq!(config.drain_timeout, Some(Duration::from_secs(15)));

        let err = parse(&["network-service", "--drain-timeout-secs", "0"])
            .into_service_config(&NETWORK)
            .unwrap_err();
        assert!(err.to_string().contains("DRAIN_TIMEOUT_SECS"));
    }

    #[test]
    fn rejects_out_of_range_port() {
        assert!(CliArgs::try_parse_from(["compute-service", "70000"]).is_err());
        assert!(CliArgs::try_parse_from(["compute-service", "http"]).is_err());
    }
}
