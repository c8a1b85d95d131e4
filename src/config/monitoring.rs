use std::net::IpAddr;
use std::net::Ipv4Addr;
use std::net::SocketAddr;

use serde::Deserialize;
use serde::Serialize;
use tracing::warn;

use crate::Error;
use crate::Result;

/// Settings for the `/metrics` endpoint served by the binary.
///
/// The library registers its collectors either way; this only controls
/// whether they are exposed over HTTP.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MonitoringConfig {
    /// Serve `/metrics` when true
    #[serde(default)]
    pub prometheus_enabled: bool,

    /// Address the endpoint binds to
    #[serde(default = "default_bind_address")]
    pub bind_address: IpAddr,

    #[serde(default = "default_prometheus_port")]
    pub prometheus_port: u16,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            prometheus_enabled: false,
            bind_address: default_bind_address(),
            prometheus_port: default_prometheus_port(),
        }
    }
}

impl MonitoringConfig {
    pub fn metrics_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.prometheus_port)
    }

    /// An enabled endpoint needs a fixed, unprivileged port so scrapers can
    /// find it.
    pub fn validate(&self) -> Result<()> {
        if !self.prometheus_enabled {
            if self.prometheus_port != default_prometheus_port() {
                warn!(
                    port = self.prometheus_port,
                    "metrics port configured but the endpoint is disabled"
                );
            }
            return Ok(());
        }

        match self.prometheus_port {
            0 => Err(Error::InvalidConfig(
                "prometheus_port must be set when the metrics endpoint is enabled".into(),
            )),
            port if port < 1024 => Err(Error::InvalidConfig(format!(
                "prometheus_port {port} is privileged; pick a port of 1024 or above"
            ))),
            _ => Ok(()),
        }
    }
}

fn default_bind_address() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

fn default_prometheus_port() -> u16 {
    9090
}
