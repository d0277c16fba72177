// Numan Thabit 2025
use std::net::SocketAddr;

use crate::error::{Error, Result};

/// Listener addresses and startup options for the demo server.
#[derive(Clone, Debug)]
pub struct DemoConfig {
    /// gRPC listener.
    pub rpc_bind: SocketAddr,
    /// Prometheus scrape endpoint.
    pub metrics_bind: SocketAddr,
    /// `name` label values exported at zero before the first call.
    pub preinitialized_names: Vec<String>,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            rpc_bind: SocketAddr::from(([127, 0, 0, 1], 9093)),
            metrics_bind: SocketAddr::from(([0, 0, 0, 0], 9092)),
            preinitialized_names: vec!["Test".to_string()],
        }
    }
}

impl DemoConfig {
    /// Reject configurations where both listeners would fight over one socket.
    pub fn validate(&self) -> Result<()> {
        let fixed_port = self.rpc_bind.port() != 0;
        if fixed_port && self.rpc_bind == self.metrics_bind {
            return Err(Error::Config(format!(
                "rpc and metrics listeners share {}",
                self.rpc_bind
            )));
        }
        if fixed_port
            && self.rpc_bind.port() == self.metrics_bind.port()
            && (self.rpc_bind.ip().is_unspecified() || self.metrics_bind.ip().is_unspecified())
        {
            return Err(Error::Config(format!(
                "port {} is claimed by both listeners",
                self.rpc_bind.port()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_accepts_default_config() {
        DemoConfig::default()
            .validate()
            .expect("default config should validate");
    }

    #[test]
    fn default_addresses_match_demo_ports() {
        let cfg = DemoConfig::default();
        assert_eq!(cfg.rpc_bind.port(), 9093);
        assert_eq!(cfg.metrics_bind.port(), 9092);
        assert!(cfg.metrics_bind.ip().is_unspecified());
        assert_eq!(cfg.preinitialized_names, vec!["Test".to_string()]);
    }

    #[test]
    fn validate_rejects_shared_address() {
        let mut cfg = DemoConfig::default();
        cfg.metrics_bind = cfg.rpc_bind;
        let err = cfg.validate().expect_err("shared address must fail");
        assert!(err.to_string().contains("share"));
    }

    #[test]
    fn validate_rejects_wildcard_overlap() {
        let cfg = DemoConfig {
            rpc_bind: "127.0.0.1:9100".parse().unwrap(),
            metrics_bind: "0.0.0.0:9100".parse().unwrap(),
            preinitialized_names: Vec::new(),
        };
        let err = cfg.validate().expect_err("wildcard overlap must fail");
        assert!(err.to_string().contains("9100"));
    }

    #[test]
    fn validate_allows_ephemeral_ports() {
        let cfg = DemoConfig {
            rpc_bind: "127.0.0.1:0".parse().unwrap(),
            metrics_bind: "127.0.0.1:0".parse().unwrap(),
            preinitialized_names: Vec::new(),
        };
        cfg.validate().expect("ephemeral ports never collide");
    }
}
