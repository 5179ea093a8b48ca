use serde::{Deserialize, Serialize};

use crate::error::WsnError;

pub const DEFAULT_SEED: u64 = 290696;
pub const DEFAULT_SENSING_PERIOD: f64 = 3600.0;
pub const DEFAULT_SENSING_WAKEUP_OFFSET: f64 = 30.0;
pub const DEFAULT_SINK_WAKEUP_OFFSET: f64 = 60.0;

pub const ETX_SHARE_PERIOD: f64 = 3600.0;
pub const DAP_SHARE_PERIOD: f64 = 3600.0;
pub const PROBE_PACKET_RATE_PER_HOUR: f64 = 1.0;

/// Which routing protocol a `Simulation` runs. Unknown names are rejected
/// at construction per the spec's Config error kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RoutingProtocolKind {
    MinHop,
    Etx,
    Dap,
}

impl RoutingProtocolKind {
    pub fn parse(name: &str) -> Result<Self, WsnError> {
        match name {
            "min-hop" => Ok(RoutingProtocolKind::MinHop),
            "etx" => Ok(RoutingProtocolKind::Etx),
            "dap" => Ok(RoutingProtocolKind::Dap),
            other => Err(WsnError::Config(other.to_string())),
        }
    }
}

/// Run-level configuration: which protocol to run, the deadline used by
/// performance evaluation (and by DAP forwarding), and the RNG seed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimConfig {
    pub routing_protocol: RoutingProtocolKind,
    pub deadline: f64,
    #[serde(default = "default_seed")]
    pub seed: u64,
}

fn default_seed() -> u64 {
    DEFAULT_SEED
}

impl SimConfig {
    pub fn new(routing_protocol: RoutingProtocolKind, deadline: f64) -> Self {
        SimConfig {
            routing_protocol,
            deadline,
            seed: DEFAULT_SEED,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}
