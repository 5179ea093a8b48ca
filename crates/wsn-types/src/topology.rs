use std::sync::Arc;

use rand::Rng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, Gamma};
use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::error::{WsnError, WsnResult};

/// Per-link delay distribution. `Custom` carries a user-supplied sampler
/// closure (the Rust equivalent of the original "nullary function returning
/// a non-negative f64") and is not serializable; the named variants are the
/// ones loadable from a scenario file.
#[derive(Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DelaySampler {
    Fixed { seconds: f64 },
    Uniform { low: f64, high: f64 },
    Gamma { shape: f64, scale: f64 },
    #[serde(skip)]
    Custom(#[serde(skip)] Arc<dyn Fn(&mut StdRng) -> f64 + Send + Sync>),
}

impl std::fmt::Debug for DelaySampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DelaySampler::Fixed { seconds } => {
                f.debug_struct("Fixed").field("seconds", seconds).finish()
            }
            DelaySampler::Uniform { low, high } => f
                .debug_struct("Uniform")
                .field("low", low)
                .field("high", high)
                .finish(),
            DelaySampler::Gamma { shape, scale } => f
                .debug_struct("Gamma")
                .field("shape", shape)
                .field("scale", scale)
                .finish(),
            DelaySampler::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

impl DelaySampler {
    pub fn fixed(seconds: f64) -> Self {
        DelaySampler::Fixed { seconds }
    }

    pub fn uniform(low: f64, high: f64) -> Self {
        DelaySampler::Uniform { low, high }
    }

    pub fn gamma(shape: f64, scale: f64) -> Self {
        DelaySampler::Gamma { shape, scale }
    }

    pub fn custom(f: impl Fn(&mut StdRng) -> f64 + Send + Sync + 'static) -> Self {
        DelaySampler::Custom(Arc::new(f))
    }

    /// Draws a fresh sample. Each call is independent, matching the
    /// original "nullary function, re-invoked per packet" contract.
    pub fn sample(&self, rng: &mut StdRng) -> WsnResult<f64> {
        let value = match self {
            DelaySampler::Fixed { seconds } => *seconds,
            DelaySampler::Uniform { low, high } => rng.random_range(*low..=*high),
            DelaySampler::Gamma { shape, scale } => {
                let dist = Gamma::new(*shape, *scale)
                    .map_err(|e| WsnError::Topology(format!("invalid gamma params: {e}")))?;
                dist.sample(rng)
            }
            DelaySampler::Custom(f) => f(rng),
        };
        if value < 0.0 {
            return Err(WsnError::Sampler(value));
        }
        Ok(value)
    }
}

/// Role-specific fields of a node, per the spec's data model.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodeKind {
    Sink,
    Sensing {
        sensing_period: f64,
        sensing_offset: f64,
    },
}

impl NodeKind {
    pub fn sensing_default() -> Self {
        NodeKind::Sensing {
            sensing_period: crate::config::DEFAULT_SENSING_PERIOD,
            sensing_offset: crate::config::DEFAULT_SENSING_WAKEUP_OFFSET,
        }
    }
}

/// Static topology entity. Two nodes are equal iff their addresses match.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub address: Address,
    pub name: String,
    pub kind: NodeKind,
}

impl Node {
    pub fn sink(address: impl Into<Address>, name: impl Into<String>) -> Self {
        Node {
            address: address.into(),
            name: name.into(),
            kind: NodeKind::Sink,
        }
    }

    pub fn sensing(
        address: impl Into<Address>,
        name: impl Into<String>,
        sensing_period: f64,
        sensing_offset: f64,
    ) -> Self {
        Node {
            address: address.into(),
            name: name.into(),
            kind: NodeKind::Sensing {
                sensing_period,
                sensing_offset,
            },
        }
    }

    pub fn is_sink(&self) -> bool {
        matches!(self.kind, NodeKind::Sink)
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.address == other.address
    }
}
impl Eq for Node {}

/// Unordered pair of node addresses plus a delay sampler.
#[derive(Clone)]
pub struct Link {
    pub endpoints: (Address, Address),
    pub delay_sampler: DelaySampler,
}

impl Link {
    pub fn new(a: impl Into<Address>, b: impl Into<Address>, delay_sampler: DelaySampler) -> Self {
        Link {
            endpoints: (a.into(), b.into()),
            delay_sampler,
        }
    }

    /// Returns the other endpoint of this link given one of its ends.
    pub fn get_destination(&self, origin: &Address) -> Option<&Address> {
        if &self.endpoints.0 == origin {
            Some(&self.endpoints.1)
        } else if &self.endpoints.1 == origin {
            Some(&self.endpoints.0)
        } else {
            None
        }
    }

    pub fn incident_on(&self, addr: &Address) -> bool {
        &self.endpoints.0 == addr || &self.endpoints.1 == addr
    }

    pub fn connects(&self, a: &Address, b: &Address) -> bool {
        (&self.endpoints.0 == a && &self.endpoints.1 == b)
            || (&self.endpoints.0 == b && &self.endpoints.1 == a)
    }
}

/// A Wireless Sensor Network formed by nodes and links. Construction,
/// `display_summary`-style printing and other user-facing helpers are
/// deliberately out of scope for this crate; this is a thin value type.
#[derive(Clone)]
pub struct Network {
    pub nodes: Vec<Node>,
    pub links: Vec<Link>,
}

impl Network {
    pub fn new(mut nodes: Vec<Node>, links: Vec<Link>) -> Self {
        nodes.sort_by(|a, b| a.address.cmp(&b.address));
        Network { nodes, links }
    }

    pub fn sink(&self) -> Option<&Node> {
        self.nodes.iter().find(|n| n.is_sink())
    }

    pub fn node(&self, address: &Address) -> Option<&Node> {
        self.nodes.iter().find(|n| &n.address == address)
    }

    pub fn links_of(&self, address: &Address) -> Vec<&Link> {
        self.links.iter().filter(|l| l.incident_on(address)).collect()
    }

    pub fn link_between(&self, a: &Address, b: &Address) -> Option<&Link> {
        self.links.iter().find(|l| l.connects(a, b))
    }
}
