use serde::Deserialize;

use crate::config::{RoutingProtocolKind, SimConfig};
use crate::error::WsnError;
use crate::topology::{DelaySampler, Link, Network, Node, NodeKind};

/// On-disk description of a network topology plus the run parameters,
/// loaded from a TOML scenario file by `wsn-cli`.
#[derive(Deserialize, Debug, Clone)]
pub struct ScenarioFile {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub routing_protocol: String,
    pub deadline: f64,
    #[serde(default)]
    pub seed: Option<u64>,
    pub run_until: f64,
    pub nodes: Vec<NodeSpec>,
    pub links: Vec<LinkSpec>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum NodeSpec {
    Sink {
        address: String,
        #[serde(default)]
        name: Option<String>,
    },
    Sensing {
        address: String,
        #[serde(default)]
        name: Option<String>,
        sensing_period: Option<f64>,
        sensing_offset: Option<f64>,
    },
}

#[derive(Deserialize, Debug, Clone)]
pub struct LinkSpec {
    pub a: String,
    pub b: String,
    #[serde(flatten)]
    pub delay: DelaySampler,
}

impl ScenarioFile {
    /// Builds the `(Network, SimConfig)` this file describes. Unknown
    /// routing protocol names are rejected here, per the spec's Config
    /// error kind being fatal at construction.
    pub fn build(&self) -> Result<(Network, SimConfig), WsnError> {
        let protocol = RoutingProtocolKind::parse(&self.routing_protocol)?;
        let nodes = self
            .nodes
            .iter()
            .map(|spec| match spec {
                NodeSpec::Sink { address, name } => Node {
                    address: address.as_str().into(),
                    name: name.clone().unwrap_or_else(|| address.clone()),
                    kind: NodeKind::Sink,
                },
                NodeSpec::Sensing {
                    address,
                    name,
                    sensing_period,
                    sensing_offset,
                } => Node {
                    address: address.as_str().into(),
                    name: name.clone().unwrap_or_else(|| address.clone()),
                    kind: NodeKind::Sensing {
                        sensing_period: sensing_period
                            .unwrap_or(crate::config::DEFAULT_SENSING_PERIOD),
                        sensing_offset: sensing_offset
                            .unwrap_or(crate::config::DEFAULT_SENSING_WAKEUP_OFFSET),
                    },
                },
            })
            .collect();
        let links = self
            .links
            .iter()
            .map(|spec| Link::new(spec.a.as_str(), spec.b.as_str(), spec.delay.clone()))
            .collect();
        let network = Network::new(nodes, links);
        let mut config = SimConfig::new(protocol, self.deadline);
        if let Some(seed) = self.seed {
            config = config.with_seed(seed);
        }
        Ok((network, config))
    }
}
