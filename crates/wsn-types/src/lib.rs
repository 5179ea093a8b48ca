pub mod address;
pub mod config;
pub mod error;
pub mod interface;
pub mod packet;
pub mod pdf;
pub mod scenario;
pub mod topology;

pub use address::Address;
pub use config::{RoutingProtocolKind, SimConfig};
pub use error::{WsnError, WsnResult};
pub use interface::{RoutingContext, RoutingProcess, RoutingProtocol, SelfTask};
pub use packet::{Payload, WirePacket};
pub use pdf::{DapVector, DelayPdf, PDF_AND_DAP_BINS, PDF_AND_DAP_DURATION, PDF_AND_DAP_RESOLUTION};
pub use scenario::ScenarioFile;
pub use topology::{DelaySampler, Link, Network, Node, NodeKind};
