pub mod dap;
pub mod etx;
pub mod min_hop;
pub mod performance;
pub mod role;

pub use dap::DapProtocol;
pub use etx::EtxProtocol;
pub use min_hop::MinHopProtocol;
pub use performance::{compute as compute_performance, PerformanceReport, SourceReport};
pub use role::Role;

use wsn_types::{RoutingProtocol, RoutingProtocolKind};

/// Builds the concrete protocol instance named by `kind`, playing `role`.
/// `deadline` only matters to DAP (it scopes forwarder selection); the other
/// two protocols ignore it.
pub fn build(kind: RoutingProtocolKind, role: Role, deadline: f64) -> Box<dyn RoutingProtocol> {
    match kind {
        RoutingProtocolKind::MinHop => Box::new(MinHopProtocol::new(role)),
        RoutingProtocolKind::Etx => Box::new(EtxProtocol::new(role)),
        RoutingProtocolKind::Dap => Box::new(DapProtocol::new(role, deadline)),
    }
}
