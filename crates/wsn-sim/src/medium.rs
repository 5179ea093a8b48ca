use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use rand::rngs::StdRng;
use tracing::{debug, trace};
use wsn_types::{Address, Network, WirePacket, WsnError, WsnResult};

use crate::scheduler::Scheduler;

/// Callback a node registers with the medium for delivery of a wire string
/// addressed to it.
pub type ReceiveHandler = Rc<dyn Fn(Scheduler, String)>;

/// Routes wire packets between neighbours, honoring each link's delay
/// sampler. Generalizes the fixed two-node channel of a point-to-point
/// simulator to an address-keyed link registry.
///
/// `send` is synchronous and value-returning: it samples the delay,
/// schedules the destination's delivery, and returns the sampled delay
/// immediately. That return value is both what lets the transmitter
/// [`Resource`](crate::resource::Resource) release right after the call to
/// the medium (rather than after the full in-flight interval) and the
/// sample ETX/DAP link-probing records.
pub struct Medium {
    network: Network,
    handlers: HashMap<Address, ReceiveHandler>,
    rng: Rc<RefCell<StdRng>>,
}

impl Medium {
    pub fn new(network: Network, rng: Rc<RefCell<StdRng>>) -> Self {
        Medium {
            network,
            handlers: HashMap::new(),
            rng,
        }
    }

    /// Registers (or replaces) the delivery callback for `address`.
    pub fn register(&mut self, address: Address, handler: ReceiveHandler) {
        self.handlers.insert(address, handler);
    }

    pub fn network(&self) -> &Network {
        &self.network
    }

    /// Parses `wire` and hands it to the right neighbour(s).
    ///
    /// Broadcast (`destination == ""`): enumerates every link incident to
    /// `origin` and schedules delivery to each neighbour at `dt = 0` — a
    /// broadcast incurs no link delay. Unicast: locates the unique link
    /// between origin and destination (a fatal [`WsnError::Topology`] if
    /// none exists), samples its delay, and schedules delivery after that
    /// many virtual seconds.
    pub fn send(&self, sched: Scheduler, wire: &str) -> WsnResult<f64> {
        let packet = WirePacket::decode(wire)?;
        if packet.destination.is_broadcast() {
            for link in self.network.links_of(&packet.origin) {
                let Some(dest) = link.get_destination(&packet.origin) else {
                    continue;
                };
                if let Some(handler) = self.handlers.get(dest).cloned() {
                    let wire_owned = wire.to_string();
                    debug!(origin = %packet.origin, %dest, "medium: broadcast fan-out");
                    sched.schedule_after(0.0, Box::new(move |sched| handler(sched, wire_owned)));
                }
            }
            Ok(0.0)
        } else {
            let link = self
                .network
                .link_between(&packet.origin, &packet.destination)
                .ok_or_else(|| {
                    WsnError::Topology(format!(
                        "no link between {} and {}",
                        packet.origin, packet.destination
                    ))
                })?;
            let delay = link.delay_sampler.sample(&mut self.rng.borrow_mut())?;
            if let Some(handler) = self.handlers.get(&packet.destination).cloned() {
                let wire_owned = wire.to_string();
                trace!(origin = %packet.origin, dest = %packet.destination, delay, "medium: unicast scheduled");
                sched.schedule_after(delay, Box::new(move |sched| handler(sched, wire_owned)));
            }
            Ok(delay)
        }
    }
}
