use std::collections::HashMap;

use tracing::warn;
use wsn_types::{Address, Payload, RoutingContext, RoutingProtocol, WirePacket, WsnError, WsnResult};

use crate::role::Role;

const ROUTE_RETRY_DELAY: f64 = 1.0;

#[derive(Debug, Clone)]
struct Neighbour {
    address: Address,
    hop_count: u32,
}

/// Hop-count flooding with random-tiebreak next-hop selection.
pub struct MinHopProtocol {
    role: Role,
    hop_count: u32,
    neighbours: HashMap<Address, Neighbour>,
}

impl MinHopProtocol {
    pub fn new(role: Role) -> Self {
        MinHopProtocol {
            hop_count: if role.is_sink() { 0 } else { 99 },
            role,
            neighbours: HashMap::new(),
        }
    }

    pub fn hop_count(&self) -> u32 {
        self.hop_count
    }

    /// Sets `own hop_count = candidate` iff it is smaller. Returns whether
    /// it changed.
    fn update_hop_count(&mut self, candidate: u32) -> bool {
        if candidate < self.hop_count {
            self.hop_count = candidate;
            true
        } else {
            false
        }
    }

    fn broadcast_hello(&self, ctx: &mut dyn RoutingContext) {
        let wire = format!(
            "{},,{}",
            ctx.own_address(),
            Payload::format_hello(Some(self.hop_count))
        );
        ctx.log_sending(&wire);
        match ctx.send_to_medium(&wire) {
            Ok(_) => ctx.log_sent(&wire),
            Err(e) => warn!(error = %e, "min-hop: broadcast failed"),
        }
    }

    /// Uniformly among neighbours with minimal `hop_count`.
    fn forwarder_for_sink(&self, ctx: &mut dyn RoutingContext) -> Option<Address> {
        let min_hop = self.neighbours.values().map(|n| n.hop_count).min()?;
        let mut candidates: Vec<&Address> = self
            .neighbours
            .values()
            .filter(|n| n.hop_count == min_hop)
            .map(|n| &n.address)
            .collect();
        // HashMap iteration order isn't a function of config.seed; sort so
        // the same RNG draw picks the same physical neighbour every run.
        candidates.sort();
        let idx = ctx.choose_index(candidates.len());
        candidates.get(idx).map(|a| (*a).clone())
    }

    fn next_hop(&self, ctx: &mut dyn RoutingContext, destination: &Address) -> WsnResult<Option<Address>> {
        if destination.is_broadcast() || destination.as_str() == "broadcast" {
            return Ok(Some(Address::broadcast()));
        }
        if self.neighbours.contains_key(destination) {
            return Ok(Some(destination.clone()));
        }
        if destination.as_str() == "sink" {
            return Ok(self.forwarder_for_sink(ctx));
        }
        Err(WsnError::Topology(format!("min-hop: no route to {destination}")))
    }

    fn enqueue(&mut self, ctx: &mut dyn RoutingContext, payload: String, destination: Address) {
        match self.next_hop(ctx, &destination) {
            Ok(Some(next_hop)) => {
                let origin = ctx.own_address().clone();
                let wire = format!("{origin},{next_hop},{payload}");
                ctx.log_enqueued(&wire);
                ctx.request_transmitter(Box::new(move |ctx| {
                    ctx.log_sending(&wire);
                    if let Err(e) = ctx.send_to_medium(&wire) {
                        warn!(error = %e, "min-hop: send failed");
                        return;
                    }
                    ctx.log_sent(&wire);
                }));
            }
            Ok(None) => {
                // No neighbour discovered yet for a sink-bound forward:
                // queue-and-retry rather than fail the way the source does.
                ctx.schedule_self_task(
                    ROUTE_RETRY_DELAY,
                    Box::new(move |protocol, ctx| protocol.add_to_output_queue(ctx, payload, destination)),
                );
            }
            Err(e) => warn!(error = %e, "min-hop: no route"),
        }
    }
}

impl RoutingProtocol for MinHopProtocol {
    fn setup(&mut self, ctx: &mut dyn RoutingContext) {
        if self.role.is_sink() {
            self.broadcast_hello(ctx);
        }
    }

    fn receive_packet(&mut self, ctx: &mut dyn RoutingContext, wire: &str) {
        let packet = match WirePacket::decode(wire) {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, "min-hop: malformed packet, dropped");
                return;
            }
        };
        match Payload::parse(&packet.payload) {
            Some(Payload::Hello { hop_count: Some(h) }) => {
                let origin = packet.origin.clone();
                let changed_entry = self.neighbours.get(&origin).map(|n| n.hop_count != h).unwrap_or(true);
                if changed_entry {
                    let is_new = !self.neighbours.contains_key(&origin);
                    self.neighbours.insert(origin.clone(), Neighbour { address: origin, hop_count: h });
                    let hop_decreased = self.update_hop_count(h + 1);
                    // A sink's hop_count is pinned at 0 and never benefits from
                    // re-announcing: only a sensing node re-broadcasts here, on
                    // first hearing a neighbour or on an improved hop count.
                    if !self.role.is_sink() && (is_new || hop_decreased) {
                        self.broadcast_hello(ctx);
                    }
                }
            }
            other => {
                if self.role == Role::Sensing && !Payload::is_hello(&packet.payload) {
                    let _ = other;
                    self.enqueue(ctx, packet.payload.clone(), Address::new("sink"));
                }
            }
        }
    }

    fn add_to_output_queue(&mut self, ctx: &mut dyn RoutingContext, payload: String, destination: Address) {
        self.enqueue(ctx, payload, destination);
    }
}
