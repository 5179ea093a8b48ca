use std::collections::HashMap;

use tracing::warn;
use wsn_types::config::ETX_SHARE_PERIOD;
use wsn_types::{Address, Payload, RoutingContext, RoutingProtocol, WirePacket, WsnError, WsnResult};

use crate::role::Role;

/// Stand-in "infinite" ETX for a sensing node that hasn't heard a share yet.
const ETX_SENTINEL: f64 = 999_999.0;
const ROUTE_RETRY_DELAY: f64 = 1.0;
/// Floating-point tolerant inequality for forwarder tie detection.
const ETX_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Clone)]
struct Neighbour {
    address: Address,
    /// Last ETX this neighbour shared for its own path to the sink.
    etx: f64,
    /// Locally probed per-link ETX samples, most recent last.
    link_etx_samples: Vec<f64>,
}

impl Neighbour {
    fn link_etx(&self) -> f64 {
        if self.link_etx_samples.is_empty() {
            1.0
        } else {
            self.link_etx_samples.iter().sum::<f64>() / self.link_etx_samples.len() as f64
        }
    }

    fn total_etx(&self) -> f64 {
        self.etx + self.link_etx()
    }
}

/// Expected-transmission-count routing: own ETX is the minimum total ETX
/// among neighbours, periodically shared and periodically re-probed.
pub struct EtxProtocol {
    role: Role,
    own_etx: f64,
    neighbours: HashMap<Address, Neighbour>,
    probe_cursor: usize,
}

impl EtxProtocol {
    pub fn new(role: Role) -> Self {
        EtxProtocol {
            own_etx: if role.is_sink() { 0.0 } else { ETX_SENTINEL },
            role,
            neighbours: HashMap::new(),
            probe_cursor: 0,
        }
    }

    pub fn own_etx(&self) -> f64 {
        self.own_etx
    }

    fn broadcast_hello(&self, ctx: &mut dyn RoutingContext) {
        let wire = format!("{},,{}", ctx.own_address(), Payload::format_hello(None));
        ctx.log_sending(&wire);
        match ctx.send_to_medium(&wire) {
            Ok(_) => ctx.log_sent(&wire),
            Err(e) => warn!(error = %e, "etx: broadcast failed"),
        }
    }

    fn broadcast_etx_share(&self, ctx: &mut dyn RoutingContext) {
        let wire = format!("{},,{}", ctx.own_address(), Payload::format_etx(self.own_etx));
        ctx.log_sending(&wire);
        match ctx.send_to_medium(&wire) {
            Ok(_) => ctx.log_sent(&wire),
            Err(e) => warn!(error = %e, "etx: share broadcast failed"),
        }
    }

    /// Uniformly among neighbours whose `total_etx` is within tolerance of
    /// the minimum.
    fn forwarder_for_sink(&self, ctx: &mut dyn RoutingContext) -> Option<Address> {
        let min_etx = self
            .neighbours
            .values()
            .map(|n| n.total_etx())
            .fold(f64::INFINITY, f64::min);
        if !min_etx.is_finite() {
            return None;
        }
        let mut candidates: Vec<&Address> = self
            .neighbours
            .values()
            .filter(|n| n.total_etx() <= min_etx + ETX_TOLERANCE)
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
        Err(WsnError::Topology(format!("etx: no route to {destination}")))
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
                        warn!(error = %e, "etx: send failed");
                        return;
                    }
                    ctx.log_sent(&wire);
                }));
            }
            Ok(None) => {
                ctx.schedule_self_task(
                    ROUTE_RETRY_DELAY,
                    Box::new(move |protocol, ctx| protocol.add_to_output_queue(ctx, payload, destination)),
                );
            }
            Err(e) => warn!(error = %e, "etx: no route"),
        }
    }

    /// Recomputes `own_etx` as the minimum total ETX across neighbours,
    /// then shares it. A sink never recomputes: it stays pinned at 0.
    fn share_round(&mut self, ctx: &mut dyn RoutingContext) {
        if !self.role.is_sink() {
            let min_etx = self
                .neighbours
                .values()
                .map(|n| n.total_etx())
                .fold(f64::INFINITY, f64::min);
            if min_etx.is_finite() {
                self.own_etx = min_etx;
            }
        }
        self.broadcast_etx_share(ctx);
    }

    /// Sends a probe packet to the next neighbour in rotation and records
    /// the sampled delay the medium returns as that link's latest ETX
    /// sample.
    fn probe_round(&mut self, ctx: &mut dyn RoutingContext) {
        if self.neighbours.is_empty() {
            return;
        }
        let mut addresses: Vec<Address> = self.neighbours.keys().cloned().collect();
        // Same HashMap-iteration-order hazard as forwarder selection: sort
        // so probe_cursor walks a deterministic sequence of neighbours.
        addresses.sort();
        let target = addresses[self.probe_cursor % addresses.len()].clone();
        self.probe_cursor = (self.probe_cursor + 1) % addresses.len();

        let origin = ctx.own_address().clone();
        let wire = format!("{},{},{}", origin, target, Payload::format_etx_probe());
        match ctx.send_to_medium(&wire) {
            Ok(delay) => {
                if let Some(neighbour) = self.neighbours.get_mut(&target) {
                    neighbour.link_etx_samples.push(delay);
                }
            }
            Err(e) => warn!(error = %e, "etx: probe failed"),
        }
    }
}

impl RoutingProtocol for EtxProtocol {
    fn setup(&mut self, ctx: &mut dyn RoutingContext) {
        // Only the sink kicks off discovery unprompted; a sensing node
        // broadcasts Hello only in reply to one it has just received (see
        // the `receive_packet` Hello arm below). Only a sensing node probes
        // links - the sink has no forwarding decision to inform.
        if self.role.is_sink() {
            self.broadcast_hello(ctx);
        } else {
            ctx.schedule_self_task(probe_interval(0), Box::new(probe_tick));
        }
        ctx.schedule_self_task(ETX_SHARE_PERIOD, Box::new(share_tick));
    }

    fn receive_packet(&mut self, ctx: &mut dyn RoutingContext, wire: &str) {
        let packet = match WirePacket::decode(wire) {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, "etx: malformed packet, dropped");
                return;
            }
        };
        match Payload::parse(&packet.payload) {
            Some(Payload::Hello { .. }) => {
                let origin = packet.origin.clone();
                let is_new = !self.neighbours.contains_key(&origin);
                if is_new {
                    self.neighbours.insert(
                        origin.clone(),
                        Neighbour { address: origin, etx: ETX_SENTINEL, link_etx_samples: Vec::new() },
                    );
                    self.broadcast_hello(ctx);
                }
            }
            Some(Payload::Etx { value: Some(v) }) => {
                let origin = packet.origin.clone();
                self.neighbours
                    .entry(origin.clone())
                    .and_modify(|n| n.etx = v)
                    .or_insert_with(|| Neighbour { address: origin, etx: v, link_etx_samples: Vec::new() });
            }
            Some(Payload::Etx { value: None }) => {
                // A probe addressed to us: nothing to update, the sender
                // reads its own send_to_medium delay as the sample.
            }
            other => {
                let is_control = other.is_some() || Payload::is_hello(&packet.payload) || Payload::is_etx(&packet.payload);
                if self.role == Role::Sensing && !is_control {
                    self.enqueue(ctx, packet.payload.clone(), Address::new("sink"));
                }
            }
        }
    }

    fn add_to_output_queue(&mut self, ctx: &mut dyn RoutingContext, payload: String, destination: Address) {
        self.enqueue(ctx, payload, destination);
    }

    fn on_periodic_share(&mut self, ctx: &mut dyn RoutingContext) {
        self.share_round(ctx);
    }

    fn on_periodic_probe(&mut self, ctx: &mut dyn RoutingContext) {
        self.probe_round(ctx);
    }

    fn next_probe_interval(&self) -> f64 {
        probe_interval(self.neighbours.len())
    }
}

/// Dispatches purely through [`RoutingProtocol`]'s trait methods, so the
/// scheduled [`wsn_types::SelfTask`] never needs to know the concrete type.
fn share_tick(protocol: &mut dyn RoutingProtocol, ctx: &mut dyn RoutingContext) {
    protocol.on_periodic_share(ctx);
    ctx.schedule_self_task(ETX_SHARE_PERIOD, Box::new(share_tick));
}

fn probe_tick(protocol: &mut dyn RoutingProtocol, ctx: &mut dyn RoutingContext) {
    protocol.on_periodic_probe(ctx);
    let next = protocol.next_probe_interval();
    ctx.schedule_self_task(next, Box::new(probe_tick));
}

/// Interval between probes: one probe per neighbour per hour, spread evenly.
/// With zero neighbours yet, retries on the share period.
fn probe_interval(neighbour_count: usize) -> f64 {
    if neighbour_count == 0 {
        ETX_SHARE_PERIOD
    } else {
        3600.0 / (wsn_types::config::PROBE_PACKET_RATE_PER_HOUR * neighbour_count as f64)
    }
}
