use std::collections::HashMap;

use tracing::warn;
use wsn_types::config::DAP_SHARE_PERIOD;
use wsn_types::pdf::bin_index;
use wsn_types::{Address, DapVector, DelayPdf, Payload, RoutingContext, RoutingProtocol, WirePacket, WsnError, WsnResult};

use crate::role::Role;

const ROUTE_RETRY_DELAY: f64 = 1.0;

struct Neighbour {
    address: Address,
    link_delay_pdf: DelayPdf,
    dap: DapVector,
    dap_through_neighbour: DapVector,
}

impl Neighbour {
    fn new(address: Address) -> Self {
        Neighbour {
            address,
            link_delay_pdf: DelayPdf::new(),
            dap: DapVector::zeros(),
            dap_through_neighbour: DapVector::zeros(),
        }
    }

    fn recompute_through_neighbour(&mut self) {
        self.dap_through_neighbour = DapVector::convolve(&self.link_delay_pdf, &self.dap);
    }
}

/// Deadline-achievement-probability routing: each node advertises the
/// probability of reaching the sink within each discretized deadline bin,
/// folding neighbours' advertised DAPs through the locally probed link-delay
/// PDF.
pub struct DapProtocol {
    role: Role,
    deadline: f64,
    own_dap: DapVector,
    neighbours: HashMap<Address, Neighbour>,
    probe_cursor: usize,
}

impl DapProtocol {
    pub fn new(role: Role, deadline: f64) -> Self {
        DapProtocol {
            own_dap: if role.is_sink() { DapVector::ones() } else { DapVector::zeros() },
            role,
            deadline,
            neighbours: HashMap::new(),
            probe_cursor: 0,
        }
    }

    pub fn own_dap(&self) -> &DapVector {
        &self.own_dap
    }

    fn broadcast_hello(&self, ctx: &mut dyn RoutingContext) {
        let wire = format!("{},,{}", ctx.own_address(), Payload::format_hello(None));
        ctx.log_sending(&wire);
        match ctx.send_to_medium(&wire) {
            Ok(_) => ctx.log_sent(&wire),
            Err(e) => warn!(error = %e, "dap: broadcast failed"),
        }
    }

    fn broadcast_dap_share(&self, ctx: &mut dyn RoutingContext) {
        let wire = format!("{},,{}", ctx.own_address(), Payload::format_dap(self.own_dap.as_slice()));
        ctx.log_sending(&wire);
        match ctx.send_to_medium(&wire) {
            Ok(_) => ctx.log_sent(&wire),
            Err(e) => warn!(error = %e, "dap: share broadcast failed"),
        }
    }

    /// Picks a forwarder among neighbours for remaining time-to-deadline
    /// `tau`. `tau <= 0` still must return a candidate: per the source's
    /// documented (if unintuitive) behavior, it falls back to maximizing
    /// the last bin even though the achievable probability is reported as
    /// zero to the caller.
    fn forwarder_for_sink(&self, ctx: &mut dyn RoutingContext, tau: f64) -> Option<Address> {
        if self.neighbours.is_empty() {
            return None;
        }
        let bin = if tau <= 0.0 {
            wsn_types::pdf::PDF_AND_DAP_BINS - 1
        } else {
            bin_index(tau)
        };
        let max_value = self
            .neighbours
            .values()
            .map(|n| n.dap_through_neighbour.get(bin))
            .fold(f64::NEG_INFINITY, f64::max);
        let mut candidates: Vec<&Address> = self
            .neighbours
            .values()
            .filter(|n| n.dap_through_neighbour.get(bin) == max_value)
            .map(|n| &n.address)
            .collect();
        // HashMap iteration order isn't a function of config.seed; sort so
        // the same RNG draw picks the same physical neighbour every run.
        candidates.sort();
        let idx = ctx.choose_index(candidates.len());
        candidates.get(idx).map(|a| (*a).clone())
    }

    fn next_hop(&self, ctx: &mut dyn RoutingContext, destination: &Address, tau: f64) -> WsnResult<Option<Address>> {
        if destination.is_broadcast() || destination.as_str() == "broadcast" {
            return Ok(Some(Address::broadcast()));
        }
        if self.neighbours.contains_key(destination) {
            return Ok(Some(destination.clone()));
        }
        if destination.as_str() == "sink" {
            return Ok(self.forwarder_for_sink(ctx, tau));
        }
        Err(WsnError::Topology(format!("dap: no route to {destination}")))
    }

    /// Remaining time-to-deadline for a payload: measurements carry their
    /// own send timestamp, so `tau = deadline - (now - t_tx)`; anything else
    /// (a bare retry re-enqueue with no timestamp we can recover) uses the
    /// full deadline.
    fn time_to_deadline(&self, ctx: &dyn RoutingContext, payload: &str) -> f64 {
        match Payload::parse(payload) {
            Some(Payload::Measurement { timestamp, .. }) => self.deadline - (ctx.now() - timestamp),
            _ => self.deadline,
        }
    }

    fn enqueue(&mut self, ctx: &mut dyn RoutingContext, payload: String, destination: Address) {
        let tau = self.time_to_deadline(ctx, &payload);
        match self.next_hop(ctx, &destination, tau) {
            Ok(Some(next_hop)) => {
                let origin = ctx.own_address().clone();
                let wire = format!("{origin},{next_hop},{payload}");
                ctx.log_enqueued(&wire);
                ctx.request_transmitter(Box::new(move |ctx| {
                    ctx.log_sending(&wire);
                    if let Err(e) = ctx.send_to_medium(&wire) {
                        warn!(error = %e, "dap: send failed");
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
            Err(e) => warn!(error = %e, "dap: no route"),
        }
    }

    /// Recomputes `own_dap` as the componentwise max of every neighbour's
    /// `dap_through_neighbour`, then shares it. The sink never recomputes:
    /// it stays the all-ones vector throughout the run.
    fn share_round(&mut self, ctx: &mut dyn RoutingContext) {
        if !self.role.is_sink() {
            self.own_dap = DapVector::componentwise_max(self.neighbours.values().map(|n| &n.dap_through_neighbour));
        }
        self.broadcast_dap_share(ctx);
    }

    /// Probes the next neighbour in rotation, folds the sampled delay into
    /// that link's PDF, and refreshes the resulting `dap_through_neighbour`.
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
        let wire = format!("{},{},{}", origin, target, Payload::format_dap_probe());
        match ctx.send_to_medium(&wire) {
            Ok(delay) => {
                if let Some(neighbour) = self.neighbours.get_mut(&target) {
                    neighbour.link_delay_pdf.record_sample(delay);
                    neighbour.recompute_through_neighbour();
                }
            }
            Err(e) => warn!(error = %e, "dap: probe failed"),
        }
    }
}

impl RoutingProtocol for DapProtocol {
    fn setup(&mut self, ctx: &mut dyn RoutingContext) {
        // Only the sink kicks off discovery unprompted; a sensing node
        // broadcasts Hello only in reply to one it has just received. Only
        // a sensing node probes links - the sink never forwards.
        if self.role.is_sink() {
            self.broadcast_hello(ctx);
        } else {
            ctx.schedule_self_task(probe_interval(0), Box::new(probe_tick));
        }
        ctx.schedule_self_task(DAP_SHARE_PERIOD, Box::new(share_tick));
    }

    fn receive_packet(&mut self, ctx: &mut dyn RoutingContext, wire: &str) {
        let packet = match WirePacket::decode(wire) {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, "dap: malformed packet, dropped");
                return;
            }
        };
        match Payload::parse(&packet.payload) {
            Some(Payload::Hello { .. }) => {
                let origin = packet.origin.clone();
                if !self.neighbours.contains_key(&origin) {
                    self.neighbours.insert(origin.clone(), Neighbour::new(origin));
                    self.broadcast_hello(ctx);
                }
            }
            Some(Payload::Dap { vector: Some(v) }) => {
                let origin = packet.origin.clone();
                let dap = DapVector::from_slice(&v);
                let neighbour = self
                    .neighbours
                    .entry(origin.clone())
                    .or_insert_with(|| Neighbour::new(origin));
                neighbour.dap = dap;
                neighbour.recompute_through_neighbour();
            }
            Some(Payload::Dap { vector: None }) => {
                // Probe addressed to us: the sender reads its own
                // send_to_medium delay as the sample, nothing to update here.
            }
            other => {
                let is_control = other.is_some() || Payload::is_hello(&packet.payload) || Payload::is_dap(&packet.payload);
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

fn share_tick(protocol: &mut dyn RoutingProtocol, ctx: &mut dyn RoutingContext) {
    protocol.on_periodic_share(ctx);
    ctx.schedule_self_task(DAP_SHARE_PERIOD, Box::new(share_tick));
}

fn probe_tick(protocol: &mut dyn RoutingProtocol, ctx: &mut dyn RoutingContext) {
    protocol.on_periodic_probe(ctx);
    let next = protocol.next_probe_interval();
    ctx.schedule_self_task(next, Box::new(probe_tick));
}

fn probe_interval(neighbour_count: usize) -> f64 {
    if neighbour_count == 0 {
        DAP_SHARE_PERIOD
    } else {
        3600.0 / (wsn_types::config::PROBE_PACKET_RATE_PER_HOUR * neighbour_count as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeCtx {
        address: Address,
        now: f64,
        sent: Vec<String>,
        probe_delay: f64,
        rng_pick: usize,
        self_task_delays: Vec<f64>,
    }

    impl RoutingContext for FakeCtx {
        fn now(&self) -> f64 {
            self.now
        }
        fn own_address(&self) -> &Address {
            &self.address
        }
        fn schedule_after(&mut self, _dt: f64, _cont: wsn_types::RoutingProcess) {}
        fn spawn(&mut self, _cont: wsn_types::RoutingProcess) {}
        fn request_transmitter(&mut self, cont: wsn_types::RoutingProcess) {
            cont(self);
        }
        fn send_to_medium(&mut self, wire: &str) -> WsnResult<f64> {
            self.sent.push(wire.to_string());
            Ok(self.probe_delay)
        }
        fn schedule_self_task(&mut self, dt: f64, _task: wsn_types::SelfTask) {
            self.self_task_delays.push(dt);
        }
        fn choose_index(&mut self, len: usize) -> usize {
            self.rng_pick.min(len.saturating_sub(1))
        }
        fn log_enqueued(&mut self, _wire: &str) {}
        fn log_sending(&mut self, _wire: &str) {}
        fn log_sent(&mut self, _wire: &str) {}
    }

    fn ctx(address: &str) -> FakeCtx {
        FakeCtx {
            address: Address::new(address),
            now: 0.0,
            sent: Vec::new(),
            probe_delay: 2.0,
            rng_pick: 0,
            self_task_delays: Vec::new(),
        }
    }

    #[test]
    fn sink_dap_is_all_ones_and_never_recomputed() {
        let mut protocol = DapProtocol::new(Role::Sink, 30.0);
        let mut c = ctx("0");
        protocol.share_round(&mut c);
        for v in protocol.own_dap().as_slice() {
            assert_eq!(*v, 1.0);
        }
    }

    #[test]
    fn sensing_dap_through_neighbour_updates_after_probe_and_share() {
        let mut protocol = DapProtocol::new(Role::Sensing, 30.0);
        let mut c = ctx("1");
        protocol.receive_packet(&mut c, "0,1,Hello");
        protocol.receive_packet(&mut c, &format!("0,1,{}", Payload::format_dap(DapVector::ones().as_slice())));
        for _ in 0..5 {
            protocol.probe_round(&mut c);
        }
        protocol.share_round(&mut c);
        let through = &protocol.neighbours.get(&Address::new("0")).unwrap().dap_through_neighbour;
        // All mass concentrated at the probe delay's bin, convolved against
        // an all-ones DAP, so the through-neighbour vector should also sum
        // close to 1 in its populated region.
        assert!(through.as_slice().iter().sum::<f64>() > 0.0);
    }

    #[test]
    fn non_positive_time_to_deadline_still_picks_a_forwarder() {
        let mut protocol = DapProtocol::new(Role::Sensing, 30.0);
        let mut c = ctx("1");
        protocol.receive_packet(&mut c, "0,1,Hello");
        protocol.receive_packet(&mut c, &format!("0,1,{}", Payload::format_dap(DapVector::ones().as_slice())));
        let forwarder = protocol.forwarder_for_sink(&mut c, -5.0);
        assert_eq!(forwarder, Some(Address::new("0")));
    }

    #[test]
    fn unknown_destination_is_a_topology_error() {
        let protocol = DapProtocol::new(Role::Sensing, 30.0);
        let mut c = ctx("1");
        let err = protocol.next_hop(&mut c, &Address::new("99"), 30.0).unwrap_err();
        assert!(matches!(err, WsnError::Topology(_)));
    }

    #[test]
    fn sink_setup_broadcasts_hello_and_skips_the_probe_task() {
        let mut protocol = DapProtocol::new(Role::Sink, 30.0);
        let mut c = ctx("0");
        protocol.setup(&mut c);
        assert_eq!(c.sent, vec!["0,,Hello".to_string()]);
        // Only the share task is scheduled; a sink never probes.
        assert_eq!(c.self_task_delays, vec![DAP_SHARE_PERIOD]);
    }

    #[test]
    fn sensing_setup_schedules_share_and_probe_but_sends_no_hello() {
        let mut protocol = DapProtocol::new(Role::Sensing, 30.0);
        let mut c = ctx("1");
        protocol.setup(&mut c);
        assert!(c.sent.is_empty());
        assert_eq!(c.self_task_delays.len(), 2);
    }

    #[test]
    fn hello_from_a_new_origin_is_answered_with_a_hello_in_return() {
        let mut protocol = DapProtocol::new(Role::Sensing, 30.0);
        let mut c = ctx("1");
        protocol.receive_packet(&mut c, "0,1,Hello");
        assert_eq!(c.sent, vec!["1,,Hello".to_string()]);
        c.sent.clear();
        protocol.receive_packet(&mut c, "0,1,Hello");
        assert!(c.sent.is_empty(), "a known origin's repeat Hello is not re-answered");
    }
}
