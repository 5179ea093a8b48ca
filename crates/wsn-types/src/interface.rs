use crate::address::Address;
use crate::error::WsnResult;

/// A suspended continuation of a cooperative process. Resumed with a fresh
/// [`RoutingContext`] bound to whichever node scheduled it — the hand-rolled
/// state-machine style recommended for a deterministic scheduler, rather
/// than a generator or stackful coroutine.
pub type RoutingProcess = Box<dyn FnOnce(&mut dyn RoutingContext)>;

/// A continuation with access to both this node's routing-protocol
/// instance and its context, for self-rescheduling periodic work.
pub type SelfTask = Box<dyn FnOnce(&mut dyn RoutingProtocol, &mut dyn RoutingContext)>;

/// Capability object a [`RoutingProtocol`] uses to call back into the
/// engine (scheduler, transmitter queue, medium) without owning any of
/// them. Breaks the node/medium reference cycle: protocols only ever see
/// this trait object, never the concrete scheduler or medium types.
pub trait RoutingContext {
    /// Current virtual time.
    fn now(&self) -> f64;

    /// This node's own address.
    fn own_address(&self) -> &Address;

    /// Suspends the calling process for `dt` seconds (`dt >= 0`), then
    /// resumes by invoking `cont`.
    fn schedule_after(&mut self, dt: f64, cont: RoutingProcess);

    /// Spawns a new cooperative process, resumed at the current instant.
    fn spawn(&mut self, cont: RoutingProcess);

    /// Acquires this node's capacity-1 transmitter, then invokes `cont`;
    /// the transmitter is released automatically once `cont` returns,
    /// regardless of how it returns.
    fn request_transmitter(&mut self, cont: RoutingProcess);

    /// Hands `wire` to the medium. Returns the sampled link delay (`0` for
    /// a broadcast) — this is also the value ETX/DAP probing records as
    /// the link sample, per the "probe delay equals the medium's timeout"
    /// definition.
    fn send_to_medium(&mut self, wire: &str) -> WsnResult<f64>;

    /// Schedules `task` to run after `dt` seconds with mutable access to
    /// this node's own [`RoutingProtocol`] instance, not just the context.
    /// The mechanism periodic internal work (ETX/DAP share and probe
    /// loops, the sink-unknown retry) uses to resume itself, since a plain
    /// [`RoutingProcess`] only ever sees the context.
    fn schedule_self_task(&mut self, dt: f64, task: SelfTask);

    /// Draws a uniform index in `0..len` from the shared RNG, for
    /// forwarder-selection tie-breaks. Returns `0` if `len == 0`.
    fn choose_index(&mut self, len: usize) -> usize;

    fn log_enqueued(&mut self, wire: &str);
    fn log_sending(&mut self, wire: &str);
    fn log_sent(&mut self, wire: &str);
}

/// Common contract of the three routing protocols (Min-Hop, ETX, DAP).
/// Implementations are parameterized by role (sink/sensing) via a small
/// enum rather than by inheritance.
pub trait RoutingProtocol {
    /// Protocol-specific warm-up: hello broadcast, periodic share tasks.
    fn setup(&mut self, ctx: &mut dyn RoutingContext);

    /// Consumes a received wire string; may enqueue further packets.
    fn receive_packet(&mut self, ctx: &mut dyn RoutingContext, wire: &str);

    /// Acquires the transmitter, chooses a next hop, formats the wire, and
    /// calls the medium.
    fn add_to_output_queue(&mut self, ctx: &mut dyn RoutingContext, payload: String, destination: Address);

    /// Periodic metric-share tick (ETX/DAP). Min-Hop has no use for it and
    /// keeps the default no-op.
    fn on_periodic_share(&mut self, _ctx: &mut dyn RoutingContext) {}

    /// Periodic link-probe tick (ETX/DAP). Min-Hop has no use for it and
    /// keeps the default no-op.
    fn on_periodic_probe(&mut self, _ctx: &mut dyn RoutingContext) {}

    /// Delay until the next probe tick should fire, recomputed after every
    /// tick since it depends on the live neighbour count. Unused by Min-Hop.
    fn next_probe_interval(&self) -> f64 {
        f64::INFINITY
    }
}
