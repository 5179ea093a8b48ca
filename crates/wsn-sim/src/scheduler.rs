use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::rc::Rc;

use tracing::debug;

/// A suspended scheduler continuation, resumed with a fresh handle to the
/// scheduler that is resuming it.
pub type Action = Box<dyn FnOnce(Scheduler)>;

struct ScheduledEvent {
    time: f64,
    seq: u64,
    action: Action,
}

impl PartialEq for ScheduledEvent {
    fn eq(&self, other: &Self) -> bool {
        self.time == other.time && self.seq == other.seq
    }
}
impl Eq for ScheduledEvent {}

impl PartialOrd for ScheduledEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScheduledEvent {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed so BinaryHeap (a max-heap) pops the smallest time first;
        // ties break FIFO on insertion order.
        other
            .time
            .partial_cmp(&self.time)
            .unwrap_or(Ordering::Equal)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

struct SchedulerState {
    time: f64,
    queue: BinaryHeap<ScheduledEvent>,
    next_seq: u64,
}

/// A single-threaded, virtual-time event loop. Events are totally ordered
/// by `(time_ready, insertion_order)`; ties break FIFO. "Processes" are
/// realized as boxed continuations that re-arm themselves by calling
/// `schedule_after` again from inside their own body, rather than true
/// coroutines — the scheduler itself never needs to understand periodicity.
///
/// Cheap to clone: all clones share the same underlying event queue, which
/// is how a continuation scheduled on one clone becomes visible to `run`
/// invoked on another.
#[derive(Clone)]
pub struct Scheduler {
    inner: Rc<RefCell<SchedulerState>>,
}

impl Scheduler {
    pub fn new() -> Self {
        Scheduler {
            inner: Rc::new(RefCell::new(SchedulerState {
                time: 0.0,
                queue: BinaryHeap::new(),
                next_seq: 0,
            })),
        }
    }

    /// Current virtual time.
    pub fn now(&self) -> f64 {
        self.inner.borrow().time
    }

    /// Schedules `action` to run after `dt` virtual seconds.
    pub fn schedule_after(&self, dt: f64, action: Action) {
        assert!(dt >= 0.0, "scheduler: negative delay {dt}");
        let mut state = self.inner.borrow_mut();
        let time = state.time + dt;
        let seq = state.next_seq;
        state.next_seq += 1;
        state.queue.push(ScheduledEvent { time, seq, action });
    }

    /// Spawns a new cooperative process, resumed at the current instant.
    pub fn spawn(&self, process: Action) {
        self.schedule_after(0.0, process);
    }

    /// Number of events still queued (diagnostics / tests only).
    pub fn pending_events(&self) -> usize {
        self.inner.borrow().queue.len()
    }

    /// Runs the event loop until the clock reaches `until`. No wall-clock
    /// involvement: this returns as soon as no queued event has
    /// `time <= until`.
    pub fn run(&self, until: f64) {
        loop {
            let next = {
                let mut state = self.inner.borrow_mut();
                match state.queue.peek() {
                    Some(event) if event.time <= until => state.queue.pop(),
                    _ => None,
                }
            };
            let Some(event) = next else { break };
            {
                let mut state = self.inner.borrow_mut();
                state.time = event.time;
            }
            debug!(time = event.time, "scheduler: dispatch");
            (event.action)(self.clone());
        }
        let mut state = self.inner.borrow_mut();
        if state.time < until {
            state.time = until;
        }
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}
