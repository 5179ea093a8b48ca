use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use crate::scheduler::Scheduler;

type Waiter = Box<dyn FnOnce(Scheduler, ResourceGuard)>;

struct ResourceState {
    held: bool,
    waiters: VecDeque<Waiter>,
}

/// A capacity-1 FIFO queue serializing a node's transmitter: at most one
/// process holds it at a time, waiters are served in arrival order, and the
/// holder's [`ResourceGuard`] guarantees release on every exit path. Cheap
/// to clone — clones share the same waiter queue.
#[derive(Clone)]
pub struct Resource {
    inner: Rc<RefCell<ResourceState>>,
}

impl Resource {
    pub fn new() -> Self {
        Resource {
            inner: Rc::new(RefCell::new(ResourceState {
                held: false,
                waiters: VecDeque::new(),
            })),
        }
    }

    /// Requests the resource. `on_acquire` runs once it is held: either
    /// immediately, if free, or after every waiter ahead of it has released.
    pub fn request(&self, sched: Scheduler, on_acquire: impl FnOnce(Scheduler, ResourceGuard) + 'static) {
        let mut state = self.inner.borrow_mut();
        if !state.held {
            state.held = true;
            drop(state);
            on_acquire(
                sched.clone(),
                ResourceGuard {
                    resource: self.clone(),
                    sched,
                },
            );
        } else {
            state.waiters.push_back(Box::new(on_acquire));
        }
    }

    /// Releases the resource, handing it directly to the next FIFO waiter
    /// if one exists, or marking it free otherwise.
    fn release(&self) -> Option<Waiter> {
        let mut state = self.inner.borrow_mut();
        match state.waiters.pop_front() {
            some @ Some(_) => some,
            None => {
                state.held = false;
                None
            }
        }
    }
}

impl Default for Resource {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII holder of a [`Resource`]. Release happens on drop, guaranteeing the
/// transmitter is freed no matter how the holding continuation exits
/// (including an unwind), and hands off to the next FIFO waiter if any.
pub struct ResourceGuard {
    resource: Resource,
    sched: Scheduler,
}

impl Drop for ResourceGuard {
    fn drop(&mut self) {
        if let Some(next_waiter) = self.resource.release() {
            next_waiter(
                self.sched.clone(),
                ResourceGuard {
                    resource: self.resource.clone(),
                    sched: self.sched.clone(),
                },
            );
        }
    }
}
