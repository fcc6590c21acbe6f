//! A single-threaded loop that owns the deferred-callback queue.
//!
//! Every continuation registered on a [`Deferred`] is dispatched through
//! the loop, never inline, so user code only ever runs from
//! [`EventLoop::turn`]. Zero-delay tasks run in FIFO order ahead of timers;
//! timers run in deadline order, ties broken by registration order.
use crate::{Deferred, Error};
use std::{
    cell::{Cell, RefCell},
    cmp::Ordering,
    collections::{BinaryHeap, VecDeque},
    fmt,
    rc::{Rc, Weak},
    thread,
    time::{Duration, Instant},
};

pub(crate) type Task = Box<dyn FnOnce()>;

/// How the loop measures time while waiting on timers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Clock {
    /// Sleep the thread until the next timer is due.
    #[default]
    Real,
    /// Jump straight to the next deadline without sleeping.
    Virtual,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LoopConfig {
    pub clock: Clock,
    /// Upper bound on the number of tasks the loop will ever run.
    pub turn_limit: Option<u64>,
}

impl LoopConfig {
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_turn_limit(mut self, limit: u64) -> Self {
        self.turn_limit = Some(limit);
        self
    }
}

struct Timer {
    deadline: Duration,
    seq: u64,
    task: Task,
}

impl PartialEq for Timer {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}

impl Eq for Timer {}

impl PartialOrd for Timer {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Timer {
    // Reversed so the max-heap pops the earliest deadline first.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

struct Inner {
    config: LoopConfig,
    origin: Instant,
    virtual_now: Cell<Duration>,
    queue: RefCell<VecDeque<Task>>,
    timers: RefCell<BinaryHeap<Timer>>,
    next_seq: Cell<u64>,
    turns: Cell<u64>,
}

/// Handle onto a deferred-callback queue. Clones share the same queue.
///
/// # Examples
///
/// ```
/// use deferred_value::{Deferred, EventLoop};
///
/// let lp = EventLoop::new();
/// let doubled = Deferred::<i32, String>::resolve(&lp, 21).and_then(|v| Ok(v * 2));
/// assert_eq!(lp.block_on(&doubled), Ok(Ok(42)));
/// ```
#[derive(Clone)]
pub struct EventLoop {
    inner: Rc<Inner>,
}

impl Default for EventLoop {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EventLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventLoop")
            .field("config", &self.inner.config)
            .field("queued", &self.inner.queue.borrow().len())
            .field("timers", &self.inner.timers.borrow().len())
            .field("turns", &self.inner.turns.get())
            .finish()
    }
}

impl EventLoop {
    pub fn new() -> Self {
        Self::with_config(LoopConfig::default())
    }

    pub fn with_config(config: LoopConfig) -> Self {
        Self {
            inner: Rc::new(Inner {
                config,
                origin: Instant::now(),
                virtual_now: Cell::new(Duration::ZERO),
                queue: RefCell::new(VecDeque::new()),
                timers: RefCell::new(BinaryHeap::new()),
                next_seq: Cell::new(0),
                turns: Cell::new(0),
            }),
        }
    }

    pub fn config(&self) -> &LoopConfig {
        &self.inner.config
    }

    /// Time elapsed since the loop was created, by the configured clock.
    pub fn now(&self) -> Duration {
        match self.inner.config.clock {
            Clock::Real => self.inner.origin.elapsed(),
            Clock::Virtual => self.inner.virtual_now.get(),
        }
    }

    /// Queue `task` to run on a later turn.
    pub fn defer<F>(&self, task: F)
    where
        F: FnOnce() + 'static,
    {
        self.inner.queue.borrow_mut().push_back(Box::new(task));
    }

    /// Queue `task` to run once `delay` has elapsed. A deadline beyond
    /// what the clock can represent is never reached, so the task is
    /// dropped without running.
    pub fn set_timeout<F>(&self, delay: Duration, task: F)
    where
        F: FnOnce() + 'static,
    {
        let deadline = match self.now().checked_add(delay) {
            Some(deadline) if deadline < Duration::MAX => deadline,
            _ => {
                tracing::trace!(delay_ms = delay.as_millis(), "timer can never fire, dropped");
                return;
            }
        };
        let seq = self.inner.next_seq.get();
        self.inner.next_seq.set(seq + 1);
        tracing::trace!(seq, delay_ms = delay.as_millis(), "timer registered");
        self.inner.timers.borrow_mut().push(Timer {
            deadline,
            seq,
            task: Box::new(task),
        });
    }

    pub fn pending_tasks(&self) -> usize {
        self.inner.queue.borrow().len() + self.inner.timers.borrow().len()
    }

    pub fn is_idle(&self) -> bool {
        self.pending_tasks() == 0
    }

    /// Number of tasks run so far.
    pub fn turns(&self) -> u64 {
        self.inner.turns.get()
    }

    /// Run a single task, waiting for the next timer if nothing else is
    /// queued. Returns `Ok(false)` once there is no work left.
    pub fn turn(&self) -> Result<bool, Error> {
        if let Some(limit) = self.inner.config.turn_limit {
            if self.inner.turns.get() >= limit && !self.is_idle() {
                tracing::debug!(limit, "turn limit reached");
                return Err(Error::TurnLimit(limit));
            }
        }
        let Some(task) = self.next_task() else {
            return Ok(false);
        };
        self.inner.turns.set(self.inner.turns.get() + 1);
        task();
        Ok(true)
    }

    /// Drive the loop until it is idle. Returns the number of turns taken.
    pub fn run(&self) -> Result<u64, Error> {
        let start = self.turns();
        while self.turn()? {}
        Ok(self.turns() - start)
    }

    /// Drive the loop until `deferred` settles and return its outcome.
    pub fn block_on<T, E>(&self, deferred: &Deferred<T, E>) -> Result<Result<T, E>, Error>
    where
        T: Clone + 'static,
        E: Clone + 'static,
    {
        loop {
            if let Some(outcome) = deferred.peek() {
                return Ok(outcome);
            }
            if !self.turn()? {
                tracing::debug!(id = deferred.id(), "event loop stalled");
                return Err(Error::Stalled);
            }
        }
    }

    pub(crate) fn downgrade(&self) -> WeakLoop {
        WeakLoop {
            inner: Rc::downgrade(&self.inner),
        }
    }

    fn next_task(&self) -> Option<Task> {
        if let Some(task) = self.inner.queue.borrow_mut().pop_front() {
            return Some(task);
        }
        let deadline = self.inner.timers.borrow().peek().map(|timer| timer.deadline)?;
        let now = self.now();
        if deadline > now {
            match self.inner.config.clock {
                Clock::Real => thread::sleep(deadline - now),
                Clock::Virtual => self.inner.virtual_now.set(deadline),
            }
        }
        let timer = self.inner.timers.borrow_mut().pop()?;
        tracing::trace!(seq = timer.seq, "timer fired");
        Some(timer.task)
    }
}

/// Non-owning handle kept by deferred values, so work queued on a loop
/// never keeps that loop alive.
#[derive(Clone)]
pub(crate) struct WeakLoop {
    inner: Weak<Inner>,
}

impl WeakLoop {
    pub(crate) fn upgrade(&self) -> Option<EventLoop> {
        self.inner.upgrade().map(|inner| EventLoop { inner })
    }

    /// Queue `task` if the loop is still alive, otherwise drop it.
    pub(crate) fn defer<F>(&self, task: F)
    where
        F: FnOnce() + 'static,
    {
        match self.upgrade() {
            Some(event_loop) => event_loop.defer(task),
            None => tracing::trace!("event loop dropped, task discarded"),
        }
    }
}
