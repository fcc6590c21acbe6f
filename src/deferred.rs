//! The settlement core: a shared, single-assignment cell plus the queue
//! of continuations waiting on it.
//!
//! A [`Deferred`] starts out pending and settles exactly once, either to a
//! value or to a reason. Settlement happens through a [`Producer`], the
//! handle given to the initializer of [`Deferred::new`] or returned by
//! [`Deferred::pending`]. The first accepted settlement call wins; every
//! later call on any clone of the producer is silently ignored.
use crate::{
    event_loop::{EventLoop, WeakLoop},
    Resolution,
};
use std::{
    any::Any,
    cell::RefCell,
    fmt, mem,
    rc::Rc,
    sync::atomic::{AtomicU64, Ordering},
    task::Waker,
    thread, vec,
};

static NEXT_ID: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Pending,
    Resolved,
    Rejected,
}

/// One registration made while the source was pending. Exactly one of the
/// two branches is invoked.
pub(crate) struct Reaction<T, E> {
    pub(crate) on_resolved: Box<dyn FnOnce(T)>,
    pub(crate) on_rejected: Box<dyn FnOnce(E)>,
}

impl<T, E> Reaction<T, E> {
    fn fire(self, outcome: Result<T, E>) {
        match outcome {
            Ok(value) => (self.on_resolved)(value),
            Err(reason) => (self.on_rejected)(reason),
        }
    }
}

struct Waiting<T, E> {
    reactions: Vec<Reaction<T, E>>,
    wakers: Vec<Waker>,
    // Set by the first settlement call a producer accepts. An adoption
    // keeps the state pending but still shuts out later producer calls.
    locked: bool,
}

impl<T, E> Default for Waiting<T, E> {
    fn default() -> Self {
        Self {
            reactions: Vec::new(),
            wakers: Vec::new(),
            locked: false,
        }
    }
}

enum State<T, E> {
    Pending(Waiting<T, E>),
    Settled(Result<T, E>),
}

struct Inner<T, E> {
    id: u64,
    event_loop: WeakLoop,
    state: RefCell<State<T, E>>,
    // Erases the reaction list so `Drop` can hand it to `release`, which
    // only accepts `'static` values.
    detach: fn(Vec<Reaction<T, E>>) -> Box<dyn Any>,
}

impl<T, E> Drop for Inner<T, E> {
    fn drop(&mut self) {
        if let State::Pending(waiting) = self.state.get_mut() {
            if !waiting.reactions.is_empty() {
                release((self.detach)(mem::take(&mut waiting.reactions)));
            }
        }
    }
}

fn erase<T: 'static, E: 'static>(reactions: Vec<Reaction<T, E>>) -> Box<dyn Any> {
    Box::new(reactions)
}

thread_local! {
    static RELEASING: RefCell<Option<Vec<Box<dyn Any>>>> = const { RefCell::new(None) };
}

/// Drop `garbage` without recursing. Reactions own the producers of the
/// values derived from them, so dropping an unsettled chain would
/// otherwise nest one `drop` per link. Drops started while a release is
/// in progress are queued and run by the outermost call.
fn release(garbage: Box<dyn Any>) {
    let claimed = RELEASING.try_with(|releasing| {
        let mut releasing = releasing.borrow_mut();
        match releasing.as_mut() {
            Some(backlog) => {
                backlog.push(garbage);
                None
            }
            None => {
                *releasing = Some(Vec::new());
                Some(garbage)
            }
        }
    });
    // `Err` means thread-local storage is being torn down; the garbage was
    // dropped along with the closure.
    let Ok(Some(garbage)) = claimed else {
        return;
    };
    let mut next = Some(garbage);
    while let Some(garbage) = next {
        drop(garbage);
        next = RELEASING.with(|releasing| {
            let mut releasing = releasing.borrow_mut();
            let next = releasing.as_mut().and_then(Vec::pop);
            if next.is_none() {
                *releasing = None;
            }
            next
        });
    }
}

/// A value that is not known yet.
///
/// Cloning a `Deferred` yields another handle onto the same instance.
///
/// # Examples
///
/// ```
/// use deferred_value::{Deferred, EventLoop};
/// use std::time::Duration;
///
/// let lp = EventLoop::new();
/// let answer = Deferred::<_, String>::new(&lp, |producer| {
///     let late = producer.clone();
///     lp.set_timeout(Duration::from_millis(5), move || late.resolve(42));
///     Ok(())
/// });
/// assert!(answer.is_pending());
/// assert_eq!(lp.block_on(&answer), Ok(Ok(42)));
/// ```
pub struct Deferred<T, E> {
    inner: Rc<Inner<T, E>>,
}

impl<T, E> Clone for Deferred<T, E> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T, E> fmt::Debug for Deferred<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Deferred")
            .field("id", &self.inner.id)
            .field("status", &self.inner.status())
            .finish()
    }
}

/// The settling side of a [`Deferred`].
///
/// All clones share one instance, so at most one call across all of them
/// has any effect.
pub struct Producer<T, E> {
    inner: Rc<Inner<T, E>>,
}

impl<T, E> Clone for Producer<T, E> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T, E> fmt::Debug for Producer<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Producer")
            .field("id", &self.inner.id)
            .field("status", &self.inner.status())
            .finish()
    }
}

impl<T, E> Inner<T, E> {
    fn status(&self) -> Status {
        match &*self.state.borrow() {
            State::Pending(_) => Status::Pending,
            State::Settled(Ok(_)) => Status::Resolved,
            State::Settled(Err(_)) => Status::Rejected,
        }
    }

    /// Claim the right to settle. Only the first caller gets `true`.
    fn lock(&self) -> bool {
        match &mut *self.state.borrow_mut() {
            State::Pending(waiting) if !waiting.locked => {
                waiting.locked = true;
                true
            }
            _ => false,
        }
    }
}

impl<T, E> Inner<T, E>
where
    T: Clone + 'static,
    E: Clone + 'static,
{
    /// Move from pending to settled and hand the outcome to every queued
    /// reaction from one deferred task. No-op once settled.
    fn complete(&self, outcome: Result<T, E>) {
        let waiting = {
            let mut state = self.state.borrow_mut();
            let State::Pending(waiting) = &mut *state else {
                return;
            };
            let waiting = mem::take(waiting);
            *state = State::Settled(outcome.clone());
            waiting
        };
        tracing::trace!(
            id = self.id,
            status = ?self.status(),
            reactions = waiting.reactions.len(),
            "deferred value settled"
        );
        for waker in waiting.wakers {
            waker.wake();
        }
        if !waiting.reactions.is_empty() {
            let dispatch = Dispatch {
                reactions: waiting.reactions.into_iter(),
                outcome,
                event_loop: self.event_loop.clone(),
            };
            self.event_loop.defer(move || dispatch.run());
        }
    }
}

/// Fires queued reactions in registration order. If one of them panics,
/// the rest are put back on the loop as a fresh task so the panic only
/// costs the reaction that raised it.
struct Dispatch<T, E>
where
    T: Clone + 'static,
    E: Clone + 'static,
{
    reactions: vec::IntoIter<Reaction<T, E>>,
    outcome: Result<T, E>,
    event_loop: WeakLoop,
}

impl<T, E> Dispatch<T, E>
where
    T: Clone + 'static,
    E: Clone + 'static,
{
    fn run(mut self) {
        while let Some(reaction) = self.reactions.next() {
            reaction.fire(self.outcome.clone());
        }
    }
}

impl<T, E> Drop for Dispatch<T, E>
where
    T: Clone + 'static,
    E: Clone + 'static,
{
    fn drop(&mut self) {
        if !thread::panicking() || self.reactions.len() == 0 {
            return;
        }
        tracing::debug!(remaining = self.reactions.len(), "reaction panicked, requeueing the rest");
        let rest = Dispatch {
            reactions: self.reactions.by_ref().collect::<Vec<_>>().into_iter(),
            outcome: self.outcome.clone(),
            event_loop: self.event_loop.clone(),
        };
        self.event_loop.defer(move || rest.run());
    }
}

fn adopt<T, E>(target: &Rc<Inner<T, E>>, source: Deferred<T, E>)
where
    T: Clone + 'static,
    E: Clone + 'static,
{
    if Rc::ptr_eq(target, &source.inner) {
        tracing::warn!(id = target.id, "deferred value adopts itself and will never settle");
        return;
    }
    tracing::trace!(id = target.id, source = source.inner.id, "adopting outcome");
    let on_resolved = Rc::clone(target);
    let on_rejected = Rc::clone(target);
    source.subscribe(Reaction {
        on_resolved: Box::new(move |value| on_resolved.complete(Ok(value))),
        on_rejected: Box::new(move |reason| on_rejected.complete(Err(reason))),
    });
}

impl<T, E> Producer<T, E>
where
    T: Clone + 'static,
    E: Clone + 'static,
{
    pub fn resolve(&self, value: T) {
        self.settle(Resolution::Value(value));
    }

    pub fn reject(&self, reason: E) {
        self.settle(Resolution::Reason(reason));
    }

    /// Mirror the eventual outcome of `source`.
    pub fn adopt(&self, source: Deferred<T, E>) {
        self.settle(Resolution::Adopt(source));
    }

    /// Settle with a value, a reason or another deferred value's outcome.
    pub fn settle(&self, resolution: impl Into<Resolution<T, E>>) {
        if !self.inner.lock() {
            tracing::trace!(id = self.inner.id, "settlement ignored, already claimed");
            return;
        }
        match resolution.into() {
            Resolution::Value(value) => self.inner.complete(Ok(value)),
            Resolution::Reason(reason) => self.inner.complete(Err(reason)),
            Resolution::Adopt(source) => adopt(&self.inner, source),
        }
    }

    pub fn is_settled(&self) -> bool {
        self.inner.status() != Status::Pending
    }

    /// The loop this value dispatches on, if it is still alive.
    pub fn event_loop(&self) -> Option<EventLoop> {
        self.inner.event_loop.upgrade()
    }
}

impl<T, E> Deferred<T, E>
where
    T: Clone + 'static,
    E: Clone + 'static,
{
    /// Create a deferred value and run `initializer` on it before
    /// returning. An `Err` from the initializer rejects the value unless a
    /// settlement call already won.
    pub fn new<F>(event_loop: &EventLoop, initializer: F) -> Self
    where
        F: FnOnce(Producer<T, E>) -> Result<(), E>,
    {
        let (producer, deferred) = Self::pending(event_loop);
        if let Err(reason) = initializer(producer.clone()) {
            producer.reject(reason);
        }
        deferred
    }

    /// Create a pending value together with the producer that settles it.
    pub fn pending(event_loop: &EventLoop) -> (Producer<T, E>, Self) {
        Self::pending_on(event_loop.downgrade())
    }

    pub(crate) fn pending_on(event_loop: WeakLoop) -> (Producer<T, E>, Self) {
        let inner = Rc::new(Inner {
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            event_loop,
            state: RefCell::new(State::Pending(Waiting::default())),
            detach: erase::<T, E>,
        });
        (
            Producer {
                inner: Rc::clone(&inner),
            },
            Self { inner },
        )
    }

    pub fn status(&self) -> Status {
        self.inner.status()
    }

    pub fn is_pending(&self) -> bool {
        self.status() == Status::Pending
    }

    /// The stored outcome, if settled.
    pub fn peek(&self) -> Option<Result<T, E>> {
        match &*self.inner.state.borrow() {
            State::Pending(_) => None,
            State::Settled(outcome) => Some(outcome.clone()),
        }
    }

    /// The loop this value dispatches on. Values only hold a weak handle,
    /// so this is `None` once every [`EventLoop`] clone has been dropped.
    pub fn event_loop(&self) -> Option<EventLoop> {
        self.inner.event_loop.upgrade()
    }

    pub(crate) fn weak_loop(&self) -> WeakLoop {
        self.inner.event_loop.clone()
    }

    /// Whether both handles refer to the same instance.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn id(&self) -> u64 {
        self.inner.id
    }

    /// Queue `reaction` if pending, otherwise dispatch it on a later turn.
    /// Never invokes user code inline.
    pub(crate) fn subscribe(&self, reaction: Reaction<T, E>) {
        let outcome = match &mut *self.inner.state.borrow_mut() {
            State::Pending(waiting) => {
                waiting.reactions.push(reaction);
                return;
            }
            State::Settled(outcome) => outcome.clone(),
        };
        tracing::trace!(id = self.inner.id, "dispatching to settled value");
        self.inner.event_loop.defer(move || reaction.fire(outcome));
    }

    /// Return the outcome if settled, otherwise remember `waker` until
    /// settlement.
    pub(crate) fn poll_outcome(&self, waker: &Waker) -> Option<Result<T, E>> {
        match &mut *self.inner.state.borrow_mut() {
            State::Pending(waiting) => {
                if !waiting.wakers.iter().any(|known| known.will_wake(waker)) {
                    waiting.wakers.push(waker.clone());
                }
                None
            }
            State::Settled(outcome) => Some(outcome.clone()),
        }
    }
}
