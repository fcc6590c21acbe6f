//! Chaining continuations onto a [`Deferred`].
//!
//! Every chaining call returns a new, distinct deferred value whose
//! outcome is derived from whatever the invoked callback returns:
//!
//! - `Ok(value)` resolves it with `value`,
//! - `Err(reason)` rejects it with `reason`,
//! - another `Deferred` makes it adopt that value's eventual outcome.
//!
//! Callbacks always run on a later turn of the [`EventLoop`](crate::EventLoop),
//! even when the source has already settled.
use crate::deferred::{Deferred, Reaction};

/// What a settlement call or a continuation settles with.
pub enum Resolution<T, E> {
    Value(T),
    Reason(E),
    /// Mirror another deferred value's eventual outcome.
    Adopt(Deferred<T, E>),
}

impl<T, E> From<Result<T, E>> for Resolution<T, E> {
    fn from(result: Result<T, E>) -> Self {
        match result {
            Ok(value) => Resolution::Value(value),
            Err(reason) => Resolution::Reason(reason),
        }
    }
}

impl<T, E> From<Deferred<T, E>> for Resolution<T, E> {
    fn from(deferred: Deferred<T, E>) -> Self {
        Resolution::Adopt(deferred)
    }
}

impl<T, E> std::fmt::Debug for Resolution<T, E>
where
    T: std::fmt::Debug,
    E: std::fmt::Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Resolution::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Resolution::Reason(reason) => f.debug_tuple("Reason").field(reason).finish(),
            Resolution::Adopt(deferred) => f.debug_tuple("Adopt").field(deferred).finish(),
        }
    }
}

impl<T, E> Deferred<T, E>
where
    T: Clone + 'static,
    E: Clone + 'static,
{
    /// Register both continuations. Exactly one of them runs, on a later
    /// turn, once this value settles.
    ///
    /// A panicking continuation unwinds out of [`EventLoop::turn`](crate::EventLoop::turn).
    /// Continuations registered after it on the same value are not lost:
    /// they are queued again and run on the next turn. The value derived
    /// from the panicking continuation stays pending.
    ///
    /// # Examples
    ///
    /// ```
    /// use deferred_value::{Deferred, EventLoop};
    ///
    /// let lp = EventLoop::new();
    /// let parsed = Deferred::<&str, String>::resolve(&lp, "12").then(
    ///     |text| text.parse::<i32>().map_err(|e| e.to_string()),
    ///     |reason| Err(reason),
    /// );
    /// assert_eq!(lp.block_on(&parsed), Ok(Ok(12)));
    /// ```
    pub fn then<U, F, G, R, S>(&self, on_resolved: F, on_rejected: G) -> Deferred<U, E>
    where
        U: Clone + 'static,
        F: FnOnce(T) -> R + 'static,
        G: FnOnce(E) -> S + 'static,
        R: Into<Resolution<U, E>>,
        S: Into<Resolution<U, E>>,
    {
        let (producer, derived) = Deferred::pending_on(self.weak_loop());
        let on_failure = producer.clone();
        self.subscribe(Reaction {
            on_resolved: Box::new(move |value| producer.settle(on_resolved(value))),
            on_rejected: Box::new(move |reason| on_failure.settle(on_rejected(reason))),
        });
        derived
    }

    /// Continue on success only; a rejection passes through unchanged.
    pub fn and_then<U, F, R>(&self, on_resolved: F) -> Deferred<U, E>
    where
        U: Clone + 'static,
        F: FnOnce(T) -> R + 'static,
        R: Into<Resolution<U, E>>,
    {
        self.then(on_resolved, Err::<U, E>)
    }

    /// Continue on failure only; a success value passes through unchanged.
    pub fn catch<G, S>(&self, on_rejected: G) -> Deferred<T, E>
    where
        G: FnOnce(E) -> S + 'static,
        S: Into<Resolution<T, E>>,
    {
        self.then(Ok::<T, E>, on_rejected)
    }
}
