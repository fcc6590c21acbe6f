use crate::Deferred;
use std::{
    future::{Future, IntoFuture},
    pin::Pin,
    task::{Context, Poll},
};

/// Future returned by [`Deferred::wait`]. Any number of them may wait on
/// the same value; each receives its own copy of the outcome.
///
/// Waiting does not drive the [`EventLoop`](crate::EventLoop). Something
/// else has to turn it for a pending value to settle.
///
/// # Examples
///
/// ```
/// use deferred_value::{Deferred, EventLoop};
/// use futures::executor::block_on;
///
/// let lp = EventLoop::new();
/// let value = Deferred::<i32, ()>::resolve(&lp, 1).and_then(|v| Ok(v + 1));
/// lp.run().unwrap();
/// assert_eq!(block_on(value.wait()), Ok(2));
/// ```
#[derive(Debug)]
pub struct Wait<T, E> {
    deferred: Deferred<T, E>,
}

impl<T, E> Future for Wait<T, E>
where
    T: Clone + 'static,
    E: Clone + 'static,
{
    type Output = Result<T, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match self.deferred.poll_outcome(cx.waker()) {
            Some(outcome) => Poll::Ready(outcome),
            None => Poll::Pending,
        }
    }
}

impl<T, E> Deferred<T, E>
where
    T: Clone + 'static,
    E: Clone + 'static,
{
    pub fn wait(&self) -> Wait<T, E> {
        Wait {
            deferred: self.clone(),
        }
    }
}

impl<T, E> IntoFuture for Deferred<T, E>
where
    T: Clone + 'static,
    E: Clone + 'static,
{
    type Output = Result<T, E>;
    type IntoFuture = Wait<T, E>;

    fn into_future(self) -> Self::IntoFuture {
        Wait { deferred: self }
    }
}
