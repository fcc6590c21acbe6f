use crate::{Deferred, EventLoop, Resolution};
use std::time::Duration;

impl<T, E> Deferred<T, E>
where
    T: Clone + 'static,
    E: Clone + 'static,
{
    /// An already resolved value.
    pub fn resolve(event_loop: &EventLoop, value: T) -> Self {
        Self::resolve_with(event_loop, Resolution::Value(value))
    }

    /// Settle with `resolution`, adopting it when it is a deferred value.
    ///
    /// ```
    /// use deferred_value::{Deferred, EventLoop};
    ///
    /// let lp = EventLoop::new();
    /// let source = Deferred::<i32, ()>::resolve(&lp, 3);
    /// let mirror = Deferred::resolve_with(&lp, source);
    /// assert!(mirror.is_pending());
    /// assert_eq!(lp.block_on(&mirror), Ok(Ok(3)));
    /// ```
    pub fn resolve_with(event_loop: &EventLoop, resolution: impl Into<Resolution<T, E>>) -> Self {
        let (producer, deferred) = Self::pending(event_loop);
        producer.settle(resolution);
        deferred
    }

    /// An already rejected value. The reason is stored as-is, even when it
    /// is itself a deferred value.
    pub fn reject(event_loop: &EventLoop, reason: E) -> Self {
        let (producer, deferred) = Self::pending(event_loop);
        producer.reject(reason);
        deferred
    }

    pub fn resolve_delay(event_loop: &EventLoop, value: T, delay: Duration) -> Self {
        Self::resolve_delay_with(event_loop, Resolution::Value(value), delay)
    }

    /// Like [`Deferred::resolve_with`], but settles only once `delay` has
    /// elapsed on the loop's clock.
    pub fn resolve_delay_with(
        event_loop: &EventLoop,
        resolution: impl Into<Resolution<T, E>>,
        delay: Duration,
    ) -> Self {
        let resolution = resolution.into();
        let (producer, deferred) = Self::pending(event_loop);
        event_loop.set_timeout(delay, move || producer.settle(resolution));
        deferred
    }

    pub fn reject_delay(event_loop: &EventLoop, reason: E, delay: Duration) -> Self {
        let (producer, deferred) = Self::pending(event_loop);
        event_loop.set_timeout(delay, move || producer.reject(reason));
        deferred
    }
}

#[cfg(test)]
mod tests {
    use crate::{Clock, Deferred, EventLoop, LoopConfig, Status};
    use std::{cell::RefCell, rc::Rc, time::Duration};

    fn virtual_loop() -> EventLoop {
        EventLoop::with_config(LoopConfig::default().with_clock(Clock::Virtual))
    }

    #[test]
    fn resolve_and_reject_settle_immediately() {
        let lp = EventLoop::new();
        let ok = Deferred::<i32, String>::resolve(&lp, 1);
        let err = Deferred::<i32, String>::reject(&lp, "no".into());
        assert_eq!(ok.status(), Status::Resolved);
        assert_eq!(err.peek(), Some(Err("no".into())));
        assert!(lp.is_idle());
    }

    #[test]
    fn resolve_with_adopts_a_rejection() {
        let lp = EventLoop::new();
        let failed = Deferred::<i32, String>::reject(&lp, "inner".into());
        let mirror = Deferred::resolve_with(&lp, failed);
        assert_eq!(lp.block_on(&mirror), Ok(Err("inner".into())));
    }

    #[test]
    fn reject_does_not_flatten_a_deferred_reason() {
        let lp = EventLoop::new();
        let reason = Deferred::<i32, ()>::resolve(&lp, 1);
        let rejected = Deferred::<i32, Deferred<i32, ()>>::reject(&lp, reason.clone());
        let stored = match rejected.peek() {
            Some(Err(stored)) => stored,
            other => panic!("expected a rejection, got {other:?}"),
        };
        assert!(stored.ptr_eq(&reason));
    }

    #[test]
    fn resolve_delay_waits_for_its_deadline() {
        let lp = virtual_loop();
        let settled_at = Rc::new(RefCell::new(Vec::new()));
        let value = Deferred::<&str, ()>::resolve_delay(&lp, "done", Duration::from_millis(40));
        let clock = lp.clone();
        let log = settled_at.clone();
        value.and_then(move |v| {
            log.borrow_mut().push((v, clock.now()));
            Ok(())
        });
        assert!(value.is_pending());
        assert_eq!(lp.now(), Duration::ZERO);
        lp.run().unwrap();
        assert_eq!(*settled_at.borrow(), vec![("done", Duration::from_millis(40))]);
    }

    #[test]
    fn resolve_delay_with_adopts_after_the_delay() {
        let lp = virtual_loop();
        let (producer, source) = Deferred::<i32, String>::pending(&lp);
        let delayed = Deferred::resolve_delay_with(&lp, source, Duration::from_millis(5));
        producer.resolve(11);
        lp.turn().unwrap();
        assert_eq!(lp.now(), Duration::from_millis(5));
        assert_eq!(lp.block_on(&delayed), Ok(Ok(11)));
    }

    #[test]
    fn reject_delay_settles_once_on_a_real_clock() {
        let lp = EventLoop::new();
        let hits = Rc::new(RefCell::new(0));
        let failed = Deferred::<(), &str>::reject_delay(&lp, "late", Duration::from_millis(10));
        let counter = hits.clone();
        let clock = lp.clone();
        let observed = failed.then(
            |()| Err("resolved unexpectedly"),
            move |reason| {
                *counter.borrow_mut() += 1;
                Ok((reason, clock.now()))
            },
        );
        assert!(failed.is_pending());
        let (reason, at) = lp.block_on(&observed).unwrap().unwrap();
        lp.run().unwrap();
        assert_eq!(reason, "late");
        assert!(at >= Duration::from_millis(10));
        assert_eq!(*hits.borrow(), 1);
    }
}
