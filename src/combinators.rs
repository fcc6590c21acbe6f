//! Fan-in over many inputs. Each input, plain or deferred, is first passed
//! through [`Deferred::resolve_with`] so plain values count as already
//! resolved. Losing inputs are never cancelled; their late settlements
//! simply find the aggregate already settled.
use crate::{deferred::Reaction, Deferred, EventLoop, Resolution};
use std::{
    cell::{Cell, RefCell},
    rc::Rc,
};

impl<T, E> Deferred<T, E>
where
    T: Clone + 'static,
    E: Clone + 'static,
{
    /// Resolve with every input's value, in input order, once all of them
    /// have resolved; reject with the first rejection observed.
    ///
    /// ```
    /// use deferred_value::{Deferred, EventLoop, Resolution};
    /// use std::time::Duration;
    ///
    /// let lp = EventLoop::new();
    /// let all = Deferred::all(
    ///     &lp,
    ///     vec![
    ///         Resolution::Value(1),
    ///         Deferred::<_, String>::resolve(&lp, 2).into(),
    ///         Deferred::resolve_delay(&lp, 3, Duration::from_millis(10)).into(),
    ///     ],
    /// );
    /// assert_eq!(lp.block_on(&all), Ok(Ok(vec![1, 2, 3])));
    /// ```
    pub fn all<I, R>(event_loop: &EventLoop, inputs: I) -> Deferred<Vec<T>, E>
    where
        I: IntoIterator<Item = R>,
        R: Into<Resolution<T, E>>,
    {
        let inputs: Vec<Self> = inputs
            .into_iter()
            .map(|input| Self::resolve_with(event_loop, input))
            .collect();
        let (producer, aggregate) = Deferred::pending(event_loop);
        let total = inputs.len();
        if total == 0 {
            producer.resolve(Vec::new());
            return aggregate;
        }

        let slots = Rc::new(RefCell::new(vec![None; total]));
        let resolved = Rc::new(Cell::new(0usize));
        for (index, input) in inputs.into_iter().enumerate() {
            let slots = Rc::clone(&slots);
            let resolved = Rc::clone(&resolved);
            let on_success = producer.clone();
            let on_failure = producer.clone();
            input.subscribe(Reaction {
                on_resolved: Box::new(move |value| {
                    slots.borrow_mut()[index] = Some(value);
                    resolved.set(resolved.get() + 1);
                    if resolved.get() == total {
                        let values = slots.borrow_mut().drain(..).flatten().collect();
                        on_success.resolve(values);
                    }
                }),
                on_rejected: Box::new(move |reason| on_failure.reject(reason)),
            });
        }
        aggregate
    }

    /// Mirror whichever input settles first, success or failure. An empty
    /// input never settles.
    pub fn race<I, R>(event_loop: &EventLoop, inputs: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Into<Resolution<T, E>>,
    {
        let (producer, winner) = Self::pending(event_loop);
        for input in inputs {
            let on_success = producer.clone();
            let on_failure = producer.clone();
            Self::resolve_with(event_loop, input).subscribe(Reaction {
                on_resolved: Box::new(move |value| on_success.resolve(value)),
                on_rejected: Box::new(move |reason| on_failure.reject(reason)),
            });
        }
        winner
    }
}
