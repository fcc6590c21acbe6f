#[cfg(test)]
mod tests {
    use deferred_value::{Clock, Deferred, Error, EventLoop, LoopConfig, Resolution, Status};
    use std::{cell::RefCell, rc::Rc, time::Duration};

    fn virtual_loop() -> EventLoop {
        EventLoop::with_config(LoopConfig::default().with_clock(Clock::Virtual))
    }

    #[test]
    fn settles_only_once() {
        let lp = EventLoop::new();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let (producer, deferred) = Deferred::<i32, String>::pending(&lp);
        let log = seen.clone();
        deferred.then(
            move |v| {
                log.borrow_mut().push(Ok(v));
                Ok(())
            },
            {
                let log = seen.clone();
                move |r| {
                    log.borrow_mut().push(Err(r));
                    Ok(())
                }
            },
        );
        producer.resolve(1);
        producer.resolve(2);
        producer.reject("nope".into());
        lp.run().unwrap();
        assert_eq!(deferred.status(), Status::Resolved);
        assert_eq!(*seen.borrow(), vec![Ok(1)]);
    }

    #[test]
    fn then_is_always_asynchronous() {
        let lp = EventLoop::new();
        let order = Rc::new(RefCell::new(Vec::new()));
        let log = order.clone();
        Deferred::<(), ()>::resolve(&lp, ()).and_then(move |_| {
            log.borrow_mut().push("callback");
            Ok(())
        });
        order.borrow_mut().push("next statement");
        lp.run().unwrap();
        assert_eq!(*order.borrow(), vec!["next statement", "callback"]);
    }

    #[test]
    fn failure_is_transparent_through_success_handlers() {
        let lp = EventLoop::new();
        let result = Deferred::<i32, i32>::reject(&lp, 5)
            .and_then(|v| Ok(v + 1))
            .catch(|r| Ok(r));
        assert_eq!(lp.block_on(&result), Ok(Ok(5)));
    }

    #[test]
    fn long_chains_do_not_grow_the_stack() {
        let lp = EventLoop::new();
        let mut chain = Deferred::<u64, ()>::resolve(&lp, 0);
        for _ in 0..10_000 {
            chain = chain.and_then(|v| Ok(v + 1));
        }
        assert_eq!(lp.block_on(&chain), Ok(Ok(10_000)));
    }

    #[test]
    fn dropping_a_long_unsettled_chain_does_not_overflow() {
        let lp = EventLoop::new();
        let (producer, source) = Deferred::<u64, ()>::pending(&lp);
        let mut chain = source.and_then(|v| Ok(v + 1));
        for _ in 0..100_000 {
            chain = chain.and_then(|v| Ok(v + 1));
        }
        drop(chain);
        drop(producer);
        drop(source);
        assert!(lp.is_idle());
    }

    #[test]
    fn timers_never_reached_leave_values_pending() {
        let lp = virtual_loop();
        let never = Deferred::<i32, ()>::resolve_delay(&lp, 1, Duration::MAX);
        let also_never = Deferred::<i32, ()>::reject_delay(&lp, (), Duration::MAX);
        assert!(lp.is_idle());
        assert_eq!(lp.block_on(&never), Err(Error::Stalled));
        assert!(also_never.is_pending());
    }

    #[test]
    fn all_resolves_in_input_order() {
        let lp = virtual_loop();
        let all = Deferred::all(
            &lp,
            vec![
                Resolution::Value(1),
                Deferred::<_, String>::resolve(&lp, 2).into(),
                Deferred::resolve_delay(&lp, 3, Duration::from_millis(10)).into(),
            ],
        );
        assert_eq!(lp.block_on(&all), Ok(Ok(vec![1, 2, 3])));
    }

    #[test]
    fn all_fails_fast() {
        let lp = virtual_loop();
        let all = Deferred::<i32, &str>::all(
            &lp,
            vec![
                Deferred::resolve_delay(&lp, 1, Duration::from_millis(50)),
                Deferred::reject(&lp, "x"),
            ],
        );
        assert_eq!(lp.block_on(&all), Ok(Err("x")));
        assert_eq!(lp.now(), Duration::ZERO);
    }

    #[test]
    fn race_picks_the_fastest_on_a_real_clock() {
        let lp = EventLoop::new();
        let winner = Deferred::<&str, ()>::race(
            &lp,
            vec![
                Deferred::resolve_delay(&lp, "slow", Duration::from_millis(100)),
                Deferred::resolve_delay(&lp, "fast", Duration::from_millis(10)),
            ],
        );
        assert_eq!(lp.block_on(&winner), Ok(Ok("fast")));
        assert!(lp.now() >= Duration::from_millis(10));
    }

    #[test]
    fn producer_settles_from_a_timer() {
        let lp = virtual_loop();
        let deferred = Deferred::<String, String>::new(&lp, |producer| {
            lp.set_timeout(Duration::from_millis(1000), move || producer.resolve("🍓".into()));
            Ok(())
        });
        let reply = deferred.and_then(|fruit| Ok(format!("got {fruit}")));
        assert_eq!(lp.block_on(&reply), Ok(Ok("got 🍓".to_string())));
        assert_eq!(lp.now(), Duration::from_millis(1000));
    }
}
