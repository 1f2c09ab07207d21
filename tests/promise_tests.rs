//! Integration tests for the promise state machine

mod common;
use common::{entries, log, Boom};
use settle::{flush, Promise, Reason, Resolution, Resolve, Reject, Thenable, TypeError};

mod settlement {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_single_assignment_through_deferred() {
        let d = Promise::<i32>::defer();
        d.resolve.call(1);
        d.reject.call(Boom("late"));
        d.resolve.call(2);
        flush().unwrap();
        assert!(d.promise.is_fulfilled());
        assert_eq!(d.promise.value().unwrap(), 1);

        let r = Promise::<i32>::defer();
        let reason = Reason::new(Boom("first"));
        r.reject.call(reason.clone());
        r.resolve.call(5);
        r.reject.call(Boom("second"));
        r.promise.suppress_unhandled_rejections();
        flush().unwrap();
        assert!(r.promise.reason().unwrap().ptr_eq(&reason));
    }

    #[test]
    fn test_constructor_error_rejects() {
        let p: Promise<i32> = Promise::new(|_, _| Err(Reason::new(Boom("ctor"))));
        assert!(p.reason().unwrap().is::<Boom>());
        p.suppress_unhandled_rejections();
    }

    #[test]
    fn test_self_resolution_is_type_error_not_hang() {
        let d = Promise::<i32>::defer();
        let q: Promise<i32> = d.promise.catch(|r| {
            assert!(r.is::<TypeError>());
            Ok(-1)
        });
        d.resolve.call(d.promise.clone());
        flush().unwrap();
        assert_eq!(q.value().unwrap(), -1);
    }

    #[test]
    fn test_state_queries() {
        let d = Promise::<i32>::defer();
        assert!(d.promise.is_pending());
        assert!(!d.promise.is_fulfilled());
        assert!(!d.promise.is_rejected());
        assert!(d.promise.to_string().ends_with(": pending]"));
        d.reject.call(Boom("x"));
        assert!(d.promise.is_rejected());
        assert!(d.promise.value().is_err());
        d.promise.suppress_unhandled_rejections();
    }
}

mod ordering {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_fifo_breadth_first_waves() {
        let order = log();
        let d = Promise::<()>::defer();

        let (one, three) = (order.clone(), order.clone());
        let first: Promise<()> = d.promise.then(move |_| {
            one.borrow_mut().push(1);
            Ok(())
        });
        first.done_then(move |_| {
            three.borrow_mut().push(3);
            Ok(())
        });

        let (two, four) = (order.clone(), order.clone());
        let second: Promise<()> = d.promise.then(move |_| {
            two.borrow_mut().push(2);
            Ok(())
        });
        second.done_then(move |_| {
            four.borrow_mut().push(4);
            Ok(())
        });

        d.resolve.call(());
        assert!(entries(&order).is_empty());
        flush().unwrap();
        assert_eq!(entries(&order), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_handler_attached_after_settlement_runs_after_earlier_ones() {
        let order = log();
        let p: Promise<i32> = Promise::resolve(1);
        let early = order.clone();
        p.done_then(move |v| {
            early.borrow_mut().push(("early", v));
            Ok(())
        });
        flush().unwrap();
        let late = order.clone();
        p.done_then(move |v| {
            late.borrow_mut().push(("late", v));
            Ok(())
        });
        assert_eq!(entries(&order).len(), 1);
        flush().unwrap();
        assert_eq!(entries(&order), vec![("early", 1), ("late", 1)]);
    }

    #[test]
    fn test_deep_chain_does_not_grow_stack() {
        let root = Promise::<u64>::defer();
        let mut tail = root.promise.clone();
        for _ in 0..100_000 {
            tail = tail.then(|v: u64| Ok(v + 1));
        }
        root.resolve.call(0);
        flush().unwrap();
        assert_eq!(tail.value().unwrap(), 100_000);
    }

    #[test]
    fn test_deep_recursive_adoption() {
        fn count_down(n: u32) -> Promise<u32> {
            if n == 0 {
                return Promise::resolve(0);
            }
            Promise::resolve(n).then(|n: u32| Ok(count_down(n - 1)))
        }
        let p = count_down(10_000);
        flush().unwrap();
        assert_eq!(p.value().unwrap(), 0);
    }

    #[test]
    fn test_dropping_unsettled_deep_chain() {
        let root = Promise::<u64>::defer();
        let mut tail = root.promise.clone();
        for _ in 0..100_000 {
            tail = tail.then(|v: u64| Ok(v + 1));
        }
        flush().unwrap();
        assert!(tail.is_pending());
        drop(tail);
        drop(root);
    }

    #[test]
    fn test_dropping_unsettled_adoption_chain() {
        fn nest(n: u32, bottom: Promise<u32>) -> Promise<u32> {
            if n == 0 {
                return bottom;
            }
            Promise::<()>::resolve(()).then(move |_: ()| Ok(nest(n - 1, bottom)))
        }
        let never = Promise::<u32>::defer();
        let top = nest(50_000, never.promise.clone());
        flush().unwrap();
        assert!(top.is_pending());
        drop(top);
        drop(never);
    }
}

mod chaining {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_then_returning_promise_is_adopted() {
        let inner = Promise::<String>::defer();
        let waiting = inner.promise.clone();
        let p: Promise<String> = Promise::resolve(1).then(move |_: i32| Ok(waiting));
        flush().unwrap();
        assert!(p.is_pending());
        inner.resolve.call("adopted".to_string());
        flush().unwrap();
        assert_eq!(p.value().unwrap(), "adopted");
    }

    #[test]
    fn test_error_in_callback_rejects_result() {
        let p: Promise<i32> = Promise::resolve(1).then(|_: i32| Err::<i32, _>(Reason::new(Boom("cb"))));
        let recovered = p.catch(|r| {
            assert_eq!(r.to_string(), "boom: cb");
            Ok(0)
        });
        flush().unwrap();
        assert!(p.is_rejected());
        assert_eq!(recovered.value().unwrap(), 0);
    }

    #[test]
    fn test_then_with_routes_by_outcome() {
        let ok: Promise<&str> =
            Promise::resolve(1).then_with(|_: i32| Ok("fulfilled"), |_| Ok("rejected"));
        let failed: Promise<i32> = Promise::reject(Boom("x"));
        let err: Promise<&str> = failed.then_with(|_| Ok("fulfilled"), |_| Ok("rejected"));
        flush().unwrap();
        assert_eq!(ok.value().unwrap(), "fulfilled");
        assert_eq!(err.value().unwrap(), "rejected");
    }

    #[test]
    fn test_catch_if_matches_error_types() {
        use settle::{Matcher, Predicate};

        let p: Promise<i32> = Promise::reject(Boom("typed"));
        let unmatched = p.catch_if(Predicate::class::<TypeError>(), |_| Ok(1));
        let listed = unmatched.catch_if(
            Predicate::classes([Matcher::of::<TypeError>(), Matcher::of::<Boom>()]),
            |_| Ok(2),
        );
        let by_fn = Promise::<i32>::reject(Boom("fn"))
            .catch_if(Predicate::when(|r| r.to_string().ends_with("fn")), |_| Ok(3));
        flush().unwrap();
        assert!(unmatched.reason().unwrap().ptr_eq(&p.reason().unwrap()));
        assert_eq!(listed.value().unwrap(), 2);
        assert_eq!(by_fn.value().unwrap(), 3);
    }

    #[test]
    fn test_finally_runs_for_both_outcomes() {
        let ran = log();
        let (a, b) = (ran.clone(), ran.clone());
        let ok = Promise::resolve(1).finally(move |p: &Promise<i32>| {
            a.borrow_mut().push(p.is_fulfilled());
            Ok(())
        });
        let failed: Promise<i32> = Promise::reject(Boom("f"));
        let err = failed.finally(move |p| {
            b.borrow_mut().push(p.is_fulfilled());
            Ok(())
        });
        err.suppress_unhandled_rejections();
        flush().unwrap();
        assert_eq!(entries(&ran), vec![true, false]);
        assert_eq!(ok.value().unwrap(), 1);
        assert!(err.reason().unwrap().ptr_eq(&failed.reason().unwrap()));
    }

    #[test]
    fn test_returns_accepts_promise() {
        let other: Promise<&str> = Promise::resolve("other");
        let p: Promise<&str> = Promise::<i32>::resolve(1).returns(other);
        flush().unwrap();
        assert_eq!(p.value().unwrap(), "other");
    }
}

mod thenables {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::cell::RefCell;
    use std::rc::Rc;

    /// A thenable that settles later, when told to
    struct Later {
        pending: Rc<RefCell<Option<Resolve<i32>>>>,
    }

    impl Thenable<i32> for Later {
        fn then(&self, resolve: Resolve<i32>, _reject: Reject<i32>) -> Result<(), Reason> {
            *self.pending.borrow_mut() = Some(resolve);
            Ok(())
        }
    }

    #[test]
    fn test_asynchronous_thenable() {
        let pending = Rc::new(RefCell::new(None));
        let thenable = Later {
            pending: pending.clone(),
        };
        let p: Promise<i32> = Promise::resolve(Resolution::thenable(thenable));
        assert!(p.is_pending());
        let resolve = pending.borrow_mut().take().unwrap();
        resolve.call(11);
        resolve.call(12);
        assert_eq!(p.value().unwrap(), 11);
    }
}
