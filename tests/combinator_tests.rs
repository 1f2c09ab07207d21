//! Integration tests for all, race, defer and the delay helpers

mod common;
use common::{entries, log, record_rejections, Boom, Event};
use settle::{config, event_loop, flush, Promise, Reason};

mod all {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_all_empty_is_already_fulfilled() {
        let p = Promise::<String>::all(Vec::new());
        assert!(p.is_fulfilled());
        assert_eq!(p.value().unwrap(), Vec::<String>::new());
    }

    #[test]
    fn test_all_collects_values_in_input_order() {
        let ds: Vec<_> = (0..4).map(|_| Promise::<usize>::defer()).collect();
        let p = Promise::all(ds.iter().map(|d| d.promise.clone()));
        for (i, d) in ds.iter().enumerate().rev() {
            d.resolve.call(i * 10);
        }
        flush().unwrap();
        assert_eq!(p.value().unwrap(), vec![0, 10, 20, 30]);
    }

    #[test]
    fn test_all_rejects_with_first_reason() {
        let events = record_rejections();
        let first = Promise::<i32>::defer();
        let second = Promise::<i32>::defer();
        let p = Promise::all([first.promise.clone(), second.promise.clone()]);
        let caught = p.catch(|_| Ok(Vec::new()));

        let reason = Reason::new(Boom("first"));
        first.reject.call(reason.clone());
        flush().unwrap();
        assert!(p.reason().unwrap().ptr_eq(&reason));

        second.resolve.call(2);
        flush().unwrap();
        assert!(p.reason().unwrap().ptr_eq(&reason));
        assert!(caught.is_fulfilled());
        assert!(entries(&events).is_empty());
        config::reset();
    }

    #[test]
    fn test_all_observes_late_rejections() {
        let events = record_rejections();
        let first = Promise::<i32>::defer();
        let second = Promise::<i32>::defer();
        let p = Promise::all([first.promise.clone(), second.promise.clone()]);
        p.suppress_unhandled_rejections();

        first.reject.call(Boom("first"));
        flush().unwrap();
        second.reject.call(Boom("second"));
        flush().unwrap();
        assert!(entries(&events).is_empty());
        config::reset();
    }
}

mod race {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_race_empty_never_settles() {
        let p = Promise::<i32>::race(Vec::new());
        flush().unwrap();
        event_loop::run().unwrap();
        assert!(p.is_pending());
    }

    #[test]
    fn test_race_follows_schedule_order() {
        let slow = Promise::delayed("slow", 50);
        let fast = Promise::delayed("fast", 5);
        let p = Promise::race([slow, fast]);
        event_loop::run().unwrap();
        assert_eq!(p.value().unwrap(), "fast");
    }

    #[test]
    fn test_race_rejection_can_win() {
        let slow = Promise::delayed(1, 50);
        let failing: Promise<i32> = Promise::delayed(2, 5).throws(Boom("fast failure"));
        let p = Promise::race([slow, failing]);
        let outcome = log();
        let sink = outcome.clone();
        p.done_catch(move |reason| {
            sink.borrow_mut().push(reason.to_string());
            Ok(())
        });
        event_loop::run().unwrap();
        assert_eq!(entries(&outcome), vec!["boom: fast failure".to_string()]);
    }
}

mod delay {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_instance_delay_waits_virtual_time() {
        let start = event_loop::now();
        let p = Promise::<i32>::resolve(3).delay(100);
        event_loop::run_for(99).unwrap();
        assert!(p.is_pending());
        event_loop::run().unwrap();
        assert_eq!(p.value().unwrap(), 3);
        assert!(event_loop::now() >= start + 100);
    }

    #[test]
    fn test_delayed_rejection_is_immediate() {
        let events = record_rejections();
        let p: Promise<i32> = Promise::reject(Boom("now"));
        let delayed = p.delay(1_000);
        flush().unwrap();
        assert!(delayed.is_rejected());
        assert_eq!(
            entries(&events),
            vec![Event::PossiblyUnhandled(delayed.id(), "boom: now".into())]
        );
        config::reset();
    }
}

mod defer {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defer_handles_settle_promise() {
        let d = Promise::<Vec<u8>>::defer();
        let len: Promise<usize> = d.promise.then(|bytes: Vec<u8>| Ok(bytes.len()));
        d.resolve.call(vec![1, 2, 3]);
        flush().unwrap();
        assert_eq!(len.value().unwrap(), 3);
    }
}
