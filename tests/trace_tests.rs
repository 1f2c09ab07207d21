//! Integration tests for long traces and the transition tracer

mod common;
use common::{entries, log, Boom};
use settle::{
    config, flush, set_long_traces, set_trace_limit, set_tracer, Promise, PromiseId, Reason,
};
use std::rc::Rc;

fn site(line: u32) -> String {
    format!("{}:{}:", file!(), line)
}

mod long_traces {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_multi_hop_trace_names_every_hop() {
        set_long_traces(true);
        let (root, l0) = (Promise::<i32>::resolve(1), line!());
        let (hop1, l1) = (root.then(|v: i32| Ok(v + 1)), line!());
        let (hop2, l2) = (hop1.then(|v: i32| Ok(v + 1)), line!());
        let (failed, l3) = (hop2.then(|_: i32| Err::<i32, _>(Reason::new(Boom("deep")))), line!());
        let stacks = log();
        let sink = stacks.clone();
        failed.done_catch(move |reason| {
            sink.borrow_mut().push(reason.stack());
            Ok(())
        });
        flush().unwrap();

        let stack = entries(&stacks).pop().unwrap();
        assert!(stack.starts_with("boom: deep\n  from Promise at:\n"));
        for line in [l0, l1, l2, l3] {
            assert!(stack.contains(&site(line)), "missing hop at line {}: {}", line, stack);
        }
        config::reset();
    }

    #[test]
    fn test_trace_limit_truncates_history() {
        set_long_traces(true);
        set_trace_limit(3);
        let mut tail = Promise::<u32>::resolve(0);
        for _ in 0..20 {
            tail = tail.then(|v: u32| Ok(v + 1));
        }
        let failed: Promise<u32> = tail.then(|_: u32| Err::<u32, _>(Reason::new(Boom("x"))));
        failed.suppress_unhandled_rejections();
        flush().unwrap();

        let reason = failed.reason().unwrap();
        let trace = reason.trace().expect("traced reason");
        assert_eq!(trace.sources().len(), 3);
        assert_eq!(reason.stack().matches("from previous:").count(), 3);
        config::reset();
    }

    #[test]
    fn test_trace_limit_truncates_recursive_history() {
        fn count_down(n: u32) -> Promise<u32> {
            if n == 0 {
                return Promise::reject(Boom("bottom"));
            }
            Promise::resolve(n).then(|n: u32| Ok(count_down(n - 1)))
        }
        set_long_traces(true);
        set_trace_limit(3);
        let top = count_down(50);
        top.suppress_unhandled_rejections();
        flush().unwrap();

        let reason = top.reason().unwrap();
        let trace = reason.trace().expect("traced reason");
        assert_eq!(trace.sources().len(), 3);
        assert_eq!(reason.stack().matches("from previous:").count(), 3);
        config::reset();
    }

    #[test]
    fn test_promises_created_in_callbacks_link_to_parent() {
        set_long_traces(true);
        let (outer, l_outer) = (Promise::<i32>::resolve(1), line!());
        let inner_trace = log();
        let sink = inner_trace.clone();
        outer.done_then(move |_| {
            let created: Promise<i32> = Promise::resolve(2);
            sink.borrow_mut().push(created.inspect());
            Ok(())
        });
        flush().unwrap();
        let text = entries(&inner_trace).pop().unwrap();
        assert!(text.contains("from previous:"));
        assert!(text.contains(&site(l_outer)));
        config::reset();
    }

    #[test]
    fn test_mode_is_fixed_at_creation() {
        set_long_traces(true);
        let traced = Promise::<i32>::defer();
        set_long_traces(false);
        let untraced = Promise::<i32>::defer();
        assert!(traced.promise.trace().is_some());
        assert!(untraced.promise.trace().is_none());

        traced.reject.call(Boom("t"));
        untraced.reject.call(Boom("u"));
        traced.promise.suppress_unhandled_rejections();
        untraced.promise.suppress_unhandled_rejections();
        assert!(traced.promise.reason().unwrap().trace().is_some());
        assert_eq!(untraced.promise.reason().unwrap().stack(), "boom: u");
        config::reset();
    }

    #[test]
    fn test_first_traced_rejection_keeps_its_trace() {
        set_long_traces(true);
        let reason = Reason::new(Boom("shared"));
        let (first, line) = (Promise::<i32>::reject(reason.clone()), line!());
        let second = Promise::<i32>::reject(reason.clone());
        first.suppress_unhandled_rejections();
        second.suppress_unhandled_rejections();
        let trace = reason.trace().unwrap();
        assert_eq!(trace.stack().location().line(), line);
        config::reset();
    }
}

mod tracer {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_tracer_sees_transitions() {
        let seen = log();
        let sink = seen.clone();
        set_tracer(Some(Rc::new(move |_: PromiseId, msg: &str| sink.borrow_mut().push(msg.to_string()))));
        let p: Promise<i32> = Promise::<i32>::resolve(1).then(|v: i32| Ok(v));
        flush().unwrap();
        set_tracer(None);
        let _ = p;

        let seen = entries(&seen);
        for event in ["new", "resolve", "fulfill", "then", "unwrap"] {
            assert!(seen.iter().any(|m| m == event), "no {} in {:?}", event, seen);
        }
        config::reset();
    }

    #[test]
    fn test_tracer_removed() {
        let seen = log();
        let sink = seen.clone();
        set_tracer(Some(Rc::new(move |id: PromiseId, _: &str| sink.borrow_mut().push(id))));
        set_tracer(None);
        let _p = Promise::<i32>::defer();
        assert!(entries(&seen).is_empty());
    }
}
