//! Shared test helpers for integration tests

use settle::config::{self, Hook, RejectionHandler, UnhandledRejectionHandler};
use settle::{PromiseId, Reason};
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// Ordered record of what callbacks ran
pub type Log<T> = Rc<RefCell<Vec<T>>>;

pub fn log<T>() -> Log<T> {
    Rc::new(RefCell::new(Vec::new()))
}

/// Snapshot of a log
#[allow(dead_code)]
pub fn entries<T: Clone>(log: &Log<T>) -> Vec<T> {
    log.borrow().clone()
}

/// A dedicated error type for rejections
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Boom(pub &'static str);

impl fmt::Display for Boom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "boom: {}", self.0)
    }
}

impl std::error::Error for Boom {}

/// Notifications observed by the rejection hooks
#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(dead_code)]
pub enum Event {
    PossiblyUnhandled(PromiseId, String),
    Handled(PromiseId, String),
}

/// Install recording possibly-unhandled and rejection-handled hooks
#[allow(dead_code)]
pub fn record_rejections() -> Log<Event> {
    let events = log();
    let unhandled = events.clone();
    let handled = events.clone();
    config::on_possibly_unhandled_rejection(Hook::<RejectionHandler>::handler(
        move |reason: &Reason, id| {
            unhandled
                .borrow_mut()
                .push(Event::PossiblyUnhandled(id, reason.to_string()))
        },
    ));
    config::on_possibly_unhandled_rejection_handled(Hook::<RejectionHandler>::handler(
        move |reason: &Reason, id| handled.borrow_mut().push(Event::Handled(id, reason.to_string())),
    ));
    events
}

/// Install a `.done()` handler that records instead of failing the flush
#[allow(dead_code)]
pub fn record_unhandled() -> Log<String> {
    let seen = log();
    let sink = seen.clone();
    config::on_unhandled_rejection(Hook::<UnhandledRejectionHandler>::handler(
        move |reason: &Reason, _| {
            sink.borrow_mut().push(reason.to_string());
            Ok(())
        },
    ));
    seen
}
