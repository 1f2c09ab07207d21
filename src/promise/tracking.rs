//! Possibly-unhandled rejection tracking
//!
//! A rejection nobody has subscribed to gets an idle-priority probe. Idle work
//! only runs once normal work is exhausted, so any handler attached during the
//! current wave is seen before the probe decides to report.

use std::rc::Rc;

use super::{Flags, Inner};
use crate::config;
use crate::error::Result;
use crate::scheduler;

/// Record that someone took responsibility for this promise's rejection
pub(crate) fn set_rejection_handled<T: Clone + 'static>(inner: &Inner<T>) {
    let flags = inner.flags();
    if flags.contains(Flags::REJECTION_HANDLED) {
        return;
    }
    inner.set_flags(Flags::REJECTION_HANDLED);
    if flags.contains(Flags::UNHANDLED_REJECTION_NOTIFIED) {
        if let Some(reason) = inner.rejection() {
            config::notify_rejection_handled(&reason, inner.id());
        }
    }
}

/// Queue a probe for a fresh rejection
pub(crate) fn track<T: Clone + 'static>(inner: &Rc<Inner<T>>) {
    if inner.flags().contains(Flags::REJECTION_HANDLED) || !config::tracking_enabled() {
        return;
    }
    scheduler::current().enqueue_idle(check_unhandled::<T>, inner.clone());
}

fn check_unhandled<T: Clone + 'static>(inner: Rc<Inner<T>>) -> Result<()> {
    if inner.flags().contains(Flags::REJECTION_HANDLED) {
        return Ok(());
    }
    if let Some(reason) = inner.rejection() {
        inner.set_flags(Flags::UNHANDLED_REJECTION_NOTIFIED);
        config::notify_possibly_unhandled(&reason, inner.id());
    }
    Ok(())
}
