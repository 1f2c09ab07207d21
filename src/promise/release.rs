//! Iterative teardown of unsettled chains
//!
//! A pending promise owns its handlers, and a `.then()` handler owns the
//! promise it settles. Dropping the head of an unsettled chain would otherwise
//! recurse once per link. Handlers are instead parked here and dropped one at
//! a time by the outermost release.

use std::any::Any;
use std::cell::{Cell, RefCell};

thread_local! {
    static PARKED: RefCell<Vec<Box<dyn Any>>> = const { RefCell::new(Vec::new()) };
    static RELEASING: Cell<bool> = const { Cell::new(false) };
}

/// Clears the releasing flag even if a destructor unwinds
struct Releasing;

impl Drop for Releasing {
    fn drop(&mut self) {
        let _ = RELEASING.try_with(|flag| flag.set(false));
    }
}

/// Drop `items` without growing the native stack per nested promise
pub(crate) fn release(items: Vec<Box<dyn Any>>) {
    // During thread shutdown the list may already be gone; drop in place.
    if PARKED
        .try_with(|parked| parked.borrow_mut().extend(items))
        .is_err()
    {
        return;
    }
    if RELEASING.try_with(|flag| flag.replace(true)).unwrap_or(true) {
        return;
    }
    let _releasing = Releasing;
    while let Some(item) = PARKED.with(|parked| parked.borrow_mut().pop()) {
        drop(item);
    }
}
