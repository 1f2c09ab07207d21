//! Settle: Promises/A+ style promises with deterministic scheduling
//!
//! Settle implements promises whose callbacks always run later, from a
//! deferred-call scheduler, never inside the call that settled them. Chains
//! of any length resolve breadth first with a flat native stack, and
//! rejections nobody handles are detected and reported.
//!
//! # Features
//!
//! - **No Zalgo**: `.then()` callbacks never run synchronously
//! - **Crash on unhandled**: a `.done()` chain ending in a rejection makes [`flush`] fail
//! - **Possibly-unhandled detection**: rejections left unobserved after a scheduling wave are reported, and reported again if handled later
//! - **Long traces**: optional causal traces linking a failure back through every async hop
//!
//! # Quick Start
//!
//! ```no_run
//! use settle::{Promise, Reason};
//!
//! fn main() -> settle::Result<()> {
//!     let doubled: Promise<i32> = Promise::resolve(21).then(|v: i32| Ok(v * 2));
//!     doubled.done_then(|v| {
//!         println!("Result: {}", v);
//!         Ok(())
//!     });
//!     settle::flush()?;
//!
//!     let failed: Promise<i32> = Promise::reject(Reason::msg("boom"));
//!     failed.done();
//!     assert!(settle::flush().is_err());
//!     Ok(())
//! }
//! ```
//!
//! # Module Overview
//!
//! | Category | Modules |
//! |----------|---------|
//! | **Core** | [`promise`], [`reason`], [`error`](Error) |
//! | **Scheduling** | [`scheduler`], [`event_loop`] |
//! | **Diagnostics** | [`trace`], [`config`] |
// Clippy configuration for settle.
//
// - type_complexity: boxed callback types spell out their full signatures
// - new_ret_no_self: constructors of shared state return `Rc<Self>`
#![allow(clippy::type_complexity)]
#![allow(clippy::new_ret_no_self)]

pub mod config;
pub mod error;
pub mod event_loop;
pub mod promise;
pub mod reason;
pub mod scheduler;
pub mod trace;

pub use config::{
    on_possibly_unhandled_rejection, on_possibly_unhandled_rejection_handled,
    on_unhandled_rejection, set_long_traces, set_trace_limit, set_tracer, Hook, Settings,
};
pub use error::{Error, Message, Result, StateKind, TypeError, UnhandledRejection};
pub use promise::{
    Completion, Deferred, Matcher, Predicate, Promise, PromiseId, Reject, Resolution, Resolve,
    Thenable,
};
pub use reason::Reason;
pub use scheduler::{flush, set_scheduler};
pub use trace::{Stack, Trace};

/// Version of settle
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_reexports_work_together() {
        let p: Promise<i32> = Promise::resolve(1).then(|v: i32| Ok(v + 1));
        flush().unwrap();
        assert_eq!(p.value().unwrap(), 2);
    }
}
