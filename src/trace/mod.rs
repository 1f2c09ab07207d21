//! Causal traces across asynchronous hops
//!
//! A [`Trace`] is the [`Stack`] of the place a promise (or `.done()` call) was
//! created, plus the stacks of the promises that led to it. Ancestors are kept
//! newest first and capped at the configured trace limit, so a recursive chain
//! never accumulates unbounded history.

mod stack;

pub use stack::Stack;

use std::fmt;
use std::panic::Location;
use std::rc::Rc;

/// Default number of ancestor stacks kept per trace
pub const DEFAULT_TRACE_LIMIT: usize = 10;

/// Immutable snapshot of a call site and its asynchronous ancestry
#[derive(Clone)]
pub struct Trace(Rc<TraceInner>);

struct TraceInner {
    stack: Stack,
    /// Newest first
    sources: Vec<Stack>,
}

impl Trace {
    /// A trace with no ancestry
    pub fn new(stack: Stack) -> Self {
        Trace(Rc::new(TraceInner {
            stack,
            sources: Vec::new(),
        }))
    }

    /// Trace rooted at the caller of this function
    #[track_caller]
    pub fn here() -> Self {
        Self::new(Stack::capture(Location::caller(), false))
    }

    /// Same call site, with `source` (and its own ancestry) as history
    ///
    /// Keeps at most `limit` ancestors, dropping the oldest.
    pub fn with_source(&self, source: &Trace, limit: usize) -> Trace {
        let mut sources = Vec::with_capacity(limit.min(source.0.sources.len() + 1));
        sources.push(source.0.stack.clone());
        sources.extend(source.0.sources.iter().cloned());
        sources.truncate(limit);
        Trace(Rc::new(TraceInner {
            stack: self.0.stack.clone(),
            sources,
        }))
    }

    /// The call site this trace was captured at
    pub fn stack(&self) -> &Stack {
        &self.0.stack
    }

    /// Ancestor call sites, newest first
    pub fn sources(&self) -> &[Stack] {
        &self.0.sources
    }

    /// Render the call site followed by each ancestor, oldest last
    pub fn inspect(&self) -> String {
        let mut out = self.0.stack.inspect();
        for source in &self.0.sources {
            out.push_str("\n  from previous:\n");
            out.push_str(&source.inspect());
        }
        out
    }
}

impl fmt::Display for Trace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.inspect())
    }
}

impl fmt::Debug for Trace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Trace")
            .field("stack", &self.0.stack)
            .field("sources", &self.0.sources.len())
            .finish()
    }
}
