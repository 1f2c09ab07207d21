//! Synchronous call-site snapshots

use std::backtrace::{Backtrace, BacktraceStatus};
use std::fmt;
use std::panic::Location;
use std::rc::Rc;

/// One captured call site
///
/// The location comes from `#[track_caller]`, so it names the user code that
/// called into the library rather than the library internals. A native
/// backtrace is only taken when requested, since it is expensive.
#[derive(Clone)]
pub struct Stack(Rc<StackInner>);

struct StackInner {
    location: &'static Location<'static>,
    backtrace: Option<Backtrace>,
}

impl Stack {
    /// Snapshot an already-resolved caller location
    pub fn capture(location: &'static Location<'static>, with_backtrace: bool) -> Self {
        let backtrace = with_backtrace.then(Backtrace::force_capture);
        Stack(Rc::new(StackInner {
            location,
            backtrace,
        }))
    }

    /// Snapshot the caller of this function
    #[track_caller]
    pub fn here() -> Self {
        Self::capture(Location::caller(), false)
    }

    /// Source location of the call site
    pub fn location(&self) -> &'static Location<'static> {
        self.0.location
    }

    /// Platform-formatted text of this snapshot
    pub fn inspect(&self) -> String {
        let loc = self.0.location;
        let mut out = format!("    at {}:{}:{}", loc.file(), loc.line(), loc.column());
        if let Some(bt) = &self.0.backtrace {
            if bt.status() == BacktraceStatus::Captured {
                for line in bt.to_string().lines() {
                    out.push_str("\n      ");
                    out.push_str(line.trim_start());
                }
            }
        }
        out
    }
}

impl fmt::Display for Stack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.inspect())
    }
}

impl fmt::Debug for Stack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Stack").field(&self.0.location).finish()
    }
}
