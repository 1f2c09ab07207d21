//! Process-wide configuration
//!
//! All switches here are per-thread globals: the library runs on a single
//! logical thread, and every OS thread gets an independent set. Lifecycle:
//! values start at their defaults, may be changed at any time (changes affect
//! only promises created afterwards), and [`reset`] restores every default,
//! hook and tracer.

use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;

use crate::error::{Result, UnhandledRejection};
use crate::promise::PromiseId;
use crate::reason::Reason;
use crate::scheduler::{self, DEFAULT_QUEUE_CAPACITY};
use crate::trace::{Trace, DEFAULT_TRACE_LIMIT};

/// Handler for rejections that reach a bare `.done()`
///
/// Returning `Err` lets the error escape the current flush.
pub type UnhandledRejectionHandler = dyn Fn(&Reason, Option<&Trace>) -> Result<()>;

/// Handler for possibly-unhandled and rejection-handled notifications
pub type RejectionHandler = dyn Fn(&Reason, PromiseId);

/// Debug hook invoked on every major promise transition
pub type Tracer = Rc<dyn Fn(PromiseId, &str)>;

/// A replaceable notification policy: built-in, switched off, or custom
pub enum Hook<F: ?Sized> {
    /// Library default behaviour
    Default,
    /// No notification at all
    Disabled,
    /// User supplied handler
    Custom(Rc<F>),
}

impl<F: ?Sized> Clone for Hook<F> {
    fn clone(&self) -> Self {
        match self {
            Hook::Default => Hook::Default,
            Hook::Disabled => Hook::Disabled,
            Hook::Custom(f) => Hook::Custom(Rc::clone(f)),
        }
    }
}

impl<F: ?Sized> From<bool> for Hook<F> {
    fn from(enabled: bool) -> Self {
        if enabled {
            Hook::Default
        } else {
            Hook::Disabled
        }
    }
}

impl<F: ?Sized> Hook<F> {
    /// Whether anything happens when the hook fires
    pub fn is_enabled(&self) -> bool {
        !matches!(self, Hook::Disabled)
    }
}

impl Hook<UnhandledRejectionHandler> {
    /// Wrap a closure as a custom unhandled-rejection handler
    pub fn handler(f: impl Fn(&Reason, Option<&Trace>) -> Result<()> + 'static) -> Self {
        Hook::Custom(Rc::new(f))
    }
}

impl Hook<RejectionHandler> {
    /// Wrap a closure as a custom notification handler
    pub fn handler(f: impl Fn(&Reason, PromiseId) + 'static) -> Self {
        Hook::Custom(Rc::new(f))
    }
}

/// Serializable subset of the configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Capture causal traces for newly created promises
    pub long_traces: bool,
    /// Ancestor stacks kept per trace
    pub trace_limit: usize,
    /// Also take a native backtrace per captured stack (expensive)
    pub capture_backtraces: bool,
    /// Probe rejections for possibly-unhandled notification
    pub track_rejections: bool,
    /// Callback pairs per scheduler call queue
    pub queue_capacity: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            long_traces: false,
            trace_limit: DEFAULT_TRACE_LIMIT,
            capture_backtraces: false,
            track_rejections: true,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

impl Settings {
    /// Parse settings from a JSON document; missing fields take defaults
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Read settings from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Settings currently in effect on this thread
    pub fn current() -> Self {
        GLOBALS.with(|g| g.borrow().settings.clone())
    }

    /// Make these settings current on this thread
    pub fn apply(&self) {
        tracing::debug!(settings = ?self, "applying settings");
        scheduler::current().set_queue_capacity(self.queue_capacity);
        GLOBALS.with(|g| g.borrow_mut().settings = self.clone());
    }
}

struct Globals {
    settings: Settings,
    tracer: Option<Tracer>,
    unhandled: Hook<UnhandledRejectionHandler>,
    possibly_unhandled: Hook<RejectionHandler>,
    rejection_handled: Hook<RejectionHandler>,
}

impl Default for Globals {
    fn default() -> Self {
        Self {
            settings: Settings::default(),
            tracer: None,
            unhandled: Hook::Default,
            possibly_unhandled: Hook::Default,
            rejection_handled: Hook::Default,
        }
    }
}

thread_local! {
    static GLOBALS: RefCell<Globals> = RefCell::new(Globals::default());
}

/// Restore every default, hook, tracer and the default host scheduler
pub fn reset() {
    GLOBALS.with(|g| *g.borrow_mut() = Globals::default());
    let scheduler = scheduler::current();
    scheduler.set_scheduler(None);
    scheduler.set_queue_capacity(DEFAULT_QUEUE_CAPACITY);
}

/// Toggle long traces; existing promises keep the mode they were created with
pub fn set_long_traces(enabled: bool) {
    GLOBALS.with(|g| g.borrow_mut().settings.long_traces = enabled);
}

/// Whether newly created promises capture causal traces
pub fn long_traces() -> bool {
    GLOBALS.with(|g| g.borrow().settings.long_traces)
}

/// Set how many ancestor stacks a trace keeps
pub fn set_trace_limit(limit: usize) {
    GLOBALS.with(|g| g.borrow_mut().settings.trace_limit = limit);
}

pub fn trace_limit() -> usize {
    GLOBALS.with(|g| g.borrow().settings.trace_limit)
}

pub(crate) fn capture_backtraces() -> bool {
    GLOBALS.with(|g| g.borrow().settings.capture_backtraces)
}

/// Install or remove the transition tracer
pub fn set_tracer(tracer: Option<Tracer>) {
    GLOBALS.with(|g| g.borrow_mut().tracer = tracer);
}

/// Policy for rejections reaching a `.done()` without a rejection handler
pub fn on_unhandled_rejection(hook: impl Into<Hook<UnhandledRejectionHandler>>) {
    let hook = hook.into();
    GLOBALS.with(|g| g.borrow_mut().unhandled = hook);
}

/// Policy for rejections nobody observed by the end of a scheduling wave
pub fn on_possibly_unhandled_rejection(hook: impl Into<Hook<RejectionHandler>>) {
    let hook = hook.into();
    GLOBALS.with(|g| g.borrow_mut().possibly_unhandled = hook);
}

/// Policy for previously reported rejections that got handled later
pub fn on_possibly_unhandled_rejection_handled(hook: impl Into<Hook<RejectionHandler>>) {
    let hook = hook.into();
    GLOBALS.with(|g| g.borrow_mut().rejection_handled = hook);
}

/// Whether a rejection should be probed for possibly-unhandled notification
pub(crate) fn tracking_enabled() -> bool {
    GLOBALS.with(|g| {
        let g = g.borrow();
        g.settings.track_rejections && g.possibly_unhandled.is_enabled()
    })
}

pub(crate) fn trace_event(id: PromiseId, msg: &str) {
    tracing::trace!(promise = %id, "{}", msg);
    let tracer = GLOBALS.with(|g| g.borrow().tracer.clone());
    if let Some(tracer) = tracer {
        tracer(id, msg);
    }
}

pub(crate) fn report_unhandled(reason: &Reason, trace: Option<&Trace>) -> Result<()> {
    let hook = GLOBALS.with(|g| g.borrow().unhandled.clone());
    match hook {
        Hook::Default => Err(UnhandledRejection::new(reason.clone(), trace.cloned()).into()),
        Hook::Disabled => Ok(()),
        Hook::Custom(handler) => handler(reason, trace),
    }
}

pub(crate) fn notify_possibly_unhandled(reason: &Reason, id: PromiseId) {
    let hook = GLOBALS.with(|g| g.borrow().possibly_unhandled.clone());
    match hook {
        Hook::Default => {
            tracing::warn!(promise = %id, "possibly unhandled rejection: {}", reason.stack())
        }
        Hook::Disabled => {}
        Hook::Custom(handler) => handler(reason, id),
    }
}

pub(crate) fn notify_rejection_handled(reason: &Reason, id: PromiseId) {
    let hook = GLOBALS.with(|g| g.borrow().rejection_handled.clone());
    match hook {
        Hook::Default => {
            tracing::warn!(promise = %id, "possibly unhandled rejection handled: {}", reason)
        }
        Hook::Disabled => {}
        Hook::Custom(handler) => handler(reason, id),
    }
}
