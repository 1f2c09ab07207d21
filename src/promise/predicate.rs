//! Filters for [`Promise::catch_if`](super::Promise::catch_if)

use std::error::Error as StdError;
use std::fmt;
use std::rc::Rc;

use crate::error::{messages, TypeError};
use crate::reason::Reason;

/// Matches reasons whose error is of one concrete type
#[derive(Clone, Copy)]
pub struct Matcher {
    name: &'static str,
    test: fn(&Reason) -> bool,
}

fn is_a<E: StdError + 'static>(reason: &Reason) -> bool {
    reason.is::<E>()
}

impl Matcher {
    /// Matcher for error type `E`
    pub fn of<E: StdError + 'static>() -> Self {
        Matcher {
            name: std::any::type_name::<E>(),
            test: is_a::<E>,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn matches(&self, reason: &Reason) -> bool {
        (self.test)(reason)
    }
}

impl fmt::Debug for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Matcher").field(&self.name).finish()
    }
}

/// Which rejections a filtered catch handles
#[derive(Clone)]
pub enum Predicate {
    /// Reasons of one error type
    Class(Matcher),
    /// Reasons of any of these error types
    Classes(Vec<Matcher>),
    /// Reasons accepted by a function
    Function(Rc<dyn Fn(&Reason) -> bool>),
}

impl Predicate {
    pub fn class<E: StdError + 'static>() -> Self {
        Predicate::Class(Matcher::of::<E>())
    }

    pub fn classes(matchers: impl IntoIterator<Item = Matcher>) -> Self {
        Predicate::Classes(matchers.into_iter().collect())
    }

    pub fn when(f: impl Fn(&Reason) -> bool + 'static) -> Self {
        Predicate::Function(Rc::new(f))
    }

    /// An empty class list can never match and is rejected as misuse
    pub(crate) fn validate(&self) -> Result<(), Reason> {
        match self {
            Predicate::Classes(matchers) if matchers.is_empty() => {
                Err(Reason::new(TypeError::new(messages::EMPTY_PREDICATE)))
            }
            _ => Ok(()),
        }
    }

    pub fn matches(&self, reason: &Reason) -> bool {
        match self {
            Predicate::Class(matcher) => matcher.matches(reason),
            Predicate::Classes(matchers) => matchers.iter().any(|m| m.matches(reason)),
            Predicate::Function(f) => f(reason),
        }
    }
}

impl fmt::Debug for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::Class(matcher) => f.debug_tuple("Class").field(matcher).finish(),
            Predicate::Classes(matchers) => f.debug_tuple("Classes").field(matchers).finish(),
            Predicate::Function(_) => f.write_str("Function(..)"),
        }
    }
}
