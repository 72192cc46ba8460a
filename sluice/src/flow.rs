//! the fount/drain vocabulary.
//!
//! A [Fount] produces items with explicit backpressure; a [Drain] consumes
//! them. Connections are made with [Fount::flow_to], which hands back the
//! drain's own downstream facing fount (when it has one) so multi stage
//! pipelines can be threaded left to right:
//!
//! ```text
//! fount.flow_to(a)?  ->  a's fount  ->  flow_to(b)?  ->  b's fount  ...
//! ```
//!
//! Because each stage chooses its own output type, the chained fount comes
//! back type erased as [AnyFount]; [AnyFount::downcast] recovers the typed
//! handle.

use std::{
    any::Any,
    fmt::{self, Debug, Formatter},
    rc::Rc,
};

use super::{
    error::{Stop, TypeMismatch},
    pause::Pause,
    tag::TypeTag,
};

/// A source of items with explicit backpressure.
///
/// Implementations hold a strong reference to their drain (the pipeline is
/// kept alive from its head) and must follow the connection protocol:
/// record the new drain before notifying it, and detach an old drain only
/// while it still points back here.
pub trait Fount {
    /// item type this fount produces.
    type Out: 'static;

    /// optional schema tag for compatibility checks.
    fn output_tag(&self) -> Option<TypeTag> {
        None
    }

    /// the drain currently attached, if any.
    fn downstream(&self) -> Option<Rc<dyn Drain<In = Self::Out>>>;

    /// Attach `drain` (or detach with `None`) and return the drain's own
    /// downstream fount for chaining, when it has one.
    fn flow_to(
        self: Rc<Self>,
        drain: Option<Rc<dyn Drain<In = Self::Out>>>,
    ) -> Result<Option<AnyFount>, TypeMismatch>;

    /// Register one interest in suppressing the flow. No `receive` happens
    /// downstream until every outstanding [Pause] is released.
    fn pause_flow(&self) -> Pause;

    /// Stop producing, permanently. The drain will see `flow_stopped` in due
    /// course.
    fn stop_flow(&self);
}

/// A sink for items with an explicit stop/start lifecycle.
pub trait Drain {
    /// item type this drain accepts.
    type In: 'static;

    /// optional schema tag for compatibility checks.
    fn input_tag(&self) -> Option<TypeTag> {
        None
    }

    /// the fount currently attached, if any.
    fn upstream(&self) -> Option<Rc<dyn Fount<Out = Self::In>>>;

    /// Attach `fount` (or detach with `None`) and return this drain's own
    /// downstream fount for chaining, when it has one.
    ///
    /// When both sides declare tags and the fount's output tag neither is
    /// nor extends this drain's input tag, fails with [TypeMismatch] and
    /// leaves the previous attachment untouched.
    fn flowing_from(
        self: Rc<Self>,
        fount: Option<Rc<dyn Fount<Out = Self::In>>>,
    ) -> Result<Option<AnyFount>, TypeMismatch>;

    /// One item arrived. Never called while this drain's fount side has
    /// outstanding pauses.
    fn receive(&self, item: Self::In);

    /// Final signal: the flow is over. No `receive` follows.
    fn flow_stopped(&self, reason: Stop);
}

/// Type erased `Rc<dyn Fount<Out = T>>`, returned from the connection calls
/// so chains can cross stages with different item types.
pub struct AnyFount(Box<dyn Any>);

impl AnyFount {
    /// erase a typed fount handle.
    pub fn erase<T: 'static>(fount: Rc<dyn Fount<Out = T>>) -> Self {
        Self(Box::new(fount))
    }

    /// recover the typed handle, or get `self` back when `T` is not the
    /// fount's item type.
    pub fn downcast<T: 'static>(self) -> Result<Rc<dyn Fount<Out = T>>, AnyFount> {
        self.0
            .downcast::<Rc<dyn Fount<Out = T>>>()
            .map(|boxed| *boxed)
            .map_err(AnyFount)
    }
}

impl Debug for AnyFount {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str("AnyFount")
    }
}
