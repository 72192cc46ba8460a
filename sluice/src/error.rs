//! error and stop-reason types.

use std::{
    error::Error,
    fmt::{self, Debug, Display, Formatter},
    rc::Rc,
};

use super::tag::TypeTag;

/// Type erased failure produced by user code (a tube body or a settled
/// placeholder). Reference counted so the same failure can be handed to the
/// tube's `stopped` and to the downstream drain's `flow_stopped`.
pub type Failure = Rc<dyn Error>;

/// box an error value into a [Failure].
pub fn failure(e: impl Error + 'static) -> Failure {
    Rc::new(e)
}

/// Why a flow came to an end.
///
/// Delivered to a tube through [Tube::stopped](crate::Tube::stopped) and to a
/// drain through [Drain::flow_stopped](crate::Drain::flow_stopped).
#[derive(Clone)]
pub enum Stop {
    /// The fount delivered everything it had.
    Finished,
    /// `stop_flow` was called from downstream.
    Cancelled,
    /// The flow was cut short by an error.
    Failed(Failure),
}

impl Stop {
    /// construct a [Stop::Failed] from a concrete error value.
    pub fn failed(e: impl Error + 'static) -> Self {
        Self::Failed(failure(e))
    }

    /// true for [Stop::Failed].
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

impl Debug for Stop {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match *self {
            Self::Finished => f.write_str("Stop::Finished"),
            Self::Cancelled => f.write_str("Stop::Cancelled"),
            Self::Failed(ref e) => write!(f, "Stop::Failed({e})"),
        }
    }
}

impl Display for Stop {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match *self {
            Self::Finished => f.write_str("flow finished"),
            Self::Cancelled => f.write_str("flow stopped on request"),
            Self::Failed(ref e) => write!(f, "flow failed: {e}"),
        }
    }
}

/// A fount was connected to a drain whose declared input tag its output tag
/// neither matches nor extends. Raised synchronously from `flowing_from`;
/// the connection is not made.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct TypeMismatch {
    /// what the fount produces.
    pub fount: TypeTag,
    /// what the drain accepts.
    pub drain: TypeTag,
}

impl Debug for TypeMismatch {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeMismatch")
            .field("fount", &self.fount.name())
            .field("drain", &self.drain.name())
            .finish()
    }
}

impl Display for TypeMismatch {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "fount output {:?} is not {:?} nor an extension of it",
            self.fount.name(),
            self.drain.name()
        )
    }
}

impl Error for TypeMismatch {}
