//! the user facing transformation contract.

use std::fmt::{self, Debug, Formatter};

use super::{
    error::{Failure, Stop},
    oneshot,
    tag::TypeTag,
};

/// One output slot produced by a tube: either a value that exists now, or a
/// placeholder that will settle later. The engine delivers outputs downstream
/// in the order they were yielded regardless of when placeholders settle.
pub enum Output<T> {
    /// an immediate value.
    Now(T),
    /// a value still being produced; see [oneshot::channel].
    Later(oneshot::Receiver<T>),
}

impl<T> From<T> for Output<T> {
    fn from(value: T) -> Self {
        Self::Now(value)
    }
}

impl<T> From<oneshot::Receiver<T>> for Output<T> {
    fn from(rx: oneshot::Receiver<T>) -> Self {
        Self::Later(rx)
    }
}

impl<T: Debug> Debug for Output<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match *self {
            Self::Now(ref v) => f.debug_tuple("Now").field(v).finish(),
            Self::Later(ref rx) => f.debug_tuple("Later").field(rx).finish(),
        }
    }
}

/// What one invocation of a tube method hands to the engine: nothing at all,
/// or a lazy sequence of [Output]s to deliver downstream.
///
/// `Emit::none()` is distinct from an empty sequence: it never creates a
/// pending iterator in the siphon at all.
pub struct Emit<T>(Option<Box<dyn Iterator<Item = Output<T>>>>);

impl<T: 'static> Emit<T> {
    /// emit nothing.
    pub fn none() -> Self {
        Self(None)
    }

    /// emit a single immediate value.
    pub fn one(item: T) -> Self {
        Self(Some(Box::new(std::iter::once(Output::Now(item)))))
    }

    /// emit a single placeholder settled later.
    pub fn later(rx: oneshot::Receiver<T>) -> Self {
        Self(Some(Box::new(std::iter::once(Output::Later(rx)))))
    }

    /// emit every immediate value of `items`, lazily.
    pub fn items<I>(items: I) -> Self
    where
        I: IntoIterator<Item = T>,
        I::IntoIter: 'static,
    {
        Self(Some(Box::new(items.into_iter().map(Output::Now))))
    }

    /// emit a mixed sequence of immediate values and placeholders, lazily.
    pub fn outputs<I>(outputs: I) -> Self
    where
        I: IntoIterator<Item = Output<T>>,
        I::IntoIter: 'static,
    {
        Self(Some(Box::new(outputs.into_iter())))
    }

    pub(crate) fn into_pending(self) -> Option<Box<dyn Iterator<Item = Output<T>>>> {
        self.0
    }
}

impl<T: 'static> Default for Emit<T> {
    fn default() -> Self {
        Self::none()
    }
}

impl<T> Debug for Emit<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self.0 {
            None => f.write_str("Emit::none"),
            Some(_) => f.write_str("Emit(..)"),
        }
    }
}

/// A stateful transformation: consume zero or more inputs, produce zero or
/// more outputs per event, with optional asynchronous completion.
///
/// Tube authors implement the three event methods and never deal with
/// buffering, pausing or ordering; adapting the tube with
/// [SiphonDrain::new](crate::SiphonDrain::new) or [series](crate::series)
/// takes care of all of that.
///
/// Returning `Err` from any method ends the flow: the failure is logged, the
/// upstream fount is stopped and the downstream drain sees
/// `flow_stopped(Stop::Failed(..))`.
pub trait Tube {
    /// what this tube consumes.
    type In: 'static;
    /// what this tube produces.
    type Out: 'static;

    /// optional schema tag for the input side.
    fn input_tag(&self) -> Option<TypeTag> {
        None
    }

    /// optional schema tag for the output side.
    fn output_tag(&self) -> Option<TypeTag> {
        None
    }

    /// Called exactly once, when the tube's siphon first gains an upstream.
    fn started(&mut self) -> Result<Emit<Self::Out>, Failure> {
        Ok(Emit::none())
    }

    /// Called for every item flowing in from upstream.
    fn received(&mut self, item: Self::In) -> Result<Emit<Self::Out>, Failure>;

    /// Called exactly once when the upstream flow ends. Outputs are delivered
    /// downstream before the stop itself is passed on.
    fn stopped(&mut self, reason: &Stop) -> Result<Emit<Self::Out>, Failure> {
        let _ = reason;
        Ok(Emit::none())
    }
}

/// A tube whose buffered output can be taken back and re-expressed, enabling
/// [Diverter](crate::Diverter) to re-plumb the upstream mid stream without
/// losing items the downstream never saw.
pub trait Divertable: Tube {
    /// Reassemble the unconsumed tail of this tube's output (outputs that
    /// were produced but never delivered) into the sequence the new
    /// downstream should observe first.
    fn reassemble(&mut self, remaining: Vec<Output<Self::Out>>) -> Vec<Output<Self::Out>>;
}
