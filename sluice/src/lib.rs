//! Push oriented dataflow plumbing with explicit backpressure.
//!
//! Pipelines connect a [Fount] (producer) through [Tube]s (transformation
//! stages) to a [Drain] (consumer). Tube authors only describe what each
//! event produces; the siphon adapting a tube into the pipeline handles
//! buffering, reference counted pausing, in order delivery of
//! asynchronously settled outputs, start/stop lifecycle and mid stream
//! diversion.
//!
//! The engine is strictly single threaded and event loop agnostic: the
//! host drives `receive`, resumes pauses and settles [oneshot]
//! placeholders on one logical task. Nothing here is `Send`.
//!
//! Build chains with [series], adapt a single tube with [SiphonDrain::new],
//! feed one from plain values with [IteratorFount], and wrap a
//! [Divertable] tube in a [Diverter] when a flow must be handed over to a
//! different consumer mid stream.

#![forbid(unsafe_code)]

mod error;
mod flow;
mod link;
mod memory;
mod pause;
mod series;
mod siphon;
mod tag;
mod tube;

pub mod diverter;
pub mod oneshot;

#[cfg(test)]
mod test_util;

pub use self::{
    diverter::Diverter,
    error::{failure, Failure, Stop, TypeMismatch},
    flow::{AnyFount, Drain, Fount},
    memory::IteratorFount,
    pause::{AlreadyUnpaused, Pause, Pauser},
    series::{series, Series},
    siphon::{SiphonDrain, SiphonFount},
    tag::TypeTag,
    tube::{Divertable, Emit, Output, Tube},
};
