//! explicit, registry free chain construction.

use std::{
    fmt::{self, Debug, Formatter},
    rc::Rc,
};

use super::{
    error::TypeMismatch,
    flow::{Drain, Fount},
    siphon::SiphonDrain,
    tube::Tube,
};

/// Start a chain from a tube.
///
/// `series(a).then(b)?.then(c)?` builds the pre-connected pipeline that
/// `a.flow_to(b).flow_to(c)` would, adapting each tube into its siphon
/// first. The item types of adjacent stages must line up at compile time;
/// schema tags are checked eagerly at connection time.
pub fn series<T>(first: T) -> Series<T::In, T::Out>
where
    T: Tube + 'static,
{
    let drain = SiphonDrain::new(first);
    let fount = drain.fount();
    Series {
        drain: drain.erased(),
        fount: fount.erased(),
    }
}

/// A partially or fully built chain. Holding the `Series` (or the head
/// drain it exposes) keeps every stage alive.
pub struct Series<In, Out> {
    drain: Rc<dyn Drain<In = In>>,
    fount: Rc<dyn Fount<Out = Out>>,
}

impl<In: 'static, Out: 'static> Series<In, Out> {
    /// Adapt `next` and connect it after the current last stage.
    pub fn then<T>(self, next: T) -> Result<Series<In, T::Out>, TypeMismatch>
    where
        T: Tube<In = Out> + 'static,
    {
        let next_drain = SiphonDrain::new(next);
        let next_fount = next_drain.fount();
        Rc::clone(&self.fount).flow_to(Some(next_drain.erased()))?;
        Ok(Series {
            drain: self.drain,
            fount: next_fount.erased(),
        })
    }

    /// Terminate the chain with an arbitrary drain and return the head
    /// drain, which now represents the whole pipeline.
    pub fn to_drain(self, drain: Rc<dyn Drain<In = Out>>) -> Result<Rc<dyn Drain<In = In>>, TypeMismatch> {
        Rc::clone(&self.fount).flow_to(Some(drain))?;
        Ok(self.drain)
    }

    /// the chain's head: feed inputs here.
    pub fn drain(&self) -> Rc<dyn Drain<In = In>> {
        Rc::clone(&self.drain)
    }

    /// the chain's tail: the overall output flows from here.
    pub fn fount(&self) -> Rc<dyn Fount<Out = Out>> {
        Rc::clone(&self.fount)
    }
}

impl<In, Out> Debug for Series<In, Out> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str("Series")
    }
}
