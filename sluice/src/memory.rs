//! founts over in memory values.

use std::{
    cell::{Cell, RefCell},
    fmt::{self, Debug, Formatter},
    rc::{Rc, Weak},
};

use super::{
    error::{Stop, TypeMismatch},
    flow::{AnyFount, Drain, Fount},
    link::DownLink,
    pause::{Pause, Pauser},
    tag::TypeTag,
};

/// A fount that delivers the values of an iterator to its drain, as fast as
/// the drain lets it: delivery runs on attach and again on every resume,
/// and halts while any pause token is outstanding.
///
/// On exhaustion the drain sees `flow_stopped(Stop::Finished)`; a
/// `stop_flow` from downstream yields `flow_stopped(Stop::Cancelled)`.
pub struct IteratorFount<I: Iterator> {
    iter: RefCell<I>,
    downlink: DownLink<I::Item>,
    pauser: Pauser,
    paused: Cell<bool>,
    stopped: Cell<bool>,
    tag: Cell<Option<TypeTag>>,
}

impl<I> IteratorFount<I>
where
    I: Iterator + 'static,
    I::Item: 'static,
{
    pub fn new<It>(iterable: It) -> Rc<Self>
    where
        It: IntoIterator<IntoIter = I>,
    {
        Rc::new_cyclic(|weak: &Weak<Self>| {
            let pause_weak = weak.clone();
            let resume_weak = weak.clone();
            Self {
                iter: RefCell::new(iterable.into_iter()),
                downlink: DownLink::new(),
                pauser: Pauser::new(
                    move || {
                        if let Some(fount) = pause_weak.upgrade() {
                            fount.paused.set(true);
                        }
                    },
                    move || {
                        if let Some(fount) = resume_weak.upgrade() {
                            fount.resume();
                        }
                    },
                ),
                paused: Cell::new(false),
                stopped: Cell::new(false),
                tag: Cell::new(None),
            }
        })
    }

    /// declare what this fount's items are, for connection time checks.
    pub fn with_output_tag(self: Rc<Self>, tag: TypeTag) -> Rc<Self> {
        self.tag.set(Some(tag));
        self
    }

    fn resume(&self) {
        if !self.stopped.get() {
            self.paused.set(false);
            self.deliver();
        }
    }

    fn deliver(&self) {
        while !self.paused.get() && !self.stopped.get() {
            let Some(drain) = self.downlink.get() else {
                return;
            };
            let next = self.iter.borrow_mut().next();
            match next {
                Some(item) => drain.receive(item),
                None => {
                    self.stopped.set(true);
                    drain.flow_stopped(Stop::Finished);
                    return;
                }
            }
        }
    }
}

impl<I> Fount for IteratorFount<I>
where
    I: Iterator + 'static,
    I::Item: 'static,
{
    type Out = I::Item;

    fn output_tag(&self) -> Option<TypeTag> {
        self.tag.get()
    }

    fn downstream(&self) -> Option<Rc<dyn Drain<In = I::Item>>> {
        self.downlink.get()
    }

    fn flow_to(
        self: Rc<Self>,
        drain: Option<Rc<dyn Drain<In = I::Item>>>,
    ) -> Result<Option<AnyFount>, TypeMismatch> {
        let this = Rc::clone(&self) as Rc<dyn Fount<Out = I::Item>>;
        let result = self.downlink.begin_flow_to(this, drain)?;
        self.deliver();
        Ok(result)
    }

    fn pause_flow(&self) -> Pause {
        self.pauser.pause()
    }

    fn stop_flow(&self) {
        if !self.stopped.get() {
            self.stopped.set(true);
            if let Some(drain) = self.downlink.get() {
                drain.flow_stopped(Stop::Cancelled);
            }
        }
    }
}

impl<I: Iterator> Debug for IteratorFount<I> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("IteratorFount")
            .field("paused", &self.paused.get())
            .field("stopped", &self.stopped.get())
            .finish()
    }
}
