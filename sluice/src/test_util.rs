//! recording fakes shared by the unit tests.

use std::{
    cell::{Cell, RefCell},
    collections::VecDeque,
    error::Error,
    fmt,
    marker::PhantomData,
    rc::{Rc, Weak},
};

use super::{
    error::{Failure, Stop, TypeMismatch},
    flow::{AnyFount, Drain, Fount},
    link::{DownLink, UpLink},
    pause::{Pause, Pauser},
    tag::TypeTag,
    tube::{Emit, Tube},
};

pub(crate) static FAKE_OUT: TypeTag = TypeTag::new("fake-out");
pub(crate) static FAKE_IN: TypeTag = TypeTag::new("fake-in");

/// test failure value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Boom;

impl fmt::Display for Boom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("boom")
    }
}

impl Error for Boom {}

/// A drain that records everything delivered to it.
pub(crate) struct FakeDrain<I: 'static> {
    pub(crate) received: RefCell<Vec<I>>,
    pub(crate) stopped: RefCell<Vec<Stop>>,
    uplink: UpLink<I>,
}

impl<I: 'static> FakeDrain<I> {
    pub(crate) fn new() -> Rc<Self> {
        Rc::new(Self {
            received: RefCell::new(Vec::new()),
            stopped: RefCell::new(Vec::new()),
            uplink: UpLink::new(),
        })
    }

    pub(crate) fn erased(self: &Rc<Self>) -> Rc<dyn Drain<In = I>> {
        Rc::clone(self) as Rc<dyn Drain<In = I>>
    }
}

impl<I: 'static> Drain for FakeDrain<I> {
    type In = I;

    fn input_tag(&self) -> Option<TypeTag> {
        Some(FAKE_IN)
    }

    fn upstream(&self) -> Option<Rc<dyn Fount<Out = I>>> {
        self.uplink.get()
    }

    fn flowing_from(
        self: Rc<Self>,
        fount: Option<Rc<dyn Fount<Out = I>>>,
    ) -> Result<Option<AnyFount>, TypeMismatch> {
        let this_addr = Rc::as_ptr(&self) as *const ();
        self.uplink
            .begin_flowing_from(this_addr, self.input_tag(), fount.as_ref())?;
        Ok(None)
    }

    fn receive(&self, item: I) {
        assert!(
            self.uplink.get().is_some(),
            "receive on a drain with no attached fount"
        );
        self.received.borrow_mut().push(item);
    }

    fn flow_stopped(&self, reason: Stop) {
        self.stopped.borrow_mut().push(reason);
    }
}

/// A fount that records pause and stop requests and never produces anything
/// by itself.
pub(crate) struct FakeFount<I: 'static> {
    downlink: DownLink<I>,
    pauser: Pauser,
    paused: Rc<Cell<bool>>,
    pub(crate) flow_is_stopped: Cell<bool>,
}

impl<I: 'static> FakeFount<I> {
    pub(crate) fn new() -> Rc<Self> {
        let paused = Rc::new(Cell::new(false));
        let (on_pause, on_resume) = (Rc::clone(&paused), Rc::clone(&paused));
        Rc::new(Self {
            downlink: DownLink::new(),
            pauser: Pauser::new(move || on_pause.set(true), move || on_resume.set(false)),
            paused,
            flow_is_stopped: Cell::new(false),
        })
    }

    pub(crate) fn paused(&self) -> bool {
        self.paused.get()
    }

    pub(crate) fn erased(self: &Rc<Self>) -> Rc<dyn Fount<Out = I>> {
        Rc::clone(self) as Rc<dyn Fount<Out = I>>
    }
}

impl<I: 'static> Fount for FakeFount<I> {
    type Out = I;

    fn output_tag(&self) -> Option<TypeTag> {
        Some(FAKE_OUT)
    }

    fn downstream(&self) -> Option<Rc<dyn Drain<In = I>>> {
        self.downlink.get()
    }

    fn flow_to(
        self: Rc<Self>,
        drain: Option<Rc<dyn Drain<In = I>>>,
    ) -> Result<Option<AnyFount>, TypeMismatch> {
        let this = Rc::clone(&self) as Rc<dyn Fount<Out = I>>;
        self.downlink.begin_flow_to(this, drain)
    }

    fn pause_flow(&self) -> Pause {
        self.pauser.pause()
    }

    fn stop_flow(&self) {
        self.flow_is_stopped.set(true);
    }
}

/// A fount with an explicit buffer that pushes as hard as it can: items are
/// delivered on attach and again every time the flow resumes.
pub(crate) struct FakeBufferFount<I: 'static> {
    downlink: DownLink<I>,
    pauser: Pauser,
    paused: Cell<bool>,
    pub(crate) flow_is_stopped: Cell<bool>,
    pub(crate) buffer: RefCell<VecDeque<I>>,
}

impl<I: 'static> FakeBufferFount<I> {
    pub(crate) fn new() -> Rc<Self> {
        Rc::new_cyclic(|weak: &Weak<Self>| {
            let pause_weak = weak.clone();
            let resume_weak = weak.clone();
            Self {
                downlink: DownLink::new(),
                pauser: Pauser::new(
                    move || {
                        if let Some(fount) = pause_weak.upgrade() {
                            fount.paused.set(true);
                        }
                    },
                    move || {
                        if let Some(fount) = resume_weak.upgrade() {
                            fount.paused.set(false);
                            fount.go();
                        }
                    },
                ),
                paused: Cell::new(false),
                flow_is_stopped: Cell::new(false),
                buffer: RefCell::new(VecDeque::new()),
            }
        })
    }

    pub(crate) fn buffer_up(&self, item: I) {
        self.buffer.borrow_mut().push_back(item);
    }

    pub(crate) fn paused(&self) -> bool {
        self.paused.get()
    }

    fn go(&self) {
        while !self.paused.get() {
            let Some(drain) = self.downlink.get() else {
                return;
            };
            let Some(item) = self.buffer.borrow_mut().pop_front() else {
                return;
            };
            drain.receive(item);
        }
    }
}

impl<I: 'static> Fount for FakeBufferFount<I> {
    type Out = I;

    fn output_tag(&self) -> Option<TypeTag> {
        Some(FAKE_OUT)
    }

    fn downstream(&self) -> Option<Rc<dyn Drain<In = I>>> {
        self.downlink.get()
    }

    fn flow_to(
        self: Rc<Self>,
        drain: Option<Rc<dyn Drain<In = I>>>,
    ) -> Result<Option<AnyFount>, TypeMismatch> {
        let this = Rc::clone(&self) as Rc<dyn Fount<Out = I>>;
        let result = self.downlink.begin_flow_to(this, drain)?;
        self.go();
        Ok(result)
    }

    fn pause_flow(&self) -> Pause {
        self.pauser.pause()
    }

    fn stop_flow(&self) {
        self.flow_is_stopped.set(true);
    }
}

/// identity tube.
pub(crate) struct Passthru<I>(PhantomData<I>);

impl<I> Passthru<I> {
    pub(crate) fn new() -> Self {
        Self(PhantomData)
    }
}

impl<I: 'static> Tube for Passthru<I> {
    type In = I;
    type Out = I;

    fn received(&mut self, item: I) -> Result<Emit<I>, Failure> {
        Ok(Emit::one(item))
    }
}

/// A tube that records every input and emits nothing.
pub(crate) struct Recorder<I: 'static> {
    pub(crate) seen: Rc<RefCell<Vec<I>>>,
}

impl<I: 'static> Recorder<I> {
    pub(crate) fn new() -> (Self, Rc<RefCell<Vec<I>>>) {
        let seen = Rc::new(RefCell::new(Vec::new()));
        (
            Self {
                seen: Rc::clone(&seen),
            },
            seen,
        )
    }
}

impl<I: 'static> Tube for Recorder<I> {
    type In = I;
    type Out = I;

    fn received(&mut self, item: I) -> Result<Emit<I>, Failure> {
        self.seen.borrow_mut().push(item);
        Ok(Emit::none())
    }
}
