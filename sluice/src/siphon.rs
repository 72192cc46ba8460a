//! the engine: adapt a [Tube] into a connected (drain, fount) pair.
//!
//! A siphon owns the tube and does everything a stage author should not
//! have to: buffer output the downstream is not ready for, propagate pause
//! tokens upstream while paused, deliver asynchronously settled outputs in
//! issue order, run `started`/`stopped` exactly once, and tolerate being
//! re-entered from inside its own deliveries.
//!
//! The two public halves, [SiphonDrain] facing upstream and [SiphonFount]
//! facing downstream, are thin handles over one shared core, the same way
//! a body channel shares its inner state between sender and receiver.

use std::{
    cell::{Cell, OnceCell, RefCell},
    fmt::{self, Debug, Formatter},
    rc::{Rc, Weak},
};

use tracing::error;

use super::{
    error::{Failure, Stop, TypeMismatch},
    flow::{AnyFount, Drain, Fount},
    link::{DownLink, UpLink},
    oneshot,
    pause::{Pause, Pauser},
    tag::TypeTag,
    tube::{Emit, Output, Tube},
};

pub(crate) type PendingIter<T> = Box<dyn Iterator<Item = Output<T>>>;

/// Consume an engine-held pause token, if one is held.
pub(crate) fn release(token: Option<Pause>) {
    if let Some(mut token) = token {
        token
            .unpause()
            .expect("engine held pause tokens are consumed exactly once");
    }
}

pub(crate) struct SiphonCore<T: Tube> {
    tube: RefCell<T>,
    weak_self: Weak<SiphonCore<T>>,
    /// the stable downstream facing half handed to peers; owned here so it
    /// lives exactly as long as the siphon does.
    fount_half: OnceCell<Rc<SiphonFount<T>>>,
    uplink: UpLink<T::In>,
    downlink: DownLink<T::Out>,
    /// pauser behind [SiphonFount::pause_flow].
    pauser: Pauser,
    /// at most one lazy output sequence being drained downstream.
    pending: RefCell<Option<PendingIter<T::Out>>>,
    currently_paused: Cell<bool>,
    unbuffering: Cell<bool>,
    ever_started: Cell<bool>,
    flow_was_stopped: Cell<bool>,
    /// upstream ended; delivered downstream once the pending iterator runs dry.
    stop_reason: RefCell<Option<Stop>>,
    /// held against the upstream while we are currently paused.
    upstream_pause: RefCell<Option<Pause>>,
    /// held against our own fount while pending items exist with no drain.
    no_drain_pause: RefCell<Option<Pause>>,
}

impl<T: Tube + 'static> SiphonCore<T> {
    fn new(tube: T) -> Rc<Self> {
        let core = Rc::new_cyclic(|weak: &Weak<SiphonCore<T>>| {
            let pause_weak = weak.clone();
            let resume_weak = weak.clone();
            SiphonCore {
                tube: RefCell::new(tube),
                weak_self: weak.clone(),
                fount_half: OnceCell::new(),
                uplink: UpLink::new(),
                downlink: DownLink::new(),
                pauser: Pauser::new(
                    move || {
                        if let Some(core) = pause_weak.upgrade() {
                            core.actually_pause();
                        }
                    },
                    move || {
                        if let Some(core) = resume_weak.upgrade() {
                            core.actually_resume();
                        }
                    },
                ),
                pending: RefCell::new(None),
                currently_paused: Cell::new(false),
                unbuffering: Cell::new(false),
                ever_started: Cell::new(false),
                flow_was_stopped: Cell::new(false),
                stop_reason: RefCell::new(None),
                upstream_pause: RefCell::new(None),
                no_drain_pause: RefCell::new(None),
            }
        });
        let fount = Rc::new(SiphonFount {
            core: Rc::downgrade(&core),
        });
        let _ = core.fount_half.set(fount);
        core
    }

    fn fount(&self) -> Rc<SiphonFount<T>> {
        Rc::clone(
            self.fount_half
                .get()
                .expect("siphon fount half is set at construction"),
        )
    }

    pub(crate) fn upstream(&self) -> Option<Rc<dyn Fount<Out = T::In>>> {
        self.uplink.get()
    }

    pub(crate) fn take_pending(&self) -> Option<PendingIter<T::Out>> {
        self.pending.borrow_mut().take()
    }

    pub(crate) fn with_tube<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        f(&mut self.tube.borrow_mut())
    }

    /// first pause: remember we are paused and pass the pressure upstream.
    fn actually_pause(&self) {
        self.currently_paused.set(true);
        let Some(upstream) = self.uplink.get() else {
            return;
        };
        if self.upstream_pause.borrow().is_none() {
            let token = upstream.pause_flow();
            *self.upstream_pause.borrow_mut() = Some(token);
        }
    }

    /// last resume: deliver what queued up, and only if that did not pause
    /// us again let the upstream go as well.
    fn actually_resume(&self) {
        self.currently_paused.set(false);
        self.unbuffer_iterator();
        if self.currently_paused.get() {
            return;
        }
        // take before releasing: the unpause can re-enter this core.
        let held = self.upstream_pause.borrow_mut().take();
        release(held);
    }

    /// Run one tube event and queue whatever it produced.
    fn deliver_from(&self, source: impl FnOnce(&mut T) -> Result<Emit<T::Out>, Failure>) {
        assert!(
            self.pending.borrow().is_none(),
            "tube event delivered while a pending iterator is still draining"
        );
        let produced = source(&mut self.tube.borrow_mut());
        let emit = match produced {
            Ok(emit) => emit,
            Err(e) => {
                error!(target: "siphon", error = %e, "tube failed while producing output");
                if let Some(upstream) = self.uplink.get() {
                    upstream.stop_flow();
                }
                if let Some(downstream) = self.downlink.get() {
                    downstream.flow_stopped(Stop::Failed(e));
                }
                return;
            }
        };
        let Some(iter) = emit.into_pending() else {
            return;
        };
        *self.pending.borrow_mut() = Some(iter);
        if !self.downlink.is_attached() && self.no_drain_pause.borrow().is_none() {
            let token = self.pauser.pause();
            *self.no_drain_pause.borrow_mut() = Some(token);
        }
        self.unbuffer_iterator();
    }

    /// put `output` back at the front of the pending iterator so it is the
    /// very next thing delivered.
    fn push_back(&self, output: Output<T::Out>) {
        let mut slot = self.pending.borrow_mut();
        let head = std::iter::once(output);
        *slot = Some(match slot.take() {
            Some(rest) => Box::new(head.chain(rest)),
            None => Box::new(head),
        });
    }

    /// Drain the pending iterator into the downstream for as long as we are
    /// not paused. Reentrancy guarded: nested calls return immediately and
    /// the outer loop observes whatever they changed.
    fn unbuffer_iterator(&self) {
        enum Step<V> {
            Exhausted,
            Deliver(V),
            Wait(oneshot::Receiver<V>),
        }

        if self.unbuffering.get() {
            return;
        }
        self.unbuffering.set(true);
        while !self.currently_paused.get() {
            let step = {
                let mut slot = self.pending.borrow_mut();
                match slot.as_mut().map(|iter| iter.next()) {
                    None => Step::Exhausted,
                    Some(None) => {
                        *slot = None;
                        Step::Exhausted
                    }
                    Some(Some(Output::Now(value))) => Step::Deliver(value),
                    Some(Some(Output::Later(rx))) => Step::Wait(rx),
                }
            };
            match step {
                Step::Exhausted => {
                    if let Some(downstream) = self.downlink.get() {
                        let reason = self.stop_reason.borrow_mut().take();
                        if let Some(reason) = reason {
                            downstream.flow_stopped(reason);
                        }
                    }
                    break;
                }
                Step::Deliver(value) => match self.downlink.get() {
                    Some(downstream) => downstream.receive(value),
                    None => {
                        // drain detached mid flow; keep the item and hold
                        // pressure until a new one shows up.
                        self.push_back(Output::Now(value));
                        if self.no_drain_pause.borrow().is_none() {
                            let token = self.pauser.pause();
                            *self.no_drain_pause.borrow_mut() = Some(token);
                        }
                        break;
                    }
                },
                Step::Wait(rx) => {
                    // halt delivery until the placeholder settles, then make
                    // its value the next item out so issue order is kept.
                    let token = self.pauser.pause();
                    let weak = self.weak_self.clone();
                    rx.on_settled(move |settled| {
                        match settled {
                            Ok(value) => {
                                if let Some(core) = weak.upgrade() {
                                    core.push_back(Output::Now(value));
                                }
                            }
                            Err(e) => {
                                error!(
                                    target: "siphon",
                                    error = %e,
                                    "async output failed; continuing with remaining items"
                                );
                            }
                        }
                        release(Some(token));
                    });
                }
            }
        }
        self.unbuffering.set(false);
    }
}

/// The upstream facing half of a siphon: the [Drain] that feeds the tube.
///
/// Created with [SiphonDrain::new]; the downstream facing [SiphonFount] is
/// reached through [SiphonDrain::fount] or by letting `flowing_from` return
/// it during connection.
pub struct SiphonDrain<T: Tube> {
    core: Rc<SiphonCore<T>>,
}

impl<T: Tube + 'static> SiphonDrain<T> {
    /// adapt `tube` into a drain/fount pair.
    pub fn new(tube: T) -> Rc<Self> {
        Rc::new(Self {
            core: SiphonCore::new(tube),
        })
    }

    /// the downstream facing half of this siphon.
    pub fn fount(&self) -> Rc<SiphonFount<T>> {
        self.core.fount()
    }

    /// this drain as a trait object, for connection calls.
    pub fn erased(self: &Rc<Self>) -> Rc<dyn Drain<In = T::In>> {
        Rc::clone(self) as Rc<dyn Drain<In = T::In>>
    }

    pub(crate) fn core(&self) -> &SiphonCore<T> {
        &self.core
    }
}

impl<T: Tube + 'static> Drain for SiphonDrain<T> {
    type In = T::In;

    fn input_tag(&self) -> Option<TypeTag> {
        self.core.tube.borrow().input_tag()
    }

    fn upstream(&self) -> Option<Rc<dyn Fount<Out = T::In>>> {
        self.core.uplink.get()
    }

    fn flowing_from(
        self: Rc<Self>,
        fount: Option<Rc<dyn Fount<Out = T::In>>>,
    ) -> Result<Option<AnyFount>, TypeMismatch> {
        let core = Rc::clone(&self.core);
        let this_addr = Rc::as_ptr(&self) as *const ();
        core.uplink
            .begin_flowing_from(this_addr, self.input_tag(), fount.as_ref())?;

        // a stop requested before any upstream existed applies to the new one.
        if core.flow_was_stopped.get() {
            if let Some(fount) = fount.as_ref() {
                fount.stop_flow();
            }
        }

        // pressure held against the old upstream migrates to the new one;
        // acquire the replacement before letting the old fount go.
        let held = core.upstream_pause.borrow_mut().take();
        if let Some(old) = held {
            let fresh = match fount.as_ref() {
                Some(fount) => fount.pause_flow(),
                None => Pause::placeholder(),
            };
            *core.upstream_pause.borrow_mut() = Some(fresh);
            release(Some(old));
        }

        if fount.is_some() && !core.ever_started.get() {
            core.ever_started.set(true);
            core.deliver_from(|tube| tube.started());
        }

        let next_fount = core.fount();
        match core.downlink.get() {
            None => Ok(Some(AnyFount::erase(
                next_fount as Rc<dyn Fount<Out = T::Out>>,
            ))),
            Some(next_drain) => {
                (next_fount as Rc<dyn Fount<Out = T::Out>>).flow_to(Some(next_drain))
            }
        }
    }

    fn receive(&self, item: T::In) {
        self.core.deliver_from(move |tube| tube.received(item));
    }

    fn flow_stopped(&self, reason: Stop) {
        *self.core.stop_reason.borrow_mut() = Some(reason.clone());
        self.core.deliver_from(move |tube| tube.stopped(&reason));
    }
}

impl<T: Tube> Debug for SiphonDrain<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "SiphonDrain<{}>", std::any::type_name::<T>())
    }
}

/// The downstream facing half of a siphon: the [Fount] that emits what the
/// tube produced.
pub struct SiphonFount<T: Tube> {
    core: Weak<SiphonCore<T>>,
}

impl<T: Tube + 'static> SiphonFount<T> {
    /// this fount as a trait object, for connection calls.
    pub fn erased(self: &Rc<Self>) -> Rc<dyn Fount<Out = T::Out>> {
        Rc::clone(self) as Rc<dyn Fount<Out = T::Out>>
    }
}

impl<T: Tube + 'static> Fount for SiphonFount<T> {
    type Out = T::Out;

    fn output_tag(&self) -> Option<TypeTag> {
        self.core
            .upgrade()
            .and_then(|core| core.tube.borrow().output_tag())
    }

    fn downstream(&self) -> Option<Rc<dyn Drain<In = T::Out>>> {
        self.core.upgrade().and_then(|core| core.downlink.get())
    }

    fn flow_to(
        self: Rc<Self>,
        drain: Option<Rc<dyn Drain<In = T::Out>>>,
    ) -> Result<Option<AnyFount>, TypeMismatch> {
        let Some(core) = self.core.upgrade() else {
            return Ok(None);
        };
        let attaching = drain.is_some();
        let result = core
            .downlink
            .begin_flow_to(self as Rc<dyn Fount<Out = T::Out>>, drain);
        if attaching && result.is_ok() {
            // there is a drain to deliver to now; let anything queued while
            // there was none go out. take before releasing: the unpause can
            // re-enter this core.
            let held = core.no_drain_pause.borrow_mut().take();
            release(held);
            core.unbuffer_iterator();
        }
        result
    }

    fn pause_flow(&self) -> Pause {
        match self.core.upgrade() {
            Some(core) => core.pauser.pause(),
            None => Pause::placeholder(),
        }
    }

    fn stop_flow(&self) {
        let Some(core) = self.core.upgrade() else {
            return;
        };
        core.flow_was_stopped.set(true);
        // discarding buffered items is intentional: downstream asked us to
        // shut up.
        *core.pending.borrow_mut() = None;
        if let Some(upstream) = core.uplink.get() {
            upstream.stop_flow();
        }
    }
}

impl<T: Tube> Debug for SiphonFount<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "SiphonFount<{}>", std::any::type_name::<T>())
    }
}
