//! the two halves of the connection protocol.
//!
//! Correctly implementing `flow_to`/`flowing_from` means doing the same
//! dance everywhere: record the new peer before notifying it (so the peer
//! can observe the connection), detach the old peer only while it still
//! points back at this node, and check tag compatibility before any state
//! changes. [DownLink] and [UpLink] do those things once, for every fount
//! and drain in the crate.
//!
//! Links own downstream and weakly reference upstream: holding a pipeline's
//! head drain keeps the whole chain alive and no strong cycles exist.

use std::{
    cell::RefCell,
    rc::{Rc, Weak},
};

use super::{
    error::TypeMismatch,
    flow::{AnyFount, Drain, Fount},
    tag::TypeTag,
};

/// Node identity is allocation identity. Fat pointer comparison would also
/// compare vtable pointers, which are not unique across codegen units, so
/// compare thin addresses only.
pub(crate) fn fount_addr<T: 'static>(fount: &Rc<dyn Fount<Out = T>>) -> *const () {
    Rc::as_ptr(fount) as *const ()
}

pub(crate) fn drain_addr<T: 'static>(drain: &Rc<dyn Drain<In = T>>) -> *const () {
    Rc::as_ptr(drain) as *const ()
}

/// tag compatibility: a missing tag on either side is permissive.
pub(crate) fn check_compatible<T: 'static>(
    fount: Option<&Rc<dyn Fount<Out = T>>>,
    input_tag: Option<TypeTag>,
) -> Result<(), TypeMismatch> {
    if let (Some(fount), Some(drain_tag)) = (fount, input_tag) {
        if let Some(fount_tag) = fount.output_tag() {
            if !fount_tag.is_or_extends(&drain_tag) {
                return Err(TypeMismatch {
                    fount: fount_tag,
                    drain: drain_tag,
                });
            }
        }
    }
    Ok(())
}

/// A fount's strong reference to its drain.
pub(crate) struct DownLink<T> {
    slot: RefCell<Option<Rc<dyn Drain<In = T>>>>,
}

impl<T: 'static> DownLink<T> {
    pub(crate) fn new() -> Self {
        Self {
            slot: RefCell::new(None),
        }
    }

    pub(crate) fn get(&self) -> Option<Rc<dyn Drain<In = T>>> {
        self.slot.borrow().clone()
    }

    pub(crate) fn is_attached(&self) -> bool {
        self.slot.borrow().is_some()
    }

    /// The attach half of `flow_to`. `this` is the fount the link belongs
    /// to, as the handle that will be handed to the new drain.
    pub(crate) fn begin_flow_to(
        &self,
        this: Rc<dyn Fount<Out = T>>,
        drain: Option<Rc<dyn Drain<In = T>>>,
    ) -> Result<Option<AnyFount>, TypeMismatch> {
        // check before mutating so a mismatch aborts the connection with
        // both sides in their previous state.
        check_compatible(Some(&this), drain.as_ref().and_then(|d| d.input_tag()))?;

        let old = self.slot.replace(drain.clone());
        if let Some(old) = old {
            let distinct = match drain.as_ref() {
                Some(new) => drain_addr(&old) != drain_addr(new),
                None => true,
            };
            let points_here = distinct
                && old
                    .upstream()
                    .is_some_and(|f| fount_addr(&f) == fount_addr(&this));
            if points_here {
                let _ = old.flowing_from(None);
            }
        }

        match drain {
            None => Ok(None),
            Some(drain) => match drain.flowing_from(Some(this)) {
                Ok(next) => Ok(next),
                Err(e) => {
                    // the drain refused deeper in its chain; don't keep
                    // pointing at a drain that never attached.
                    *self.slot.borrow_mut() = None;
                    Err(e)
                }
            },
        }
    }
}

/// A drain's weak reference to its fount.
pub(crate) struct UpLink<T> {
    slot: RefCell<Option<Weak<dyn Fount<Out = T>>>>,
}

impl<T: 'static> UpLink<T> {
    pub(crate) fn new() -> Self {
        Self {
            slot: RefCell::new(None),
        }
    }

    pub(crate) fn get(&self) -> Option<Rc<dyn Fount<Out = T>>> {
        self.slot.borrow().as_ref().and_then(Weak::upgrade)
    }

    /// The attach half of `flowing_from`. `this_addr` identifies the drain
    /// the link belongs to, for the does-it-still-point-here check.
    pub(crate) fn begin_flowing_from(
        &self,
        this_addr: *const (),
        input_tag: Option<TypeTag>,
        fount: Option<&Rc<dyn Fount<Out = T>>>,
    ) -> Result<(), TypeMismatch> {
        check_compatible(fount, input_tag)?;

        let old = self.slot.replace(fount.map(Rc::downgrade));
        if let Some(old) = old.and_then(|weak| weak.upgrade()) {
            let distinct = match fount {
                Some(new) => fount_addr(&old) != fount_addr(new),
                None => true,
            };
            let points_here = distinct
                && old
                    .downstream()
                    .is_some_and(|d| drain_addr(&d) == this_addr);
            if points_here {
                let _ = old.flow_to(None);
            }
        }
        Ok(())
    }
}
