//! one shot settlement channel used as the asynchronous placeholder.
//!
//! A tube that cannot produce an output synchronously yields
//! [Output::Later](crate::Output::Later) holding the [Receiver]; whoever
//! completes the work settles the [Sender] on the same thread that drives
//! the pipeline. The engine only needs callback delivery; the receiver also
//! implements [Future] so hosts can await one directly.

use std::{
    cell::RefCell,
    fmt::{self, Debug, Formatter},
    future::Future,
    pin::Pin,
    rc::Rc,
    task::{Context, Poll, Waker},
};

use super::error::{failure, Failure};

/// The sender side was dropped without settling.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct SenderDropped;

impl Debug for SenderDropped {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str("SenderDropped")
    }
}

impl fmt::Display for SenderDropped {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str("one shot sender dropped without settling")
    }
}

impl std::error::Error for SenderDropped {}

type Callback<T> = Box<dyn FnOnce(Result<T, Failure>)>;

enum Inner<T> {
    Waiting {
        callback: Option<Callback<T>>,
        waker: Option<Waker>,
    },
    Settled(Result<T, Failure>),
    Consumed,
}

/// construct a connected sender/receiver pair.
pub fn channel<T>() -> (Sender<T>, Receiver<T>) {
    let inner = Rc::new(RefCell::new(Inner::Waiting {
        callback: None,
        waker: None,
    }));
    (Sender(Rc::clone(&inner)), Receiver(inner))
}

/// Producer half. Settles exactly once with a value or a failure.
pub struct Sender<T>(Rc<RefCell<Inner<T>>>);

impl<T> Sender<T> {
    /// settle with a value.
    pub fn resolve(self, value: T) {
        self.settle(Ok(value));
    }

    /// settle with a failure.
    pub fn reject(self, error: Failure) {
        self.settle(Err(error));
    }

    fn settle(&self, result: Result<T, Failure>) {
        let state = std::mem::replace(&mut *self.0.borrow_mut(), Inner::Consumed);
        match state {
            Inner::Waiting {
                callback: Some(callback),
                waker,
            } => {
                if let Some(waker) = waker {
                    waker.wake();
                }
                // the receiver asked for callback delivery; run it now, with
                // the inner borrow already released.
                callback(result);
            }
            Inner::Waiting { callback: None, waker } => {
                *self.0.borrow_mut() = Inner::Settled(result);
                if let Some(waker) = waker {
                    waker.wake();
                }
            }
            // second settle is unreachable: resolve/reject take self by value.
            state => *self.0.borrow_mut() = state,
        }
    }
}

impl<T> Drop for Sender<T> {
    fn drop(&mut self) {
        // a sender abandoned before settling must not hang the pipeline.
        if matches!(&*self.0.borrow(), Inner::Waiting { .. }) {
            self.settle(Err(failure(SenderDropped)));
        }
    }
}

impl<T> Debug for Sender<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str("oneshot::Sender")
    }
}

/// Consumer half.
pub struct Receiver<T>(Rc<RefCell<Inner<T>>>);

impl<T> Receiver<T> {
    /// Deliver the settlement to `callback`: immediately when already
    /// settled, otherwise as soon as the sender settles.
    pub fn on_settled(self, callback: impl FnOnce(Result<T, Failure>) + 'static) {
        let state = std::mem::replace(&mut *self.0.borrow_mut(), Inner::Consumed);
        match state {
            Inner::Waiting { waker, .. } => {
                *self.0.borrow_mut() = Inner::Waiting {
                    callback: Some(Box::new(callback)),
                    waker,
                };
            }
            Inner::Settled(result) => callback(result),
            Inner::Consumed => {}
        }
    }
}

impl<T> Future for Receiver<T> {
    type Output = Result<T, Failure>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut inner = self.0.borrow_mut();
        match &mut *inner {
            Inner::Waiting { waker, .. } => {
                *waker = Some(cx.waker().clone());
                Poll::Pending
            }
            Inner::Settled(_) => match std::mem::replace(&mut *inner, Inner::Consumed) {
                Inner::Settled(result) => Poll::Ready(result),
                _ => unreachable!("receiver state changed during poll"),
            },
            Inner::Consumed => panic!("oneshot::Receiver polled after completion"),
        }
    }
}

impl<T> Debug for Receiver<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let state = match &*self.0.borrow() {
            Inner::Waiting { .. } => "waiting",
            Inner::Settled(_) => "settled",
            Inner::Consumed => "consumed",
        };
        write!(f, "oneshot::Receiver({state})")
    }
}
