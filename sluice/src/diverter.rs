//! mid stream re-plumbing.

use std::{
    fmt::{self, Debug, Formatter},
    rc::Rc,
};

use tracing::error;

use super::{
    error::Failure,
    flow::{Drain, Fount},
    pause::Pause,
    siphon::{release, SiphonDrain},
    tube::{Divertable, Emit, Output, Tube},
};

/// Wraps a [Divertable] tube's siphon and adds one operation: [divert],
/// which hands the upstream fount over to a different downstream without
/// losing output the old downstream never consumed.
///
/// This is what lets a protocol parser decide mid stream that a prefix of
/// bytes was for it and the rest belongs verbatim to someone else (a
/// STARTTLS or websocket upgrade, say).
///
/// Diversion only makes sense for tubes whose input and output are the same
/// type: after the hand over the new downstream sees raw upstream items.
///
/// [divert]: Diverter::divert
pub struct Diverter<T: Tube> {
    siphon: Rc<SiphonDrain<T>>,
}

impl<I, T> Diverter<T>
where
    I: 'static,
    T: Divertable + Tube<In = I, Out = I> + 'static,
{
    pub fn new(tube: T) -> Self {
        Self {
            siphon: SiphonDrain::new(tube),
        }
    }

    /// the wrapped siphon's drain; connect the upstream here.
    pub fn drain(&self) -> Rc<dyn Drain<In = I>> {
        self.siphon.erased()
    }

    /// Re-plumb the upstream fount onto `drain`.
    ///
    /// Any outputs still buffered in the siphon are taken back, passed
    /// through the tube's `reassemble`, and flushed into `drain` first;
    /// the upstream stays paused until that flush completes, then flows
    /// directly to `drain` from that point on.
    ///
    /// # Panics
    ///
    /// Panics when no upstream fount is attached; there is nothing to
    /// divert.
    pub fn divert(&self, drain: Rc<dyn Drain<In = I>>) {
        let core = self.siphon.core();
        let upstream = core
            .upstream()
            .expect("diverting a flow that has no upstream fount");

        // outputs produced but never consumed go through reassemble; a
        // siphon with nothing pending has nothing to reassemble.
        let reassembled = match core.take_pending() {
            Some(pending) => {
                let unspent: Vec<Output<I>> = pending.collect();
                core.with_tube(|tube| tube.reassemble(unspent))
            }
            None => Vec::new(),
        };

        // hold the upstream still while the reassembled prefix drains.
        let hang_on = upstream.pause_flow();
        let draining = SiphonDrain::new(DrainingTube {
            items: Some(reassembled),
            handoff: Some(Handoff {
                upstream: Rc::clone(&upstream),
                downstream: Rc::clone(&drain),
                hang_on,
            }),
        });

        if let Err(e) = draining.fount().erased().flow_to(Some(drain)) {
            error!(target: "diverter", error = %e, "new downstream refused the diverted flow");
            return;
        }
        if let Err(e) = upstream.flow_to(Some(draining.erased())) {
            error!(target: "diverter", error = %e, "upstream refused the draining stage");
        }
    }
}

impl<T: Tube> Debug for Diverter<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "Diverter<{}>", std::any::type_name::<T>())
    }
}

struct Handoff<I: 'static> {
    upstream: Rc<dyn Fount<Out = I>>,
    downstream: Rc<dyn Drain<In = I>>,
    hang_on: Pause,
}

/// The internal stage that flushes reassembled output and then gets out of
/// the way: its `started` yields the reassembled items in order, and at
/// exhaustion re-plumbs the upstream directly onto the new downstream and
/// releases the pause taken at construction.
struct DrainingTube<I: 'static> {
    items: Option<Vec<Output<I>>>,
    handoff: Option<Handoff<I>>,
}

impl<I: 'static> Tube for DrainingTube<I> {
    type In = I;
    type Out = I;

    fn started(&mut self) -> Result<Emit<I>, Failure> {
        Ok(Emit::outputs(DrainThen {
            items: self.items.take().unwrap_or_default().into_iter(),
            handoff: self.handoff.take(),
        }))
    }

    fn received(&mut self, item: I) -> Result<Emit<I>, Failure> {
        // the upstream is paused for this stage's whole life; nothing should
        // arrive, but passing it through loses nothing if it does.
        Ok(Emit::one(item))
    }
}

struct DrainThen<I: 'static> {
    items: std::vec::IntoIter<Output<I>>,
    handoff: Option<Handoff<I>>,
}

impl<I: 'static> Iterator for DrainThen<I> {
    type Item = Output<I>;

    fn next(&mut self) -> Option<Output<I>> {
        match self.items.next() {
            Some(output) => Some(output),
            None => {
                if let Some(handoff) = self.handoff.take() {
                    if let Err(e) = handoff.upstream.flow_to(Some(handoff.downstream)) {
                        error!(
                            target: "diverter",
                            error = %e,
                            "re-plumbing the upstream after draining failed"
                        );
                    }
                    release(Some(handoff.hang_on));
                }
                None
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    use std::cell::RefCell;

    use crate::{
        series::series,
        test_util::{FakeBufferFount, FakeDrain, FakeFount},
    };

    type Item = &'static str;

    /// identity tube that can give buffered output back unchanged.
    struct SwitchablePassthru;

    impl Tube for SwitchablePassthru {
        type In = Item;
        type Out = Item;

        fn received(&mut self, item: Item) -> Result<Emit<Item>, Failure> {
            Ok(Emit::one(item))
        }
    }

    impl Divertable for SwitchablePassthru {
        fn reassemble(&mut self, remaining: Vec<Output<Item>>) -> Vec<Output<Item>> {
            remaining
        }
    }

    /// prefixes everything it forwards, so tests can see which side of the
    /// diversion an item travelled through.
    struct Switchee(&'static str);

    impl Tube for Switchee {
        type In = Item;
        type Out = String;

        fn received(&mut self, item: Item) -> Result<Emit<String>, Failure> {
            Ok(Emit::one(format!("{} {item}", self.0)))
        }
    }

    /// diverts its diverter on a trigger item, consuming the trigger.
    struct Switcher {
        diverter: Rc<Diverter<SwitchablePassthru>>,
        target: RefCell<Option<Rc<dyn Drain<In = Item>>>>,
        seen: Rc<RefCell<Vec<Item>>>,
    }

    impl Tube for Switcher {
        type In = Item;
        type Out = Item;

        fn received(&mut self, item: Item) -> Result<Emit<Item>, Failure> {
            self.seen.borrow_mut().push(item);
            let target = self.target.borrow_mut().take().expect("one trigger only");
            self.diverter.divert(target);
            Ok(Emit::none())
        }
    }

    #[test]
    fn diversion_reroutes_the_rest_of_the_flow() {
        let ff = FakeFount::new();
        let capture = FakeDrain::new();
        let seen = Rc::new(RefCell::new(Vec::new()));

        let diverter = Rc::new(Diverter::new(SwitchablePassthru));
        let switchee_chain = series(Switchee("switched"))
            .to_drain(capture.erased())
            .unwrap();
        let switcher_chain = series(Switcher {
            diverter: Rc::clone(&diverter),
            target: RefCell::new(Some(switchee_chain)),
            seen: Rc::clone(&seen),
        });

        let first_drain = diverter.drain();
        ff.erased()
            .flow_to(Some(Rc::clone(&first_drain)))
            .unwrap()
            .unwrap()
            .downcast::<Item>()
            .ok()
            .unwrap()
            .flow_to(Some(switcher_chain.drain()))
            .unwrap();

        first_drain.receive("switch");
        ff.downstream().unwrap().receive("to switchee");

        assert_eq!(*seen.borrow(), ["switch"]);
        assert_eq!(*capture.received.borrow(), ["switched to switchee"]);
    }

    /// splits on the literal "BORK" and marks the split points on
    /// reassembly.
    struct Borker;

    impl Tube for Borker {
        type In = Item;
        type Out = Item;

        fn received(&mut self, item: Item) -> Result<Emit<Item>, Failure> {
            Ok(Emit::items(item.split("BORK").collect::<Vec<_>>()))
        }
    }

    impl Divertable for Borker {
        fn reassemble(&mut self, remaining: Vec<Output<Item>>) -> Vec<Output<Item>> {
            remaining
                .into_iter()
                .flat_map(|output| [Output::Now("(bork was here)"), output])
                .collect()
        }
    }

    /// like [Switcher] but for a [Borker] diverter.
    struct BorkSwitcher {
        diverter: Rc<Diverter<Borker>>,
        target: RefCell<Option<Rc<dyn Drain<In = Item>>>>,
        seen: Rc<RefCell<Vec<Item>>>,
    }

    impl Tube for BorkSwitcher {
        type In = Item;
        type Out = Item;

        fn received(&mut self, item: Item) -> Result<Emit<Item>, Failure> {
            self.seen.borrow_mut().push(item);
            let target = self.target.borrow_mut().take().expect("one trigger only");
            self.diverter.divert(target);
            Ok(Emit::none())
        }
    }

    #[test]
    fn unconsumed_output_is_reassembled_for_the_new_downstream() {
        let ff = FakeFount::new();
        let capture = FakeDrain::new();
        let seen = Rc::new(RefCell::new(Vec::new()));

        let diverter = Rc::new(Diverter::new(Borker));
        let switchee_chain = series(Switchee("switched"))
            .to_drain(capture.erased())
            .unwrap();
        let switcher_chain = series(BorkSwitcher {
            diverter: Rc::clone(&diverter),
            target: RefCell::new(Some(switchee_chain)),
            seen: Rc::clone(&seen),
        });

        let first_drain = diverter.drain();
        ff.erased()
            .flow_to(Some(Rc::clone(&first_drain)))
            .unwrap()
            .unwrap()
            .downcast::<Item>()
            .ok()
            .unwrap()
            .flow_to(Some(switcher_chain.drain()))
            .unwrap();

        first_drain.receive("beforeBORKto switchee");

        assert_eq!(*seen.borrow(), ["before"]);
        assert_eq!(
            *capture.received.borrow(),
            ["switched (bork was here)", "switched to switchee"]
        );
    }

    /// identity tube over owned strings, divertable.
    struct StringPassthru;

    impl Tube for StringPassthru {
        type In = String;
        type Out = String;

        fn received(&mut self, item: String) -> Result<Emit<String>, Failure> {
            Ok(Emit::one(item))
        }
    }

    impl Divertable for StringPassthru {
        fn reassemble(&mut self, remaining: Vec<Output<String>>) -> Vec<Output<String>> {
            remaining
        }
    }

    struct StringSwitchee;

    impl Tube for StringSwitchee {
        type In = String;
        type Out = String;

        fn received(&mut self, item: String) -> Result<Emit<String>, Failure> {
            Ok(Emit::one(format!("switched({item})")))
        }
    }

    /// An upstream stage that diverts its own downstream mid output: items
    /// yielded after the trigger must already travel the new route. The
    /// replacement chain is built at diversion time, taking the capture
    /// drain over from the old route.
    struct InlineSwitcher {
        diverter: Rc<Diverter<StringPassthru>>,
        capture: Rc<FakeDrain<String>>,
    }

    impl Tube for InlineSwitcher {
        type In = String;
        type Out = String;

        fn received(&mut self, item: String) -> Result<Emit<String>, Failure> {
            if item == "switch" {
                let diverter = Rc::clone(&self.diverter);
                let capture = Rc::clone(&self.capture);
                Ok(Emit::outputs(
                    std::iter::once(Output::Now("switching".to_string())).chain(
                        std::iter::once_with(move || {
                            let target = series(StringSwitchee)
                                .to_drain(capture.erased())
                                .unwrap();
                            diverter.divert(target);
                            Output::Now("switched".to_string())
                        }),
                    ),
                ))
            } else {
                Ok(Emit::one(item))
            }
        }
    }

    #[test]
    fn diverting_mid_output_reroutes_the_remaining_outputs() {
        let ff = FakeFount::new();
        let capture = FakeDrain::new();

        let diverter = Rc::new(Diverter::new(StringPassthru));
        let head = series(InlineSwitcher {
            diverter: Rc::clone(&diverter),
            capture: Rc::clone(&capture),
        });

        // head stage -> divertable passthru -> capture
        head.fount()
            .flow_to(Some(diverter.drain()))
            .unwrap()
            .unwrap()
            .downcast::<String>()
            .ok()
            .unwrap()
            .flow_to(Some(capture.erased()))
            .unwrap();
        ff.erased().flow_to(Some(head.drain())).unwrap();

        for item in ["before", "switch", "after"] {
            head.drain().receive(item.to_string());
        }
        assert_eq!(
            *capture.received.borrow(),
            [
                "before",
                "switching",
                "switched(switched)",
                "switched(after)",
            ]
        );
    }

    /// a synchronously resuming fount keeps feeding the new route after the
    /// diversion happened inside one of its own deliveries.
    #[test]
    fn diversion_during_a_buffered_delivery_reroutes_the_rest() {
        let ff = FakeBufferFount::new();
        let capture = FakeDrain::new();
        let seen = Rc::new(RefCell::new(Vec::new()));

        let diverter = Rc::new(Diverter::new(SwitchablePassthru));
        let switchee_chain = series(Switchee("switched"))
            .to_drain(capture.erased())
            .unwrap();
        let switcher_chain = series(Switcher {
            diverter: Rc::clone(&diverter),
            target: RefCell::new(Some(switchee_chain)),
            seen: Rc::clone(&seen),
        });

        let first_drain = diverter.drain();
        ff.buffer_up("switch");
        ff.buffer_up("after");
        Rc::clone(&ff)
            .flow_to(Some(Rc::clone(&first_drain)))
            .unwrap()
            .unwrap()
            .downcast::<Item>()
            .ok()
            .unwrap()
            .flow_to(Some(switcher_chain.drain()))
            .unwrap();

        assert_eq!(*seen.borrow(), ["switch"]);
        assert_eq!(*capture.received.borrow(), ["switched after"]);
        assert!(ff.buffer.borrow().is_empty());
        assert!(!ff.flow_is_stopped.get());
    }
}
