//! reference counted pausing.

use std::{
    cell::Cell,
    fmt::{self, Debug, Formatter},
    rc::Rc,
};

/// A second `unpause` on the same [Pause] token. Programmer error; the first
/// call already released the token's interest in keeping things paused.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct AlreadyUnpaused;

impl Debug for AlreadyUnpaused {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str("AlreadyUnpaused")
    }
}

impl fmt::Display for AlreadyUnpaused {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str("pause token was already consumed by a previous unpause")
    }
}

impl std::error::Error for AlreadyUnpaused {}

struct Shared {
    pauses: Cell<usize>,
    on_first_pause: Box<dyn Fn()>,
    on_last_resume: Box<dyn Fn()>,
}

/// Multiple parties may be interested in suppressing some ongoing activity,
/// each for their own purposes. A `Pauser` counts those interests and turns
/// them into exactly one `on_first_pause`/`on_last_resume` callback pair on
/// the 0→1 and 1→0 transitions.
pub struct Pauser {
    shared: Rc<Shared>,
}

impl Pauser {
    /// Construct with the two transition callbacks. Callbacks must not fail;
    /// they run synchronously inside [Pauser::pause] and [Pause::unpause].
    pub fn new<P, R>(on_first_pause: P, on_last_resume: R) -> Self
    where
        P: Fn() + 'static,
        R: Fn() + 'static,
    {
        Self {
            shared: Rc::new(Shared {
                pauses: Cell::new(0),
                on_first_pause: Box::new(on_first_pause),
                on_last_resume: Box::new(on_last_resume),
            }),
        }
    }

    /// Register one interest in staying paused and get the token that
    /// releases it.
    pub fn pause(&self) -> Pause {
        if self.shared.pauses.get() == 0 {
            (self.shared.on_first_pause)();
        }
        self.shared.pauses.set(self.shared.pauses.get() + 1);
        Pause(State::Live(Rc::clone(&self.shared)))
    }

    /// How many tokens are outstanding.
    pub fn pauses(&self) -> usize {
        self.shared.pauses.get()
    }
}

impl Debug for Pauser {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pauser").field("pauses", &self.pauses()).finish()
    }
}

enum State {
    Live(Rc<Shared>),
    Placeholder,
    Spent,
}

/// One party's interest in keeping something paused. Consumed exactly once
/// by [Pause::unpause]; dropping an unconsumed token keeps the pause held
/// forever.
pub struct Pause(State);

impl Pause {
    /// A token not backed by any [Pauser]; its `unpause` is always a no-op.
    /// Used to hold the shape of "a pause against the upstream" when there
    /// is no upstream to pause.
    pub fn placeholder() -> Self {
        Self(State::Placeholder)
    }

    /// Release this token's interest. When it is the last outstanding token
    /// the pauser's `on_last_resume` runs before this returns.
    pub fn unpause(&mut self) -> Result<(), AlreadyUnpaused> {
        match std::mem::replace(&mut self.0, State::Spent) {
            State::Live(shared) => {
                shared.pauses.set(shared.pauses.get() - 1);
                if shared.pauses.get() == 0 {
                    (shared.on_last_resume)();
                }
                Ok(())
            }
            State::Placeholder => {
                self.0 = State::Placeholder;
                Ok(())
            }
            State::Spent => Err(AlreadyUnpaused),
        }
    }
}

impl Debug for Pause {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self.0 {
            State::Live(_) => f.write_str("Pause(live)"),
            State::Placeholder => f.write_str("Pause(placeholder)"),
            State::Spent => f.write_str("Pause(spent)"),
        }
    }
}
