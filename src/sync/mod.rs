pub mod chandy_misra;
pub mod mailbox;
pub mod stats;
pub mod think;
pub mod topology;

pub type PhilosopherId = usize;
/// Fork `r` lies between philosopher `r` and philosopher `(r + 1) % n`
pub type ForkId = usize;

/// Whether a fork has been eaten with since it was last handed over.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mark {
    /// Used, surrendered as soon as a neighbor asks
    Dirty,
    /// Unused since hand-over, kept until its holder has eaten
    Clean,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum State {
    Thinking,
    Hungry,
    Eating,
}

/// What a philosopher believes about one of its two forks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Side {
    Held(Mark),
    /// Not held, a Request for it has been sent
    Requested,
    /// Not held and not asked for
    Away,
}

impl Side {
    pub fn is_held(&self) -> bool {
        matches!(self, Side::Held(_))
    }
}

/// Starvation free fork discipline without shared state.
///
/// The requirements for that are
/// 1. Mutual Exclusion - a fork is recorded as held by at most one of its two philosophers, since it only
/// changes hands through a Grant that the giver sends after forgetting it.
/// 2. No Starvation - a Clean fork is never given up before its holder ate with it, so a hungry philosopher
/// waits for at most one meal per neighbor.
///
/// `Hooks` is the seam to everything outside the protocol: the opaque think and eat steps, and observers
/// of state changes. Every method defaults to doing nothing.
pub trait Hooks: Send + Sync {
    fn think(&self, _i: PhilosopherId) {}
    fn eat(&self, _i: PhilosopherId) {}
    fn transition(&self, _i: PhilosopherId, _state: State) {}
    fn acquired(&self, _i: PhilosopherId, _fork: ForkId) {}
    // Runs before the Grant leaves, so it always precedes the receiver's acquired()
    fn released(&self, _i: PhilosopherId, _fork: ForkId) {}
}

pub struct NoHooks;
impl Hooks for NoHooks {}
