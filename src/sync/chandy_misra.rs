use std::{
    collections::VecDeque,
    sync::Arc,
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use tracing::{debug, error, info, trace};

use super::mailbox::{stop_signal, Envelope, Mailbox, Message, Postman, Received, Stop, StopHandle};
use super::stats::Stats;
use super::topology::Seating;
use super::{ForkId, Hooks, Mark, PhilosopherId, Side, State};
use crate::error::{Error, ProtocolViolation};

// One of the two forks next to a philosopher
#[derive(Clone, Copy, Debug)]
struct Place {
    fork: ForkId,
    neighbor: PhilosopherId,
    side: Side,
}

enum Wait {
    Ready,
    Stopped,
}

/// Chandy-Misra philosopher. Knows only its own two forks and negotiates for them by mail.
///
/// 1. A Dirty fork is given up as soon as a neighbor requests it, and is cleaned on the way.
/// 2. A Clean fork is kept and the request deferred until its holder has eaten with it.
/// 3. Eating dirties both forks, after which every deferred request is granted.
///
/// A hungry philosopher that gives up a Dirty fork asks for it back in the same breath, so a request
/// is never lost. Clean forks only ever sit with hungry philosophers, which is what bounds how often a
/// neighbor can overtake.
pub struct Philosopher<H> {
    id: PhilosopherId,
    state: State,
    left: Place,
    right: Place,
    deferred: VecDeque<ForkId>,
    mailbox: Mailbox,
    postman: Postman,
    stop: Stop,
    stopper: StopHandle,
    hooks: Arc<H>,
    stats: Arc<Stats>,
    alarm: Option<Sender<ProtocolViolation>>,
}

/// A philosopher's own record, as it stood when it was taken.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Snapshot {
    pub id: PhilosopherId,
    pub state: State,
    pub left: (ForkId, Side),
    pub right: (ForkId, Side),
    pub deferred: Vec<ForkId>,
}

impl Snapshot {
    pub fn held(&self) -> impl Iterator<Item = ForkId> {
        [self.left, self.right]
            .into_iter()
            .filter(|(_, side)| side.is_held())
            .map(|(fork, _)| fork)
    }
}

impl<H: Hooks + 'static> Philosopher<H> {
    pub fn new(
        seating: Seating,
        mailbox: Mailbox,
        postman: Postman,
        hooks: Arc<H>,
        stats: Arc<Stats>,
    ) -> Self {
        assert_eq!(
            mailbox.owner(),
            seating.id,
            "Expect the mailbox of philosopher {} to be wired to its seat",
            seating.id
        );
        let (stopper, stop) = stop_signal();
        Self {
            id: seating.id,
            state: State::Thinking,
            left: Place {
                fork: seating.left_fork,
                neighbor: seating.left_neighbor,
                side: seating.left,
            },
            right: Place {
                fork: seating.right_fork,
                neighbor: seating.right_neighbor,
                side: seating.right,
            },
            deferred: VecDeque::new(),
            mailbox,
            postman,
            stop,
            stopper,
            hooks,
            stats,
            alarm: None,
        }
    }

    /// Where to report a violation besides the return value of [`Philosopher::run`]
    pub fn alarm(mut self, alarm: Sender<ProtocolViolation>) -> Self {
        self.alarm = Some(alarm);
        self
    }

    pub fn id(&self) -> PhilosopherId {
        self.id
    }
    pub fn state(&self) -> State {
        self.state
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            id: self.id,
            state: self.state,
            left: (self.left.fork, self.left.side),
            right: (self.right.fork, self.right.side),
            deferred: self.deferred.iter().copied().collect(),
        }
    }

    /// Runs the philosopher on its own thread
    pub fn start(mut self) -> Handle {
        let id = self.id;
        let stopper = self.stopper.detach();
        let (done_tx, done) = bounded(1);
        let thread = thread::spawn(move || {
            // Nobody listening means the handle was dropped, which already stopped us
            let _ = done_tx.send(self.run());
        });
        Handle {
            id,
            stopper,
            done,
            thread,
        }
    }

    /// Think, get hungry, eat, release, until stopped or a violation is found.
    ///
    /// Stop is checked once per cycle and while waiting for forks. A philosopher that is already eating
    /// finishes the cycle, deferred grants included, before it leaves.
    pub fn run(mut self) -> Result<Snapshot, ProtocolViolation> {
        info!(philosopher = self.id, "sitting down");
        let outcome = self.dine();
        match &outcome {
            Ok(()) => info!(
                philosopher = self.id,
                meals = self.stats.meals(self.id),
                state = ?self.state,
                "leaving the table"
            ),
            Err(violation) => {
                error!(philosopher = self.id, %violation, "protocol violation");
                if let Some(alarm) = &self.alarm {
                    let _ = alarm.send(violation.clone());
                }
            }
        }
        outcome.map(|()| self.snapshot())
    }

    fn dine(&mut self) -> Result<(), ProtocolViolation> {
        loop {
            self.think();

            let hungry_since = Instant::now();
            self.become_hungry()?;
            let wait = self.wait_for_forks()?;
            self.stats.add_wait(self.id, hungry_since.elapsed());
            if let Wait::Stopped = wait {
                return Ok(());
            }

            self.eat();
            let releasing = Instant::now();
            self.release()?;
            self.stats.add_wait(self.id, releasing.elapsed());

            if self.stop.is_stopped() {
                return Ok(());
            }
        }
    }

    fn think(&mut self) {
        self.hooks.think(self.id);
        self.stats.record_thought(self.id);
    }

    // Answers whatever arrived while thinking, then asks for the missing forks
    fn become_hungry(&mut self) -> Result<(), ProtocolViolation> {
        self.enter(State::Hungry);
        for envelope in self.mailbox.drain() {
            self.handle(envelope)?;
        }
        for fork in [self.left.fork, self.right.fork] {
            if self.side(fork) == Some(Side::Away) {
                self.request(fork);
            }
        }
        Ok(())
    }

    fn wait_for_forks(&mut self) -> Result<Wait, ProtocolViolation> {
        while !(self.left.side.is_held() && self.right.side.is_held()) {
            // No deadline: dropping the stop handle disconnects the stop channel, which wakes this receive
            match self.mailbox.recv(&self.stop, None) {
                Received::Message(envelope) => self.handle(envelope)?,
                Received::Stopped => {
                    debug!(
                        philosopher = self.id,
                        left = ?self.left.side,
                        right = ?self.right.side,
                        "stopped while hungry"
                    );
                    return Ok(Wait::Stopped);
                }
                Received::TimedOut => {}
            }
        }
        Ok(Wait::Ready)
    }

    // The mailbox is not read while eating, so handle() only ever sees Thinking or Hungry
    fn eat(&mut self) {
        self.enter(State::Eating);
        self.hooks.eat(self.id);
        self.stats.record_meal(self.id);
    }

    // Dirty both forks, then grant everything that was deferred and anything that came in meanwhile
    fn release(&mut self) -> Result<(), ProtocolViolation> {
        self.left.side = Side::Held(Mark::Dirty);
        self.right.side = Side::Held(Mark::Dirty);
        self.enter(State::Thinking);
        while let Some(fork) = self.deferred.pop_front() {
            self.surrender(fork);
        }
        for envelope in self.mailbox.drain() {
            self.handle(envelope)?;
        }
        Ok(())
    }

    fn handle(&mut self, envelope: Envelope) -> Result<(), ProtocolViolation> {
        let Envelope { from, message } = envelope;
        let id = self.id;
        let fork = message.fork();
        let place = self
            .place(fork)
            .ok_or(ProtocolViolation::NotAdjacent { philosopher: id, fork })?;
        if place.neighbor != from {
            return Err(ProtocolViolation::UnexpectedSender {
                philosopher: id,
                fork,
                from,
            });
        }

        match (message, place.side) {
            (Message::Request(_), Side::Held(Mark::Dirty)) => {
                self.surrender(fork);
                if self.state == State::Hungry {
                    self.request(fork);
                }
            }
            (Message::Request(_), Side::Held(_)) => {
                if !self.deferred.contains(&fork) {
                    debug!(philosopher = id, fork, from, "deferring request");
                    self.deferred.push_back(fork);
                }
            }
            (Message::Request(_), _) => {
                trace!(philosopher = id, fork, from, "ignoring request for a fork not held");
            }
            (Message::Grant(..), Side::Held(_)) => {
                return Err(ProtocolViolation::DuplicateGrant {
                    philosopher: id,
                    fork,
                });
            }
            (Message::Grant(_, mark), Side::Requested) => {
                debug!(philosopher = id, fork, from, ?mark, "granted");
                self.set_side(fork, Side::Held(mark));
                self.hooks.acquired(id, fork);
            }
            (Message::Grant(..), Side::Away) => {
                trace!(philosopher = id, fork, from, "ignoring grant that was never requested");
            }
        }
        Ok(())
    }

    fn request(&mut self, fork: ForkId) {
        let Some(place) = self.place(fork) else {
            return;
        };
        debug!(philosopher = self.id, fork, to = place.neighbor, "requesting");
        self.set_side(fork, Side::Requested);
        self.send(place.neighbor, Message::Request(fork));
    }

    fn surrender(&mut self, fork: ForkId) {
        let Some(place) = self.place(fork) else {
            return;
        };
        if !place.side.is_held() {
            return;
        }
        debug!(philosopher = self.id, fork, to = place.neighbor, "surrendering");
        self.set_side(fork, Side::Away);
        self.hooks.released(self.id, fork);
        self.send(place.neighbor, Message::Grant(fork, Mark::Clean));
    }

    fn send(&self, to: PhilosopherId, message: Message) {
        self.postman.send(to, Envelope { from: self.id, message });
    }

    fn enter(&mut self, state: State) {
        trace!(philosopher = self.id, ?state, "transition");
        self.state = state;
        self.hooks.transition(self.id, state);
    }

    fn place(&self, fork: ForkId) -> Option<Place> {
        [self.left, self.right].into_iter().find(|p| p.fork == fork)
    }
    fn side(&self, fork: ForkId) -> Option<Side> {
        self.place(fork).map(|p| p.side)
    }
    fn set_side(&mut self, fork: ForkId, side: Side) {
        if self.left.fork == fork {
            self.left.side = side;
        } else if self.right.fork == fork {
            self.right.side = side;
        }
    }
}

/// A philosopher running on its own thread.
///
/// Dropping the handle stops the philosopher without waiting for it.
pub struct Handle {
    id: PhilosopherId,
    stopper: StopHandle,
    done: Receiver<Result<Snapshot, ProtocolViolation>>,
    thread: JoinHandle<()>,
}

impl Handle {
    pub fn id(&self) -> PhilosopherId {
        self.id
    }
    pub fn request_stop(&mut self) {
        self.stopper.request_stop();
    }
    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Stops the philosopher if not done already and waits up to `timeout` for its final record
    pub fn join(self, timeout: Option<Duration>) -> Result<Snapshot, Error> {
        let Handle {
            id,
            mut stopper,
            done,
            thread,
        } = self;
        stopper.request_stop();
        let outcome = match timeout {
            Some(timeout) => done.recv_timeout(timeout).map_err(|e| match e {
                RecvTimeoutError::Timeout => Error::Unresponsive(id),
                RecvTimeoutError::Disconnected => Error::Panicked(id),
            })?,
            None => done.recv().map_err(|_| Error::Panicked(id))?,
        };
        thread.join().map_err(|_| Error::Panicked(id))?;
        Ok(outcome?)
    }
}
