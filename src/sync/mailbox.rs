use std::{sync::Arc, time::Duration};

use crossbeam_channel::{after, bounded, never, select, unbounded, Receiver, Sender, TryRecvError};
use tracing::{trace, warn};

use super::{ForkId, Mark, PhilosopherId};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Message {
    Request(ForkId),
    /// Hand-over, with the mark the fork carries from now on
    Grant(ForkId, Mark),
}

impl Message {
    pub fn fork(&self) -> ForkId {
        match *self {
            Message::Request(fork) | Message::Grant(fork, _) => fork,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Envelope {
    pub from: PhilosopherId,
    pub message: Message,
}

/// Sending half of every mailbox at the table, indexed by philosopher.
///
/// Channels are FIFO, so mail from one sender to one receiver arrives in order. Nothing is promised
/// across senders.
#[derive(Clone)]
pub struct Postman {
    inboxes: Arc<[Sender<Envelope>]>,
}

pub struct Mailbox {
    owner: PhilosopherId,
    rx: Receiver<Envelope>,
}

pub fn post_office(n: usize) -> (Postman, Vec<Mailbox>) {
    let (inboxes, mailboxes): (Vec<_>, Vec<_>) = (0..n)
        .map(|owner| {
            let (tx, rx) = unbounded();
            (tx, Mailbox { owner, rx })
        })
        .unzip();
    (
        Postman {
            inboxes: inboxes.into(),
        },
        mailboxes,
    )
}

impl Postman {
    // Never blocks. Mail for a philosopher that already left the table is dropped
    pub fn send(&self, to: PhilosopherId, envelope: Envelope) {
        match self.inboxes.get(to) {
            Some(inbox) => {
                if inbox.send(envelope).is_err() {
                    trace!(to, ?envelope, "dropped mail for a philosopher who left");
                }
            }
            None => warn!(to, ?envelope, "dropped mail for a philosopher not at the table"),
        }
    }
}

/// Cooperative cancellation observed by [`Mailbox::recv`] and between cycles.
#[derive(Clone)]
pub struct Stop(Receiver<()>);

/// Owning side of a [`Stop`]. Nothing is ever sent: dropping the sender disconnects the channel,
/// which wakes every receive blocked on it at once.
pub struct StopHandle(Option<Sender<()>>);

pub fn stop_signal() -> (StopHandle, Stop) {
    let (tx, rx) = bounded(0);
    (StopHandle(Some(tx)), Stop(rx))
}

impl StopHandle {
    pub fn request_stop(&mut self) {
        self.0.take();
    }
    pub fn is_requested(&self) -> bool {
        self.0.is_none()
    }
    // Moves the signal into a new handle, leaving this one inert
    pub(crate) fn detach(&mut self) -> StopHandle {
        StopHandle(self.0.take())
    }
}

impl Stop {
    pub fn is_stopped(&self) -> bool {
        matches!(self.0.try_recv(), Err(TryRecvError::Disconnected))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Received {
    Message(Envelope),
    Stopped,
    TimedOut,
}

impl Mailbox {
    pub fn owner(&self) -> PhilosopherId {
        self.owner
    }

    /// Blocks until mail arrives, `stop` fires or `timeout` passes (`None` waits for the first two only)
    pub fn recv(&self, stop: &Stop, timeout: Option<Duration>) -> Received {
        let deadline = timeout.map(after).unwrap_or_else(never);
        select! {
            recv(self.rx) -> envelope => match envelope {
                Ok(envelope) => Received::Message(envelope),
                // Every postman is gone, nothing can arrive anymore
                Err(_) => Received::Stopped,
            },
            recv(stop.0) -> _ => Received::Stopped,
            recv(deadline) -> _ => Received::TimedOut,
        }
    }

    /// Everything already buffered, without waiting
    pub fn drain(&self) -> Vec<Envelope> {
        self.rx.try_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use crate::sync::{
        mailbox::{post_office, stop_signal, Envelope, Message, Received},
        Mark,
    };
    use rand::Rng;
    use std::time::{Duration, Instant};

    #[test]
    fn fifo_per_sender() {
        const WORK: usize = 10_000;
        let (postman, mut mailboxes) = post_office(3);
        let inbox = mailboxes.remove(0);

        let ths = (1..3)
            .map(|from| {
                let postman = postman.clone();
                std::thread::spawn(move || {
                    for fork in 0..WORK {
                        if fork % 1000 == 0 {
                            rand_timeout();
                        }
                        postman.send(
                            0,
                            Envelope {
                                from,
                                message: Message::Request(fork),
                            },
                        );
                    }
                })
            })
            .collect::<Vec<_>>();
        ths.into_iter().for_each(|th| th.join().unwrap());

        let (_stopper, stop) = stop_signal();
        let mut next = [0usize; 3];
        for _ in 0..2 * WORK {
            match inbox.recv(&stop, Some(Duration::from_secs(1))) {
                Received::Message(Envelope { from, message }) => {
                    assert_eq!(message.fork(), next[from]);
                    next[from] += 1;
                }
                other => panic!("expected mail, got {other:?}"),
            }
        }
        assert_eq!(next, [0, WORK, WORK]);
        assert!(inbox.drain().is_empty());
    }

    #[test]
    fn stop_wakes_blocked_receive() {
        let (postman, mut mailboxes) = post_office(2);
        let inbox = mailboxes.remove(0);
        let (mut stopper, stop) = stop_signal();

        let th = std::thread::spawn(move || {
            let _postman = postman;
            inbox.recv(&stop, None)
        });
        std::thread::sleep(Duration::from_millis(100));
        assert!(!th.is_finished());

        let start = Instant::now();
        assert!(!stopper.is_requested());
        stopper.request_stop();
        assert!(stopper.is_requested());
        assert_eq!(th.join().unwrap(), Received::Stopped);
        assert!(start.elapsed() < Duration::from_millis(500));
    }

    #[test]
    fn stop_is_visible_to_every_clone() {
        let (mut stopper, stop) = stop_signal();
        let clone = stop.clone();
        assert!(!stop.is_stopped());
        stopper.request_stop();
        assert!(stop.is_stopped());
        assert!(clone.is_stopped());

        // Detaching moves the signal, it does not fire it
        let (mut stopper, stop) = stop_signal();
        let mut moved = stopper.detach();
        assert!(!stop.is_stopped());
        drop(stopper);
        assert!(!stop.is_stopped());
        moved.request_stop();
        assert!(stop.is_stopped());
    }

    #[test]
    fn times_out_without_mail() {
        let (_postman, mailboxes) = post_office(2);
        let (_stopper, stop) = stop_signal();
        let start = Instant::now();
        assert_eq!(
            mailboxes[1].recv(&stop, Some(Duration::from_millis(50))),
            Received::TimedOut
        );
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn drain_does_not_block() {
        let (postman, mailboxes) = post_office(2);
        assert!(mailboxes[1].drain().is_empty());

        let mail = [
            Envelope {
                from: 0,
                message: Message::Request(0),
            },
            Envelope {
                from: 0,
                message: Message::Grant(1, Mark::Clean),
            },
        ];
        mail.iter().for_each(|&e| postman.send(1, e));
        assert_eq!(mailboxes[1].drain(), mail.to_vec());
        assert!(mailboxes[0].drain().is_empty());
    }

    #[test]
    fn send_to_departed_or_unknown_is_dropped() {
        let (postman, mut mailboxes) = post_office(2);
        drop(mailboxes.pop());
        let envelope = Envelope {
            from: 0,
            message: Message::Request(0),
        };
        postman.send(1, envelope);
        postman.send(7, envelope);
        assert!(mailboxes[0].drain().is_empty());
    }

    fn rand_timeout() {
        let mut rng = rand::thread_rng();
        let t = rng.gen_range(0..=5);
        std::thread::sleep(std::time::Duration::from_millis(t));
    }
}
