//! Harness: seats a ring of philosophers, lets them dine for a while and collects the outcome.

use std::{
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

use crossbeam_channel::{after, select, tick, unbounded};
use tracing::{error, info, warn};

use crate::config::TableConfig;
use crate::error::Error;
use crate::sync::{
    chandy_misra::{Handle, Philosopher, Snapshot},
    mailbox::{post_office, Postman},
    stats::{Report, Stats},
    think::Think,
    topology::Ring,
    Hooks, PhilosopherId,
};

/// Hooks driven by a [`TableConfig`]
pub struct Routine {
    think: Think,
    eat: Duration,
}

impl From<&TableConfig> for Routine {
    fn from(config: &TableConfig) -> Self {
        Self {
            think: config.think.clone(),
            eat: config.eat(),
        }
    }
}

impl Hooks for Routine {
    fn think(&self, _i: PhilosopherId) {
        self.think.run();
    }
    fn eat(&self, _i: PhilosopherId) {
        if !self.eat.is_zero() {
            thread::sleep(self.eat);
        }
    }
}

pub struct Table<H> {
    config: TableConfig,
    ring: Ring,
    hooks: Arc<H>,
    stats: Arc<Stats>,
}

impl Table<Routine> {
    pub fn new(config: TableConfig) -> Result<Self, Error> {
        let hooks = Arc::new(Routine::from(&config));
        Self::with_hooks(config, hooks)
    }
}

impl<H: Hooks + 'static> Table<H> {
    pub fn with_hooks(config: TableConfig, hooks: Arc<H>) -> Result<Self, Error> {
        let ring = Ring::new(config.philosophers)?;
        let stats = Arc::new(Stats::new(ring.n_philosophers()));
        Ok(Self {
            config,
            ring,
            hooks,
            stats,
        })
    }

    pub fn ring(&self) -> Ring {
        self.ring
    }
    pub fn stats(&self) -> &Arc<Stats> {
        &self.stats
    }

    /// Philosophers wired to the ring and to each other's mailboxes, not yet running
    pub fn seat(&self) -> (Vec<Philosopher<H>>, Postman) {
        let (postman, mailboxes) = post_office(self.ring.n_philosophers());
        let philosophers = self
            .ring
            .seating()
            .into_iter()
            .zip(mailboxes)
            .map(|(seating, mailbox)| {
                Philosopher::new(
                    seating,
                    mailbox,
                    postman.clone(),
                    self.hooks.clone(),
                    self.stats.clone(),
                )
            })
            .collect();
        (philosophers, postman)
    }

    pub fn run(&self, duration: Duration) -> Result<Report, Error> {
        let (philosophers, _postman) = self.seat();
        self.dine(philosophers, duration)
    }

    /// Runs `philosophers` for `duration`, or until one of them finds a protocol violation, in which case
    /// everyone is stopped and the violation returned.
    pub fn dine(&self, philosophers: Vec<Philosopher<H>>, duration: Duration) -> Result<Report, Error> {
        let started = Instant::now();
        let (alarm, violations) = unbounded();
        let mut handles = philosophers
            .into_iter()
            .map(|p| p.alarm(alarm.clone()).start())
            .collect::<Vec<_>>();
        drop(alarm);
        info!(philosophers = handles.len(), ?duration, "dinner started");

        let deadline = after(duration);
        let observer = tick(self.config.observe_interval());
        let mut last = self.stats.all_meals();
        let violation = loop {
            // Some(outcome) once dinner is over, None on an observer tick
            let over = select! {
                // Disconnected means every philosopher already left
                recv(violations) -> violation => Some(violation.ok()),
                recv(observer) -> _ => None,
                recv(deadline) -> _ => Some(None),
            };
            if let Some(violation) = over {
                break violation;
            }
            for i in self.stats.stalled(&last) {
                warn!(philosopher = i, meals = last[i], "did not eat since last check");
            }
            last = self.stats.all_meals();
        };

        handles.iter_mut().for_each(Handle::request_stop);
        let elapsed = started.elapsed();
        let snapshots = handles
            .into_iter()
            .map(|h| h.join(Some(self.config.join_timeout())))
            .collect::<Result<Vec<_>, _>>();
        if let Some(violation) = violation {
            error!(%violation, "dinner aborted");
            return Err(violation.into());
        }

        let holders = fork_holders(&self.ring, &snapshots?)?;
        let report = self.stats.report(elapsed, holders);
        info!(
            meals = report.total_meals(),
            elapsed_ms = report.elapsed.as_millis() as u64,
            all_ate = report.all_ate(),
            "dinner over"
        );
        Ok(report)
    }
}

/// Who holds each fork according to the philosophers' own records
pub fn fork_holders(ring: &Ring, snapshots: &[Snapshot]) -> Result<Vec<Option<PhilosopherId>>, Error> {
    let mut holders = vec![None; ring.n_philosophers()];
    for snapshot in snapshots {
        for fork in snapshot.held() {
            if let Some(first) = holders[fork].replace(snapshot.id) {
                return Err(Error::DoubleHeld {
                    fork,
                    first,
                    second: snapshot.id,
                });
            }
        }
    }
    Ok(holders)
}
