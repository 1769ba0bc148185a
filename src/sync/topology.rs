use super::{ForkId, Mark, PhilosopherId, Side};
use crate::error::Error;

/// Ring of `n` philosophers with one fork between every adjacent pair.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Ring {
    n: usize,
}

/// Where one philosopher sits and what it holds when dinner starts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Seating {
    pub id: PhilosopherId,
    pub left_neighbor: PhilosopherId,
    pub right_neighbor: PhilosopherId,
    pub left_fork: ForkId,
    pub right_fork: ForkId,
    pub left: Side,
    pub right: Side,
}

impl Ring {
    pub fn new(n: usize) -> Result<Self, Error> {
        if n < 2 {
            return Err(Error::TooFewPhilosophers(n));
        }
        Ok(Self { n })
    }
    pub fn n_philosophers(&self) -> usize {
        self.n
    }
    pub fn left_neighbor(&self, i: PhilosopherId) -> PhilosopherId {
        (i + self.n - 1) % self.n
    }
    pub fn right_neighbor(&self, i: PhilosopherId) -> PhilosopherId {
        (i + 1) % self.n
    }
    // Shared with the left neighbor
    pub fn left_fork(&self, i: PhilosopherId) -> ForkId {
        (i + self.n - 1) % self.n
    }
    // Shared with the right neighbor
    pub fn right_fork(&self, i: PhilosopherId) -> ForkId {
        i
    }
    pub fn endpoints(&self, fork: ForkId) -> (PhilosopherId, PhilosopherId) {
        (fork, (fork + 1) % self.n)
    }
    /// Lower-indexed endpoint. Only the wrap-around fork `n - 1` goes to philosopher 0 instead of
    /// philosopher `n - 1`, so not every fork points the same way and the ring cannot start deadlocked.
    pub fn initial_holder(&self, fork: ForkId) -> PhilosopherId {
        let (a, b) = self.endpoints(fork);
        a.min(b)
    }

    /// Index table of every seat, computed once per dinner
    pub fn seating(&self) -> Vec<Seating> {
        let side = |fork: ForkId, i: PhilosopherId| {
            if self.initial_holder(fork) == i {
                Side::Held(Mark::Dirty)
            } else {
                Side::Away
            }
        };
        (0..self.n)
            .map(|i| Seating {
                id: i,
                left_neighbor: self.left_neighbor(i),
                right_neighbor: self.right_neighbor(i),
                left_fork: self.left_fork(i),
                right_fork: self.right_fork(i),
                left: side(self.left_fork(i), i),
                right: side(self.right_fork(i), i),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use crate::error::Error;
    use crate::sync::{topology::Ring, Mark, Side};

    #[test]
    fn neighbors_wrap_around() {
        let ring = Ring::new(5).unwrap();
        assert_eq!(ring.left_neighbor(0), 4);
        assert_eq!(ring.right_neighbor(4), 0);
        assert_eq!(ring.left_neighbor(3), 2);
        assert_eq!(ring.right_neighbor(3), 4);

        // Every fork is shared by exactly the two philosophers that name it
        for i in 0..5 {
            assert_eq!(ring.right_fork(ring.left_neighbor(i)), ring.left_fork(i));
            assert_eq!(ring.left_fork(ring.right_neighbor(i)), ring.right_fork(i));
            assert_ne!(ring.left_fork(i), ring.right_fork(i));
        }
    }

    #[test]
    fn too_small() {
        assert!(matches!(Ring::new(0), Err(Error::TooFewPhilosophers(0))));
        assert!(matches!(Ring::new(1), Err(Error::TooFewPhilosophers(1))));
        assert!(Ring::new(2).is_ok());
    }

    #[test]
    fn seeding_is_asymmetric() {
        for n in 2..=9 {
            let ring = Ring::new(n).unwrap();
            let seats = ring.seating();

            // Each fork starts Dirty at exactly one of its endpoints
            for fork in 0..n {
                let holders = seats
                    .iter()
                    .filter(|s| {
                        (s.left_fork == fork && s.left.is_held())
                            || (s.right_fork == fork && s.right.is_held())
                    })
                    .map(|s| s.id)
                    .collect::<Vec<_>>();
                assert_eq!(holders, vec![ring.initial_holder(fork)]);
            }
            for s in &seats {
                for side in [s.left, s.right] {
                    assert!(matches!(side, Side::Held(Mark::Dirty) | Side::Away));
                }
            }

            // Philosopher 0 starts with both forks and philosopher n-1 with none
            assert!(seats[0].left.is_held() && seats[0].right.is_held());
            assert!(!seats[n - 1].left.is_held() && !seats[n - 1].right.is_held());
            // Everyone else holds its right fork only
            assert!(seats[1..n - 1]
                .iter()
                .all(|s| !s.left.is_held() && s.right.is_held()));
        }
    }

    #[test]
    fn two_philosophers_share_both_forks() {
        let ring = Ring::new(2).unwrap();
        let seats = ring.seating();
        assert_eq!(seats[0].left_neighbor, 1);
        assert_eq!(seats[0].right_neighbor, 1);
        assert_eq!((seats[0].left_fork, seats[0].right_fork), (1, 0));
        assert_eq!((seats[1].left_fork, seats[1].right_fork), (0, 1));
        assert_eq!(ring.initial_holder(0), 0);
        assert_eq!(ring.initial_holder(1), 0);
    }
}
