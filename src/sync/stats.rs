use std::{
    fmt,
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use super::PhilosopherId;

/// Per-philosopher counters. They only ever grow, and are the only state a philosopher writes outside its
/// own record.
///
/// Relaxed since every counter is independent: readers either sample them best-effort while dinner runs
/// or read them after joining the philosophers.
pub struct Stats {
    meals: Vec<AtomicU64>,
    thoughts: Vec<AtomicU64>,
    wait_us: Vec<AtomicU64>,
}

impl Stats {
    pub fn new(n: usize) -> Self {
        let zeros = || -> Vec<AtomicU64> { (0..n).map(|_| AtomicU64::new(0)).collect() };
        Self {
            meals: zeros(),
            thoughts: zeros(),
            wait_us: zeros(),
        }
    }
    pub fn n_philosophers(&self) -> usize {
        self.meals.len()
    }

    pub fn record_meal(&self, i: PhilosopherId) {
        self.meals[i].fetch_add(1, Ordering::Relaxed);
    }
    pub fn record_thought(&self, i: PhilosopherId) {
        self.thoughts[i].fetch_add(1, Ordering::Relaxed);
    }
    pub fn add_wait(&self, i: PhilosopherId, wait: Duration) {
        let us = u64::try_from(wait.as_micros()).unwrap_or(u64::MAX);
        self.wait_us[i].fetch_add(us, Ordering::Relaxed);
    }

    pub fn meals(&self, i: PhilosopherId) -> u64 {
        self.meals[i].load(Ordering::Relaxed)
    }
    pub fn thoughts(&self, i: PhilosopherId) -> u64 {
        self.thoughts[i].load(Ordering::Relaxed)
    }
    pub fn wait(&self, i: PhilosopherId) -> Duration {
        Duration::from_micros(self.wait_us[i].load(Ordering::Relaxed))
    }
    pub fn all_meals(&self) -> Vec<u64> {
        self.meals.iter().map(|m| m.load(Ordering::Relaxed)).collect()
    }
    pub fn total_meals(&self) -> u64 {
        self.all_meals().iter().sum()
    }

    /// Philosophers whose meal count has not moved since `previous` was sampled
    pub fn stalled(&self, previous: &[u64]) -> Vec<PhilosopherId> {
        self.all_meals()
            .iter()
            .zip(previous)
            .enumerate()
            .filter(|(_, (now, before))| now <= before)
            .map(|(i, _)| i)
            .collect()
    }

    pub fn report(&self, elapsed: Duration, holders: Vec<Option<PhilosopherId>>) -> Report {
        let n = self.n_philosophers();
        Report {
            elapsed,
            meals: self.all_meals(),
            thoughts: (0..n).map(|i| self.thoughts(i)).collect(),
            wait: (0..n).map(|i| self.wait(i)).collect(),
            holders,
        }
    }
}

/// End of dinner summary.
#[derive(Clone, Debug, PartialEq)]
pub struct Report {
    pub elapsed: Duration,
    pub meals: Vec<u64>,
    pub thoughts: Vec<u64>,
    pub wait: Vec<Duration>,
    /// Who held each fork when everyone left, `None` if it was in flight
    pub holders: Vec<Option<PhilosopherId>>,
}

impl Report {
    pub fn total_meals(&self) -> u64 {
        self.meals.iter().sum()
    }
    pub fn total_wait(&self) -> Duration {
        self.wait.iter().sum()
    }
    // Above 1.0 means philosophers spent more time waiting, summed, than dinner lasted
    pub fn wait_ratio(&self) -> f64 {
        if self.elapsed.is_zero() {
            return 0.0;
        }
        self.total_wait().as_secs_f64() / self.elapsed.as_secs_f64()
    }
    pub fn all_ate(&self) -> bool {
        self.meals.iter().all(|&m| m > 0)
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let join = |v: Vec<String>| v.join(" ");
        writeln!(
            f,
            "Meals {}, thoughts {}",
            join(self.meals.iter().map(u64::to_string).collect()),
            join(self.thoughts.iter().map(u64::to_string).collect()),
        )?;
        writeln!(f, "Elapsed time: {}ms", self.elapsed.as_millis())?;
        writeln!(
            f,
            "Wait time: {}",
            join(self.wait.iter().map(|w| w.as_millis().to_string()).collect()),
        )?;
        writeln!(
            f,
            "Forks: {}",
            join(
                self.holders
                    .iter()
                    .map(|h| h.map_or_else(|| "-".to_string(), |i| i.to_string()))
                    .collect()
            ),
        )?;
        if self.all_ate() {
            write!(
                f,
                "Total wait time: {}ms, total wait / elapsed: {:.3}",
                self.total_wait().as_millis(),
                self.wait_ratio()
            )
        } else {
            write!(f, "Failed to run some philosopher(s)")
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::sync::stats::Stats;
    use std::{sync::Arc, time::Duration};

    #[test]
    fn counters_from_many_threads() {
        const N_THREADS: usize = 4;
        const WORK: u64 = 100_000;
        let stats = Arc::new(Stats::new(N_THREADS));
        let ths = (0..N_THREADS)
            .map(|i| {
                let stats = stats.clone();
                std::thread::spawn(move || {
                    for _ in 0..WORK {
                        stats.record_meal(i);
                        stats.record_thought(i);
                        stats.add_wait(i, Duration::from_micros(1));
                    }
                })
            })
            .collect::<Vec<_>>();
        ths.into_iter().for_each(|th| th.join().unwrap());

        assert_eq!(stats.total_meals(), WORK * N_THREADS as u64);
        for i in 0..N_THREADS {
            assert_eq!(stats.meals(i), WORK);
            assert_eq!(stats.thoughts(i), WORK);
            assert_eq!(stats.wait(i), Duration::from_micros(WORK));
        }
    }

    #[test]
    fn stalled_philosophers() {
        let stats = Stats::new(3);
        let before = stats.all_meals();
        stats.record_meal(1);
        assert_eq!(stats.stalled(&before), vec![0, 2]);

        let before = stats.all_meals();
        (0..3).for_each(|i| stats.record_meal(i));
        assert!(stats.stalled(&before).is_empty());
    }

    #[test]
    fn report_summary() {
        let stats = Stats::new(2);
        stats.record_meal(0);
        stats.add_wait(0, Duration::from_millis(30));
        let report = stats.report(Duration::from_millis(100), vec![Some(0), None]);
        assert!(!report.all_ate());
        assert!(report.to_string().ends_with("Failed to run some philosopher(s)"));

        stats.record_meal(1);
        stats.add_wait(1, Duration::from_millis(20));
        let report = stats.report(Duration::from_millis(100), vec![Some(0), None]);
        assert!(report.all_ate());
        assert_eq!(report.total_meals(), 2);
        assert_eq!(report.total_wait(), Duration::from_millis(50));
        assert!((report.wait_ratio() - 0.5).abs() < 1e-9);

        let text = report.to_string();
        assert!(text.starts_with("Meals 1 1, thoughts 0 0"));
        assert!(text.contains("Wait time: 30 20"));
        assert!(text.contains("Forks: 0 -"));
        assert!(text.ends_with("total wait / elapsed: 0.500"));
    }
}
