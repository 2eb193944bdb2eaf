// Admission control: bounds fetch concurrency and paces new fetches

use rand::Rng;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::{Instant, sleep, timeout_at};
use tracing::{debug, warn};

/// Holds one unit of the safety cap from the moment a link is claimed
/// until its task finishes.
#[derive(Debug)]
pub struct Reservation {
    _permit: OwnedSemaphorePermit,
}

/// Authorizes exactly one in-flight fetch. Both tokens go back to their
/// pools when this is dropped.
#[derive(Debug)]
pub struct Admission {
    _reservation: Reservation,
    _permit: OwnedSemaphorePermit,
    in_flight: Arc<AtomicUsize>,
}

impl Drop for Admission {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

#[derive(Debug)]
pub struct AdmissionController {
    workers: Arc<Semaphore>,
    safety: Arc<Semaphore>,
    deadline: Instant,
    jitter_min: Duration,
    jitter_max: Duration,
    in_flight: Arc<AtomicUsize>,
    peak: AtomicUsize,
    shed: AtomicUsize,
}

impl AdmissionController {
    /// A safety cap below `parallelism` is raised to it, so every worker slot
    /// can always be reserved.
    pub fn new(parallelism: usize, safety_cap: usize, deadline: Instant) -> Self {
        let parallelism = parallelism.max(1);
        if safety_cap < parallelism {
            warn!(
                "Safety cap {} is below parallelism {}, raising it to {}",
                safety_cap, parallelism, parallelism
            );
        }
        Self {
            workers: Arc::new(Semaphore::new(parallelism)),
            safety: Arc::new(Semaphore::new(safety_cap.max(parallelism))),
            deadline,
            jitter_min: Duration::ZERO,
            jitter_max: Duration::ZERO,
            in_flight: Arc::new(AtomicUsize::new(0)),
            peak: AtomicUsize::new(0),
            shed: AtomicUsize::new(0),
        }
    }

    pub fn with_jitter(mut self, min: Duration, max: Duration) -> Self {
        self.jitter_min = min.min(max);
        self.jitter_max = max.max(min);
        self
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.deadline
    }

    /// Non-blocking. `None` means the candidate fetch is dropped: either the
    /// deadline has passed or too much work is already queued.
    pub fn try_reserve(&self) -> Option<Reservation> {
        if self.is_expired() {
            self.shed.fetch_add(1, Ordering::Relaxed);
            debug!("Deadline passed, shedding candidate fetch");
            return None;
        }

        match self.safety.clone().try_acquire_owned() {
            Ok(permit) => Some(Reservation { _permit: permit }),
            Err(e) => {
                self.shed.fetch_add(1, Ordering::Relaxed);
                debug!("Safety cap rejected candidate fetch: {}", e);
                None
            }
        }
    }

    /// Waits for a worker slot, then for the politeness delay. Gives up with
    /// `None` if the deadline arrives first; the fetch then never starts.
    pub async fn admit(&self, reservation: Reservation) -> Option<Admission> {
        let permit = match timeout_at(self.deadline, self.workers.clone().acquire_owned()).await {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => {
                debug!("Admission closed before a worker slot was free");
                return None;
            }
            Err(_) => {
                debug!("Deadline reached while waiting for a worker slot");
                return None;
            }
        };

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        let admission = Admission {
            _reservation: reservation,
            _permit: permit,
            in_flight: self.in_flight.clone(),
        };

        let delay = self.jitter_delay();
        if !delay.is_zero() && timeout_at(self.deadline, sleep(delay)).await.is_err() {
            debug!("Deadline reached during politeness delay");
            return None;
        }

        Some(admission)
    }

    /// Stops handing out tokens. Waiters are released with `None`.
    pub fn close(&self) {
        self.workers.close();
        self.safety.close();
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn shed_count(&self) -> usize {
        self.shed.load(Ordering::Relaxed)
    }

    fn jitter_delay(&self) -> Duration {
        if self.jitter_max.is_zero() {
            return Duration::ZERO;
        }
        let min = self.jitter_min.as_millis() as u64;
        let max = self.jitter_max.as_millis() as u64;
        Duration::from_millis(rand::thread_rng().gen_range(min..=max))
    }
}
