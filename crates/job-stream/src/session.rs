//! One client's simulated workload and the timer that advances it.
//!
//! A [`Session`] owns its jobs and its ticker task. The ticker only holds a
//! [`Weak`] back-reference, so the session lives exactly as long as whoever
//! owns it (normally the [`SessionRegistry`](crate::registry::SessionRegistry)).
//!
//! Tick and close are serialized through one mutex per session: a tick holds
//! it for its whole run and checks the lifecycle state first, so a tick that
//! was already queued when `close` ran does nothing.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::SimulationConfig;
use crate::job::{random_int, Job, JobSnapshot};
use crate::period::Period;
use crate::protocol::{PublishError, Publisher, ServerEvent};

/// Identity of one accepted connection. Allocated by the registry and never
/// reused within a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl From<u64> for ConnectionId {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Active,
    Closed,
}

/// Result of a single tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// The tick ran and published this many `job-update` messages.
    Published(usize),
    /// The session is closed (already, or because publishing failed).
    Closed,
}

struct SessionInner {
    state: LifecycleState,
    jobs: Vec<Job>,
    sequence: u32,
    rng: StdRng,
}

pub struct Session {
    connection_id: ConnectionId,
    period: Period,
    simulation: SimulationConfig,
    publisher: Arc<dyn Publisher>,
    inner: Mutex<SessionInner>,
    cancel: CancellationToken,
    ticker: Mutex<Option<JoinHandle<()>>>,
}

impl Session {
    /// Seed a new session with a random batch of pending jobs.
    ///
    /// The timer is not running yet; call [`Session::start`] once the
    /// snapshot has been published.
    pub fn new(
        connection_id: ConnectionId,
        period: Period,
        simulation: SimulationConfig,
        publisher: Arc<dyn Publisher>,
    ) -> Arc<Self> {
        Self::with_rng(
            connection_id,
            period,
            simulation,
            publisher,
            StdRng::from_entropy(),
        )
    }

    pub fn with_rng(
        connection_id: ConnectionId,
        period: Period,
        simulation: SimulationConfig,
        publisher: Arc<dyn Publisher>,
        rng: StdRng,
    ) -> Arc<Self> {
        let mut inner = SessionInner {
            state: LifecycleState::Active,
            jobs: Vec::new(),
            sequence: 0,
            rng,
        };

        let count = random_int(
            &mut inner.rng,
            *simulation.initial_jobs.start() as i64,
            *simulation.initial_jobs.end() as i64,
        );
        for _ in 0..count {
            inner.sequence += 1;
            let job = loop {
                let candidate = Job::new(inner.sequence, &mut inner.rng);
                if !inner.jobs.iter().any(|j| j.id() == candidate.id()) {
                    break candidate;
                }
            };
            inner.jobs.push(job);
        }

        debug!(
            connection_id = %connection_id,
            jobs = inner.jobs.len(),
            period_ms = period.as_millis(),
            "session created"
        );

        Arc::new(Self {
            connection_id,
            period,
            simulation,
            publisher,
            inner: Mutex::new(inner),
            cancel: CancellationToken::new(),
            ticker: Mutex::new(None),
        })
    }

    pub fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }

    pub fn period(&self) -> Period {
        self.period
    }

    pub fn state(&self) -> LifecycleState {
        self.lock_inner().state
    }

    pub fn is_closed(&self) -> bool {
        self.state() == LifecycleState::Closed
    }

    /// Current jobs in creation order.
    pub fn jobs(&self) -> Vec<Job> {
        self.lock_inner().jobs.clone()
    }

    /// Full records of every job, for the `initial-jobs` message.
    pub fn snapshot(&self) -> Vec<JobSnapshot> {
        self.lock_inner().jobs.iter().map(Job::snapshot).collect()
    }

    /// Start the recurring timer. The first tick fires one period from now.
    ///
    /// No-op if the session is closed or already started.
    pub fn start(self: &Arc<Self>) {
        if self.is_closed() {
            debug!(connection_id = %self.connection_id, "not starting closed session");
            return;
        }
        let mut ticker = self.ticker.lock().unwrap_or_else(PoisonError::into_inner);
        if ticker.is_some() {
            warn!(connection_id = %self.connection_id, "session timer already running");
            return;
        }
        *ticker = Some(spawn_ticker(
            Arc::downgrade(self),
            self.period.as_duration(),
            self.cancel.clone(),
        ));
    }

    /// Run one tick: each unfinished job advances with the configured
    /// probability, and every job that advanced is published on its own.
    ///
    /// If the publisher can no longer accept writes the session closes itself
    /// instead of failing again on every later tick.
    pub fn advance_tick(&self) -> TickOutcome {
        let mut inner = self.lock_inner();
        if inner.state == LifecycleState::Closed {
            return TickOutcome::Closed;
        }

        let increment = &self.simulation.increment;
        let (min, max) = (*increment.start() as i64, *increment.end() as i64);
        let SessionInner { jobs, rng, .. } = &mut *inner;

        let mut published = 0;
        let mut failure = None;
        for job in jobs.iter_mut() {
            if job.is_complete() {
                continue;
            }
            if rng.gen::<f64>() >= self.simulation.advance_probability {
                continue;
            }
            if !self.publisher.can_publish() {
                failure = Some(PublishError::ChannelClosed);
                break;
            }
            let step = random_int(rng, min, max).clamp(0, u8::MAX as i64) as u8;
            if !job.advance(step) {
                continue;
            }
            debug!(
                connection_id = %self.connection_id,
                job_id = %job.id(),
                progress = job.progress(),
                status = job.status().as_str(),
                "job progressed"
            );

            if let Err(e) = self.publisher.publish(&ServerEvent::JobUpdate(job.update())) {
                failure = Some(e);
                break;
            }
            published += 1;
        }

        match failure {
            None => TickOutcome::Published(published),
            Some(err) => {
                inner.state = LifecycleState::Closed;
                drop(inner);
                info!(
                    connection_id = %self.connection_id,
                    error = %err,
                    "client unreachable, closing session"
                );
                self.stop_timer();
                TickOutcome::Closed
            }
        }
    }

    /// Close the session and stop its timer. Returns `true` only for the call
    /// that performed the transition.
    pub fn close(&self) -> bool {
        {
            let mut inner = self.lock_inner();
            if inner.state == LifecycleState::Closed {
                return false;
            }
            inner.state = LifecycleState::Closed;
        }
        self.stop_timer();
        debug!(connection_id = %self.connection_id, "session closed");
        true
    }

    /// Resolves once the session is closed, by anyone.
    pub async fn closed(&self) {
        self.cancel.cancelled().await
    }

    /// Token that fires when the session closes. Cancelling it does not
    /// close the session.
    pub fn closed_signal(&self) -> CancellationToken {
        self.cancel.child_token()
    }

    fn stop_timer(&self) {
        self.cancel.cancel();
        let handle = self
            .ticker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            handle.abort();
        }
    }

    fn lock_inner(&self) -> MutexGuard<'_, SessionInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.cancel.cancel();
        if let Some(handle) = self
            .ticker
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            handle.abort();
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("connection_id", &self.connection_id)
            .field("period", &self.period)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

fn spawn_ticker(
    session: Weak<Session>,
    period: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {}
            }
            let Some(session) = session.upgrade() else {
                break;
            };
            if session.advance_tick() == TickOutcome::Closed {
                break;
            }
        }
    })
}
