// Interval polling with debounced on-demand checks.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::engine::SyncTarget;

/// One polling session, from `start` to `stop`.
struct Run {
    cancel: CancellationToken,
    ticker: JoinHandle<()>,
    /// Pending debounced check, tagged so a finished deferral only clears
    /// its own slot.
    deferred: Option<(u64, JoinHandle<()>)>,
}

#[derive(Default)]
struct State {
    run: Option<Run>,
    last_check_at: Option<Instant>,
    next_deferral: u64,
}

struct Shared {
    target: Arc<dyn SyncTarget>,
    min_check_interval: Duration,
    state: Mutex<State>,
    in_flight: AtomicBool,
}

/// Held for the duration of one refresh; clears the in-flight flag on drop.
struct InFlight(Arc<Shared>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.in_flight.store(false, Ordering::Release);
    }
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().expect("scheduler state mutex poisoned")
    }

    /// Claim the single refresh slot and stamp the check time. Returns `None`
    /// while another refresh runs, leaving `last_check_at` untouched so a
    /// dropped check does not push the floor back.
    fn begin_check(self: &Arc<Self>, state: &mut State, now: Instant) -> Option<InFlight> {
        if self.in_flight.swap(true, Ordering::AcqRel) {
            debug!(roster = self.target.label(), "check already in flight, skipping");
            return None;
        }
        state.last_check_at = Some(now);
        Some(InFlight(Arc::clone(self)))
    }

    async fn run_check(&self, _in_flight: InFlight, cancel: &CancellationToken) {
        let outcome = self.target.refresh(cancel).await;
        debug!(roster = self.target.label(), ?outcome, "check finished");
    }

    /// When the next on-demand check may run, or `None` if it may run now.
    fn floor_deadline(&self, last_check_at: Option<Instant>, now: Instant) -> Option<Instant> {
        last_check_at
            .map(|at| at + self.min_check_interval)
            .filter(|due| *due > now)
    }
}

/// Drives one engine: a periodic refresh while running, plus immediate
/// checks on request, never more often than the minimum check interval.
pub struct PollScheduler {
    shared: Arc<Shared>,
}

impl PollScheduler {
    pub fn new(target: Arc<dyn SyncTarget>, min_check_interval: Duration) -> Self {
        PollScheduler {
            shared: Arc::new(Shared {
                target,
                min_check_interval,
                state: Mutex::new(State::default()),
                in_flight: AtomicBool::new(false),
            }),
        }
    }

    /// Begin periodic refreshes. Restarts the timer if already running.
    /// The first periodic refresh happens one `interval` from now.
    pub fn start(&self, interval: Duration) {
        self.stop();

        let cancel = CancellationToken::new();
        let shared = Arc::clone(&self.shared);
        let token = cancel.clone();
        let ticker = tokio::spawn(async move {
            let mut ticks = tokio::time::interval(interval);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticks.tick().await;
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticks.tick() => {
                        let started = shared.begin_check(&mut shared.state(), Instant::now());
                        if let Some(in_flight) = started {
                            shared.run_check(in_flight, &token).await;
                        }
                    }
                }
            }
        });

        self.shared.state().run = Some(Run {
            cancel,
            ticker,
            deferred: None,
        });
        info!(
            roster = self.shared.target.label(),
            interval_ms = interval.as_millis() as u64,
            "polling started"
        );
    }

    /// Stop polling. Any refresh still running observes the cancellation
    /// and leaves the roster alone.
    pub fn stop(&self) {
        let run = self.shared.state().run.take();
        if let Some(run) = run {
            run.cancel.cancel();
            run.ticker.abort();
            if let Some((_, deferred)) = run.deferred {
                deferred.abort();
            }
            info!(roster = self.shared.target.label(), "polling stopped");
        }
    }

    /// Ask for a refresh now.
    ///
    /// Runs at once if the last check is at least `min_check_interval` old,
    /// otherwise is deferred to when the interval has passed. Further
    /// requests inside the window collapse into that one deferred check.
    /// Ignored while stopped.
    pub fn request_immediate_check(&self) {
        let mut guard = self.shared.state();
        let state = &mut *guard;
        let Some(run) = state.run.as_mut() else {
            debug!(roster = self.shared.target.label(), "not polling, ignoring check request");
            return;
        };
        let cancel = run.cancel.clone();
        if let Some((_, previous)) = run.deferred.take() {
            previous.abort();
        }

        let now = Instant::now();
        match self.shared.floor_deadline(state.last_check_at, now) {
            None => {
                if let Some(in_flight) = self.shared.begin_check(state, now) {
                    let shared = Arc::clone(&self.shared);
                    tokio::spawn(async move { shared.run_check(in_flight, &cancel).await });
                }
            }
            Some(due) => {
                let id = state.next_deferral;
                state.next_deferral += 1;
                debug!(
                    roster = self.shared.target.label(),
                    wait_ms = due.saturating_duration_since(now).as_millis() as u64,
                    "check request deferred"
                );
                let shared = Arc::clone(&self.shared);
                let handle = tokio::spawn(deferred_check(shared, cancel, due, id));
                run.deferred = Some((id, handle));
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.shared.state().run.is_some()
    }

    pub fn last_check_at(&self) -> Option<Instant> {
        self.shared.state().last_check_at
    }
}

impl Drop for PollScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn deferred_check(shared: Arc<Shared>, cancel: CancellationToken, due: Instant, id: u64) {
    let mut due = due;
    let in_flight = loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep_until(due) => {}
        }

        let mut guard = shared.state();
        let state = &mut *guard;
        let now = Instant::now();
        // A tick may have run while we slept; honour the floor against it.
        if let Some(later) = shared.floor_deadline(state.last_check_at, now) {
            due = later;
            continue;
        }
        if let Some(run) = state.run.as_mut() {
            if run.deferred.as_ref().is_some_and(|(slot, _)| *slot == id) {
                run.deferred = None;
            }
        }
        break shared.begin_check(state, now);
    };
    if let Some(in_flight) = in_flight {
        shared.run_check(in_flight, &cancel).await;
    }
}


#[cfg(test)]
mod tests {
    use super::fakes::RecordingTarget;
    use super::*;

    const FLOOR: Duration = Duration::from_millis(4000);

    fn scheduler(target: &Arc<RecordingTarget>) -> PollScheduler {
        PollScheduler::new(target.clone(), FLOOR)
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    #[tokio::test]
    async fn ticks_at_interval_after_start() {
        tokio::time::pause();
        let target = Arc::new(RecordingTarget::default());
        let scheduler = scheduler(&target);
        let started = Instant::now();

        scheduler.start(Duration::from_millis(1000));
        tokio::time::sleep(Duration::from_millis(3500)).await;

        let times = target.times();
        assert_eq!(times.len(), 3);
        assert!(times[0] >= started + Duration::from_millis(1000));
        assert!(scheduler.is_running());
    }

    #[tokio::test]
    async fn immediate_check_runs_at_once_then_is_floored() {
        tokio::time::pause();
        let target = Arc::new(RecordingTarget::default());
        let scheduler = scheduler(&target);
        scheduler.start(Duration::from_secs(60));

        scheduler.request_immediate_check();
        settle().await;
        assert_eq!(target.count(), 1);
        let first = target.times()[0];

        // Burst of requests 500ms apart inside the floor window.
        for _ in 0..3 {
            tokio::time::sleep(Duration::from_millis(500)).await;
            scheduler.request_immediate_check();
        }
        settle().await;
        assert_eq!(target.count(), 1, "burst must be debounced");

        tokio::time::sleep(Duration::from_millis(5000)).await;
        let times = target.times();
        assert_eq!(times.len(), 2, "burst collapses into one deferred check");
        assert!(times[1] >= first + FLOOR);
    }

    #[tokio::test]
    async fn request_while_stopped_is_ignored() {
        tokio::time::pause();
        let target = Arc::new(RecordingTarget::default());
        let scheduler = scheduler(&target);

        scheduler.request_immediate_check();
        tokio::time::sleep(Duration::from_secs(10)).await;

        assert_eq!(target.count(), 0);
        assert!(!scheduler.is_running());
    }

    #[tokio::test]
    async fn stop_halts_ticks_and_deferred_checks() {
        tokio::time::pause();
        let target = Arc::new(RecordingTarget::default());
        let scheduler = scheduler(&target);
        scheduler.start(Duration::from_millis(1000));

        scheduler.request_immediate_check();
        settle().await;
        scheduler.request_immediate_check(); // deferred
        scheduler.stop();

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(target.count(), 1);
        assert!(!scheduler.is_running());
    }

    #[tokio::test]
    async fn overlapping_check_is_dropped() {
        tokio::time::pause();
        let target = Arc::new(RecordingTarget::slow(Duration::from_millis(3000)));
        let scheduler = PollScheduler::new(target.clone(), Duration::from_millis(100));
        scheduler.start(Duration::from_millis(1000));

        // Tick at 1000 is still running at 1200.
        tokio::time::sleep(Duration::from_millis(1200)).await;
        scheduler.request_immediate_check();
        settle().await;

        assert_eq!(target.count(), 1);
    }

    #[tokio::test]
    async fn stop_cancels_in_flight_check() {
        tokio::time::pause();
        let target = Arc::new(RecordingTarget::slow(Duration::from_millis(1000)));
        let scheduler = scheduler(&target);
        scheduler.start(Duration::from_secs(60));

        scheduler.request_immediate_check();
        tokio::time::sleep(Duration::from_millis(500)).await;
        scheduler.stop();
        tokio::time::sleep(Duration::from_millis(1000)).await;

        assert_eq!(*target.cancelled.lock().unwrap(), vec![true]);
    }

    #[tokio::test]
    async fn tick_counts_toward_the_floor() {
        tokio::time::pause();
        let target = Arc::new(RecordingTarget::default());
        let scheduler = scheduler(&target);
        scheduler.start(Duration::from_millis(1000));

        tokio::time::sleep(Duration::from_millis(1500)).await;
        let tick_at = scheduler.last_check_at().expect("tick recorded");
        scheduler.request_immediate_check();
        settle().await;

        // Only the tick so far; the request waits for the floor.
        assert_eq!(target.count(), 1);
        assert_eq!(scheduler.last_check_at(), Some(tick_at));
        scheduler.stop();
    }

    #[tokio::test]
    async fn dropped_tick_does_not_move_the_floor() {
        tokio::time::pause();
        let target = Arc::new(RecordingTarget::slow(Duration::from_millis(3000)));
        let scheduler = scheduler(&target);
        scheduler.start(Duration::from_millis(2500));

        // Immediate check runs 0..3000, so the tick at 2500 is dropped.
        scheduler.request_immediate_check();
        settle().await;
        let first = scheduler.last_check_at().expect("check recorded");
        tokio::time::sleep(Duration::from_millis(2700)).await;
        assert_eq!(target.count(), 1);
        assert_eq!(scheduler.last_check_at(), Some(first));

        // The floor is measured from the check that ran, so this runs now.
        tokio::time::sleep_until(first + Duration::from_millis(4200)).await;
        scheduler.request_immediate_check();
        settle().await;
        assert_eq!(target.count(), 2);
        assert!(target.times()[1] < first + Duration::from_millis(5000));
        scheduler.stop();
    }

    #[tokio::test]
    async fn restart_replaces_timer() {
        tokio::time::pause();
        let target = Arc::new(RecordingTarget::default());
        let scheduler = scheduler(&target);

        scheduler.start(Duration::from_millis(1000));
        tokio::time::sleep(Duration::from_millis(500)).await;
        scheduler.start(Duration::from_millis(1000));
        tokio::time::sleep(Duration::from_millis(800)).await;

        // Old timer would have fired at 1000; the new one fires at 1500.
        assert_eq!(target.count(), 0);
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(target.count(), 1);
    }
}
