//! Debounce timers.
//!
//! A debounce scheduler holds at most one pending task. Every `arm` call
//! replaces the pending task and restarts the countdown, so a burst of
//! triggers closer together than the delay collapses into a single run.

use std::io;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Work run when a countdown elapses.
pub type Task = Arc<dyn Fn() + Send + Sync>;

pub trait DebounceScheduler: Send + Sync {
    /// Start (or restart) the countdown; `task` runs once `delay` passes without another `arm`.
    fn arm(&self, delay: Duration, task: Task);

    /// Drop the pending task, if any. A task already running is not interrupted.
    fn cancel(&self);

    fn is_armed(&self) -> bool;
}

// ── Background thread timer ──────────────────────────────────────────

#[derive(Default)]
struct TimerState {
    deadline: Option<Instant>,
    task: Option<Task>,
    shutdown: bool,
}

#[derive(Default)]
struct TimerShared {
    state: Mutex<TimerState>,
    wake: Condvar,
}

impl TimerShared {
    fn lock(&self) -> MutexGuard<'_, TimerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Debounce timer backed by one dedicated thread.
///
/// Tasks run on the timer thread, outside the timer lock, so a task may
/// re-arm the scheduler.
pub struct ThreadScheduler {
    shared: Arc<TimerShared>,
    handle: Option<JoinHandle<()>>,
}

impl ThreadScheduler {
    pub fn new() -> io::Result<Self> {
        Self::with_name("mapraster-debounce")
    }

    pub fn with_name(name: &str) -> io::Result<Self> {
        let shared = Arc::new(TimerShared::default());
        let worker_shared = shared.clone();
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || run_timer(worker_shared))?;
        log::debug!("Debounce timer thread '{}' started", name);
        Ok(Self {
            shared,
            handle: Some(handle),
        })
    }
}

fn run_timer(shared: Arc<TimerShared>) {
    let mut state = shared.lock();
    loop {
        if state.shutdown {
            return;
        }
        let deadline = state.deadline;
        match deadline {
            None => {
                state = shared.wake.wait(state).unwrap_or_else(|e| e.into_inner());
            }
            Some(deadline) => {
                let now = Instant::now();
                if now < deadline {
                    state = shared
                        .wake
                        .wait_timeout(state, deadline - now)
                        .unwrap_or_else(|e| e.into_inner())
                        .0;
                    continue;
                }
                state.deadline = None;
                let task = state.task.take();
                drop(state);
                if let Some(task) = task {
                    task();
                }
                state = shared.lock();
            }
        }
    }
}

impl DebounceScheduler for ThreadScheduler {
    fn arm(&self, delay: Duration, task: Task) {
        let mut state = self.shared.lock();
        state.deadline = Some(Instant::now() + delay);
        state.task = Some(task);
        self.shared.wake.notify_one();
    }

    fn cancel(&self) {
        let mut state = self.shared.lock();
        state.deadline = None;
        state.task = None;
        self.shared.wake.notify_one();
    }

    fn is_armed(&self) -> bool {
        self.shared.lock().deadline.is_some()
    }
}

impl Drop for ThreadScheduler {
    fn drop(&mut self) {
        {
            let mut state = self.shared.lock();
            state.shutdown = true;
            state.task = None;
            self.shared.wake.notify_one();
        }
        if let Some(handle) = self.handle.take() {
            // The last owner can be dropped from inside a task; never join ourselves.
            if handle.thread().id() != thread::current().id() {
                let _ = handle.join();
            }
        }
    }
}

impl std::fmt::Debug for ThreadScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadScheduler")
            .field("armed", &self.is_armed())
            .finish()
    }
}

// ── Manual clock ─────────────────────────────────────────────────────

#[derive(Default)]
struct ManualState {
    now: Duration,
    deadline: Option<Duration>,
    task: Option<Task>,
    arms: usize,
    fires: usize,
}

/// Debounce scheduler driven by an explicit clock.
///
/// Time only moves when [`advance`](ManualScheduler::advance) is called, which
/// makes debounce behaviour deterministic in tests and lets hosts drive
/// rasterization from their own frame clock.
#[derive(Default)]
pub struct ManualScheduler {
    state: Mutex<ManualState>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ManualState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn now(&self) -> Duration {
        self.lock().now
    }

    /// Move the clock forward. Runs the pending task if its deadline is reached.
    pub fn advance(&self, by: Duration) -> bool {
        let task = {
            let mut state = self.lock();
            state.now += by;
            let deadline = state.deadline;
            match deadline {
                Some(deadline) if deadline <= state.now => {
                    state.deadline = None;
                    state.fires += 1;
                    state.task.take()
                }
                _ => None,
            }
        };
        match task {
            Some(task) => {
                task();
                true
            }
            None => false,
        }
    }

    /// Jump the clock to the pending deadline and run the task.
    pub fn fire_pending(&self) -> bool {
        let remaining = {
            let state = self.lock();
            let now = state.now;
            match state.deadline {
                Some(deadline) => deadline.saturating_sub(now),
                None => return false,
            }
        };
        self.advance(remaining)
    }

    /// Number of `arm` calls received.
    pub fn arm_count(&self) -> usize {
        self.lock().arms
    }

    /// Number of tasks run.
    pub fn fire_count(&self) -> usize {
        self.lock().fires
    }
}

impl DebounceScheduler for ManualScheduler {
    fn arm(&self, delay: Duration, task: Task) {
        let mut state = self.lock();
        let deadline = state.now + delay;
        state.deadline = Some(deadline);
        state.task = Some(task);
        state.arms += 1;
    }

    fn cancel(&self) {
        let mut state = self.lock();
        state.deadline = None;
        state.task = None;
    }

    fn is_armed(&self) -> bool {
        self.lock().deadline.is_some()
    }
}

impl std::fmt::Debug for ManualScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("ManualScheduler")
            .field("now", &state.now)
            .field("deadline", &state.deadline)
            .field("arms", &state.arms)
            .field("fires", &state.fires)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc;

    fn counter() -> (Arc<AtomicUsize>, Task) {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        (count, Arc::new(move || {
            c.fetch_add(1, Ordering::SeqCst);
        }))
    }

    #[test]
    fn test_manual_fires_after_delay() {
        let scheduler = ManualScheduler::new();
        let (count, task) = counter();
        scheduler.arm(Duration::from_millis(500), task);
        assert!(scheduler.is_armed());

        assert!(!scheduler.advance(Duration::from_millis(499)));
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert!(scheduler.advance(Duration::from_millis(1)));
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(!scheduler.is_armed());

        // Fires once only.
        assert!(!scheduler.advance(Duration::from_secs(10)));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_manual_rearm_restarts_countdown() {
        let scheduler = ManualScheduler::new();
        let (count, task) = counter();
        for _ in 0..5 {
            scheduler.arm(Duration::from_millis(100), task.clone());
            scheduler.advance(Duration::from_millis(60));
        }
        assert_eq!(count.load(Ordering::SeqCst), 0);
        scheduler.advance(Duration::from_millis(40));
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(scheduler.arm_count(), 5);
        assert_eq!(scheduler.fire_count(), 1);
    }

    #[test]
    fn test_manual_cancel_and_fire_pending() {
        let scheduler = ManualScheduler::new();
        let (count, task) = counter();
        scheduler.arm(Duration::from_millis(100), task.clone());
        scheduler.cancel();
        assert!(!scheduler.fire_pending());

        scheduler.arm(Duration::ZERO, task);
        assert!(scheduler.fire_pending());
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_thread_scheduler_debounces_burst() {
        let scheduler = ThreadScheduler::new().unwrap();
        let (tx, rx) = mpsc::channel::<usize>();
        let tx = Arc::new(Mutex::new(tx));
        for i in 0..10 {
            let tx = tx.clone();
            scheduler.arm(
                Duration::from_millis(50),
                Arc::new(move || {
                    let _ = tx.lock().unwrap().send(i);
                }),
            );
        }
        let fired = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(fired, 9);
        assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
        assert!(!scheduler.is_armed());
    }

    #[test]
    fn test_thread_scheduler_cancel() {
        let scheduler = ThreadScheduler::new().unwrap();
        let (count, task) = counter();
        scheduler.arm(Duration::from_millis(50), task);
        scheduler.cancel();
        thread::sleep(Duration::from_millis(150));
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}
