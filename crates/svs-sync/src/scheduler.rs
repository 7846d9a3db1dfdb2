//! Jittered periodic timer with mid-cycle control.
//!
//! One background task owns the timer. Callers steer it through a serialized
//! action queue, so the cycle is never redefined concurrently:
//!
//! - `skip` fires the target now and starts a fresh cycle
//! - `reset` starts a fresh cycle without firing
//! - `set(d)` makes the current cycle expire `d` from now
//! - `stop` ends the loop and waits for it to exit

use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, warn};

/// Something the scheduler fires.
#[async_trait]
pub trait ScheduledTask: Send + Sync + 'static {
    async fn fire(&self);
}

/// How the length of a fresh cycle is drawn.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Jitter {
    /// Uniform in `[base * (1 - frac), base * (1 + frac)]`.
    Fraction { base: Duration, frac: f64 },
    /// Uniform in `[min, max]`.
    Bounds { min: Duration, max: Duration },
}

impl Jitter {
    /// No jitter: every cycle lasts exactly `base`.
    pub fn fixed(base: Duration) -> Self {
        Self::Fraction { base, frac: 0.0 }
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        let (min, max) = self.bounds();
        if min >= max {
            return min;
        }
        // Spans past u64::MAX nanoseconds are drawn from the first ~584 years.
        let span = u64::try_from((max - min).as_nanos()).unwrap_or(u64::MAX);
        min + Duration::from_nanos(rng.gen_range(0..=span))
    }

    /// Inclusive range a sample falls in.
    pub fn bounds(&self) -> (Duration, Duration) {
        match *self {
            Self::Fraction { base, frac } => {
                let frac = frac.clamp(0.0, 1.0);
                (base.mul_f64(1.0 - frac), base.mul_f64(1.0 + frac))
            }
            Self::Bounds { min, max } => (min, max),
        }
    }
}

#[derive(Debug)]
enum Action {
    Skip,
    Reset,
    Set(Duration),
    Stop,
}

#[derive(Debug, Clone, Copy)]
struct Cycle {
    start: Instant,
    length: Duration,
}

impl Cycle {
    fn deadline(&self) -> Instant {
        self.start + self.length
    }
}

/// A jittered periodic timer.
pub struct Scheduler {
    jitter: Jitter,
    rng: Arc<Mutex<StdRng>>,
    cycle: Arc<Mutex<Option<Cycle>>>,
    actions: Mutex<Option<mpsc::UnboundedSender<Action>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Scheduler {
    /// Create a stopped scheduler. `seed` makes the jitter reproducible.
    pub fn new(jitter: Jitter, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            jitter,
            rng: Arc::new(Mutex::new(rng)),
            cycle: Arc::new(Mutex::new(None)),
            actions: Mutex::new(None),
            handle: Mutex::new(None),
        }
    }

    /// Start the loop, firing `target` once up front if `fire_now`.
    ///
    /// Must be called from within a tokio runtime. The target is held weakly;
    /// the loop exits once it has been dropped.
    pub fn start(&self, target: Weak<dyn ScheduledTask>, fire_now: bool) {
        let mut handle = lock(&self.handle);
        if handle.as_ref().is_some_and(|h| !h.is_finished()) {
            warn!("scheduler already running");
            return;
        }

        let (tx, rx) = mpsc::unbounded_channel();
        *lock(&self.actions) = Some(tx);

        let run = RunLoop {
            jitter: self.jitter,
            rng: Arc::clone(&self.rng),
            cycle: Arc::clone(&self.cycle),
            target,
            actions: rx,
        };
        *handle = Some(tokio::spawn(run.run(fire_now)));
    }

    /// Stop the loop and wait for it to exit. Safe to call when stopped.
    pub async fn stop(&self) {
        if let Some(tx) = lock(&self.actions).take() {
            let _ = tx.send(Action::Stop);
        }
        let handle = lock(&self.handle).take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!(error = %e, "scheduler loop ended abnormally");
            }
        }
        *lock(&self.cycle) = None;
    }

    /// Fire now, then start a fresh cycle.
    pub fn skip(&self) {
        self.send(Action::Skip);
    }

    /// Start a fresh cycle without firing.
    pub fn reset(&self) {
        self.send(Action::Reset);
    }

    /// Make the current cycle expire `after` from now, without firing.
    pub fn set(&self, after: Duration) {
        self.send(Action::Set(after));
    }

    /// Time remaining in the current cycle. Zero when stopped.
    pub fn time_left(&self) -> Duration {
        match *lock(&self.cycle) {
            Some(cycle) => cycle.length.saturating_sub(cycle.start.elapsed()),
            None => Duration::ZERO,
        }
    }

    pub fn is_running(&self) -> bool {
        lock(&self.handle)
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }

    /// Draw a jittered duration from this scheduler's random source.
    pub fn sample(&self, jitter: &Jitter) -> Duration {
        jitter.sample(&mut *lock(&self.rng))
    }

    fn send(&self, action: Action) {
        match lock(&self.actions).as_ref() {
            Some(tx) => {
                let _ = tx.send(action);
            }
            None => debug!(?action, "scheduler not running, action ignored"),
        }
    }
}

struct RunLoop {
    jitter: Jitter,
    rng: Arc<Mutex<StdRng>>,
    cycle: Arc<Mutex<Option<Cycle>>>,
    target: Weak<dyn ScheduledTask>,
    actions: mpsc::UnboundedReceiver<Action>,
}

impl RunLoop {
    async fn run(mut self, fire_now: bool) {
        if fire_now && !self.fire().await {
            return;
        }
        let mut deadline = self.fresh_cycle();

        loop {
            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => {
                    if !self.fire().await {
                        break;
                    }
                    deadline = self.fresh_cycle();
                }
                action = self.actions.recv() => match action {
                    None | Some(Action::Stop) => break,
                    Some(Action::Skip) => {
                        if !self.fire().await {
                            break;
                        }
                        deadline = self.fresh_cycle();
                    }
                    Some(Action::Reset) => deadline = self.fresh_cycle(),
                    Some(Action::Set(after)) => deadline = self.begin_cycle(after),
                },
            }
        }
        debug!("scheduler loop exited");
    }

    /// Fire the target. `false` if it has been dropped.
    async fn fire(&self) -> bool {
        match self.target.upgrade() {
            Some(target) => {
                target.fire().await;
                true
            }
            None => false,
        }
    }

    fn fresh_cycle(&self) -> Instant {
        let length = self.jitter.sample(&mut *lock(&self.rng));
        self.begin_cycle(length)
    }

    fn begin_cycle(&self, length: Duration) -> Instant {
        let cycle = Cycle {
            start: Instant::now(),
            length,
        };
        *lock(&self.cycle) = Some(cycle);
        cycle.deadline()
    }
}

/// Lock a mutex, recovering the data if a holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
