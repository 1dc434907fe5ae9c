//! Serialized call broker for the quota-constrained inference dependency.
//!
//! Every outbound inference call goes through one [`CallBroker`]: a single
//! worker thread pulls tasks off an unbounded FIFO queue, paces them to the
//! configured requests-per-minute ceiling, and retries transient failures
//! with exponential backoff. At most one call is in flight at any time.
//!
//! Ordering: tasks run in submission order, except that a retried task
//! re-enters at the back of the queue and may let later submissions run
//! first. That trade-off is accepted for simplicity; it is not a strict
//! FIFO guarantee.
//!
//! Known limitation: a caller that times out waiting for its result does
//! not cancel the task. The task still runs (or retries) to completion and
//! its result is silently discarded.

use crate::{Error, Result};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender, SyncSender, channel, sync_channel};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

/// Broker configuration.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// Maximum calls per rolling 60-second window.
    pub rpm: u32,
    /// Retry budget per task for transient failures.
    pub max_retries: u32,
    /// How long a caller blocks awaiting its result.
    pub wait_timeout: Duration,
    /// Backoff unit; attempt `k` sleeps `backoff_base * 2^k` before requeue.
    pub backoff_base: Duration,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            rpm: 10,
            max_retries: 3,
            wait_timeout: Duration::from_secs(60),
            backoff_base: Duration::from_secs(1),
        }
    }
}

impl BrokerConfig {
    /// Loads configuration from environment variables.
    ///
    /// | Variable | Description | Default |
    /// |----------|-------------|---------|
    /// | `ASKBASE_BROKER_RPM` | Calls per minute ceiling | 10 |
    /// | `ASKBASE_BROKER_MAX_RETRIES` | Retry budget per task | 3 |
    /// | `ASKBASE_BROKER_WAIT_TIMEOUT_MS` | Caller wait timeout | 60000 |
    /// | `ASKBASE_BROKER_BACKOFF_BASE_MS` | Backoff unit | 1000 |
    #[must_use]
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Applies environment variable overrides.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(v) = std::env::var("ASKBASE_BROKER_RPM") {
            if let Ok(parsed) = v.parse::<u32>() {
                self.rpm = parsed.max(1);
            }
        }
        if let Ok(v) = std::env::var("ASKBASE_BROKER_MAX_RETRIES") {
            if let Ok(parsed) = v.parse::<u32>() {
                self.max_retries = parsed;
            }
        }
        if let Ok(v) = std::env::var("ASKBASE_BROKER_WAIT_TIMEOUT_MS") {
            if let Ok(parsed) = v.parse::<u64>() {
                self.wait_timeout = Duration::from_millis(parsed);
            }
        }
        if let Ok(v) = std::env::var("ASKBASE_BROKER_BACKOFF_BASE_MS") {
            if let Ok(parsed) = v.parse::<u64>() {
                self.backoff_base = Duration::from_millis(parsed);
            }
        }
        self
    }

    /// Minimum spacing between consecutive calls.
    #[must_use]
    pub fn min_interval(&self) -> Duration {
        Duration::from_secs_f64(60.0 / f64::from(self.rpm.max(1)))
    }
}

/// Broker usage statistics for operational dashboards.
#[derive(Debug, Clone, serde::Serialize)]
pub struct BrokerStats {
    /// Configured calls-per-minute ceiling.
    pub rpm_limit: u32,
    /// Completed calls in the current rolling window.
    pub requests_last_minute: u32,
    /// Completed calls since the broker started.
    pub requests_total: u64,
    /// Tasks currently queued or running.
    pub queue_size: usize,
    /// Minimum spacing between calls, in seconds.
    pub min_interval_sec: f64,
}

/// A unit of work awaiting the worker.
///
/// Lifecycle: queued, running, then completed, retrying (back to queued),
/// or failed once the retry budget is spent.
struct BrokerTask {
    job: Box<dyn Fn() -> Result<String> + Send>,
    retry_count: u32,
    done: SyncSender<Result<String>>,
}

/// Rate-limit state shared between submitters and the worker, guarded by a
/// single mutex so concurrent readers never race the window counters.
struct RateState {
    last_call_time: Option<Instant>,
    window_started: Instant,
    calls_this_window: u32,
    calls_total: u64,
}

/// Single admission point for calls to the inference dependency.
pub struct CallBroker {
    config: BrokerConfig,
    queue: Sender<BrokerTask>,
    state: Arc<Mutex<RateState>>,
    pending: Arc<AtomicUsize>,
    // Liveness token; the worker exits when it holds the last clone.
    liveness: Arc<()>,
}

impl CallBroker {
    /// Creates a broker and spawns its worker thread.
    ///
    /// The worker exits once every handle to the broker is dropped.
    #[must_use]
    pub fn new(config: BrokerConfig) -> Self {
        let (tx, rx) = channel::<BrokerTask>();
        let state = Arc::new(Mutex::new(RateState {
            last_call_time: None,
            window_started: Instant::now(),
            calls_this_window: 0,
            calls_total: 0,
        }));
        let pending = Arc::new(AtomicUsize::new(0));
        let liveness = Arc::new(());

        let worker = Worker {
            config: config.clone(),
            requeue: tx.clone(),
            state: Arc::clone(&state),
            pending: Arc::clone(&pending),
            liveness: Arc::clone(&liveness),
        };
        thread::Builder::new()
            .name("askbase-broker".to_string())
            .spawn(move || worker.run(&rx))
            .ok();

        tracing::info!(rpm = config.rpm, max_retries = config.max_retries, "call broker started");

        Self {
            config,
            queue: tx,
            state,
            pending,
            liveness,
        }
    }

    /// Creates a broker with default configuration.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(BrokerConfig::default())
    }

    /// Submits a call and blocks until it resolves or the wait timeout
    /// elapses.
    ///
    /// The job may run more than once (retries), so it must be `Fn`, not
    /// `FnOnce`. A timed-out caller leaves the task in place; its eventual
    /// result is discarded.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RetryExhausted`] when the retry budget is spent,
    /// or [`Error::OperationFailed`] when the wait timeout elapses or the
    /// worker is gone.
    pub fn call<F>(&self, job: F) -> Result<String>
    where
        F: Fn() -> Result<String> + Send + 'static,
    {
        let (done_tx, done_rx) = sync_channel(1);
        let task = BrokerTask {
            job: Box::new(job),
            retry_count: 0,
            done: done_tx,
        };

        self.pending.fetch_add(1, Ordering::SeqCst);
        metrics::counter!("broker_calls_submitted_total").increment(1);
        self.queue.send(task).map_err(|_| Error::OperationFailed {
            operation: "broker_submit".to_string(),
            cause: "worker thread is not running".to_string(),
        })?;

        match done_rx.recv_timeout(self.config.wait_timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => {
                metrics::counter!("broker_caller_timeouts_total").increment(1);
                tracing::error!(
                    timeout_ms = u64::try_from(self.config.wait_timeout.as_millis()).unwrap_or(u64::MAX),
                    "caller timed out awaiting brokered call; task will still run"
                );
                Err(Error::OperationFailed {
                    operation: "broker_call".to_string(),
                    cause: format!(
                        "timed out after {}ms awaiting result",
                        self.config.wait_timeout.as_millis()
                    ),
                })
            },
            Err(RecvTimeoutError::Disconnected) => Err(Error::OperationFailed {
                operation: "broker_call".to_string(),
                cause: "worker dropped the task without resolving it".to_string(),
            }),
        }
    }

    /// Returns usage statistics.
    pub fn stats(&self) -> BrokerStats {
        let (requests_last_minute, requests_total) = self.state.lock().map_or((0, 0), |state| {
            (state.calls_this_window, state.calls_total)
        });

        BrokerStats {
            rpm_limit: self.config.rpm,
            requests_last_minute,
            requests_total,
            queue_size: self.pending.load(Ordering::SeqCst),
            min_interval_sec: self.config.min_interval().as_secs_f64(),
        }
    }
}

/// The background worker owning the consuming side of the queue.
struct Worker {
    config: BrokerConfig,
    requeue: Sender<BrokerTask>,
    state: Arc<Mutex<RateState>>,
    pending: Arc<AtomicUsize>,
    liveness: Arc<()>,
}

impl Worker {
    fn run(&self, rx: &Receiver<BrokerTask>) {
        loop {
            // recv() with a timeout so the thread notices disconnection even
            // while idle. The worker exits when every Sender is gone, which
            // happens when the broker and all queued retries are dropped.
            let task = match rx.recv_timeout(Duration::from_secs(1)) {
                Ok(task) => task,
                Err(RecvTimeoutError::Timeout) => {
                    // The worker holds its own requeue Sender, so `rx` never
                    // reports disconnected; the liveness token tells us when
                    // the broker handle itself is gone.
                    if self.pending.load(Ordering::SeqCst) == 0
                        && Arc::strong_count(&self.liveness) == 1
                    {
                        break;
                    }
                    continue;
                },
                Err(RecvTimeoutError::Disconnected) => break,
            };

            self.wait_for_rate_limit();
            self.execute(task);
        }
        tracing::debug!("broker worker exiting");
    }

    fn execute(&self, mut task: BrokerTask) {
        let span = tracing::debug_span!("broker.call", retry = task.retry_count);
        let _enter = span.enter();

        let started = Instant::now();
        let result = (task.job)();
        let elapsed = started.elapsed();
        metrics::histogram!("broker_call_duration_ms").record(elapsed.as_secs_f64() * 1000.0);

        match result {
            Ok(value) => {
                self.record_completed();
                metrics::counter!("broker_calls_total", "status" => "success").increment(1);
                self.pending.fetch_sub(1, Ordering::SeqCst);
                // Send fails only if the caller gave up; discard silently.
                let _ = task.done.send(Ok(value));
            },
            Err(err) => {
                if task.retry_count < self.config.max_retries {
                    task.retry_count += 1;
                    let backoff = self
                        .config
                        .backoff_base
                        .saturating_mul(2u32.saturating_pow(task.retry_count));
                    metrics::counter!("broker_retries_total").increment(1);
                    tracing::warn!(
                        attempt = task.retry_count,
                        max_retries = self.config.max_retries,
                        backoff_ms = u64::try_from(backoff.as_millis()).unwrap_or(u64::MAX),
                        error = %err,
                        "brokered call failed, retrying"
                    );
                    thread::sleep(backoff);
                    // Back of the queue; later submissions may run first.
                    if self.requeue.send(task).is_err() {
                        self.pending.fetch_sub(1, Ordering::SeqCst);
                    }
                } else {
                    metrics::counter!("broker_calls_total", "status" => "failed").increment(1);
                    tracing::error!(
                        attempts = task.retry_count + 1,
                        error = %err,
                        "brokered call failed after exhausting retries"
                    );
                    self.pending.fetch_sub(1, Ordering::SeqCst);
                    let _ = task.done.send(Err(Error::RetryExhausted {
                        attempts: task.retry_count + 1,
                        cause: err.to_string(),
                    }));
                }
            },
        }
    }

    /// Sleeps as needed to honor the per-call spacing, and rolls the
    /// 60-second window counter.
    ///
    /// The sleep duration is computed under the lock but slept outside it,
    /// so `stats()` readers never block behind the pacing delay.
    fn wait_for_rate_limit(&self) {
        let sleep_for = {
            let Ok(mut state) = self.state.lock() else {
                return;
            };

            let now = Instant::now();
            if now.duration_since(state.window_started) >= Duration::from_secs(60) {
                state.calls_this_window = 0;
                state.window_started = now;
            }

            state.last_call_time.and_then(|last| {
                self.config
                    .min_interval()
                    .checked_sub(now.duration_since(last))
            })
        };

        if let Some(sleep_for) = sleep_for.filter(|d| !d.is_zero()) {
            tracing::debug!(
                sleep_ms = u64::try_from(sleep_for.as_millis()).unwrap_or(u64::MAX),
                "rate limit pacing"
            );
            thread::sleep(sleep_for);
        }

        if let Ok(mut state) = self.state.lock() {
            state.last_call_time = Some(Instant::now());
        }
    }

    fn record_completed(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.calls_this_window += 1;
            state.calls_total += 1;
        }
    }
}
