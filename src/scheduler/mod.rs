//! Capture scheduler
//!
//! Maintains the recurring-timer state machine: Stopped → Running
//! (timer armed) → Executing (capture in progress) → back to Running or
//! Stopped. Each firing arms a fresh one-shot delay computed from "now",
//! so execution latency shifts absolute fire times instead of
//! accumulating drift. Fire times are wall-clock aligned: a 15-minute
//! interval lands on :00/:15/:30/:45, a daily interval on local
//! midnight in the configured timezone.

use crate::capture::CaptureService;
use crate::state::AppState;
use chrono::{DateTime, NaiveDateTime, TimeZone, Timelike, Utc};
use chrono_tz::Tz;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

const MINUTES_PER_DAY: u32 = 1440;

/// Time source, injectable so tests can pin "now"
pub trait Clock: Send + Sync {
    fn now_utc(&self) -> DateTime<Utc>;
}

/// Wall clock used in production
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Observable scheduler state
#[derive(Debug, Clone, Serialize)]
pub struct SchedulerStatus {
    pub running: bool,
    pub interval_minutes: u32,
    pub fetch_delay_ms: u64,
    pub next_fire_time: DateTime<Utc>,
    pub is_executing: bool,
}

struct TimerState {
    running: bool,
    next_fire: Option<DateTime<Utc>>,
    stop: Option<Arc<Notify>>,
    task: Option<JoinHandle<()>>,
}

struct SchedulerInner {
    state: Mutex<TimerState>,
    clock: Arc<dyn Clock>,
}

/// Recurring capture scheduler. One instance per process.
pub struct CaptureScheduler {
    inner: Arc<SchedulerInner>,
    app: Arc<AppState>,
}

impl CaptureScheduler {
    pub fn new(app: Arc<AppState>, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                state: Mutex::new(TimerState {
                    running: false,
                    next_fire: None,
                    stop: None,
                    task: None,
                }),
                clock,
            }),
            app,
        }
    }

    /// Arm the recurring timer. No-op if already running or if scheduled
    /// captures are disabled by configuration.
    pub fn start(&self) {
        if !self.app.config.capture.enabled {
            info!("Scheduled captures disabled by configuration");
            return;
        }

        let mut state = self.inner.state.lock();
        if state.running {
            return;
        }

        state.running = true;
        let stop = Arc::new(Notify::new());
        state.stop = Some(stop.clone());
        state.task = Some(tokio::spawn(run_loop(
            self.inner.clone(),
            self.app.clone(),
            stop,
        )));

        info!(
            "Scheduler started: every {} minutes",
            self.app.config.capture.interval_minutes
        );
    }

    /// Disarm the timer and clear scheduler state. Idempotent. A capture
    /// that is already executing runs to completion; only future cycles
    /// are prevented.
    pub fn stop(&self) {
        let mut state = self.inner.state.lock();
        if !state.running {
            return;
        }

        state.running = false;
        state.next_fire = None;
        if let Some(stop) = state.stop.take() {
            stop.notify_one();
        }
        state.task = None;

        info!("Scheduler stopped");
    }

    /// Current scheduler state for external observability. When nothing
    /// has been armed yet, the next fire time falls back to the next
    /// local midnight rather than failing.
    pub fn status(&self) -> SchedulerStatus {
        let state = self.inner.state.lock();
        let tz = self.app.config.capture.timezone;

        let next_fire_time = state.next_fire.unwrap_or_else(|| {
            let now_local = self.inner.clock.now_utc().with_timezone(&tz);
            next_fire_time(now_local, MINUTES_PER_DAY).with_timezone(&Utc)
        });

        SchedulerStatus {
            running: state.running,
            interval_minutes: self.app.config.capture.interval_minutes,
            fetch_delay_ms: self.app.config.capture.fetch_delay_ms,
            next_fire_time,
            // The in-flight flag is shared with manual captures, so this
            // reads true whichever path triggered the running capture
            is_executing: self.app.capture_in_flight.load(Ordering::SeqCst),
        }
    }
}

async fn run_loop(inner: Arc<SchedulerInner>, app: Arc<AppState>, stop: Arc<Notify>) {
    loop {
        let fire_at = {
            let mut state = inner.state.lock();
            if !state.running {
                break;
            }

            let tz = app.config.capture.timezone;
            let now_local = inner.clock.now_utc().with_timezone(&tz);
            let fire_local = next_fire_time(now_local, app.config.capture.interval_minutes);
            let fire_utc = fire_local.with_timezone(&Utc);
            state.next_fire = Some(fire_utc);
            fire_utc
        };

        let until_fire = (fire_at - inner.clock.now_utc())
            .to_std()
            .unwrap_or(Duration::ZERO);
        info!(
            "Next capture at {} (in {}s)",
            fire_at.format("%Y-%m-%d %H:%M:%S UTC"),
            until_fire.as_secs()
        );

        tokio::select! {
            _ = stop.notified() => break,
            _ = tokio::time::sleep(until_fire) => {}
        }

        if !inner.state.lock().running {
            break;
        }

        // Reentrancy guard, shared with manual captures: a firing that
        // lands while any capture is still executing is skipped
        // entirely, not queued. capture_all re-checks the same flag
        // atomically, so a race here only changes which log line fires.
        if app.capture_in_flight.load(Ordering::SeqCst) {
            warn!("Timer fired while a capture is still executing, skipping this firing");
            continue;
        }

        match CaptureService::capture_all(&app).await {
            Ok(Some(report)) => info!(
                "Scheduled capture done: {}/{} items",
                report.success_count, report.total_count
            ),
            Ok(None) => info!("Scheduled capture skipped, another capture was in flight"),
            Err(e) => error!("Scheduled capture failed: {}", e),
        }
    }

    inner.state.lock().next_fire = None;
}

/// Compute the next wall-clock-aligned fire time strictly after `now`.
///
/// A daily interval fires at the next local midnight. Any other interval
/// `m` fires at the next multiple of `m` minutes past the hour, seconds
/// zeroed, so e.g. every 15 minutes lands on :00/:15/:30/:45 rather
/// than "now + m".
pub fn next_fire_time(now: DateTime<Tz>, interval_minutes: u32) -> DateTime<Tz> {
    let tz = now.timezone();
    let naive = now.naive_local();

    if interval_minutes == MINUTES_PER_DAY {
        let next_midnight = naive
            .date()
            .succ_opt()
            .expect("date overflow")
            .and_hms_opt(0, 0, 0)
            .unwrap();
        return resolve_local(&tz, next_midnight);
    }

    let steps = naive.minute() / interval_minutes + 1;
    let hour_start = naive.date().and_hms_opt(naive.hour(), 0, 0).unwrap();
    let target = hour_start + chrono::Duration::minutes((steps * interval_minutes) as i64);
    resolve_local(&tz, target)
}

/// Resolve a naive local time against the timezone. Ambiguous times
/// (DST fall-back) take the earlier instant; non-existent times (DST
/// spring-forward gap) advance to the first valid wall-clock time.
fn resolve_local(tz: &Tz, naive: NaiveDateTime) -> DateTime<Tz> {
    let mut probe = naive;
    loop {
        match tz.from_local_datetime(&probe) {
            chrono::LocalResult::Single(t) => return t,
            chrono::LocalResult::Ambiguous(earliest, _) => return earliest,
            chrono::LocalResult::None => {
                probe += chrono::Duration::minutes(15);
            }
        }
    }
}
