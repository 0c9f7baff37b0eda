#![forbid(unsafe_code)]

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local};
use smarthome_contracts::otp::OtpCode;
use smarthome_engines::otp::OtpGenerator;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, trace};

pub const SCHEDULER_EVENT_QUEUE_CAPACITY: usize = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    pub otp_tick: Duration,
    pub time_tick: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerEvent {
    OtpRefreshed { sequence: u64, code: OtpCode },
    ClockTick { at: DateTime<Local>, otp: OtpCode },
}

#[derive(Debug, Default)]
struct SchedulerCounters {
    otp_refreshes: AtomicU64,
    clock_ticks: AtomicU64,
}

/// Owns the two periodic jobs. Results go to the foreground through the
/// returned channel; the jobs never call into presentation code.
/// Dropping the scheduler stops both jobs.
#[derive(Debug)]
pub struct Scheduler {
    otp_job: JoinHandle<()>,
    clock_job: JoinHandle<()>,
    counters: Arc<SchedulerCounters>,
}

impl Scheduler {
    // Must be called from within a tokio runtime.
    pub fn spawn(
        config: SchedulerConfig,
        otp: Arc<OtpGenerator>,
    ) -> (Self, mpsc::Receiver<SchedulerEvent>) {
        let (tx, rx) = mpsc::channel(SCHEDULER_EVENT_QUEUE_CAPACITY);
        let counters = Arc::new(SchedulerCounters::default());
        let otp_job = spawn_otp_refresh_job(config.otp_tick, otp.clone(), tx.clone(), counters.clone());
        let clock_job = spawn_clock_job(config.time_tick, otp, tx, counters.clone());
        info!(
            otp_tick_secs = config.otp_tick.as_secs(),
            time_tick_secs = config.time_tick.as_secs(),
            "scheduler started"
        );
        (
            Self {
                otp_job,
                clock_job,
                counters,
            },
            rx,
        )
    }

    pub fn otp_refreshes(&self) -> u64 {
        self.counters.otp_refreshes.load(Ordering::Relaxed)
    }

    pub fn clock_ticks(&self) -> u64 {
        self.counters.clock_ticks.load(Ordering::Relaxed)
    }

    pub fn shutdown(self) {
        drop(self);
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.otp_job.abort();
        self.clock_job.abort();
        debug!("scheduler stopped");
    }
}

fn spawn_otp_refresh_job(
    period: Duration,
    otp: Arc<OtpGenerator>,
    tx: mpsc::Sender<SchedulerEvent>,
    counters: Arc<SchedulerCounters>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        // The first code is generated at startup, so the first refresh waits a full period.
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut notify = true;
        loop {
            ticker.tick().await;
            let code = otp.refresh();
            let sequence = counters.otp_refreshes.fetch_add(1, Ordering::Relaxed) + 1;
            trace!(sequence, "otp refresh tick");
            // Rotation keeps going even when nobody listens or the queue is full.
            if notify {
                match tx.try_send(SchedulerEvent::OtpRefreshed { sequence, code }) {
                    Ok(()) | Err(TrySendError::Full(_)) => {}
                    Err(TrySendError::Closed(_)) => notify = false,
                }
            }
        }
    })
}

fn spawn_clock_job(
    period: Duration,
    otp: Arc<OtpGenerator>,
    tx: mpsc::Sender<SchedulerEvent>,
    counters: Arc<SchedulerCounters>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            counters.clock_ticks.fetch_add(1, Ordering::Relaxed);
            let event = SchedulerEvent::ClockTick {
                at: Local::now(),
                otp: otp.current(),
            };
            match tx.try_send(event) {
                Ok(()) | Err(TrySendError::Full(_)) => {}
                Err(TrySendError::Closed(_)) => {
                    debug!("clock job stopping, display channel closed");
                    break;
                }
            }
        }
    })
}
