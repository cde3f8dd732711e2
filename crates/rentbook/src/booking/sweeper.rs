use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::domain::{HoldId, HoldState};
use super::gate::AvailabilityGate;
use super::repository::{BookingRepository, ChangeSet};
use super::service::{BookingError, BookingService};

/// Counts from one sweep run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub scanned: usize,
    pub expired: usize,
    pub failed: usize,
    /// Set when the run was skipped because a previous one was still in progress.
    pub skipped: bool,
}

enum Outcome {
    Expired,
    StillRunning,
}

/// Clears the running flag when a sweep ends, including by unwinding.
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Expires confirmed holds whose stay has ended and frees their listings.
pub struct ExpirationSweeper<R> {
    service: Arc<BookingService<R>>,
    running: AtomicBool,
}

impl<R> ExpirationSweeper<R>
where
    R: BookingRepository + 'static,
{
    pub fn new(service: Arc<BookingService<R>>) -> Self {
        Self {
            service,
            running: AtomicBool::new(false),
        }
    }

    /// Scan every confirmed hold once. Failures on one hold are logged and counted, they
    /// never abort the rest of the run.
    pub fn run_once(&self, now: DateTime<Utc>) -> SweepReport {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("previous sweep still running, skipping");
            return SweepReport {
                skipped: true,
                ..SweepReport::default()
            };
        }

        let _running = RunningGuard(&self.running);
        self.sweep(now)
    }

    fn sweep(&self, now: DateTime<Utc>) -> SweepReport {
        let mut report = SweepReport::default();
        let confirmed = match self.service.repository().holds_in_state(HoldState::Confirmed) {
            Ok(holds) => holds,
            Err(err) => {
                warn!(error = %err, "sweep could not list confirmed bookings");
                report.failed = 1;
                return report;
            }
        };

        for hold in confirmed {
            report.scanned += 1;
            let hold_id = hold.record.id;
            let listing_id = hold.record.listing_id;
            let outcome = self
                .service
                .locks()
                .with_listing(&listing_id, || self.expire_if_finished(&hold_id, now));
            match outcome {
                Ok(Outcome::Expired) => report.expired += 1,
                Ok(Outcome::StillRunning) => {}
                Err(err) => {
                    report.failed += 1;
                    warn!(hold_id = %hold_id, listing_id = %listing_id, error = %err, "failed to expire booking");
                }
            }
        }

        if report.expired > 0 || report.failed > 0 {
            info!(
                scanned = report.scanned,
                expired = report.expired,
                failed = report.failed,
                "expiration sweep finished"
            );
        }
        report
    }

    fn expire_if_finished(
        &self,
        hold_id: &HoldId,
        now: DateTime<Utc>,
    ) -> Result<Outcome, BookingError> {
        let mut hold = self.service.load_hold(hold_id)?;
        if hold.record.state != HoldState::Confirmed {
            return Ok(Outcome::StillRunning);
        }
        let mut listing = self.service.load_listing(&hold.record.listing_id)?;
        if hold.record.stay_ends_at(listing.record.check_out_time) > now {
            return Ok(Outcome::StillRunning);
        }

        hold.record.state = HoldState::Expired;
        AvailabilityGate::vacate(&mut listing.record);

        let mut changes = ChangeSet::new();
        changes.update_hold(hold).update_listing(listing);
        self.service.repository().commit(changes)?;
        debug!(hold_id = %hold_id, "booking expired");
        Ok(Outcome::Expired)
    }

    /// Run the sweep every `interval` until `shutdown` flips to `true` or its sender drops.
    pub fn spawn(
        self: Arc<Self>,
        interval: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            info!(interval_secs = interval.as_secs(), "expiration sweeper started");
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let sweeper = Arc::clone(&self);
                        let run = tokio::task::spawn_blocking(move || sweeper.run_once(Utc::now()));
                        if let Err(err) = run.await {
                            warn!(error = %err, "sweep task panicked");
                        }
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
            info!("expiration sweeper stopped");
        })
    }
}
