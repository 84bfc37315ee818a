use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Deserialize;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, info, warn};

use crate::activity_log::{ActivityLog, LogEntry};
use crate::alarm::model::{Alarm, AlarmCreateInfo};
use crate::alarm::scheduler::{AlarmScheduler, ClearOutcome};
use crate::alert::AlertSound;
use crate::display::{Affordance, AlarmRow, ClickTarget, render_rows};

/// How `create_alarm` treats a spec without exactly one delay encoding.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreatePolicy {
    /// Reject locally and log the reason; the scheduler is never called.
    #[default]
    Strict,
    /// Forward to the scheduler and log whatever it reports.
    Permissive,
}

#[derive(Debug, Clone, Default)]
pub struct ManagerSettings {
    pub log_capacity: Option<usize>,
    /// Upper bound on the scheduler query inside a refresh.
    pub refresh_timeout: Option<Duration>,
    pub create_policy: CreatePolicy,
}

/// An operation's outcome together with the log entry it appended.
#[derive(Debug, Clone, PartialEq)]
pub struct Reported<T> {
    pub outcome: T,
    pub entry: LogEntry,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum RefreshOutcome {
    /// The display was repopulated with this many rows.
    Rendered(usize),
    /// Another refresh was in flight; the request was dropped.
    Skipped,
    /// The scheduler query failed or timed out; the display is left empty.
    Failed,
}

/// Where a failed refresh reports itself.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
enum FailureReport {
    ActivityLog,
    TracingOnly,
}

/// Releases the single-flight flag when dropped, on every exit path.
struct RefreshGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> RefreshGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for RefreshGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Mediates every interaction between the UI and the alarm scheduler.
///
/// The manager never holds an authoritative copy of the alarm set. Its
/// rendered rows are a snapshot taken by the last completed refresh, and
/// at most one refresh runs at a time; requests arriving while one is in
/// flight are dropped, not queued. Failures are reported only through the
/// activity log.
pub struct AlarmManager<S, A> {
    scheduler: Arc<S>,
    alert: A,
    settings: ManagerSettings,
    refreshing: AtomicBool,
    rows: Mutex<Vec<AlarmRow>>,
    log: Mutex<ActivityLog>,
}

impl<S, A> AlarmManager<S, A>
where
    S: AlarmScheduler,
    A: AlertSound,
{
    pub fn new(scheduler: Arc<S>, alert: A, settings: ManagerSettings) -> Self {
        let manager = Self {
            scheduler,
            alert,
            log: Mutex::new(ActivityLog::new(settings.log_capacity)),
            settings,
            refreshing: AtomicBool::new(false),
            rows: Mutex::new(Vec::new()),
        };
        manager.log_message("Manager: initializing demo");
        manager
    }

    pub fn log_message(&self, message: impl Into<String>) -> LogEntry {
        let entry = self.log_mut().push(message);
        info!(target: "alarmdesk::activity", "{}", entry.message);
        entry
    }

    /// Returns the single entry the request added to the log.
    pub async fn create_alarm(&self, name: &str, info: &AlarmCreateInfo) -> LogEntry {
        if self.settings.create_policy == CreatePolicy::Strict
            && let Err(err) = info.validate()
        {
            return self.log_message(format!("Manager: rejected alarm \"{name}\": {err}"));
        }

        let entry = match self.scheduler.create(name, info).await {
            Ok(()) => self.log_message(format!("Created \"{name}\"\n{}", info.summary_json())),
            Err(err) => {
                warn!(alarm = name, error = %err, "scheduler refused alarm");
                self.log_message(format!("Manager: could not create alarm \"{name}\": {err}"))
            }
        };
        self.refresh_display().await;
        entry
    }

    /// Cancels one alarm. The display is not refreshed.
    pub async fn cancel_alarm(&self, name: &str) -> Reported<ClearOutcome> {
        let (outcome, message) = match self.scheduler.cancel(name).await {
            Ok(ClearOutcome::Cleared) => (
                ClearOutcome::Cleared,
                format!("Manager: canceled alarm \"{name}\""),
            ),
            Ok(ClearOutcome::NotFound) => (
                ClearOutcome::NotFound,
                format!("Manager: could not cancel alarm \"{name}\""),
            ),
            Err(err) => {
                warn!(alarm = name, error = %err, "cancel failed");
                (
                    ClearOutcome::NotFound,
                    format!("Manager: could not cancel alarm \"{name}\": {err}"),
                )
            }
        };
        Reported {
            outcome,
            entry: self.log_message(message),
        }
    }

    /// Silences the alert and cancels every alarm. The display is not refreshed.
    pub async fn cancel_all_alarms(&self) -> Reported<ClearOutcome> {
        self.alert.pause();
        let (outcome, message) = match self.scheduler.cancel_all().await {
            Ok(ClearOutcome::Cleared) => (
                ClearOutcome::Cleared,
                "Manager: canceled all alarms".to_string(),
            ),
            Ok(ClearOutcome::NotFound) => (
                ClearOutcome::NotFound,
                "Manager: could not cancel all alarms".to_string(),
            ),
            Err(err) => {
                warn!(error = %err, "cancel all failed");
                (
                    ClearOutcome::NotFound,
                    format!("Manager: could not cancel all alarms: {err}"),
                )
            }
        };
        Reported {
            outcome,
            entry: self.log_message(message),
        }
    }

    pub async fn refresh_display(&self) -> RefreshOutcome {
        self.refresh(FailureReport::ActivityLog).await
    }

    async fn refresh(&self, report: FailureReport) -> RefreshOutcome {
        let Some(_guard) = RefreshGuard::acquire(&self.refreshing) else {
            debug!("refresh already in flight, dropping request");
            return RefreshOutcome::Skipped;
        };

        self.clear_display();
        let listed = match self.settings.refresh_timeout {
            Some(limit) => match tokio::time::timeout(limit, self.scheduler.list_all()).await {
                Ok(listed) => listed,
                Err(_) => {
                    self.report_failure(
                        report,
                        format!("Manager: refresh timed out after {} ms", limit.as_millis()),
                    );
                    return RefreshOutcome::Failed;
                }
            },
            None => self.scheduler.list_all().await,
        };

        match listed {
            Ok(alarms) => {
                let rendered = render_rows(&alarms);
                let count = rendered.len();
                self.rows_mut().extend(rendered);
                debug!(rows = count, "display refreshed");
                RefreshOutcome::Rendered(count)
            }
            Err(err) => {
                self.report_failure(report, format!("Manager: could not list alarms: {err}"));
                RefreshOutcome::Failed
            }
        }
    }

    fn report_failure(&self, report: FailureReport, message: String) {
        match report {
            FailureReport::ActivityLog => {
                warn!("{message}");
                self.log_message(message);
            }
            FailureReport::TracingOnly => warn!("{message}"),
        }
    }

    pub async fn handle_alarm_fired(&self, alarm: &Alarm) {
        self.log_message(format!(
            "Alarm \"{}\" fired\n{}",
            alarm.name,
            alarm.summary_json()
        ));
        self.alert.play();
        // A fire adds exactly one log entry; a failed follow-up refresh goes to tracing.
        self.refresh(FailureReport::TracingOnly).await;
    }

    /// Routes a click on the alarm display. Returns the entry logged by the
    /// handled action, or `None` when the click hit nothing actionable.
    pub async fn handle_click(&self, target: &ClickTarget) -> Option<LogEntry> {
        match target.affordance() {
            Some(Affordance::CancelRow) => {
                let Some(name) = target.row_name.as_deref() else {
                    debug!(tag = %target.tag, "cancel click outside a row");
                    return None;
                };
                let reported = self.cancel_alarm(name).await;
                self.refresh_display().await;
                Some(reported.entry)
            }
            None => None,
        }
    }

    /// Feeds fire notifications into [`handle_alarm_fired`](Self::handle_alarm_fired)
    /// until the stream closes.
    pub async fn listen(&self, mut fired: broadcast::Receiver<Alarm>) {
        loop {
            match fired.recv().await {
                Ok(alarm) => self.handle_alarm_fired(&alarm).await,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "fire notifications lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    }

    pub fn clear_display(&self) {
        self.rows_mut().clear();
    }

    pub fn stop_alert(&self) {
        self.alert.pause();
    }

    pub fn rows(&self) -> Vec<AlarmRow> {
        self.rows_mut().clone()
    }

    /// Log entries, newest first.
    pub fn log_entries(&self) -> Vec<LogEntry> {
        self.log_mut().entries().cloned().collect()
    }

    #[cfg(test)]
    pub fn is_refreshing(&self) -> bool {
        self.refreshing.load(Ordering::Acquire)
    }

    pub fn alert(&self) -> &A {
        &self.alert
    }

    fn rows_mut(&self) -> MutexGuard<'_, Vec<AlarmRow>> {
        self.rows.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn log_mut(&self) -> MutexGuard<'_, ActivityLog> {
        self.log.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
