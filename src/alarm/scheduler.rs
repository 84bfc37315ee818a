use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Local;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::alarm::model::{Alarm, AlarmCreateInfo, MS_PER_MINUTE, SpecError};

const FIRE_CHANNEL_CAPACITY: usize = 64;

/// Result of a cancellation request.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ClearOutcome {
    /// At least one alarm was removed.
    Cleared,
    /// Nothing matched; the call was a no-op.
    NotFound,
}

impl ClearOutcome {
    pub fn from_cleared(was_cleared: bool) -> Self {
        if was_cleared {
            ClearOutcome::Cleared
        } else {
            ClearOutcome::NotFound
        }
    }
}

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("invalid alarm spec: {0}")]
    InvalidSpec(#[from] SpecError),
    #[error("scheduler unavailable: {0}")]
    Unavailable(String),
}

/// Capability interface of the host alarm service.
///
/// The scheduler owns all alarm state and timing. Callers only observe it
/// through [`list_all`](AlarmScheduler::list_all) and the fire stream
/// returned by [`subscribe`](AlarmScheduler::subscribe).
#[async_trait]
pub trait AlarmScheduler: Send + Sync {
    /// Registers `name`, replacing any existing alarm with the same name.
    async fn create(&self, name: &str, info: &AlarmCreateInfo) -> Result<(), SchedulerError>;

    async fn cancel(&self, name: &str) -> Result<ClearOutcome, SchedulerError>;

    async fn cancel_all(&self) -> Result<ClearOutcome, SchedulerError>;

    async fn list_all(&self) -> Result<Vec<Alarm>, SchedulerError>;

    fn subscribe(&self) -> broadcast::Receiver<Alarm>;
}

pub fn now_unix_ms() -> f64 {
    Local::now().timestamp_millis() as f64
}

/// Process-local scheduler used by the demo binary.
///
/// Alarms are kept in creation order. Firing is driven externally through
/// [`fire_due`](InMemoryScheduler::fire_due), usually from the task started
/// by [`spawn_clock`](InMemoryScheduler::spawn_clock).
pub struct InMemoryScheduler {
    alarms: Mutex<Vec<Alarm>>,
    fired: broadcast::Sender<Alarm>,
}

impl Default for InMemoryScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryScheduler {
    pub fn new() -> Self {
        let (fired, _) = broadcast::channel(FIRE_CHANNEL_CAPACITY);
        Self {
            alarms: Mutex::new(Vec::new()),
            fired,
        }
    }

    pub fn create_at(
        &self,
        name: &str,
        info: &AlarmCreateInfo,
        now_ms: f64,
    ) -> Result<(), SchedulerError> {
        let scheduled_time = info.resolve_fire_time(now_ms)?;
        let alarm = Alarm {
            name: name.to_string(),
            scheduled_time,
            period_in_minutes: info.period_in_minutes,
        };
        let mut alarms = self.table()?;
        alarms.retain(|existing| existing.name != name);
        alarms.push(alarm);
        Ok(())
    }

    /// Fires every alarm due at `now_ms` and returns them in table order.
    ///
    /// Periodic alarms move to their first period boundary after `now_ms`;
    /// one-shot alarms are removed.
    pub fn fire_due(&self, now_ms: f64) -> Vec<Alarm> {
        let mut alarms = match self.table() {
            Ok(alarms) => alarms,
            Err(err) => {
                warn!(error = %err, "skipping fire pass");
                return Vec::new();
            }
        };

        let mut fired = Vec::new();
        alarms.retain_mut(|alarm| {
            if alarm.scheduled_time > now_ms {
                return true;
            }
            fired.push(alarm.clone());
            match alarm.period_in_minutes {
                Some(period) => {
                    let period_ms = period * MS_PER_MINUTE;
                    let missed = ((now_ms - alarm.scheduled_time) / period_ms).floor() + 1.0;
                    alarm.scheduled_time += missed * period_ms;
                    true
                }
                None => false,
            }
        });
        drop(alarms);

        for alarm in &fired {
            debug!(alarm = %alarm.name, "alarm fired");
            // No receivers just means nobody is listening yet.
            let _ = self.fired.send(alarm.clone());
        }
        fired
    }

    /// Starts a task that fires due alarms every `interval`.
    ///
    /// The task holds only a weak reference and stops once the scheduler
    /// is dropped.
    pub fn spawn_clock(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let scheduler = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let Some(scheduler) = scheduler.upgrade() else {
                    break;
                };
                scheduler.fire_due(now_unix_ms());
            }
        })
    }

    fn table(&self) -> Result<MutexGuard<'_, Vec<Alarm>>, SchedulerError> {
        self.alarms
            .lock()
            .map_err(|_| SchedulerError::Unavailable("alarm table lock poisoned".to_string()))
    }
}

#[async_trait]
impl AlarmScheduler for InMemoryScheduler {
    async fn create(&self, name: &str, info: &AlarmCreateInfo) -> Result<(), SchedulerError> {
        self.create_at(name, info, now_unix_ms())
    }

    async fn cancel(&self, name: &str) -> Result<ClearOutcome, SchedulerError> {
        let mut alarms = self.table()?;
        let before = alarms.len();
        alarms.retain(|alarm| alarm.name != name);
        Ok(ClearOutcome::from_cleared(alarms.len() != before))
    }

    async fn cancel_all(&self) -> Result<ClearOutcome, SchedulerError> {
        let mut alarms = self.table()?;
        let was_cleared = !alarms.is_empty();
        alarms.clear();
        Ok(ClearOutcome::from_cleared(was_cleared))
    }

    async fn list_all(&self) -> Result<Vec<Alarm>, SchedulerError> {
        Ok(self.table()?.clone())
    }

    fn subscribe(&self) -> broadcast::Receiver<Alarm> {
        self.fired.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alarm::model::DelayUnit;

    fn at(when: f64) -> AlarmCreateInfo {
        AlarmCreateInfo {
            when: Some(when),
            ..AlarmCreateInfo::default()
        }
    }

    #[tokio::test]
    async fn create_replaces_alarm_with_same_name() {
        let scheduler = InMemoryScheduler::new();
        scheduler.create_at("a", &at(1_000.0), 0.0).expect("create a");
        scheduler.create_at("b", &at(2_000.0), 0.0).expect("create b");
        scheduler.create_at("a", &at(3_000.0), 0.0).expect("recreate a");

        let alarms = scheduler.list_all().await.expect("list");
        let names = alarms.iter().map(|a| a.name.as_str()).collect::<Vec<_>>();
        assert_eq!(names, ["b", "a"]);
        assert_eq!(alarms[1].scheduled_time, 3_000.0);
    }

    #[tokio::test]
    async fn create_refuses_malformed_spec() {
        let scheduler = InMemoryScheduler::new();
        let err = scheduler
            .create("broken", &AlarmCreateInfo::default())
            .await
            .expect_err("missing delay should be refused");
        assert!(matches!(err, SchedulerError::InvalidSpec(SpecError::MissingDelay)));
        assert!(scheduler.list_all().await.expect("list").is_empty());
    }

    #[test]
    fn create_refuses_negative_period_instead_of_storing_a_one_shot() {
        let scheduler = InMemoryScheduler::new();
        let info = AlarmCreateInfo::from_form(1.0, DelayUnit::Min, Some(-5.0), 0.0);
        let err = scheduler
            .create_at("neg", &info, 0.0)
            .expect_err("negative period should be refused");
        assert!(matches!(
            err,
            SchedulerError::InvalidSpec(SpecError::NonPositivePeriod(_))
        ));
    }

    #[tokio::test]
    async fn cancel_reports_whether_anything_was_removed() {
        let scheduler = InMemoryScheduler::new();
        scheduler.create_at("a", &at(1_000.0), 0.0).expect("create");

        assert_eq!(scheduler.cancel("missing").await.expect("cancel"), ClearOutcome::NotFound);
        assert_eq!(scheduler.cancel("a").await.expect("cancel"), ClearOutcome::Cleared);
        assert_eq!(scheduler.cancel("a").await.expect("cancel"), ClearOutcome::NotFound);
    }

    #[tokio::test]
    async fn cancel_all_on_empty_table_is_a_no_op() {
        let scheduler = InMemoryScheduler::new();
        assert_eq!(scheduler.cancel_all().await.expect("clear"), ClearOutcome::NotFound);

        scheduler.create_at("a", &at(1_000.0), 0.0).expect("create");
        scheduler.create_at("b", &at(1_000.0), 0.0).expect("create");
        assert_eq!(scheduler.cancel_all().await.expect("clear"), ClearOutcome::Cleared);
        assert!(scheduler.list_all().await.expect("list").is_empty());
    }

    #[tokio::test]
    async fn one_shot_alarm_fires_once_and_is_removed() {
        let scheduler = InMemoryScheduler::new();
        let mut fired_rx = scheduler.subscribe();
        scheduler.create_at("once", &at(5_000.0), 0.0).expect("create");

        assert!(scheduler.fire_due(4_999.0).is_empty());
        let fired = scheduler.fire_due(5_000.0);
        assert_eq!(fired.len(), 1);
        assert_eq!(fired_rx.recv().await.expect("notification").name, "once");
        assert!(scheduler.fire_due(10_000.0).is_empty());
        assert!(scheduler.list_all().await.expect("list").is_empty());
    }

    #[tokio::test]
    async fn periodic_alarm_moves_to_next_boundary() {
        let scheduler = InMemoryScheduler::new();
        let info = AlarmCreateInfo::from_form(1.0, DelayUnit::Min, Some(1.0), 0.0);
        scheduler.create_at("tick", &info, 0.0).expect("create");

        // Two and a half periods late: fires once, then lands on 3 minutes.
        let fired = scheduler.fire_due(150_000.0);
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].scheduled_time, 60_000.0);

        let alarms = scheduler.list_all().await.expect("list");
        assert_eq!(alarms[0].scheduled_time, 180_000.0);
    }

    #[tokio::test(start_paused = true)]
    async fn clock_task_stops_when_scheduler_is_dropped() {
        let scheduler = Arc::new(InMemoryScheduler::new());
        let handle = scheduler.spawn_clock(Duration::from_millis(10));
        drop(scheduler);
        tokio::time::advance(Duration::from_millis(50)).await;
        handle.await.expect("clock task should exit cleanly");
    }
}
