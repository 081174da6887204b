use super::Background;
use crate::identity::{Clock, time_until_rollover};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{Duration, MissedTickBehavior};

const MIN_CHECK_INTERVAL_MINUTES: u32 = 5;
const DAY: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Alarm {
    HourlyCheck,
    MidnightRefresh,
}

impl Alarm {
    pub fn name(self) -> &'static str {
        match self {
            Self::HourlyCheck => "hourly-check",
            Self::MidnightRefresh => "midnight-refresh",
        }
    }
}

/// Start both periodic resyncs. Neither fires immediately: the caller has
/// just run the startup pass.
pub fn spawn_alarms(
    background: &Arc<Background>,
    check_interval_minutes: u32,
) -> Vec<JoinHandle<()>> {
    vec![
        spawn_hourly_check(Arc::clone(background), check_interval_minutes),
        spawn_midnight_refresh(Arc::clone(background)),
    ]
}

fn spawn_hourly_check(background: Arc<Background>, interval_minutes: u32) -> JoinHandle<()> {
    let minutes = interval_minutes.max(MIN_CHECK_INTERVAL_MINUTES);
    let period = Duration::from_secs(u64::from(minutes) * 60);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            fire(&background, Alarm::HourlyCheck).await;
        }
    })
}

fn spawn_midnight_refresh(background: Arc<Background>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let now = background.coordinator().clock().now();
        let first = time_until_rollover(now);
        tracing::debug!("Midnight refresh in {}s", first.as_secs());
        let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + first, DAY);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            fire(&background, Alarm::MidnightRefresh).await;
        }
    })
}

async fn fire(background: &Background, alarm: Alarm) {
    if let Err(e) = background.on_alarm(alarm).await {
        tracing::warn!("Alarm '{}' failed: {e}", alarm.name());
    }
}
