//! # scheduler — Daily Trigger
//!
//! ยิง forecast run วันละครั้ง ณ เวลาที่กำหนด (UTC)
//!
//! The trigger only decides *when*; overlap protection lives in the
//! orchestrator's run guard, so a run that is still going when the next one
//! fires makes the new one fail fast with `AlreadyRunning`.

use std::sync::Arc;

use chrono::{DateTime, Days, NaiveTime, Utc};
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::error::RunError;
use crate::pipeline::NightlyOrchestrator;

#[derive(Debug, Clone, Copy)]
pub struct DailyTrigger {
    at: NaiveTime,
}

impl DailyTrigger {
    pub fn new(at: NaiveTime) -> Self {
        Self { at }
    }

    /// First fire time strictly after `now`.
    pub fn next_fire(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let today = now.date_naive().and_time(self.at).and_utc();
        if today > now {
            return today;
        }
        now.date_naive()
            .checked_add_days(Days::new(1))
            .map(|d| d.and_time(self.at).and_utc())
            .unwrap_or(today)
    }

    /// Sleeps until each fire time and runs the full tracked set.
    pub fn spawn(self, orchestrator: Arc<NightlyOrchestrator>) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                let now = Utc::now();
                let next = self.next_fire(now);
                info!(next_run = %next, "⏰ next forecast run scheduled");
                let wait = (next - now).to_std().unwrap_or_default();
                tokio::time::sleep(wait).await;

                match orchestrator.run().await {
                    Ok(_) => {}
                    Err(RunError::AlreadyRunning) => {
                        info!("scheduled run skipped, previous run still in progress");
                    }
                    Err(e) => error!(error = %e, "❌ scheduled forecast run could not start"),
                }
            }
        })
    }
}
