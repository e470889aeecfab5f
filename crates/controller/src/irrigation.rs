//! Threshold-gated irrigation at fixed times of day.
//!
//! At each trigger a fresh moisture read decides whether to water. Below
//! the threshold the pump runs for the configured duration, then stops. The
//! stop is owned by a drop guard, so it also happens when the hold is cut
//! short by shutdown, by task cancellation or by a panic.
//!
//! Between triggers the loop naps in bounded steps and re-reads the wall
//! clock, so a clock step (NTP sync on a board without RTC) is noticed. A
//! trigger missed by more than the grace period is skipped rather than
//! fired late.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveTime, Utc};
use chrono_tz::Tz;
use tracing::{info, warn};

use growbox_sensors::SensorDriver;

use crate::actuator::Actuator;
use crate::config::IrrigationSettings;
use crate::schedule::next_trigger;
use crate::shutdown::{sleep_or_shutdown, ShutdownRx};
use crate::status::{ActuatorKind, RelayState, StatusChannel};

/// Longest single sleep between clock checks.
const MAX_NAP: Duration = Duration::from_secs(60);

/// How late a trigger may still fire.
const MISSED_GRACE_SECS: i64 = 5 * 60;

/// Result of one gated action.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Outcome {
    ReadFailed,
    Sufficient { moisture: f64 },
    Watered { moisture: f64 },
    /// Shutdown arrived during the hold; the pump was stopped early.
    Interrupted { moisture: f64 },
}

// ---------------------------------------------------------------------------
// Pump guard
// ---------------------------------------------------------------------------

/// Keeps the pump energized while alive.
struct PumpGuard<'a> {
    pump: &'a Actuator,
    status: &'a StatusChannel,
    armed: bool,
}

impl<'a> PumpGuard<'a> {
    async fn engage(pump: &'a Actuator, status: &'a StatusChannel) -> PumpGuard<'a> {
        // Armed before the line is written so a cancel at the await below
        // still stops the pump.
        let guard = PumpGuard {
            pump,
            status,
            armed: true,
        };
        guard.pump.set(true);
        guard.status.publish(ActuatorKind::Pump, RelayState::On).await;
        guard
    }

    async fn release(mut self) {
        self.armed = false;
        self.pump.set(false);
        self.status
            .publish(ActuatorKind::Pump, RelayState::Off)
            .await;
    }
}

impl Drop for PumpGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.pump.set(false);
            self.status
                .publish_detached(ActuatorKind::Pump, RelayState::Off);
            warn!("pump stopped by guard (hold abandoned)");
        }
    }
}

// ---------------------------------------------------------------------------
// Trigger timing
// ---------------------------------------------------------------------------

#[derive(Debug, PartialEq)]
enum Step {
    Nap(Duration),
    Fire,
    Missed(chrono::Duration),
}

fn step(now: DateTime<Tz>, due: DateTime<Tz>) -> Step {
    if now < due {
        let wait = (due - now).to_std().unwrap_or(Duration::ZERO);
        return Step::Nap(wait.min(MAX_NAP));
    }
    let late = now - due;
    if late > chrono::Duration::seconds(MISSED_GRACE_SECS) {
        Step::Missed(late)
    } else {
        Step::Fire
    }
}

// ---------------------------------------------------------------------------
// Loop
// ---------------------------------------------------------------------------

pub struct IrrigationLoop {
    driver: SensorDriver,
    channel: u8,
    pump: Arc<Actuator>,
    status: StatusChannel,
    times: Vec<NaiveTime>,
    threshold_pct: f64,
    duration: Duration,
    tz: Tz,
}

impl IrrigationLoop {
    pub fn new(
        driver: SensorDriver,
        channel: u8,
        pump: Arc<Actuator>,
        status: StatusChannel,
        policy: &IrrigationSettings,
        tz: Tz,
    ) -> Self {
        Self {
            driver,
            channel,
            pump,
            status,
            times: policy.times.clone(),
            threshold_pct: policy.threshold_pct,
            duration: policy.duration,
            tz,
        }
    }

    fn now(&self) -> DateTime<Tz> {
        Utc::now().with_timezone(&self.tz)
    }

    /// Read moisture and water if it is strictly below the threshold.
    pub async fn gated_action(&self, shutdown: &mut ShutdownRx) -> Outcome {
        let moisture = match self.driver.read_moisture(self.channel).await {
            Ok(m) => m,
            Err(e) => {
                warn!(channel = self.channel, error = %e, "moisture read failed, skipping watering");
                return Outcome::ReadFailed;
            }
        };

        if moisture >= self.threshold_pct {
            info!(moisture, threshold = self.threshold_pct, "soil moisture sufficient");
            return Outcome::Sufficient { moisture };
        }

        info!(
            moisture,
            threshold = self.threshold_pct,
            duration_sec = self.duration.as_secs(),
            "soil dry, watering"
        );
        let guard = PumpGuard::engage(&self.pump, &self.status).await;
        let interrupted = sleep_or_shutdown(self.duration, shutdown).await;
        guard.release().await;

        if interrupted {
            warn!(moisture, "watering interrupted by shutdown");
            Outcome::Interrupted { moisture }
        } else {
            info!(moisture, "watering done");
            Outcome::Watered { moisture }
        }
    }

    /// Run until shutdown. The pump is off when this returns.
    pub async fn run(self, mut shutdown: ShutdownRx) {
        let triggers: Vec<String> = self
            .times
            .iter()
            .map(|t| t.format("%H:%M").to_string())
            .collect();
        info!(
            triggers = ?triggers,
            threshold = self.threshold_pct,
            duration_sec = self.duration.as_secs(),
            tz = %self.tz,
            "irrigation loop started"
        );

        let mut due = next_trigger(&self.now(), &self.times);
        loop {
            let Some(at) = due else {
                warn!("no irrigation trigger times, idling");
                while !sleep_or_shutdown(MAX_NAP, &mut shutdown).await {}
                break;
            };

            match step(self.now(), at) {
                Step::Nap(wait) => {
                    if sleep_or_shutdown(wait, &mut shutdown).await {
                        break;
                    }
                    // The clock may have stepped back past an earlier trigger.
                    if let Some(earlier) = next_trigger(&self.now(), &self.times) {
                        if earlier < at {
                            due = Some(earlier);
                        }
                    }
                    continue;
                }
                Step::Missed(late) => {
                    warn!(
                        trigger = %at.format("%Y-%m-%d %H:%M"),
                        late_sec = late.num_seconds(),
                        "irrigation trigger missed, skipping"
                    );
                }
                Step::Fire => {
                    info!(trigger = %at.format("%Y-%m-%d %H:%M"), "irrigation trigger");
                    if let Outcome::Interrupted { .. } = self.gated_action(&mut shutdown).await {
                        break;
                    }
                }
            }
            due = next_trigger(&self.now(), &self.times);
        }

        self.pump.set(false);
        self.status
            .publish(ActuatorKind::Pump, RelayState::Off)
            .await;
        info!("irrigation loop stopped");
    }
}

// ===========================================================================
// Tests
// ===========================================================================
