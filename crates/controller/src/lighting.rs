//! Grow light control: every interval, evaluate the on/off window in the
//! configured zone and drive the light relay to match.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use tracing::{debug, info};

use crate::actuator::Actuator;
use crate::config::LightSettings;
use crate::schedule::{is_active, ScheduleWindow};
use crate::shutdown::{sleep_or_shutdown, ShutdownRx};
use crate::status::{ActuatorKind, RelayState, StatusChannel};

pub struct LightLoop {
    light: Arc<Actuator>,
    status: StatusChannel,
    window: ScheduleWindow,
    interval: Duration,
    tz: Tz,
}

impl LightLoop {
    pub fn new(light: Arc<Actuator>, status: StatusChannel, settings: &LightSettings, tz: Tz) -> Self {
        Self {
            light,
            status,
            window: settings.window,
            interval: settings.interval,
            tz,
        }
    }

    /// One evaluation at `now`. Returns the state the light was left in.
    pub async fn tick(&self, now: DateTime<Utc>) -> RelayState {
        let local = now.with_timezone(&self.tz).time();
        let active = is_active(local, &self.window);
        debug!(
            local = %local.format("%H:%M:%S"),
            window = %self.window,
            active,
            "light window evaluated"
        );

        self.light.set(active);
        let state = RelayState::from(self.light.current());
        self.status.publish(ActuatorKind::Light, state).await;
        state
    }

    /// Run until shutdown, then switch the light off.
    pub async fn run(self, mut shutdown: ShutdownRx) {
        info!(
            window = %self.window,
            interval_sec = self.interval.as_secs(),
            tz = %self.tz,
            "light loop started"
        );

        loop {
            self.tick(Utc::now()).await;
            if sleep_or_shutdown(self.interval, &mut shutdown).await {
                break;
            }
        }

        self.light.set(false);
        self.status.publish(ActuatorKind::Light, RelayState::Off).await;
        info!("light loop stopped");
    }
}

// ===========================================================================
// Tests
// ===========================================================================
