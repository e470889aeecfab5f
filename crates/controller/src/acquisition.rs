//! Periodic sampling of every sensor into the reading store. Never touches
//! a relay.

use std::time::Duration;

use chrono::{NaiveDateTime, Timelike, Utc};
use chrono_tz::Tz;
use tracing::{error, info, warn};

use growbox_sensors::{DeviceTemperatureReader, SensorDriver};

use crate::config::AcquisitionSettings;
use crate::db::{Db, SensorSample};
use crate::shutdown::{sleep_or_shutdown, ShutdownRx};

pub struct AcquisitionLoop {
    driver: SensorDriver,
    channel: u8,
    device_temp: DeviceTemperatureReader,
    db: Db,
    interval: Duration,
    warmup: Duration,
    tz: Tz,
}

impl AcquisitionLoop {
    pub fn new(
        driver: SensorDriver,
        channel: u8,
        db: Db,
        settings: &AcquisitionSettings,
        tz: Tz,
    ) -> Self {
        Self {
            driver,
            channel,
            device_temp: DeviceTemperatureReader::new(settings.device_temperature_path.clone()),
            db,
            interval: settings.interval,
            warmup: settings.warmup,
            tz,
        }
    }

    fn timestamp(&self) -> NaiveDateTime {
        let local = Utc::now().with_timezone(&self.tz).naive_local();
        local.with_nanosecond(0).unwrap_or(local)
    }

    /// Read every sensor once and append the sample. Each failed read
    /// leaves only its own fields empty.
    pub async fn cycle(&self) -> SensorSample {
        let mut sample = SensorSample::empty(self.timestamp());

        match self.driver.read_moisture(self.channel).await {
            Ok(m) => sample.soil_moisture = Some(m),
            Err(e) => warn!(sensor = "moisture", error = %e, "sensor read failed"),
        }
        match self.driver.read_climate().await {
            Ok(c) => {
                sample.temperature = Some(c.temperature);
                sample.humidity = Some(c.humidity);
            }
            Err(e) => warn!(sensor = "climate", error = %e, "sensor read failed"),
        }
        match self.device_temp.read().await {
            Ok(t) => sample.device_temperature = Some(t),
            Err(e) => warn!(sensor = "device_temperature", error = %e, "sensor read failed"),
        }
        match self.driver.read_lux().await {
            Ok(l) => sample.lux = Some(l),
            Err(e) => warn!(sensor = "lux", error = %e, "sensor read failed"),
        }

        match self.db.append(&sample).await {
            Ok(id) => info!(
                id,
                populated = sample.populated(),
                temperature = ?sample.temperature,
                humidity = ?sample.humidity,
                soil_moisture = ?sample.soil_moisture,
                device_temperature = ?sample.device_temperature,
                lux = ?sample.lux,
                "sample stored"
            ),
            Err(e) => error!(error = %e, "sample not stored"),
        }
        sample
    }

    /// Warm up, sample, wait; repeat until shutdown.
    pub async fn run(self, mut shutdown: ShutdownRx) {
        info!(
            interval_sec = self.interval.as_secs(),
            warmup_sec = self.warmup.as_secs(),
            channel = self.channel,
            "acquisition loop started"
        );

        loop {
            if sleep_or_shutdown(self.warmup, &mut shutdown).await {
                break;
            }
            self.cycle().await;
            if sleep_or_shutdown(self.interval, &mut shutdown).await {
                break;
            }
        }
        info!("acquisition loop stopped");
    }
}

// ===========================================================================
// Tests
// ===========================================================================
