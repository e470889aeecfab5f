//! High-level sensor reads over the shared bus.
//!
//! Each public read is exactly one bus transaction (the lux sensor adds a
//! one-time configuration transaction on first use) and returns either a
//! value in physical units or a [`BusError`]; there is no partial result.

use std::sync::Arc;

use tokio::sync::OnceCell;

use crate::adc;
use crate::bus::SharedBus;
use crate::climate::{self, Climate};
use crate::error::BusError;
use crate::light::{self, LightConfig};
use crate::units::{moisture_from_raw, CalibrationProfile};

/// Device addresses and fixed settings for the sensor set.
#[derive(Debug, Clone, Copy)]
pub struct DriverConfig {
    pub adc_address: u16,
    pub climate_address: u16,
    pub lux_address: u16,
    pub calibration: CalibrationProfile,
    pub light: LightConfig,
}

/// Cheap to clone; every clone shares the bus and the lux init state.
#[derive(Clone)]
pub struct SensorDriver {
    bus: SharedBus,
    cfg: DriverConfig,
    lux_ready: Arc<OnceCell<()>>,
}

impl SensorDriver {
    pub fn new(bus: SharedBus, cfg: DriverConfig) -> Self {
        Self {
            bus,
            cfg,
            lux_ready: Arc::new(OnceCell::new()),
        }
    }

    pub fn config(&self) -> &DriverConfig {
        &self.cfg
    }

    /// Raw ADC count on `channel`, for calibration.
    pub async fn read_moisture_raw(&self, channel: u8) -> Result<u8, BusError> {
        // Reject before queueing for the bus.
        adc::command_for_channel(channel)?;
        let addr = self.cfg.adc_address;
        self.bus
            .transaction(move |bus| adc::read_raw(bus, addr, channel))
            .await
    }

    /// Soil moisture percentage on `channel`.
    pub async fn read_moisture(&self, channel: u8) -> Result<f64, BusError> {
        let raw = self.read_moisture_raw(channel).await?;
        let pct = moisture_from_raw(raw, self.cfg.calibration);
        tracing::debug!(channel, raw, moisture = pct, "moisture read");
        Ok(pct)
    }

    pub async fn read_climate(&self) -> Result<Climate, BusError> {
        let addr = self.cfg.climate_address;
        self.bus
            .transaction(move |bus| climate::read(bus, addr))
            .await
    }

    /// Ambient light in lux. Configures the sensor on first use; a failed
    /// configuration is retried on the next call.
    pub async fn read_lux(&self) -> Result<f64, BusError> {
        let addr = self.cfg.lux_address;
        let light_cfg = self.cfg.light;

        self.lux_ready
            .get_or_try_init(|| async {
                self.bus
                    .transaction(move |bus| light::configure(bus, addr, &light_cfg))
                    .await?;
                // Outside the bus lock: the first count is only valid after
                // one full integration period.
                tokio::time::sleep(light_cfg.first_sample_delay()).await;
                tracing::info!(
                    addr = format_args!("0x{addr:02x}"),
                    gain = ?light_cfg.gain,
                    integration_ms = light_cfg.integration.millis(),
                    "veml7700 initialised"
                );
                Ok::<_, BusError>(())
            })
            .await?;

        self.bus
            .transaction(move |bus| light::read_lux(bus, addr, &light_cfg))
            .await
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::FakeBus;

    const ADC: u16 = 0x48;
    const SHT: u16 = 0x44;
    const LUX: u16 = 0x10;

    fn driver(fake: &FakeBus) -> SensorDriver {
        SensorDriver::new(
            SharedBus::new(Box::new(fake.clone())),
            DriverConfig {
                adc_address: ADC,
                climate_address: SHT,
                lux_address: LUX,
                calibration: CalibrationProfile::new(240, 76).unwrap(),
                light: LightConfig::default(),
            },
        )
    }

    // -- Moisture -------------------------------------------------------------

    #[tokio::test]
    async fn moisture_converts_through_calibration() {
        let fake = FakeBus::new();
        fake.respond(ADC, &[158]);
        assert_eq!(driver(&fake).read_moisture(0).await.unwrap(), 50.0);
    }

    #[tokio::test]
    async fn moisture_invalid_channel_never_reaches_bus() {
        let fake = FakeBus::new();
        let err = driver(&fake).read_moisture(8).await.unwrap_err();
        assert!(matches!(err, BusError::InvalidChannel(8)));
        assert!(fake.writes().is_empty());
    }

    #[tokio::test]
    async fn moisture_bus_failure_is_error() {
        let fake = FakeBus::new();
        fake.fail(ADC);
        assert!(driver(&fake).read_moisture(0).await.is_err());
    }

    // -- Climate --------------------------------------------------------------

    #[tokio::test]
    async fn climate_reads_frame() {
        let fake = FakeBus::new();
        fake.respond(SHT, &[0x66, 0x66, 0, 0x66, 0x66, 0]);
        let c = driver(&fake).read_climate().await.unwrap();
        assert_eq!((c.temperature, c.humidity), (25.0, 40.0));
    }

    // -- Lux ------------------------------------------------------------------

    #[tokio::test]
    async fn lux_configures_once() {
        let fake = FakeBus::new();
        fake.respond(LUX, &[0xE8, 0x03]);
        let d = driver(&fake);

        assert_eq!(d.read_lux().await.unwrap(), 460.8);
        assert_eq!(d.clone().read_lux().await.unwrap(), 460.8);

        let writes = fake.writes_to(LUX);
        let conf_writes = writes.iter().filter(|w| w.len() == 3).count();
        assert_eq!(conf_writes, 1, "writes: {writes:?}");
    }

    #[tokio::test]
    async fn lux_init_failure_is_retried() {
        let fake = FakeBus::new();
        fake.respond(LUX, &[0x0A, 0x00]);
        fake.fail(LUX);
        let d = driver(&fake);

        assert!(d.read_lux().await.is_err());

        fake.recover(LUX);
        assert_eq!(d.read_lux().await.unwrap(), 4.61);
        assert_eq!(fake.writes_to(LUX)[0], vec![0x00, 0x00, 0x10]);
    }
}
