//! Simulated sensor devices for running without hardware.
//!
//! Answers the same byte protocol as the real ADS7830, SHT31 and VEML7700
//! so the drivers above are exercised unchanged:
//! - soil moisture: random walk with drying drift, mean reversion, ADC noise
//!   and occasional spikes
//! - temperature / humidity: diurnal sinusoid plus noise
//! - ambient light: day/night square-ish curve plus noise

use std::collections::HashMap;

use crate::bus::I2cBus;
use crate::driver::DriverConfig;
use crate::error::BusError;
use crate::{adc, climate, light};

/// Length of one simulated day. Short so a dev run shows a full cycle.
const DIURNAL_PERIOD_S: f64 = 600.0;

// ---------------------------------------------------------------------------
// Gaussian approximation (no extra dependency)
// ---------------------------------------------------------------------------

/// Approximate a sample from N(0,1) using the Irwin-Hall method:
/// sum of 12 uniform [0,1) values minus 6.
fn approx_std_normal() -> f64 {
    let mut sum: f64 = 0.0;
    for _ in 0..12 {
        sum += fastrand::f64();
    }
    sum - 6.0
}

/// Sample from N(mean, sigma).
fn gaussian(mean: f64, sigma: f64) -> f64 {
    mean + sigma * approx_std_normal()
}

fn diurnal_phase() -> f64 {
    let now_s = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64();
    2.0 * std::f64::consts::PI * now_s / DIURNAL_PERIOD_S
}

// ---------------------------------------------------------------------------
// Soil probe
// ---------------------------------------------------------------------------

/// Capacitive probe seen through the 8-bit ADC. Higher count = drier.
struct SoilProbe {
    base: f64,
    center: f64,
    drift_per_sample: f64,
    walk_sigma: f64,
    mean_reversion: f64,
    noise_sigma: f64,
    spike_prob: f32,
    spike_sigma: f64,
}

impl SoilProbe {
    fn new() -> Self {
        Self {
            base: 150.0 + gaussian(0.0, 5.0),
            center: 160.0,
            drift_per_sample: 0.3,
            walk_sigma: 2.0,
            mean_reversion: 0.02,
            noise_sigma: 1.5,
            spike_prob: 0.02,
            spike_sigma: 25.0,
        }
    }

    fn sample(&mut self) -> u8 {
        let pull = self.mean_reversion * (self.center - self.base);
        let walk = gaussian(0.0, self.walk_sigma);
        self.base = (self.base + self.drift_per_sample + pull + walk).clamp(60.0, 250.0);

        let noise = gaussian(0.0, self.noise_sigma);
        let spike = if fastrand::f32() < self.spike_prob {
            gaussian(0.0, self.spike_sigma)
        } else {
            0.0
        };
        (self.base + noise + spike).round().clamp(0.0, 255.0) as u8
    }
}

// ---------------------------------------------------------------------------
// Bus
// ---------------------------------------------------------------------------

/// Simulated bus with the three devices, by default at their factory
/// addresses.
pub struct SimBus {
    adc_addr: u16,
    climate_addr: u16,
    lux_addr: u16,
    probes: HashMap<u8, SoilProbe>,
    /// Command byte of the last ADC write; selects the channel to sample.
    adc_command: Option<u8>,
    /// Whether the light sensor has been powered on.
    lux_configured: bool,
    /// Pending SHT31 measurement.
    climate_pending: bool,
}

impl SimBus {
    pub fn new() -> Self {
        Self::with_addresses(
            adc::DEFAULT_ADDRESS,
            climate::DEFAULT_ADDRESS,
            light::DEFAULT_ADDRESS,
        )
    }

    /// Devices at the addresses the driver is configured for.
    pub fn for_driver(cfg: &DriverConfig) -> Self {
        Self::with_addresses(cfg.adc_address, cfg.climate_address, cfg.lux_address)
    }

    fn with_addresses(adc_addr: u16, climate_addr: u16, lux_addr: u16) -> Self {
        Self {
            adc_addr,
            climate_addr,
            lux_addr,
            probes: HashMap::new(),
            adc_command: None,
            lux_configured: false,
            climate_pending: false,
        }
    }

    fn adc_sample(&mut self) -> Result<u8, BusError> {
        let cmd = self.adc_command.take().ok_or_else(|| {
            BusError::transaction(self.adc_addr, "read without conversion command")
        })?;
        let channel = (cmd >> 4) & 0x07;
        Ok(self.probes.entry(channel).or_insert_with(SoilProbe::new).sample())
    }

    fn climate_frame(&mut self) -> Result<[u8; 6], BusError> {
        if !std::mem::take(&mut self.climate_pending) {
            return Err(BusError::transaction(
                self.climate_addr,
                "read without measurement command",
            ));
        }
        let phase = diurnal_phase();
        let temp_c = (24.0 + 4.0 * phase.sin() + gaussian(0.0, 0.2)).clamp(-45.0, 130.0);
        let rh = (55.0 - 10.0 * phase.sin() + gaussian(0.0, 0.8)).clamp(0.0, 100.0);

        let t = ((temp_c + 45.0) / 175.0 * 65535.0).round() as u16;
        let h = (rh / 100.0 * 65535.0).round() as u16;
        let [th, tl] = t.to_be_bytes();
        let [hh, hl] = h.to_be_bytes();
        Ok([th, tl, crc8(&[th, tl]), hh, hl, crc8(&[hh, hl])])
    }

    fn als_count(&self) -> u16 {
        if !self.lux_configured {
            return 0;
        }
        let day = diurnal_phase().sin();
        let base = if day > 0.0 { 1800.0 * day.sqrt() + 20.0 } else { 20.0 };
        (base + gaussian(0.0, base * 0.02 + 1.0)).clamp(0.0, 65535.0) as u16
    }
}

impl Default for SimBus {
    fn default() -> Self {
        Self::new()
    }
}

impl I2cBus for SimBus {
    fn write(&mut self, addr: u16, bytes: &[u8]) -> Result<(), BusError> {
        match bytes {
            [cmd] if addr == self.adc_addr => self.adc_command = Some(*cmd),
            [0x2C, 0x06] if addr == self.climate_addr => self.climate_pending = true,
            [0x00, lo, _] if addr == self.lux_addr => self.lux_configured = lo & 1 == 0,
            _ => return Err(BusError::transaction(addr, "no device responded")),
        }
        Ok(())
    }

    fn read(&mut self, addr: u16, buf: &mut [u8]) -> Result<(), BusError> {
        let bytes: Vec<u8> = if addr == self.adc_addr {
            vec![self.adc_sample()?]
        } else if addr == self.climate_addr {
            self.climate_frame()?.to_vec()
        } else {
            return Err(BusError::transaction(addr, "no device responded"));
        };
        if bytes.len() < buf.len() {
            return Err(BusError::ShortRead {
                addr,
                expected: buf.len(),
                got: bytes.len(),
            });
        }
        buf.copy_from_slice(&bytes[..buf.len()]);
        Ok(())
    }

    fn write_read(&mut self, addr: u16, bytes: &[u8], buf: &mut [u8]) -> Result<(), BusError> {
        match bytes {
            [0x04] if addr == self.lux_addr && buf.len() == 2 => {
                buf.copy_from_slice(&self.als_count().to_le_bytes());
                Ok(())
            }
            _ => Err(BusError::transaction(addr, "unsupported register read")),
        }
    }
}

/// Sensirion CRC-8 (poly 0x31, init 0xFF).
fn crc8(data: &[u8]) -> u8 {
    let mut crc: u8 = 0xFF;
    for &byte in data {
        crc ^= byte;
        for _ in 0..8 {
            crc = if crc & 0x80 != 0 {
                (crc << 1) ^ 0x31
            } else {
                crc << 1
            };
        }
    }
    crc
}

// ===========================================================================
// Tests
// ===========================================================================
