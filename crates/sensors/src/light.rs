//! VEML7700 ambient light sensor over I2C.
//!
//! Registers are 16-bit little-endian. The sensor must be configured (gain,
//! integration time, power on) once before the ALS register holds a valid
//! count; after that every read is a single register fetch.

use std::time::Duration;

use crate::bus::I2cBus;
use crate::error::BusError;
use crate::units::round2;

/// Fixed I2C address.
pub const DEFAULT_ADDRESS: u16 = 0x10;

const REG_ALS_CONF: u8 = 0x00;
const REG_ALS: u8 = 0x04;

// ALS_CONF layout:
//   [12:11] ALS_GAIN
//   [9:6]   ALS_IT
//   [5:4]   ALS_PERS
//   [1]     ALS_INT_EN
//   [0]     ALS_SD (1 = shut down)
const GAIN_SHIFT: u16 = 11;
const IT_SHIFT: u16 = 6;

/// lx per count at gain 2, 800 ms; every other setting scales from here.
const RESOLUTION_MAX: f64 = 0.0036;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gain {
    X1_8,
    X1_4,
    X1,
    X2,
}

impl Gain {
    /// Parse the config spelling: `"1/8"`, `"1/4"`, `"1"`, `"2"`.
    pub fn from_label(s: &str) -> Option<Self> {
        match s.trim() {
            "1/8" => Some(Self::X1_8),
            "1/4" => Some(Self::X1_4),
            "1" => Some(Self::X1),
            "2" => Some(Self::X2),
            _ => None,
        }
    }

    fn bits(self) -> u16 {
        match self {
            Self::X1 => 0b00,
            Self::X2 => 0b01,
            Self::X1_8 => 0b10,
            Self::X1_4 => 0b11,
        }
    }

    fn factor(self) -> f64 {
        match self {
            Self::X1_8 => 0.125,
            Self::X1_4 => 0.25,
            Self::X1 => 1.0,
            Self::X2 => 2.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntegrationTime {
    Ms25,
    Ms50,
    Ms100,
    Ms200,
    Ms400,
    Ms800,
}

impl IntegrationTime {
    pub fn from_millis(ms: u16) -> Option<Self> {
        match ms {
            25 => Some(Self::Ms25),
            50 => Some(Self::Ms50),
            100 => Some(Self::Ms100),
            200 => Some(Self::Ms200),
            400 => Some(Self::Ms400),
            800 => Some(Self::Ms800),
            _ => None,
        }
    }

    pub fn millis(self) -> u16 {
        match self {
            Self::Ms25 => 25,
            Self::Ms50 => 50,
            Self::Ms100 => 100,
            Self::Ms200 => 200,
            Self::Ms400 => 400,
            Self::Ms800 => 800,
        }
    }

    fn bits(self) -> u16 {
        match self {
            Self::Ms25 => 0b1100,
            Self::Ms50 => 0b1000,
            Self::Ms100 => 0b0000,
            Self::Ms200 => 0b0001,
            Self::Ms400 => 0b0010,
            Self::Ms800 => 0b0011,
        }
    }
}

/// Gain and integration time, fixed at configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LightConfig {
    pub gain: Gain,
    pub integration: IntegrationTime,
}

impl Default for LightConfig {
    /// Gain 1/8 with 100 ms integration keeps a grow lamp from saturating.
    fn default() -> Self {
        Self {
            gain: Gain::X1_8,
            integration: IntegrationTime::Ms100,
        }
    }
}

impl LightConfig {
    /// ALS_CONF value: powered on, no interrupts, persistence 1.
    pub fn conf_word(&self) -> u16 {
        (self.gain.bits() << GAIN_SHIFT) | (self.integration.bits() << IT_SHIFT)
    }

    /// lx per ALS count for this setting.
    pub fn resolution(&self) -> f64 {
        RESOLUTION_MAX * (2.0 / self.gain.factor()) * (800.0 / f64::from(self.integration.millis()))
    }

    /// How long after configuring before the first count is valid.
    pub fn first_sample_delay(&self) -> Duration {
        Duration::from_millis(u64::from(self.integration.millis()) + 10)
    }
}

/// Write ALS_CONF, powering the sensor on with `cfg`.
pub fn configure(bus: &mut dyn I2cBus, addr: u16, cfg: &LightConfig) -> Result<(), BusError> {
    let [lo, hi] = cfg.conf_word().to_le_bytes();
    bus.write(addr, &[REG_ALS_CONF, lo, hi])
}

/// Read the ALS count and scale it to lux.
pub fn read_lux(bus: &mut dyn I2cBus, addr: u16, cfg: &LightConfig) -> Result<f64, BusError> {
    let mut buf = [0u8; 2];
    bus.write_read(addr, &[REG_ALS], &mut buf)?;
    let count = u16::from_le_bytes(buf);
    Ok(round2(f64::from(count) * cfg.resolution()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::FakeBus;

    #[test]
    fn default_conf_word() {
        // gain 1/8 → 0b10 << 11, IT 100 ms → 0
        assert_eq!(LightConfig::default().conf_word(), 0x1000);
    }

    #[test]
    fn conf_word_max_sensitivity() {
        let cfg = LightConfig {
            gain: Gain::X2,
            integration: IntegrationTime::Ms800,
        };
        assert_eq!(cfg.conf_word(), (0b01 << 11) | (0b0011 << 6));
        assert_eq!(cfg.conf_word() & 1, 0, "must not set shutdown bit");
    }

    #[test]
    fn resolution_scales_with_gain_and_time() {
        let max = LightConfig {
            gain: Gain::X2,
            integration: IntegrationTime::Ms800,
        };
        assert!((max.resolution() - 0.0036).abs() < 1e-12);
        assert!((LightConfig::default().resolution() - 0.4608).abs() < 1e-12);
    }

    #[test]
    fn gain_labels() {
        assert_eq!(Gain::from_label("1/8"), Some(Gain::X1_8));
        assert_eq!(Gain::from_label(" 2 "), Some(Gain::X2));
        assert_eq!(Gain::from_label("3"), None);
    }

    #[test]
    fn integration_from_millis() {
        assert_eq!(IntegrationTime::from_millis(100), Some(IntegrationTime::Ms100));
        assert_eq!(IntegrationTime::from_millis(150), None);
    }

    #[test]
    fn configure_writes_little_endian_conf() {
        let mut bus = FakeBus::new();
        configure(&mut bus, DEFAULT_ADDRESS, &LightConfig::default()).unwrap();
        assert_eq!(bus.writes_to(DEFAULT_ADDRESS), vec![vec![0x00, 0x00, 0x10]]);
    }

    #[test]
    fn read_lux_scales_count() {
        let mut bus = FakeBus::new();
        // 1000 counts little-endian
        bus.respond(DEFAULT_ADDRESS, &[0xE8, 0x03]);
        let lux = read_lux(&mut bus, DEFAULT_ADDRESS, &LightConfig::default()).unwrap();
        assert_eq!(lux, 460.8);
        assert_eq!(bus.writes_to(DEFAULT_ADDRESS), vec![vec![REG_ALS]]);
    }
}
