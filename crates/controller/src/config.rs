//! TOML config file loading and validation into typed [`Settings`].

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use chrono::NaiveTime;
use chrono_tz::Tz;
use serde::Deserialize;

use growbox_sensors::device_temp::DEFAULT_PATH as DEVICE_TEMP_PATH;
use growbox_sensors::{adc, climate, light};
use growbox_sensors::{CalibrationProfile, DriverConfig, Gain, IntegrationTime, LightConfig};

use crate::error::ConfigError;
use crate::schedule::{parse_hhmm, ScheduleWindow};

// ---------------------------------------------------------------------------
// Config file structures
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub timezone: String,
    pub database_url: String,
    pub bus: BusSection,
    pub calibration: CalibrationSection,
    pub relays: RelaySection,
    pub light: LightSection,
    pub irrigation: IrrigationSection,
    pub acquisition: AcquisitionSection,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BusSection {
    pub i2c_bus: i64,
    pub adc_address: i64,
    pub adc_channel: i64,
    pub climate_address: i64,
    pub lux_address: i64,
    pub lux_gain: String,
    pub lux_integration_ms: i64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CalibrationSection {
    pub raw_dry: i64,
    pub raw_wet: i64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RelaySection {
    pub active_low: bool,
    pub light_gpio: i64,
    pub pump_gpio: i64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LightSection {
    pub on: String,
    pub off: String,
    pub interval_sec: i64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IrrigationSection {
    pub times: Vec<String>,
    pub threshold_pct: f64,
    pub duration_sec: i64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AcquisitionSection {
    pub interval_sec: i64,
    pub warmup_sec: i64,
    pub device_temperature_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            timezone: "UTC".into(),
            database_url: "sqlite:growbox.db?mode=rwc".into(),
            bus: BusSection::default(),
            calibration: CalibrationSection::default(),
            relays: RelaySection::default(),
            light: LightSection::default(),
            irrigation: IrrigationSection::default(),
            acquisition: AcquisitionSection::default(),
        }
    }
}

impl Default for BusSection {
    fn default() -> Self {
        Self {
            i2c_bus: 1,
            adc_address: i64::from(adc::DEFAULT_ADDRESS),
            adc_channel: 0,
            climate_address: i64::from(climate::DEFAULT_ADDRESS),
            lux_address: i64::from(light::DEFAULT_ADDRESS),
            lux_gain: "1/8".into(),
            lux_integration_ms: 100,
        }
    }
}

impl Default for CalibrationSection {
    fn default() -> Self {
        Self {
            raw_dry: 240,
            raw_wet: 76,
        }
    }
}

impl Default for RelaySection {
    fn default() -> Self {
        Self {
            active_low: true,
            light_gpio: 9,
            pump_gpio: 24,
        }
    }
}

impl Default for LightSection {
    fn default() -> Self {
        Self {
            on: "20:10".into(),
            off: "08:00".into(),
            interval_sec: 60,
        }
    }
}

impl Default for IrrigationSection {
    fn default() -> Self {
        Self {
            times: vec!["06:00".into(), "22:00".into()],
            threshold_pct: 30.0,
            duration_sec: 15,
        }
    }
}

impl Default for AcquisitionSection {
    fn default() -> Self {
        Self {
            interval_sec: 3600,
            warmup_sec: 10,
            device_temperature_path: PathBuf::from(DEVICE_TEMP_PATH),
        }
    }
}

// ---------------------------------------------------------------------------
// Validated settings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Settings {
    pub timezone: Tz,
    pub database_url: String,
    pub i2c_bus: u8,
    pub adc_channel: u8,
    pub driver: DriverConfig,
    pub relays: RelaySettings,
    pub light: LightSettings,
    pub irrigation: IrrigationSettings,
    pub acquisition: AcquisitionSettings,
}

#[derive(Debug, Clone, Copy)]
pub struct RelaySettings {
    pub active_low: bool,
    pub light_gpio: u8,
    pub pump_gpio: u8,
}

#[derive(Debug, Clone, Copy)]
pub struct LightSettings {
    pub window: ScheduleWindow,
    pub interval: Duration,
}

#[derive(Debug, Clone)]
pub struct IrrigationSettings {
    pub times: Vec<NaiveTime>,
    pub threshold_pct: f64,
    pub duration: Duration,
}

#[derive(Debug, Clone)]
pub struct AcquisitionSettings {
    pub interval: Duration,
    pub warmup: Duration,
    pub device_temperature_path: PathBuf,
}

// ---------------------------------------------------------------------------
// Limits
// ---------------------------------------------------------------------------

/// BCM GPIO pins available on the Raspberry Pi 40-pin header for general
/// use. GPIO 0-1 are reserved for the ID EEPROM and must never be used.
/// GPIO 28+ are not exposed on the standard header.
const VALID_GPIO_PINS: std::ops::RangeInclusive<i64> = 2..=27;

/// Non-reserved 7-bit I2C addresses.
const VALID_I2C_ADDRESSES: std::ops::RangeInclusive<i64> = 0x03..=0x77;

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

impl Config {
    /// Validate every section and build [`Settings`]. On failure the error
    /// lists every violation found, not just the first one.
    pub fn validate(&self) -> Result<Settings, ConfigError> {
        let mut errors: Vec<String> = Vec::new();

        let timezone = match self.timezone.parse::<Tz>() {
            Ok(tz) => Some(tz),
            Err(_) => {
                errors.push(format!("timezone: unknown IANA zone {:?}", self.timezone));
                None
            }
        };
        if self.database_url.trim().is_empty() {
            errors.push("database_url is empty".into());
        }

        let bus = self.validate_bus(&mut errors);
        let calibration = self.validate_calibration(&mut errors);
        let relays = self.validate_relays(&mut errors);
        let light = self.validate_light(&mut errors);
        let irrigation = self.validate_irrigation(&mut errors);
        let acquisition = self.validate_acquisition(&mut errors);

        match (
            timezone,
            bus,
            calibration,
            relays,
            light,
            irrigation,
            acquisition,
        ) {
            (
                Some(timezone),
                Some((i2c_bus, adc_channel, driver_partial)),
                Some(calibration),
                Some(relays),
                Some(light),
                Some(irrigation),
                Some(acquisition),
            ) if errors.is_empty() => Ok(Settings {
                timezone,
                database_url: self.database_url.clone(),
                i2c_bus,
                adc_channel,
                driver: DriverConfig {
                    calibration,
                    ..driver_partial
                },
                relays,
                light,
                irrigation,
                acquisition,
            }),
            _ => Err(ConfigError::Invalid(errors)),
        }
    }

    fn validate_bus(&self, errors: &mut Vec<String>) -> Option<(u8, u8, DriverConfig)> {
        let b = &self.bus;
        let before = errors.len();

        let i2c_bus = u8::try_from(b.i2c_bus).ok();
        if i2c_bus.is_none() {
            errors.push(format!("bus.i2c_bus {} out of range [0, 255]", b.i2c_bus));
        }

        let channel_ok = (0..=i64::from(adc::MAX_CHANNEL)).contains(&b.adc_channel);
        if !channel_ok {
            errors.push(format!(
                "bus.adc_channel {} out of range [0, {}]",
                b.adc_channel,
                adc::MAX_CHANNEL
            ));
        }

        let mut seen: HashSet<i64> = HashSet::new();
        for (name, addr) in [
            ("adc_address", b.adc_address),
            ("climate_address", b.climate_address),
            ("lux_address", b.lux_address),
        ] {
            if !VALID_I2C_ADDRESSES.contains(&addr) {
                errors.push(format!(
                    "bus.{name} 0x{addr:02x} is not a valid 7-bit I2C address (allowed: 0x03-0x77)"
                ));
            } else if !seen.insert(addr) {
                errors.push(format!(
                    "bus.{name} 0x{addr:02x} is already used by another sensor"
                ));
            }
        }

        let gain = Gain::from_label(&b.lux_gain);
        if gain.is_none() {
            errors.push(format!(
                "bus.lux_gain {:?} is not one of \"1/8\", \"1/4\", \"1\", \"2\"",
                b.lux_gain
            ));
        }
        let integration = u16::try_from(b.lux_integration_ms)
            .ok()
            .and_then(IntegrationTime::from_millis);
        if integration.is_none() {
            errors.push(format!(
                "bus.lux_integration_ms {} is not one of 25, 50, 100, 200, 400, 800",
                b.lux_integration_ms
            ));
        }

        if errors.len() > before {
            return None;
        }
        Some((
            i2c_bus?,
            b.adc_channel as u8,
            DriverConfig {
                adc_address: b.adc_address as u16,
                climate_address: b.climate_address as u16,
                lux_address: b.lux_address as u16,
                // Filled from the calibration section by the caller.
                calibration: CalibrationProfile { dry: 1, wet: 0 },
                light: LightConfig {
                    gain: gain?,
                    integration: integration?,
                },
            },
        ))
    }

    fn validate_calibration(&self, errors: &mut Vec<String>) -> Option<CalibrationProfile> {
        let c = &self.calibration;
        let dry = u8::try_from(c.raw_dry).ok();
        let wet = u8::try_from(c.raw_wet).ok();

        if dry.is_none() {
            errors.push(format!(
                "calibration.raw_dry {} out of ADC range [0, 255]",
                c.raw_dry
            ));
        }
        if wet.is_none() {
            errors.push(format!(
                "calibration.raw_wet {} out of ADC range [0, 255]",
                c.raw_wet
            ));
        }
        let (dry, wet) = (dry?, wet?);

        let profile = CalibrationProfile::new(dry, wet);
        if profile.is_none() {
            if dry == wet {
                errors.push(format!(
                    "calibration: raw_dry and raw_wet are both {dry}, calibration range is zero"
                ));
            } else {
                errors.push(format!(
                    "calibration: raw_dry ({dry}) must be greater than raw_wet ({wet})"
                ));
            }
        }
        profile
    }

    fn validate_relays(&self, errors: &mut Vec<String>) -> Option<RelaySettings> {
        let r = &self.relays;
        let before = errors.len();

        for (name, pin) in [("light_gpio", r.light_gpio), ("pump_gpio", r.pump_gpio)] {
            if !VALID_GPIO_PINS.contains(&pin) {
                errors.push(format!(
                    "relays.{name} {pin} is not a valid BCM GPIO pin (allowed: 2-27)"
                ));
            }
        }
        if r.light_gpio == r.pump_gpio {
            errors.push(format!(
                "relays: light_gpio and pump_gpio are both {}",
                r.light_gpio
            ));
        }

        (errors.len() == before).then(|| RelaySettings {
            active_low: r.active_low,
            light_gpio: r.light_gpio as u8,
            pump_gpio: r.pump_gpio as u8,
        })
    }

    fn validate_light(&self, errors: &mut Vec<String>) -> Option<LightSettings> {
        let l = &self.light;
        let on = parse_hhmm(&l.on);
        let off = parse_hhmm(&l.off);

        if on.is_none() {
            errors.push(format!("light.on {:?} is not a valid HH:MM time", l.on));
        }
        if off.is_none() {
            errors.push(format!("light.off {:?} is not a valid HH:MM time", l.off));
        }
        let interval = positive_secs("light.interval_sec", l.interval_sec, errors);

        Some(LightSettings {
            window: ScheduleWindow::new(on?, off?),
            interval: interval?,
        })
    }

    fn validate_irrigation(&self, errors: &mut Vec<String>) -> Option<IrrigationSettings> {
        let i = &self.irrigation;
        let before = errors.len();

        if i.times.is_empty() {
            errors.push("irrigation.times is empty".into());
        }
        let mut times: Vec<NaiveTime> = Vec::with_capacity(i.times.len());
        for (idx, s) in i.times.iter().enumerate() {
            match parse_hhmm(s) {
                Some(t) if times.contains(&t) => {
                    errors.push(format!("irrigation.times[{idx}] {s:?} is a duplicate"));
                }
                Some(t) => times.push(t),
                None => errors.push(format!(
                    "irrigation.times[{idx}] {s:?} is not a valid HH:MM time"
                )),
            }
        }

        if !(0.0..=100.0).contains(&i.threshold_pct) {
            errors.push(format!(
                "irrigation.threshold_pct {} out of range [0, 100]",
                i.threshold_pct
            ));
        }
        let duration = positive_secs("irrigation.duration_sec", i.duration_sec, errors);

        if errors.len() > before {
            return None;
        }
        times.sort();
        Some(IrrigationSettings {
            times,
            threshold_pct: i.threshold_pct,
            duration: duration?,
        })
    }

    fn validate_acquisition(&self, errors: &mut Vec<String>) -> Option<AcquisitionSettings> {
        let a = &self.acquisition;
        let interval = positive_secs("acquisition.interval_sec", a.interval_sec, errors);

        let warmup = match u64::try_from(a.warmup_sec) {
            Err(_) => {
                errors.push(format!(
                    "acquisition.warmup_sec must not be negative, got {}",
                    a.warmup_sec
                ));
                None
            }
            Ok(secs) if secs > MAX_DURATION_SECS => {
                errors.push(format!(
                    "acquisition.warmup_sec must be at most {MAX_DURATION_SECS}, got {secs}"
                ));
                None
            }
            Ok(secs) => Some(Duration::from_secs(secs)),
        };
        if a.device_temperature_path.as_os_str().is_empty() {
            errors.push("acquisition.device_temperature_path is empty".into());
            return None;
        }

        Some(AcquisitionSettings {
            interval: interval?,
            warmup: warmup?,
            device_temperature_path: a.device_temperature_path.clone(),
        })
    }
}

/// Upper bound for every configured interval and duration (one week).
const MAX_DURATION_SECS: u64 = 7 * 24 * 3600;

fn positive_secs(name: &str, value: i64, errors: &mut Vec<String>) -> Option<Duration> {
    match u64::try_from(value) {
        Ok(secs) if secs > MAX_DURATION_SECS => {
            errors.push(format!("{name} must be at most {MAX_DURATION_SECS}, got {value}"));
            None
        }
        Ok(secs) if secs > 0 => Some(Duration::from_secs(secs)),
        _ => {
            errors.push(format!("{name} must be positive, got {value}"));
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Load
// ---------------------------------------------------------------------------

/// Read, parse, and validate a TOML config file.
pub fn load(path: &str) -> Result<Settings, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_string(),
        source,
    })?;
    let config: Config = toml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_string(),
        source,
    })?;
    let settings = config.validate()?;

    tracing::info!(
        path,
        timezone = %settings.timezone,
        light_window = %settings.light.window,
        triggers = settings.irrigation.times.len(),
        "config loaded"
    );
    Ok(settings)
}

// ===========================================================================
// Tests
// ===========================================================================
