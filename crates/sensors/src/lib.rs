//! Sensor side of growbox: I2C drivers for the soil moisture ADC, the
//! climate sensor and the ambient light sensor, the host temperature
//! reader, and the unit conversions between raw registers and physical
//! values.

pub mod adc;
pub mod bus;
pub mod climate;
pub mod device_temp;
pub mod driver;
pub mod error;
pub mod fake;
pub mod light;
#[cfg(feature = "sim")]
pub mod sim;
pub mod units;

pub use bus::{I2cBus, SharedBus};
pub use climate::Climate;
pub use device_temp::DeviceTemperatureReader;
pub use driver::{DriverConfig, SensorDriver};
pub use error::{BusError, DeviceTempError};
pub use light::{Gain, IntegrationTime, LightConfig};
pub use units::CalibrationProfile;
