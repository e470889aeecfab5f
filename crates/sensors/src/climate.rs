//! SHT31 temperature / humidity sensor over I2C.
//!
//! Single-shot, high repeatability, clock stretching enabled. The CRC bytes
//! in the response frame are carried but not checked.

use std::{thread, time::Duration};

use crate::bus::I2cBus;
use crate::error::BusError;
use crate::units::climate_from_raw;

/// Default I2C address (ADDR pin low).
pub const DEFAULT_ADDRESS: u16 = 0x44;

/// Single-shot measurement, high repeatability, clock stretching.
const MEASURE_COMMAND: [u8; 2] = [0x2C, 0x06];

/// High-repeatability conversion takes up to 15 ms.
const SETTLE: Duration = Duration::from_millis(15);

/// `[tH, tL, tCRC, hH, hL, hCRC]`
const FRAME_LEN: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Climate {
    /// °C
    pub temperature: f64,
    /// %RH
    pub humidity: f64,
}

/// Decode a measurement frame into physical units.
pub fn decode_frame(frame: &[u8; FRAME_LEN]) -> Climate {
    let temp_raw = u16::from_be_bytes([frame[0], frame[1]]);
    let hum_raw = u16::from_be_bytes([frame[3], frame[4]]);
    let (temperature, humidity) = climate_from_raw(temp_raw, hum_raw);
    Climate {
        temperature,
        humidity,
    }
}

/// Trigger a measurement, wait for it, and read the frame.
///
/// Blocks the calling thread for the settle delay; run it inside a bus
/// transaction on the blocking pool.
pub fn read(bus: &mut dyn I2cBus, addr: u16) -> Result<Climate, BusError> {
    bus.write(addr, &MEASURE_COMMAND)?;
    thread::sleep(SETTLE);
    let mut frame = [0u8; FRAME_LEN];
    bus.read(addr, &mut frame)?;
    Ok(decode_frame(&frame))
}
