//! ADS7830 8-bit, 8-channel ADC over I2C, used for the soil moisture probe.
//!
//! One transaction = write a command byte selecting the channel, then read
//! a single conversion byte (0–255).

use crate::bus::I2cBus;
use crate::error::BusError;

/// Default I2C address (A1 = A0 = GND).
pub const DEFAULT_ADDRESS: u16 = 0x48;

// ── Command byte ────────────────────────────────────────────────────────────
//
// Layout (MSB first):
//   [7]     SD: 1 = single-ended
//   [6:4]   C2–C0 channel select
//   [3:2]   PD1–PD0 power-down (01 = internal ref off, A/D on)
//   [1:0]   unused

/// Single-ended, reference off, converter on.
const COMMAND_BASE: u8 = 0x84;
const CHANNEL_SHIFT: u8 = 4;

/// Highest valid channel index.
pub const MAX_CHANNEL: u8 = 7;

/// Build the command byte for `channel`.
pub fn command_for_channel(channel: u8) -> Result<u8, BusError> {
    if channel > MAX_CHANNEL {
        return Err(BusError::InvalidChannel(channel));
    }
    Ok(COMMAND_BASE | (channel << CHANNEL_SHIFT))
}

/// Perform one conversion on `channel` and return the raw count.
pub fn read_raw(bus: &mut dyn I2cBus, addr: u16, channel: u8) -> Result<u8, BusError> {
    let command = command_for_channel(channel)?;
    bus.write(addr, &[command])?;
    let mut buf = [0u8; 1];
    bus.read(addr, &mut buf)?;
    Ok(buf[0])
}

// ── Tests ───────────────────────────────────────────────────────────────────
