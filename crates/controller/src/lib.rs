//! Control side of growbox: configuration, relays, the light, irrigation
//! and acquisition loops, the reading store and the status channel.
//!
//! The `growbox` binary wires these together; the dashboard reads the same
//! database through [`db::Db`].

pub mod acquisition;
pub mod actuator;
pub mod config;
pub mod db;
pub mod error;
pub mod irrigation;
pub mod lighting;
pub mod schedule;
pub mod shutdown;
pub mod status;
