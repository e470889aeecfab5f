use std::path::PathBuf;

use thiserror::Error;

/// Failure of a single bus transaction. Always recoverable: the caller
/// treats the reading as absent and tries again next cycle.
#[derive(Debug, Error)]
pub enum BusError {
    #[error("i2c transaction with 0x{addr:02x} failed: {reason}")]
    Transaction { addr: u16, reason: String },

    #[error("short read from 0x{addr:02x}: expected {expected} byte(s), got {got}")]
    ShortRead {
        addr: u16,
        expected: usize,
        got: usize,
    },

    #[error("adc channel {0} out of range (0-7)")]
    InvalidChannel(u8),

    #[error("bus worker failed: {0}")]
    Worker(String),
}

impl BusError {
    pub(crate) fn transaction(addr: u16, reason: impl ToString) -> Self {
        Self::Transaction {
            addr,
            reason: reason.to_string(),
        }
    }
}

/// Host temperature could not be read from the thermal zone file.
#[derive(Debug, Error)]
pub enum DeviceTempError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unexpected contents in {path}: {contents:?}")]
    Malformed { path: PathBuf, contents: String },
}
