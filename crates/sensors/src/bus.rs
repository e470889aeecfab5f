//! Shared I2C bus handle.
//!
//! One handle is opened per process and shared by every loop. A
//! transaction (command write through final response byte) runs on the
//! blocking pool while holding the bus lock, so two callers can never
//! interleave their bytes on the wire.

use std::sync::{Arc, Mutex};

use crate::driver::DriverConfig;
use crate::error::BusError;

#[cfg(feature = "i2c")]
use rppal::i2c::I2c;

/// Raw byte-level access to devices on one I2C bus.
pub trait I2cBus: Send {
    /// Write `bytes` to the device at `addr`.
    fn write(&mut self, addr: u16, bytes: &[u8]) -> Result<(), BusError>;

    /// Fill `buf` from the device at `addr`. A short read is an error.
    fn read(&mut self, addr: u16, buf: &mut [u8]) -> Result<(), BusError>;

    /// Write `bytes` then read into `buf` with a repeated start.
    fn write_read(&mut self, addr: u16, bytes: &[u8], buf: &mut [u8]) -> Result<(), BusError>;
}

/// Cloneable, mutually exclusive handle onto a single [`I2cBus`].
#[derive(Clone)]
pub struct SharedBus {
    inner: Arc<Mutex<Box<dyn I2cBus>>>,
}

impl SharedBus {
    pub fn new(bus: Box<dyn I2cBus>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(bus)),
        }
    }

    /// Run one transaction with exclusive use of the bus.
    ///
    /// The closure runs on tokio's blocking pool because device settle
    /// delays are plain thread sleeps.
    pub async fn transaction<T, F>(&self, f: F) -> Result<T, BusError>
    where
        T: Send + 'static,
        F: FnOnce(&mut dyn I2cBus) -> Result<T, BusError> + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || {
            // A panic inside a previous transaction poisons the lock; the
            // bus itself is still usable.
            let mut bus = inner.lock().unwrap_or_else(|p| p.into_inner());
            f(bus.as_mut())
        })
        .await
        .map_err(|e| BusError::Worker(e.to_string()))?
    }
}

// ---------------------------------------------------------------------------
// Real bus (production, requires rppal + Raspberry Pi hardware)
// ---------------------------------------------------------------------------

#[cfg(feature = "i2c")]
pub struct RppalBus {
    i2c: I2c,
    current_addr: Option<u16>,
}

#[cfg(feature = "i2c")]
impl RppalBus {
    /// Open `/dev/i2c-<bus>`.
    pub fn open(bus: u8) -> Result<Self, BusError> {
        let i2c = I2c::with_bus(bus).map_err(|e| BusError::transaction(0, e))?;
        tracing::info!(bus, "i2c bus opened");
        Ok(Self {
            i2c,
            current_addr: None,
        })
    }

    fn select(&mut self, addr: u16) -> Result<(), BusError> {
        if self.current_addr != Some(addr) {
            self.i2c
                .set_slave_address(addr)
                .map_err(|e| BusError::transaction(addr, e))?;
            self.current_addr = Some(addr);
        }
        Ok(())
    }
}

#[cfg(feature = "i2c")]
impl I2cBus for RppalBus {
    fn write(&mut self, addr: u16, bytes: &[u8]) -> Result<(), BusError> {
        self.select(addr)?;
        let n = self
            .i2c
            .write(bytes)
            .map_err(|e| BusError::transaction(addr, e))?;
        if n != bytes.len() {
            return Err(BusError::transaction(
                addr,
                format!("wrote {n} of {} byte(s)", bytes.len()),
            ));
        }
        Ok(())
    }

    fn read(&mut self, addr: u16, buf: &mut [u8]) -> Result<(), BusError> {
        self.select(addr)?;
        let n = self
            .i2c
            .read(buf)
            .map_err(|e| BusError::transaction(addr, e))?;
        if n != buf.len() {
            return Err(BusError::ShortRead {
                addr,
                expected: buf.len(),
                got: n,
            });
        }
        Ok(())
    }

    fn write_read(&mut self, addr: u16, bytes: &[u8], buf: &mut [u8]) -> Result<(), BusError> {
        self.select(addr)?;
        self.i2c
            .write_read(bytes, buf)
            .map_err(|e| BusError::transaction(addr, e))
    }
}

/// Open the bus backend compiled into this build.
///
/// With `i2c` this is the real `/dev/i2c-<bus>`; otherwise, with `sim`,
/// a simulated set of devices, at the addresses in `devices`, for running
/// off-target.
#[cfg(feature = "i2c")]
pub fn open(bus: u8, _devices: &DriverConfig) -> Result<SharedBus, BusError> {
    Ok(SharedBus::new(Box::new(RppalBus::open(bus)?)))
}

#[cfg(all(not(feature = "i2c"), feature = "sim"))]
pub fn open(bus: u8, devices: &DriverConfig) -> Result<SharedBus, BusError> {
    tracing::warn!(bus, "i2c feature disabled, using simulated sensors");
    Ok(SharedBus::new(Box::new(crate::sim::SimBus::for_driver(devices))))
}

#[cfg(not(any(feature = "i2c", feature = "sim")))]
pub fn open(_bus: u8, _devices: &DriverConfig) -> Result<SharedBus, BusError> {
    Err(BusError::Worker(
        "no bus backend compiled in (enable `i2c` or `sim`)".to_string(),
    ))
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::FakeBus;
    use std::time::Duration;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_transactions_do_not_interleave() {
        let fake = FakeBus::new();
        let bus = SharedBus::new(Box::new(fake.clone()));

        let mut handles = Vec::new();
        for addr in [0x10u16, 0x20, 0x30, 0x40] {
            let bus = bus.clone();
            handles.push(tokio::spawn(async move {
                bus.transaction(move |b| {
                    b.write(addr, &[1])?;
                    std::thread::sleep(Duration::from_millis(5));
                    b.write(addr, &[2])
                })
                .await
            }));
        }
        for h in handles {
            h.await.unwrap().unwrap();
        }

        // Every transaction's two writes must be adjacent in the wire log.
        let log = fake.writes();
        assert_eq!(log.len(), 8);
        for pair in log.chunks(2) {
            assert_eq!(pair[0].0, pair[1].0, "interleaved: {log:?}");
            assert_eq!(pair[0].1, vec![1]);
            assert_eq!(pair[1].1, vec![2]);
        }
    }

    #[tokio::test]
    async fn panicking_transaction_reports_worker_error() {
        let bus = SharedBus::new(Box::new(FakeBus::new()));
        let res: Result<(), _> = bus.transaction(|_| panic!("boom")).await;
        assert!(matches!(res, Err(BusError::Worker(_))));

        // The bus stays usable afterwards.
        bus.transaction(|b| b.write(0x48, &[0x84])).await.unwrap();
    }
}
