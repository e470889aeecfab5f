//! In-memory I2C bus with canned device responses and fault injection.
//!
//! Clones share state, so a test can keep one handle to script responses
//! and inspect the wire log while the driver owns another.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::bus::I2cBus;
use crate::error::BusError;

#[derive(Default)]
struct FakeState {
    writes: Vec<(u16, Vec<u8>)>,
    queued: HashMap<u16, VecDeque<Vec<u8>>>,
    fixed: HashMap<u16, Vec<u8>>,
    failing: HashSet<u16>,
}

#[derive(Clone, Default)]
pub struct FakeBus {
    state: Arc<Mutex<FakeState>>,
}

impl FakeBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Every read from `addr` returns `bytes` (after queued responses run out).
    pub fn respond(&self, addr: u16, bytes: &[u8]) {
        self.lock().fixed.insert(addr, bytes.to_vec());
    }

    /// The next read from `addr` returns `bytes`, once.
    pub fn push_response(&self, addr: u16, bytes: &[u8]) {
        self.lock()
            .queued
            .entry(addr)
            .or_default()
            .push_back(bytes.to_vec());
    }

    /// Make every transaction with `addr` fail until [`FakeBus::recover`].
    pub fn fail(&self, addr: u16) {
        self.lock().failing.insert(addr);
    }

    pub fn recover(&self, addr: u16) {
        self.lock().failing.remove(&addr);
    }

    /// All writes seen so far, in wire order.
    pub fn writes(&self) -> Vec<(u16, Vec<u8>)> {
        self.lock().writes.clone()
    }

    /// Writes seen so far addressed to `addr`.
    pub fn writes_to(&self, addr: u16) -> Vec<Vec<u8>> {
        self.lock()
            .writes
            .iter()
            .filter(|(a, _)| *a == addr)
            .map(|(_, b)| b.clone())
            .collect()
    }

    fn check(&self, addr: u16) -> Result<(), BusError> {
        if self.lock().failing.contains(&addr) {
            return Err(BusError::transaction(addr, "remote i/o error (injected)"));
        }
        Ok(())
    }

    fn next_response(&self, addr: u16) -> Option<Vec<u8>> {
        let mut st = self.lock();
        if let Some(bytes) = st.queued.get_mut(&addr).and_then(VecDeque::pop_front) {
            return Some(bytes);
        }
        st.fixed.get(&addr).cloned()
    }
}

impl I2cBus for FakeBus {
    fn write(&mut self, addr: u16, bytes: &[u8]) -> Result<(), BusError> {
        self.check(addr)?;
        self.lock().writes.push((addr, bytes.to_vec()));
        Ok(())
    }

    fn read(&mut self, addr: u16, buf: &mut [u8]) -> Result<(), BusError> {
        self.check(addr)?;
        let resp = self
            .next_response(addr)
            .ok_or_else(|| BusError::transaction(addr, "no device responded"))?;
        if resp.len() < buf.len() {
            return Err(BusError::ShortRead {
                addr,
                expected: buf.len(),
                got: resp.len(),
            });
        }
        buf.copy_from_slice(&resp[..buf.len()]);
        Ok(())
    }

    fn write_read(&mut self, addr: u16, bytes: &[u8], buf: &mut [u8]) -> Result<(), BusError> {
        self.write(addr, bytes)?;
        self.read(addr, buf)
    }
}
