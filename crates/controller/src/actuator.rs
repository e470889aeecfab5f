//! Relay control via GPIO. The `gpio` feature gates the real rppal driver;
//! without it, relays are mock lines that only log their level.

use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::Result;

#[cfg(feature = "gpio")]
use rppal::gpio::{Gpio, OutputPin};

use crate::status::{ActuatorKind, RelayState};

/// One digital output driving a relay input.
pub trait OutputLine: Send {
    /// Drive the line high (`true`) or low (`false`).
    fn write(&mut self, high: bool);
}

// ---------------------------------------------------------------------------
// Real GPIO line (production, requires rppal + Raspberry Pi hardware)
// ---------------------------------------------------------------------------
#[cfg(feature = "gpio")]
pub struct RppalLine {
    pin: OutputPin,
}

#[cfg(feature = "gpio")]
impl RppalLine {
    /// Claim BCM `pin` as an output, starting at `initial_high` so the relay
    /// never glitches on.
    pub fn open(pin: u8, initial_high: bool) -> Result<Self> {
        let gpio = Gpio::new()?;
        let pin = gpio.get(pin)?;
        let pin = if initial_high {
            pin.into_output_high()
        } else {
            pin.into_output_low()
        };
        Ok(Self { pin })
    }
}

#[cfg(feature = "gpio")]
impl OutputLine for RppalLine {
    fn write(&mut self, high: bool) {
        if high {
            self.pin.set_high()
        } else {
            self.pin.set_low()
        }
    }
}

// ---------------------------------------------------------------------------
// Mock line (development and tests, no hardware)
// ---------------------------------------------------------------------------

/// Records every level written. Clones share the record.
#[derive(Clone, Default)]
pub struct MockLine {
    pin: u8,
    levels: Arc<Mutex<Vec<bool>>>,
}

impl MockLine {
    pub fn new(pin: u8) -> Self {
        Self {
            pin,
            levels: Arc::default(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<bool>> {
        self.levels.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Every level written so far, oldest first.
    pub fn writes(&self) -> Vec<bool> {
        self.lock().clone()
    }

    pub fn level(&self) -> Option<bool> {
        self.lock().last().copied()
    }
}

impl OutputLine for MockLine {
    fn write(&mut self, high: bool) {
        tracing::debug!(pin = self.pin, high, "[mock-gpio] line write");
        self.lock().push(high);
    }
}

/// Open the output line for BCM `pin`, already at the relay's off level.
#[cfg(feature = "gpio")]
pub fn open_line(pin: u8, active_low: bool) -> Result<Box<dyn OutputLine>> {
    Ok(Box::new(RppalLine::open(pin, active_low)?))
}

#[cfg(not(feature = "gpio"))]
pub fn open_line(pin: u8, _active_low: bool) -> Result<Box<dyn OutputLine>> {
    tracing::warn!(pin, "gpio feature disabled, relay is a mock line (not wired)");
    Ok(Box::new(MockLine::new(pin)))
}

// ---------------------------------------------------------------------------
// Actuator
// ---------------------------------------------------------------------------

struct LineState {
    line: Box<dyn OutputLine>,
    energized: bool,
}

/// One relay with tracked state. Transitions are idempotent: setting the
/// current state writes nothing and logs nothing.
pub struct Actuator {
    kind: ActuatorKind,
    active_low: bool,
    state: Mutex<LineState>,
}

impl Actuator {
    /// Takes ownership of `line` and drives it to off immediately.
    pub fn new(kind: ActuatorKind, mut line: Box<dyn OutputLine>, active_low: bool) -> Self {
        line.write(level(false, active_low));
        Self {
            kind,
            active_low,
            state: Mutex::new(LineState {
                line,
                energized: false,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LineState> {
        // Line writes cannot panic halfway; the tracked flag stays valid.
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn kind(&self) -> ActuatorKind {
        self.kind
    }

    /// Returns whether the line was written.
    pub fn set(&self, energized: bool) -> bool {
        let mut st = self.lock();
        if st.energized == energized {
            return false;
        }
        st.line.write(level(energized, self.active_low));
        st.energized = energized;
        tracing::info!(
            actuator = %self.kind,
            state = %RelayState::from(energized),
            "relay switched"
        );
        true
    }

    pub fn current(&self) -> bool {
        self.lock().energized
    }

    /// Write the off level whatever the tracked state. Shutdown path only.
    pub fn force_off(&self) {
        let mut st = self.lock();
        st.line.write(level(false, self.active_low));
        if std::mem::replace(&mut st.energized, false) {
            tracing::info!(actuator = %self.kind, "relay forced off");
        }
    }
}

/// Line level for a relay state: active-low boards energize on LOW.
fn level(energized: bool, active_low: bool) -> bool {
    energized != active_low
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn actuator(active_low: bool) -> (Actuator, MockLine) {
        let line = MockLine::new(24);
        let a = Actuator::new(ActuatorKind::Pump, Box::new(line.clone()), active_low);
        (a, line)
    }

    #[test]
    fn new_drives_line_off() {
        let (a, line) = actuator(true);
        assert!(!a.current());
        assert_eq!(line.writes(), vec![true]); // active-low off = HIGH
    }

    #[test]
    fn new_drives_line_off_active_high() {
        let (_, line) = actuator(false);
        assert_eq!(line.writes(), vec![false]);
    }

    #[test]
    fn set_true_twice_writes_once() {
        let (a, line) = actuator(true);
        assert!(a.set(true));
        assert!(!a.set(true));
        assert!(a.current());
        // Construction write + one transition.
        assert_eq!(line.writes(), vec![true, false]);
    }

    #[test]
    fn set_false_when_off_writes_nothing() {
        let (a, line) = actuator(true);
        assert!(!a.set(false));
        assert_eq!(line.writes().len(), 1);
    }

    #[test]
    fn polarity_active_high() {
        let (a, line) = actuator(false);
        a.set(true);
        assert_eq!(line.level(), Some(true));
        a.set(false);
        assert_eq!(line.level(), Some(false));
    }

    #[test]
    fn force_off_writes_unconditionally() {
        let (a, line) = actuator(true);
        a.force_off();
        a.set(true);
        a.force_off();
        assert!(!a.current());
        assert_eq!(line.writes(), vec![true, true, false, true]);
    }

    #[test]
    fn set_from_many_threads_is_consistent() {
        let (a, line) = actuator(true);
        let a = Arc::new(a);
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let a = Arc::clone(&a);
                std::thread::spawn(move || a.set(true))
            })
            .collect();
        let switched = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|s| *s)
            .count();
        assert_eq!(switched, 1);
        assert_eq!(line.writes().len(), 2);
    }
}
