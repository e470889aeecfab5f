//! Pure conversions from raw register values to physical units.

/// Raw ADC counts for fully dry and fully wet soil.
///
/// Capacitive probes read *lower* the wetter the soil is, so a valid
/// profile always has `dry > wet`. The pair is tuned per physical probe
/// and comes from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalibrationProfile {
    pub dry: u8,
    pub wet: u8,
}

impl CalibrationProfile {
    /// Returns `None` for an inverted or zero-width pair.
    pub fn new(dry: u8, wet: u8) -> Option<Self> {
        (dry > wet).then_some(Self { dry, wet })
    }
}

/// Round to two decimal places, the precision every reading is stored at.
pub fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// Convert a raw ADC count to a soil moisture percentage.
///
/// Saturates at 0.0 for anything at or above the dry point and at 100.0
/// for anything at or below the wet point; linear in between.
pub fn moisture_from_raw(raw: u8, profile: CalibrationProfile) -> f64 {
    if raw >= profile.dry {
        return 0.0;
    }
    if raw <= profile.wet {
        return 100.0;
    }
    let dry = f64::from(profile.dry);
    let wet = f64::from(profile.wet);
    round2((dry - f64::from(raw)) / (dry - wet) * 100.0)
}

/// SHT3x transfer functions: `(°C, %RH)` from the two raw 16-bit words.
pub fn climate_from_raw(temp_raw: u16, hum_raw: u16) -> (f64, f64) {
    let temp = -45.0 + 175.0 * f64::from(temp_raw) / 65535.0;
    let humidity = 100.0 * f64::from(hum_raw) / 65535.0;
    (round2(temp), round2(humidity))
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn profile() -> CalibrationProfile {
        CalibrationProfile::new(240, 76).unwrap()
    }

    // -- CalibrationProfile -------------------------------------------------

    #[test]
    fn profile_rejects_inverted_pair() {
        assert!(CalibrationProfile::new(76, 240).is_none());
    }

    #[test]
    fn profile_rejects_equal_pair() {
        assert!(CalibrationProfile::new(100, 100).is_none());
    }

    // -- moisture_from_raw --------------------------------------------------

    #[test]
    fn moisture_saturates_dry() {
        for raw in 240..=255u8 {
            assert_eq!(moisture_from_raw(raw, profile()), 0.0, "raw={raw}");
        }
    }

    #[test]
    fn moisture_saturates_wet() {
        for raw in 0..=76u8 {
            assert_eq!(moisture_from_raw(raw, profile()), 100.0, "raw={raw}");
        }
    }

    #[test]
    fn moisture_interior_strictly_between_bounds() {
        for raw in 77..240u8 {
            let m = moisture_from_raw(raw, profile());
            assert!(m > 0.0 && m < 100.0, "raw={raw} gave {m}");
        }
    }

    #[test]
    fn moisture_monotonic_non_increasing() {
        let mut prev = moisture_from_raw(0, profile());
        for raw in 1..=255u8 {
            let m = moisture_from_raw(raw, profile());
            assert!(m <= prev, "raw={raw}: {m} > {prev}");
            prev = m;
        }
    }

    #[test]
    fn moisture_midpoint() {
        // (240 - 158) / 164 = 0.5
        assert_eq!(moisture_from_raw(158, profile()), 50.0);
    }

    #[test]
    fn moisture_rounds_to_two_decimals() {
        // (240 - 200) / 164 * 100 = 24.390243...
        assert_eq!(moisture_from_raw(200, profile()), 24.39);
    }

    // -- climate_from_raw ---------------------------------------------------

    #[test]
    fn climate_lower_endpoint() {
        assert_eq!(climate_from_raw(0, 0), (-45.0, 0.0));
    }

    #[test]
    fn climate_upper_endpoint() {
        assert_eq!(climate_from_raw(65535, 65535), (130.0, 100.0));
    }

    #[test]
    fn climate_typical_room() {
        // 0x6666 = 26214 → -45 + 175 * 0.4 = 25.0; humidity 40.0
        let (t, h) = climate_from_raw(0x6666, 0x6666);
        assert_eq!(t, 25.0);
        assert_eq!(h, 40.0);
    }
}
