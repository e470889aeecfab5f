//! Time-of-day logic: the light window evaluator and the irrigation trigger
//! calculator. Pure functions over `chrono` values; no clocks are read here.

use std::fmt;

use chrono::{DateTime, Days, NaiveTime, TimeZone};

/// Parse `"HH:MM"` (24-hour).
pub fn parse_hhmm(s: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(s.trim(), "%H:%M").ok()
}

/// Daily on/off window, half-open `[on, off)`. Wraps past midnight when
/// `on > off`. An `on == off` window is empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleWindow {
    pub on: NaiveTime,
    pub off: NaiveTime,
}

impl ScheduleWindow {
    pub fn new(on: NaiveTime, off: NaiveTime) -> Self {
        Self { on, off }
    }

    pub fn wraps_midnight(&self) -> bool {
        self.on > self.off
    }
}

impl fmt::Display for ScheduleWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.on.format("%H:%M"), self.off.format("%H:%M"))
    }
}

/// Whether `now` falls inside `window`. On-instant inclusive, off-instant
/// exclusive, in both the same-day and the overnight case.
pub fn is_active(now: NaiveTime, window: &ScheduleWindow) -> bool {
    if window.on <= window.off {
        window.on <= now && now < window.off
    } else {
        now >= window.on || now < window.off
    }
}

/// Earliest trigger strictly after `now`, in `now`'s zone.
///
/// Local times that do not exist on a given day (DST spring-forward gap)
/// are skipped for that day; ambiguous ones resolve to the earlier instant.
pub fn next_trigger<Tz: TimeZone>(now: &DateTime<Tz>, times: &[NaiveTime]) -> Option<DateTime<Tz>> {
    let tz = &now.timezone();
    let today = now.date_naive();

    (0..=2u64)
        .filter_map(|d| today.checked_add_days(Days::new(d)))
        .flat_map(|date| {
            times
                .iter()
                .filter_map(move |t| tz.from_local_datetime(&date.and_time(*t)).earliest())
                .collect::<Vec<_>>()
        })
        .filter(|candidate| candidate > now)
        .min()
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use chrono_tz::Europe::Warsaw;

    fn t(s: &str) -> NaiveTime {
        parse_hhmm(s).unwrap()
    }

    fn window(on: &str, off: &str) -> ScheduleWindow {
        ScheduleWindow::new(t(on), t(off))
    }

    // -- parse_hhmm -------------------------------------------------------

    #[test]
    fn parse_valid() {
        assert_eq!(parse_hhmm("20:10"), NaiveTime::from_hms_opt(20, 10, 0));
        assert_eq!(parse_hhmm(" 08:00 "), NaiveTime::from_hms_opt(8, 0, 0));
    }

    #[test]
    fn parse_invalid() {
        assert_eq!(parse_hhmm("24:00"), None);
        assert_eq!(parse_hhmm("12:60"), None);
        assert_eq!(parse_hhmm("noon"), None);
        assert_eq!(parse_hhmm(""), None);
    }

    // -- is_active: overnight window ---------------------------------------

    #[test]
    fn overnight_active_late_evening() {
        assert!(is_active(t("23:00"), &window("22:50", "08:00")));
    }

    #[test]
    fn overnight_active_just_before_off() {
        assert!(is_active(t("07:59"), &window("22:50", "08:00")));
    }

    #[test]
    fn overnight_inactive_at_off() {
        assert!(!is_active(t("08:00"), &window("22:50", "08:00")));
    }

    #[test]
    fn overnight_inactive_just_before_on() {
        assert!(!is_active(t("22:49"), &window("22:50", "08:00")));
    }

    #[test]
    fn overnight_active_at_on() {
        assert!(is_active(t("22:50"), &window("22:50", "08:00")));
    }

    #[test]
    fn overnight_active_at_midnight() {
        assert!(is_active(t("00:00"), &window("22:50", "08:00")));
    }

    #[test]
    fn overnight_inactive_midday() {
        assert!(!is_active(t("12:00"), &window("22:50", "08:00")));
    }

    #[test]
    fn overnight_seconds_before_off_still_active() {
        let now = NaiveTime::from_hms_opt(7, 59, 59).unwrap();
        assert!(is_active(now, &window("22:50", "08:00")));
    }

    // -- is_active: same-day window ----------------------------------------

    #[test]
    fn same_day_active_at_on() {
        assert!(is_active(t("06:00"), &window("06:00", "18:00")));
    }

    #[test]
    fn same_day_inactive_at_off() {
        assert!(!is_active(t("18:00"), &window("06:00", "18:00")));
    }

    #[test]
    fn same_day_active_just_before_off() {
        assert!(is_active(t("17:59"), &window("06:00", "18:00")));
    }

    #[test]
    fn same_day_inactive_just_before_on() {
        assert!(!is_active(t("05:59"), &window("06:00", "18:00")));
    }

    #[test]
    fn empty_window_never_active() {
        let w = window("12:00", "12:00");
        for s in ["00:00", "11:59", "12:00", "12:01", "23:59"] {
            assert!(!is_active(t(s), &w), "{s}");
        }
    }

    #[test]
    fn window_display_and_wrap() {
        let w = window("20:10", "08:00");
        assert!(w.wraps_midnight());
        assert_eq!(w.to_string(), "20:10-08:00");
        assert!(!window("06:00", "18:00").wraps_midnight());
    }

    // -- next_trigger --------------------------------------------------------

    #[test]
    fn next_trigger_later_today() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 5, 0, 0).unwrap();
        let next = next_trigger(&now, &[t("06:00"), t("22:00")]).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 5, 1, 6, 0, 0).unwrap());
    }

    #[test]
    fn next_trigger_rolls_to_tomorrow() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 22, 30, 0).unwrap();
        let next = next_trigger(&now, &[t("22:00"), t("06:00")]).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 5, 2, 6, 0, 0).unwrap());
    }

    #[test]
    fn next_trigger_is_strictly_after_now() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 6, 0, 0).unwrap();
        let next = next_trigger(&now, &[t("06:00")]).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 5, 2, 6, 0, 0).unwrap());
    }

    #[test]
    fn next_trigger_no_times() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 6, 0, 0).unwrap();
        assert_eq!(next_trigger(&now, &[]), None);
    }

    #[test]
    fn next_trigger_skips_dst_gap() {
        // Warsaw springs forward 2024-03-31 02:00 → 03:00; 02:30 does not exist.
        let now = Warsaw.with_ymd_and_hms(2024, 3, 31, 1, 0, 0).unwrap();
        let next = next_trigger(&now, &[t("02:30")]).unwrap();
        assert_eq!(next, Warsaw.with_ymd_and_hms(2024, 4, 1, 2, 30, 0).unwrap());
    }

    #[test]
    fn next_trigger_in_local_zone() {
        // 04:30 UTC is 06:30 CEST; the 06:00 trigger has passed locally.
        let now = Utc
            .with_ymd_and_hms(2024, 6, 1, 4, 30, 0)
            .unwrap()
            .with_timezone(&Warsaw);
        let next = next_trigger(&now, &[t("06:00"), t("22:00")]).unwrap();
        assert_eq!(next, Warsaw.with_ymd_and_hms(2024, 6, 1, 22, 0, 0).unwrap());
    }
}
