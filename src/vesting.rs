// ⏳ Vesting Engine - How many tokens have unlocked at a given instant
//
// Vested amount is a pure function of (schedule, now):
//   vested = min(periods_elapsed * amount_per_period, total_tokens)
//
// The first vesting event happens ON the start date, so periods_elapsed is 1
// at the start instant itself. "now" is always passed in explicitly; nothing
// here reads the clock.

use crate::error::DashboardError;
use chrono::{DateTime, Duration, Months, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// FREQUENCY
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VestingFrequency {
    Second,
    Minute,
    Hour,
    Day,
    Week,
    Month,
    /// Anything a stored row carries that we don't recognise. Vests nothing.
    #[serde(other)]
    Unknown,
}

impl VestingFrequency {
    /// Fixed period length in milliseconds, or None for calendar months.
    pub fn period_ms(&self) -> Option<i64> {
        match self {
            VestingFrequency::Second => Some(1_000),
            VestingFrequency::Minute => Some(60_000),
            VestingFrequency::Hour => Some(3_600_000),
            VestingFrequency::Day => Some(86_400_000),
            VestingFrequency::Week => Some(7 * 86_400_000),
            VestingFrequency::Month | VestingFrequency::Unknown => None,
        }
    }

    /// Parse without failing: unrecognised strings become `Unknown`.
    pub fn parse_lenient(s: &str) -> Self {
        s.parse().unwrap_or(VestingFrequency::Unknown)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            VestingFrequency::Second => "second",
            VestingFrequency::Minute => "minute",
            VestingFrequency::Hour => "hour",
            VestingFrequency::Day => "day",
            VestingFrequency::Week => "week",
            VestingFrequency::Month => "month",
            VestingFrequency::Unknown => "unknown",
        }
    }
}

impl FromStr for VestingFrequency {
    type Err = DashboardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "second" => Ok(VestingFrequency::Second),
            "minute" => Ok(VestingFrequency::Minute),
            "hour" => Ok(VestingFrequency::Hour),
            "day" => Ok(VestingFrequency::Day),
            "week" => Ok(VestingFrequency::Week),
            "month" => Ok(VestingFrequency::Month),
            other => Err(DashboardError::UnknownVestingFrequency(other.to_string())),
        }
    }
}

impl fmt::Display for VestingFrequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SCHEDULE
// ============================================================================

/// A vesting plan. Immutable per query; the vested amount is never stored
/// here, it is always recomputed with [`vested_as_of`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VestingSchedule {
    /// Calendar date of the first vesting event. Any date or timestamp
    /// string is accepted; only the leading `YYYY-MM-DD` is used.
    pub start_date: String,
    pub frequency: VestingFrequency,
    pub amount_per_period: f64,
    pub total_tokens: f64,
}

impl VestingSchedule {
    pub fn new(
        start_date: &str,
        frequency: VestingFrequency,
        amount_per_period: f64,
        total_tokens: f64,
    ) -> Self {
        VestingSchedule {
            start_date: start_date.to_string(),
            frequency,
            amount_per_period,
            total_tokens,
        }
    }

    /// UTC midnight of the start date, regardless of any time or offset the
    /// stored string carries.
    pub fn start_instant(&self) -> Option<DateTime<Utc>> {
        let date = parse_start_date(&self.start_date)?;
        Some(date.and_hms_opt(0, 0, 0)?.and_utc())
    }

    fn amount(&self) -> f64 {
        non_negative(self.amount_per_period)
    }

    fn total(&self) -> f64 {
        non_negative(self.total_tokens)
    }
}

/// Date-only component of a date or timestamp string.
///
/// Postgres hands back values like `2025-09-16 00:00:00+00`; the time and
/// offset are dropped so the result never shifts a day with the caller's zone.
pub fn parse_start_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    let date_part = trimmed.get(..10).unwrap_or(trimmed);
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok()
}

fn non_negative(value: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        0.0
    }
}

// ============================================================================
// ENGINE
// ============================================================================

/// Number of vesting events that have happened by `now` (inclusive).
pub fn periods_elapsed(schedule: &VestingSchedule, now: DateTime<Utc>) -> u64 {
    let start = match schedule.start_instant() {
        Some(start) if start <= now => start,
        _ => return 0,
    };

    match schedule.frequency {
        VestingFrequency::Month => months_elapsed(start, now),
        VestingFrequency::Unknown => {
            tracing::debug!(start_date = %schedule.start_date, "unknown vesting frequency, 0 periods");
            0
        }
        fixed => {
            // period_ms is Some for every fixed frequency
            let period_ms = fixed.period_ms().unwrap_or(i64::MAX);
            let elapsed_ms = (now - start).num_milliseconds();
            (elapsed_ms / period_ms) as u64 + 1
        }
    }
}

/// Count calendar-month boundaries from `start` up to and including `now`.
///
/// Each step is taken from `start` rather than from the previous cursor so a
/// 31st start clamps to short months without drifting (Jan 31, Feb 29, Mar 31).
fn months_elapsed(start: DateTime<Utc>, now: DateTime<Utc>) -> u64 {
    let mut count: u32 = 0;
    let mut cursor = start;
    while cursor <= now {
        count += 1;
        cursor = match start.checked_add_months(Months::new(count)) {
            Some(next) => next,
            None => break,
        };
    }
    count as u64
}

/// Tokens vested as of `now`, capped at `total_tokens`.
///
/// Returns 0 when the start date can't be parsed or lies in the future.
pub fn vested_as_of(schedule: &VestingSchedule, now: DateTime<Utc>) -> f64 {
    let periods = periods_elapsed(schedule, now);
    if periods == 0 {
        return 0.0;
    }
    (periods as f64 * schedule.amount()).min(schedule.total())
}

/// Tokens still locked as of `now`. Never negative.
pub fn unvested_as_of(schedule: &VestingSchedule, now: DateTime<Utc>) -> f64 {
    (schedule.total() - vested_as_of(schedule, now)).max(0.0)
}

/// Instant of the first vesting event strictly after `now`.
///
/// None once the schedule is fully vested, when nothing would vest
/// (zero amount, unknown frequency), or when the start date is unparseable.
pub fn next_vest_date(schedule: &VestingSchedule, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let start = schedule.start_instant()?;
    if schedule.amount() <= 0.0 || schedule.frequency == VestingFrequency::Unknown {
        return None;
    }
    if start > now {
        return Some(start);
    }
    if vested_as_of(schedule, now) >= schedule.total() {
        return None;
    }

    // Events are indexed from 0 at the start, so the next one is index `periods`.
    let periods = periods_elapsed(schedule, now);
    match schedule.frequency.period_ms() {
        Some(period_ms) => {
            let offset = (periods as i64).checked_mul(period_ms)?;
            start.checked_add_signed(Duration::milliseconds(offset))
        }
        None => start.checked_add_months(Months::new(u32::try_from(periods).ok()?)),
    }
}

// ============================================================================
// VALUATION
// ============================================================================

/// A schedule priced at a per-token value, as shown on the vesting page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VestingValuation {
    pub vested_tokens: f64,
    pub remaining_tokens: f64,
    pub token_price: f64,
    pub vested_value: f64,
    pub remaining_value: f64,
    /// Value of a single vesting event.
    pub per_vest_value: f64,
    pub pct_vested: f64,
    pub next_vest_date: Option<DateTime<Utc>>,
}

impl VestingValuation {
    pub fn compute(schedule: &VestingSchedule, token_price: f64, now: DateTime<Utc>) -> Self {
        let token_price = non_negative(token_price);
        let vested_tokens = vested_as_of(schedule, now);
        let remaining_tokens = unvested_as_of(schedule, now);
        let total = schedule.total();

        VestingValuation {
            vested_tokens,
            remaining_tokens,
            token_price,
            vested_value: vested_tokens * token_price,
            remaining_value: remaining_tokens * token_price,
            per_vest_value: schedule.amount() * token_price,
            pct_vested: if total > 0.0 { vested_tokens / total * 100.0 } else { 0.0 },
            next_vest_date: next_vest_date(schedule, now),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, s).unwrap()
    }

    fn schedule(start: &str, frequency: VestingFrequency, amount: f64, total: f64) -> VestingSchedule {
        VestingSchedule::new(start, frequency, amount, total)
    }

    #[test]
    fn test_first_period_vests_at_start() {
        let frequencies = [
            VestingFrequency::Second,
            VestingFrequency::Minute,
            VestingFrequency::Hour,
            VestingFrequency::Day,
            VestingFrequency::Week,
            VestingFrequency::Month,
        ];

        for frequency in frequencies {
            let s = schedule("2025-01-16", frequency, 100.0, 10_000.0);
            assert_eq!(
                vested_as_of(&s, at(2025, 1, 16, 0, 0, 0)),
                100.0,
                "{} should vest one period at the start instant",
                frequency
            );
        }

        println!("✅ First period vests at start for every frequency");
    }

    #[test]
    fn test_before_start_is_zero() {
        let s = schedule("2025-01-16", VestingFrequency::Day, 100.0, 10_000.0);
        assert_eq!(vested_as_of(&s, at(2025, 1, 15, 23, 59, 59)), 0.0);
        assert_eq!(periods_elapsed(&s, at(2024, 6, 1, 0, 0, 0)), 0);
    }

    #[test]
    fn test_fixed_frequencies() {
        let s = schedule("2025-01-01", VestingFrequency::Day, 10.0, 1_000.0);
        // Day 0 + 9 full days
        assert_eq!(vested_as_of(&s, at(2025, 1, 10, 12, 0, 0)), 100.0);

        let s = schedule("2025-01-01", VestingFrequency::Hour, 1.0, 1_000.0);
        assert_eq!(vested_as_of(&s, at(2025, 1, 1, 5, 30, 0)), 6.0);

        let s = schedule("2025-01-01", VestingFrequency::Week, 50.0, 1_000.0);
        assert_eq!(vested_as_of(&s, at(2025, 1, 14, 23, 59, 59)), 100.0);
        assert_eq!(vested_as_of(&s, at(2025, 1, 15, 0, 0, 0)), 150.0);

        let s = schedule("2025-01-01", VestingFrequency::Second, 0.5, 1_000.0);
        assert_eq!(vested_as_of(&s, at(2025, 1, 1, 0, 0, 9)), 5.0);

        let s = schedule("2025-01-01", VestingFrequency::Minute, 2.0, 1_000.0);
        assert_eq!(vested_as_of(&s, at(2025, 1, 1, 0, 2, 59)), 6.0);
    }

    #[test]
    fn test_cap_at_total_tokens() {
        let s = schedule("2020-01-01", VestingFrequency::Day, 100.0, 250.0);
        assert_eq!(vested_as_of(&s, at(2025, 1, 1, 0, 0, 0)), 250.0);
        assert_eq!(unvested_as_of(&s, at(2025, 1, 1, 0, 0, 0)), 0.0);

        // Amount bigger than the whole grant
        let s = schedule("2025-01-01", VestingFrequency::Month, 500.0, 200.0);
        assert_eq!(vested_as_of(&s, at(2025, 1, 1, 0, 0, 0)), 200.0);
    }

    #[test]
    fn test_month_end_start_clamps_to_short_months() {
        let s = schedule("2024-01-31", VestingFrequency::Month, 1.0, 100.0);

        assert_eq!(periods_elapsed(&s, at(2024, 2, 15, 0, 0, 0)), 1);
        assert_eq!(periods_elapsed(&s, at(2024, 2, 28, 23, 59, 59)), 1);
        assert_eq!(periods_elapsed(&s, at(2024, 2, 29, 0, 0, 0)), 2);
        assert_eq!(periods_elapsed(&s, at(2024, 3, 30, 0, 0, 0)), 2);
        assert_eq!(periods_elapsed(&s, at(2024, 3, 31, 0, 0, 0)), 3);
        assert!(vested_as_of(&s, at(2024, 3, 31, 0, 0, 0)) >= 2.0);

        println!("✅ Month-end schedule handles February");
    }

    #[test]
    fn test_month_frequency_mid_month() {
        let s = schedule("2025-09-16", VestingFrequency::Month, 1_000.0, 12_000.0);
        assert_eq!(vested_as_of(&s, at(2025, 10, 15, 23, 0, 0)), 1_000.0);
        assert_eq!(vested_as_of(&s, at(2025, 10, 16, 0, 0, 0)), 2_000.0);
        assert_eq!(vested_as_of(&s, at(2026, 9, 16, 0, 0, 0)), 12_000.0);
    }

    #[test]
    fn test_timestamp_start_is_normalised_to_utc_midnight() {
        let s = schedule("2025-09-16 00:00:00+00", VestingFrequency::Day, 1.0, 100.0);
        assert_eq!(s.start_instant(), Some(at(2025, 9, 16, 0, 0, 0)));

        // A late-evening offset must not push the start to another day
        let s = schedule("2025-09-16T23:30:00-10:00", VestingFrequency::Day, 1.0, 100.0);
        assert_eq!(s.start_instant(), Some(at(2025, 9, 16, 0, 0, 0)));
        assert_eq!(vested_as_of(&s, at(2025, 9, 16, 0, 0, 0)), 1.0);
    }

    #[test]
    fn test_unparseable_start_and_unknown_frequency() {
        let s = schedule("not a date", VestingFrequency::Day, 1.0, 100.0);
        assert_eq!(vested_as_of(&s, at(2025, 1, 1, 0, 0, 0)), 0.0);
        assert_eq!(next_vest_date(&s, at(2025, 1, 1, 0, 0, 0)), None);

        let s = schedule("2024-01-01", VestingFrequency::parse_lenient("fortnight"), 1.0, 100.0);
        assert_eq!(s.frequency, VestingFrequency::Unknown);
        assert_eq!(vested_as_of(&s, at(2025, 1, 1, 0, 0, 0)), 0.0);
    }

    #[test]
    fn test_frequency_parsing() {
        assert_eq!("Month".parse::<VestingFrequency>(), Ok(VestingFrequency::Month));
        assert_eq!(" week ".parse::<VestingFrequency>(), Ok(VestingFrequency::Week));
        assert!("yearly".parse::<VestingFrequency>().is_err());

        let parsed: VestingFrequency = serde_json::from_str("\"hour\"").unwrap();
        assert_eq!(parsed, VestingFrequency::Hour);
        let parsed: VestingFrequency = serde_json::from_str("\"quarter\"").unwrap();
        assert_eq!(parsed, VestingFrequency::Unknown);
    }

    #[test]
    fn test_negative_inputs_do_not_produce_negative_vesting() {
        let s = schedule("2024-01-01", VestingFrequency::Day, -10.0, 100.0);
        assert_eq!(vested_as_of(&s, at(2025, 1, 1, 0, 0, 0)), 0.0);

        let s = schedule("2024-01-01", VestingFrequency::Day, f64::NAN, 100.0);
        assert_eq!(vested_as_of(&s, at(2025, 1, 1, 0, 0, 0)), 0.0);
    }

    #[test]
    fn test_next_vest_date() {
        let s = schedule("2025-01-31", VestingFrequency::Month, 10.0, 100.0);
        assert_eq!(next_vest_date(&s, at(2025, 1, 1, 0, 0, 0)), Some(at(2025, 1, 31, 0, 0, 0)));
        assert_eq!(next_vest_date(&s, at(2025, 1, 31, 0, 0, 0)), Some(at(2025, 2, 28, 0, 0, 0)));
        assert_eq!(next_vest_date(&s, at(2025, 3, 1, 0, 0, 0)), Some(at(2025, 3, 31, 0, 0, 0)));

        let s = schedule("2025-01-01", VestingFrequency::Day, 10.0, 100.0);
        assert_eq!(next_vest_date(&s, at(2025, 1, 3, 8, 0, 0)), Some(at(2025, 1, 4, 0, 0, 0)));

        // Fully vested after 10 days
        assert_eq!(next_vest_date(&s, at(2025, 1, 10, 0, 0, 0)), None);
    }

    #[test]
    fn test_valuation() {
        let s = schedule("2025-01-01", VestingFrequency::Month, 250.0, 1_000.0);
        let v = VestingValuation::compute(&s, 2.0, at(2025, 2, 15, 0, 0, 0));

        assert_eq!(v.vested_tokens, 500.0);
        assert_eq!(v.remaining_tokens, 500.0);
        assert_eq!(v.vested_value, 1_000.0);
        assert_eq!(v.remaining_value, 1_000.0);
        assert_eq!(v.per_vest_value, 500.0);
        assert_eq!(v.pct_vested, 50.0);
        assert_eq!(v.next_vest_date, Some(at(2025, 3, 1, 0, 0, 0)));

        let empty = schedule("2025-01-01", VestingFrequency::Month, 0.0, 0.0);
        let v = VestingValuation::compute(&empty, 2.0, at(2025, 2, 15, 0, 0, 0));
        assert_eq!(v.pct_vested, 0.0);

        println!("✅ Valuation test passed: {:.1}% vested", 50.0);
    }
}
