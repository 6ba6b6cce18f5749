// 💵 Income - Salary config, upcoming pay events and income by source
//
// Salary is configured as a gross annual figure; take-home pay per period
// always goes through the tax engine (or a fixed override rate).

use crate::db::{IncomeSource, Transaction, TransactionType};
use crate::tax::{PayFrequency, TaxEngine};
use chrono::{Datelike, Duration, Months, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Day of the month token grants usually vest on
pub const VEST_DAY_OF_MONTH: u32 = 16;

// ============================================================================
// CONFIG
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncomeConfig {
    pub salary_gross_annual: f64,
    pub salary_frequency: PayFrequency,
    /// Any known pay day; later ones are derived by stepping one period at a time
    pub next_salary_date: NaiveDate,
    /// Flat rate used instead of the tax tables, as a fraction (0.3 = 30%)
    #[serde(default)]
    pub tax_rate_override: Option<f64>,
}

impl IncomeConfig {
    pub fn new(salary_gross_annual: f64, salary_frequency: PayFrequency, next_salary_date: NaiveDate) -> Self {
        IncomeConfig {
            salary_gross_annual,
            salary_frequency,
            next_salary_date,
            tax_rate_override: None,
        }
    }

    fn override_rate(&self) -> Option<f64> {
        self.tax_rate_override
            .filter(|r| r.is_finite() && (0.0..1.0).contains(r))
    }

    pub fn effective_rate(&self, engine: &TaxEngine) -> f64 {
        self.override_rate()
            .unwrap_or_else(|| engine.calculate_income_tax(self.salary_gross_annual).effective_rate)
    }

    pub fn net_annual(&self, engine: &TaxEngine) -> f64 {
        match self.override_rate() {
            Some(rate) => self.salary_gross_annual.max(0.0) * (1.0 - rate),
            None => engine.calculate_income_tax(self.salary_gross_annual).net_annual,
        }
    }

    /// Take-home pay for one pay period.
    pub fn net_per_pay(&self, engine: &TaxEngine) -> f64 {
        match self.override_rate() {
            Some(_) => self.net_annual(engine) / self.salary_frequency.periods_per_year(),
            None => engine.gross_to_net(self.salary_gross_annual, self.salary_frequency),
        }
    }

    /// Pre-tax estimate of an after-tax amount at this salary's rate.
    pub fn gross_up(&self, engine: &TaxEngine, after_tax: f64) -> f64 {
        match self.override_rate() {
            Some(rate) => after_tax / (1.0 - rate),
            None => engine.gross_up(after_tax, self.salary_gross_annual),
        }
    }

    /// First pay day on or after `today`.
    pub fn next_pay_date(&self, today: NaiveDate) -> NaiveDate {
        let anchor = self.next_salary_date;
        if anchor >= today {
            return anchor;
        }

        match self.salary_frequency {
            PayFrequency::Weekly | PayFrequency::Fortnightly => {
                let step = if self.salary_frequency == PayFrequency::Weekly { 7 } else { 14 };
                let behind = (today - anchor).num_days();
                let periods = (behind + step - 1) / step;
                anchor + Duration::days(periods * step)
            }
            PayFrequency::Monthly | PayFrequency::Annually => {
                let step: u32 = if self.salary_frequency == PayFrequency::Monthly { 1 } else { 12 };
                let months_behind = (today.year() - anchor.year()) * 12 + today.month() as i32
                    - anchor.month() as i32;
                let first = (months_behind.max(0) as u32 / step).max(1);
                // Step from the anchor so month-end pay days don't drift
                (first..=first + 1)
                    .filter_map(|k| anchor.checked_add_months(Months::new(k * step)))
                    .find(|d| *d >= today)
                    .unwrap_or(today)
            }
        }
    }
}

// ============================================================================
// UPCOMING EVENTS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncomeEventKind {
    Salary,
    Dividend,
    TokenVest,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncomeEvent {
    pub kind: IncomeEventKind,
    pub label: String,
    pub date: NaiveDate,
    /// Expected amount; 0 when not known ahead of time
    pub amount: f64,
    pub description: String,
}

/// The Friday after `today` (a week out when today is Friday).
pub fn next_friday(today: NaiveDate) -> NaiveDate {
    let from_sunday = today.weekday().num_days_from_sunday() as i64;
    let friday = Weekday::Fri.num_days_from_sunday() as i64;
    let days = match (friday - from_sunday + 7) % 7 {
        0 => 7,
        d => d,
    };
    today + Duration::days(days)
}

/// The next 16th strictly after `today`.
pub fn next_vest_day(today: NaiveDate) -> NaiveDate {
    let this_month = today.with_day(VEST_DAY_OF_MONTH).unwrap_or(today);
    if today.day() < VEST_DAY_OF_MONTH {
        this_month
    } else {
        this_month.checked_add_months(Months::new(1)).unwrap_or(this_month)
    }
}

/// Salary (when configured), the weekly dividend and the monthly vest,
/// soonest first.
pub fn upcoming_income_events(
    config: Option<&IncomeConfig>,
    engine: &TaxEngine,
    today: NaiveDate,
) -> Vec<IncomeEvent> {
    let mut events = Vec::with_capacity(3);

    if let Some(config) = config {
        events.push(IncomeEvent {
            kind: IncomeEventKind::Salary,
            label: "Salary".to_string(),
            date: config.next_pay_date(today),
            amount: config.net_per_pay(engine),
            description: format!("{} after tax", capitalise(&config.salary_frequency.to_string())),
        });
    }

    events.push(IncomeEvent {
        kind: IncomeEventKind::Dividend,
        label: "Dividend".to_string(),
        date: next_friday(today),
        amount: 0.0,
        description: "Weekly Friday income".to_string(),
    });

    events.push(IncomeEvent {
        kind: IncomeEventKind::TokenVest,
        label: "Token Vest".to_string(),
        date: next_vest_day(today),
        amount: 0.0,
        description: format!("{}th of month", VEST_DAY_OF_MONTH),
    });

    events.sort_by_key(|e| e.date);
    events
}

fn capitalise(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

// ============================================================================
// INCOME BY SOURCE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct IncomeBreakdown {
    pub salary: f64,
    pub dividend: f64,
    pub token_vest: f64,
    /// Tagged `other` or untagged
    pub other: f64,
    pub total: f64,
}

impl IncomeBreakdown {
    pub fn from_transactions(transactions: &[Transaction]) -> Self {
        let mut breakdown = IncomeBreakdown::default();

        for tx in transactions.iter().filter(|tx| tx.transaction_type == TransactionType::Income) {
            let bucket = match tx.income_source {
                Some(IncomeSource::Salary) => &mut breakdown.salary,
                Some(IncomeSource::Dividend) => &mut breakdown.dividend,
                Some(IncomeSource::TokenVest) => &mut breakdown.token_vest,
                Some(IncomeSource::Other) | None => &mut breakdown.other,
            };
            *bucket += tx.amount;
            breakdown.total += tx.amount;
        }

        breakdown
    }
}

/// Income by source per calendar month, keyed "YYYY-MM".
pub fn income_by_month(transactions: &[Transaction]) -> BTreeMap<String, IncomeBreakdown> {
    let mut grouped: BTreeMap<String, Vec<Transaction>> = BTreeMap::new();
    for tx in transactions.iter().filter(|tx| tx.transaction_type == TransactionType::Income) {
        let month = tx.date.get(..7).unwrap_or(&tx.date).to_string();
        grouped.entry(month).or_default().push(tx.clone());
    }

    grouped
        .into_iter()
        .map(|(month, txs)| (month, IncomeBreakdown::from_transactions(&txs)))
        .collect()
}
