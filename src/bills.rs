// 🧾 Bills - Recurring commitments and one-off payments
//
// Recurring bills are normalised to a monthly figure with fixed multipliers
// (a "month" is 4.33 weeks). One-off bills stay on the list until paid.

use crate::error::DashboardError;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Rows shown in the upcoming-bills panel
pub const UPCOMING_RECURRING_LIMIT: usize = 4;
pub const UPCOMING_ONE_OFF_LIMIT: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BillFrequency {
    Weekly,
    Fortnightly,
    Monthly,
    Quarterly,
    Yearly,
}

impl BillFrequency {
    /// Factor converting one payment into a monthly equivalent.
    pub fn monthly_multiplier(&self) -> f64 {
        match self {
            BillFrequency::Weekly => 4.33,
            BillFrequency::Fortnightly => 2.17,
            BillFrequency::Monthly => 1.0,
            BillFrequency::Quarterly => 0.33,
            BillFrequency::Yearly => 0.083,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BillFrequency::Weekly => "weekly",
            BillFrequency::Fortnightly => "fortnightly",
            BillFrequency::Monthly => "monthly",
            BillFrequency::Quarterly => "quarterly",
            BillFrequency::Yearly => "yearly",
        }
    }
}

impl FromStr for BillFrequency {
    type Err = DashboardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "weekly" => Ok(BillFrequency::Weekly),
            "fortnightly" => Ok(BillFrequency::Fortnightly),
            "monthly" => Ok(BillFrequency::Monthly),
            "quarterly" => Ok(BillFrequency::Quarterly),
            "yearly" | "annually" => Ok(BillFrequency::Yearly),
            other => Err(DashboardError::UnknownVariant {
                kind: "bill frequency",
                value: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for BillFrequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecurringBill {
    pub id: String,
    pub name: String,
    pub amount: f64,
    pub frequency: BillFrequency,
    pub next_due_date: NaiveDate,
    pub category: String,
    pub is_active: bool,
}

impl RecurringBill {
    pub fn new(name: &str, amount: f64, frequency: BillFrequency, next_due_date: NaiveDate) -> Self {
        RecurringBill {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            amount,
            frequency,
            next_due_date,
            category: "Bills".to_string(),
            is_active: true,
        }
    }

    pub fn monthly_equivalent(&self) -> f64 {
        self.amount * self.frequency.monthly_multiplier()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OneOffBill {
    pub id: String,
    pub name: String,
    pub amount: f64,
    pub due_date: NaiveDate,
    pub is_paid: bool,
    pub notes: Option<String>,
}

impl OneOffBill {
    pub fn new(name: &str, amount: f64, due_date: NaiveDate) -> Self {
        OneOffBill {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            amount,
            due_date,
            is_paid: false,
            notes: None,
        }
    }
}

/// How soon a bill needs attention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BillUrgency {
    /// Overdue or due within 3 days
    Urgent,
    /// Within a week
    Soon,
    /// Within a fortnight
    Upcoming,
    Later,
}

impl BillUrgency {
    pub fn from_days_until(days: i64) -> Self {
        match days {
            d if d <= 3 => BillUrgency::Urgent,
            d if d <= 7 => BillUrgency::Soon,
            d if d <= 14 => BillUrgency::Upcoming,
            _ => BillUrgency::Later,
        }
    }
}

/// Whole days from `today` to `due`; negative when overdue.
pub fn days_until(due: NaiveDate, today: NaiveDate) -> i64 {
    (due - today).num_days()
}

/// Monthly cost of every active recurring bill.
pub fn monthly_commitment(bills: &[RecurringBill]) -> f64 {
    bills
        .iter()
        .filter(|b| b.is_active)
        .map(RecurringBill::monthly_equivalent)
        .sum()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpcomingBill {
    pub id: String,
    pub name: String,
    pub amount: f64,
    pub due_date: NaiveDate,
    pub days_until: i64,
    pub urgency: BillUrgency,
    pub recurring: bool,
}

/// The next few bills to pay: active recurring bills by due date, and
/// unpaid one-off bills that are not yet overdue.
pub fn upcoming_bills(
    recurring: &[RecurringBill],
    one_off: &[OneOffBill],
    today: NaiveDate,
) -> Vec<UpcomingBill> {
    let mut one_off: Vec<&OneOffBill> = one_off
        .iter()
        .filter(|b| !b.is_paid && days_until(b.due_date, today) >= 0)
        .collect();
    one_off.sort_by_key(|b| b.due_date);

    let mut recurring: Vec<&RecurringBill> = recurring.iter().filter(|b| b.is_active).collect();
    recurring.sort_by_key(|b| b.next_due_date);

    let one_off = one_off
        .into_iter()
        .take(UPCOMING_ONE_OFF_LIMIT)
        .map(|b| upcoming(&b.id, &b.name, b.amount, b.due_date, false, today));
    let recurring = recurring
        .into_iter()
        .take(UPCOMING_RECURRING_LIMIT)
        .map(|b| upcoming(&b.id, &b.name, b.amount, b.next_due_date, true, today));

    one_off.chain(recurring).collect()
}

fn upcoming(
    id: &str,
    name: &str,
    amount: f64,
    due_date: NaiveDate,
    recurring: bool,
    today: NaiveDate,
) -> UpcomingBill {
    let days = days_until(due_date, today);
    UpcomingBill {
        id: id.to_string(),
        name: name.to_string(),
        amount,
        due_date,
        days_until: days,
        urgency: BillUrgency::from_days_until(days),
        recurring,
    }
}
