// 📊 Portfolio Metrics - The numbers on the dashboard
//
//   paper_net_worth  = total_assets  - total_liabilities
//   liquid_net_worth = liquid_assets - total_liabilities
//
// Liquid assets count vesting grants at their vested quantity only, so the
// gap between the two is (mostly) unvested token value.

use crate::db::{Asset, Liability, NetWorthSnapshot, Transaction, TransactionType, VestingRecord};
use crate::prices::PriceSource;
use crate::vesting::{vested_as_of, VestingSchedule, VestingValuation};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

pub const UNCATEGORISED: &str = "Uncategorised";

// ============================================================================
// NET WORTH
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetWorthSummary {
    pub total_assets: f64,
    pub liquid_assets: f64,
    pub total_liabilities: f64,
    pub paper_net_worth: f64,
    pub liquid_net_worth: f64,
}

impl NetWorthSummary {
    /// Assets with a vesting grant contribute `vested * price` to liquid
    /// assets; other assets contribute their full value when `is_liquid`.
    pub fn compute(
        assets: &[Asset],
        liabilities: &[Liability],
        grants: &[VestingRecord],
        now: DateTime<Utc>,
    ) -> Self {
        let by_asset: HashMap<&str, &VestingSchedule> = grants
            .iter()
            .filter_map(|g| g.asset_id.as_deref().map(|id| (id, &g.schedule)))
            .collect();

        let total_assets: f64 = assets.iter().map(Asset::total_value).sum();

        let liquid_assets: f64 = assets
            .iter()
            .map(|asset| match by_asset.get(asset.id.as_str()) {
                // asset.value is the per-token price here
                Some(schedule) => vested_as_of(schedule, now) * asset.value,
                None if asset.is_liquid => asset.total_value(),
                None => 0.0,
            })
            .sum();

        let total_liabilities = total_liabilities(liabilities);

        NetWorthSummary {
            total_assets,
            liquid_assets,
            total_liabilities,
            paper_net_worth: total_assets - total_liabilities,
            liquid_net_worth: liquid_assets - total_liabilities,
        }
    }
}

fn total_liabilities(liabilities: &[Liability]) -> f64 {
    liabilities.iter().map(|l| l.balance).sum()
}

impl NetWorthSnapshot {
    /// Snapshot using the `is_liquid` flag alone; vesting is not consulted.
    pub fn capture(date: NaiveDate, assets: &[Asset], liabilities: &[Liability]) -> Self {
        let total_assets: f64 = assets.iter().map(Asset::total_value).sum();
        let liquid_assets: f64 = assets
            .iter()
            .filter(|a| a.is_liquid)
            .map(Asset::total_value)
            .sum();
        let total_liabilities = total_liabilities(liabilities);

        NetWorthSnapshot {
            date,
            total_assets,
            liquid_assets,
            total_liabilities,
            net_worth: total_assets - total_liabilities,
            liquid_net_worth: liquid_assets - total_liabilities,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NetWorthChange {
    pub change: f64,
    pub change_pct: f64,
}

/// Change between the latest snapshot and the oldest one within the last
/// 30 days. `snapshots` must be sorted oldest first.
pub fn net_worth_change_30d(snapshots: &[NetWorthSnapshot], today: NaiveDate) -> NetWorthChange {
    let cutoff = today - Duration::days(30);
    let latest = snapshots.last();
    let older = snapshots.iter().find(|s| s.date >= cutoff);

    match (latest, older) {
        (Some(latest), Some(older)) => {
            let change = latest.net_worth - older.net_worth;
            let change_pct = if older.net_worth > 0.0 {
                change / older.net_worth * 100.0
            } else {
                0.0
            };
            NetWorthChange { change, change_pct }
        }
        _ => NetWorthChange { change: 0.0, change_pct: 0.0 },
    }
}

// ============================================================================
// CASH FLOW
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CashFlow {
    pub income: f64,
    pub expenses: f64,
    pub net: f64,
    /// Percent of income kept
    pub savings_rate: f64,
}

impl CashFlow {
    pub fn from_transactions(transactions: &[Transaction]) -> Self {
        let income = sum_of(transactions, TransactionType::Income);
        let expenses = sum_of(transactions, TransactionType::Expense);
        let net = income - expenses;

        CashFlow {
            income,
            expenses,
            net,
            savings_rate: if income > 0.0 { net / income * 100.0 } else { 0.0 },
        }
    }

    /// Months `liquid_assets` would last at this rate of spending.
    pub fn cash_runway(&self, liquid_assets: f64) -> f64 {
        if self.expenses > 0.0 {
            liquid_assets / self.expenses
        } else {
            0.0
        }
    }
}

fn sum_of(transactions: &[Transaction], kind: TransactionType) -> f64 {
    transactions
        .iter()
        .filter(|tx| tx.transaction_type == kind)
        .map(|tx| tx.amount)
        .sum()
}

/// Cash flow per calendar month, keyed "YYYY-MM".
pub fn cash_flow_by_month(transactions: &[Transaction]) -> BTreeMap<String, CashFlow> {
    let mut grouped: BTreeMap<String, Vec<Transaction>> = BTreeMap::new();
    for tx in transactions {
        let month = tx.date.get(..7).unwrap_or(&tx.date).to_string();
        grouped.entry(month).or_default().push(tx.clone());
    }

    grouped
        .into_iter()
        .map(|(month, txs)| (month, CashFlow::from_transactions(&txs)))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpendingCategory {
    pub category: String,
    pub amount: f64,
    pub count: usize,
    pub percentage: f64,
}

/// Expenses grouped by category, largest first.
pub fn spending_breakdown(transactions: &[Transaction]) -> Vec<SpendingCategory> {
    let mut by_category: HashMap<&str, (f64, usize)> = HashMap::new();
    let mut total = 0.0;

    for tx in transactions.iter().filter(|tx| tx.transaction_type == TransactionType::Expense) {
        let category = if tx.category.trim().is_empty() {
            UNCATEGORISED
        } else {
            tx.category.as_str()
        };
        let entry = by_category.entry(category).or_insert((0.0, 0));
        entry.0 += tx.amount;
        entry.1 += 1;
        total += tx.amount;
    }

    let mut categories: Vec<SpendingCategory> = by_category
        .into_iter()
        .map(|(category, (amount, count))| SpendingCategory {
            category: category.to_string(),
            amount,
            count,
            percentage: if total > 0.0 { amount / total * 100.0 } else { 0.0 },
        })
        .collect();

    categories.sort_by(|a, b| {
        b.amount
            .total_cmp(&a.amount)
            .then_with(|| a.category.cmp(&b.category))
    });
    categories
}

// ============================================================================
// TOKEN GRANTS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrantValuation {
    pub token_symbol: String,
    pub token_name: String,
    pub valuation: VestingValuation,
}

/// Price every grant. Grants without a known price are valued at 0.
pub fn value_grants<P: PriceSource>(
    grants: &[VestingRecord],
    prices: &P,
    now: DateTime<Utc>,
) -> Vec<GrantValuation> {
    grants
        .iter()
        .map(|grant| {
            let price = prices.price(&grant.token_symbol).unwrap_or_else(|| {
                tracing::debug!(symbol = %grant.token_symbol, "no price, valuing at 0");
                0.0
            });
            GrantValuation {
                token_symbol: grant.token_symbol.clone(),
                token_name: grant.token_name.clone(),
                valuation: VestingValuation::compute(&grant.schedule, price, now),
            }
        })
        .collect()
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{AssetType, LiabilityType};
    use crate::prices::StaticPrices;
    use crate::vesting::VestingFrequency;
    use chrono::TimeZone;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn snapshot(d: NaiveDate, net_worth: f64) -> NetWorthSnapshot {
        NetWorthSnapshot {
            date: d,
            total_assets: net_worth,
            liquid_assets: 0.0,
            total_liabilities: 0.0,
            net_worth,
            liquid_net_worth: 0.0,
        }
    }

    #[test]
    fn test_net_worth_with_vesting_grant() {
        let now = Utc.with_ymd_and_hms(2025, 3, 20, 0, 0, 0).unwrap();

        let mut cash = Asset::new("Savings", AssetType::Cash, 30_000.0);
        cash.is_liquid = true;
        let house = Asset::new("House", AssetType::Property, 800_000.0);
        let mut token = Asset::new("Project Token", AssetType::Crypto, 2.0);
        token.quantity = Some(1_200.0);
        token.is_liquid = true;

        let mut grant = VestingRecord::new(
            "PRJ",
            "Project Token",
            VestingSchedule::new("2025-01-16", VestingFrequency::Month, 100.0, 1_200.0),
        );
        grant.asset_id = Some(token.id.clone());

        let mortgage = Liability::new("Mortgage", LiabilityType::Mortgage, 500_000.0);

        let summary = NetWorthSummary::compute(
            &[cash, house, token],
            &[mortgage],
            &[grant],
            now,
        );

        assert_eq!(summary.total_assets, 30_000.0 + 800_000.0 + 2_400.0);
        // 3 vests of 100 tokens at $2
        assert_eq!(summary.liquid_assets, 30_000.0 + 600.0);
        assert_eq!(summary.total_liabilities, 500_000.0);
        assert_eq!(summary.paper_net_worth, 332_400.0);
        assert_eq!(summary.liquid_net_worth, 30_600.0 - 500_000.0);

        println!("✅ Net worth: paper ${:.2}, liquid ${:.2}", summary.paper_net_worth, summary.liquid_net_worth);
    }

    #[test]
    fn test_snapshot_capture_uses_liquid_flag() {
        let mut cash = Asset::new("Savings", AssetType::Cash, 10_000.0);
        cash.is_liquid = true;
        let house = Asset::new("House", AssetType::Property, 500_000.0);
        let loan = Liability::new("Car", LiabilityType::Loan, 15_000.0);

        let snap = NetWorthSnapshot::capture(date(2025, 3, 20), &[cash, house], &[loan]);
        assert_eq!(snap.total_assets, 510_000.0);
        assert_eq!(snap.liquid_assets, 10_000.0);
        assert_eq!(snap.net_worth, 495_000.0);
        assert_eq!(snap.liquid_net_worth, -5_000.0);
    }

    #[test]
    fn test_cash_flow() {
        let txs = vec![
            Transaction::new("2025-03-14", 5_000.0, TransactionType::Income, "Salary"),
            Transaction::new("2025-03-01", 2_000.0, TransactionType::Expense, "Rent"),
            Transaction::new("2025-03-03", 500.0, TransactionType::Expense, "Groceries"),
            Transaction::new("2025-03-05", 9_999.0, TransactionType::Transfer, "Savings"),
        ];

        let flow = CashFlow::from_transactions(&txs);
        assert_eq!(flow.income, 5_000.0);
        assert_eq!(flow.expenses, 2_500.0);
        assert_eq!(flow.net, 2_500.0);
        assert_eq!(flow.savings_rate, 50.0);
        assert_eq!(flow.cash_runway(10_000.0), 4.0);

        let empty = CashFlow::from_transactions(&[]);
        assert_eq!(empty.savings_rate, 0.0);
        assert_eq!(empty.cash_runway(10_000.0), 0.0);
    }

    #[test]
    fn test_cash_flow_by_month() {
        let txs = vec![
            Transaction::new("2025-02-14", 4_000.0, TransactionType::Income, "Salary"),
            Transaction::new("2025-03-14", 5_000.0, TransactionType::Income, "Salary"),
            Transaction::new("2025-03-20", 1_000.0, TransactionType::Expense, "Travel"),
        ];

        let months = cash_flow_by_month(&txs);
        let keys: Vec<&String> = months.keys().collect();
        assert_eq!(keys, vec!["2025-02", "2025-03"]);
        assert_eq!(months["2025-03"].net, 4_000.0);
    }

    #[test]
    fn test_spending_breakdown() {
        let txs = vec![
            Transaction::new("2025-03-01", 2_000.0, TransactionType::Expense, "Rent"),
            Transaction::new("2025-03-02", 300.0, TransactionType::Expense, "Groceries"),
            Transaction::new("2025-03-09", 200.0, TransactionType::Expense, "Groceries"),
            Transaction::new("2025-03-10", 500.0, TransactionType::Expense, ""),
            Transaction::new("2025-03-14", 5_000.0, TransactionType::Income, "Salary"),
        ];

        let breakdown = spending_breakdown(&txs);
        assert_eq!(breakdown.len(), 3);
        assert_eq!(breakdown[0].category, "Rent");
        assert!((breakdown[0].percentage - 2_000.0 / 3_000.0 * 100.0).abs() < 1e-9);
        // Groceries and Uncategorised tie at 500; name breaks the tie
        assert_eq!(breakdown[1].category, "Groceries");
        assert_eq!(breakdown[1].count, 2);
        assert_eq!(breakdown[2].category, UNCATEGORISED);
    }

    #[test]
    fn test_net_worth_change_30d() {
        let today = date(2025, 3, 31);
        let snapshots = vec![
            snapshot(date(2025, 2, 1), 80_000.0),
            snapshot(date(2025, 3, 5), 100_000.0),
            snapshot(date(2025, 3, 31), 110_000.0),
        ];

        let change = net_worth_change_30d(&snapshots, today);
        assert_eq!(change.change, 10_000.0);
        assert_eq!(change.change_pct, 10.0);

        assert_eq!(net_worth_change_30d(&[], today).change, 0.0);

        let negative_base = vec![snapshot(date(2025, 3, 10), -5_000.0), snapshot(today, 5_000.0)];
        let change = net_worth_change_30d(&negative_base, today);
        assert_eq!(change.change, 10_000.0);
        assert_eq!(change.change_pct, 0.0);
    }

    #[test]
    fn test_value_grants() {
        let now = Utc.with_ymd_and_hms(2025, 3, 20, 0, 0, 0).unwrap();
        let grants = vec![
            VestingRecord::new(
                "PRJ",
                "Project Token",
                VestingSchedule::new("2025-01-16", VestingFrequency::Month, 100.0, 1_200.0),
            ),
            VestingRecord::new(
                "UNK",
                "Unlisted",
                VestingSchedule::new("2025-01-01", VestingFrequency::Day, 1.0, 10.0),
            ),
        ];

        let mut prices = StaticPrices::new();
        prices.insert("PRJ", 2.0);

        let valued = value_grants(&grants, &prices, now);
        assert_eq!(valued[0].valuation.vested_value, 600.0);
        assert_eq!(valued[0].valuation.remaining_value, 1_800.0);
        assert_eq!(valued[1].valuation.token_price, 0.0);
        assert_eq!(valued[1].valuation.vested_tokens, 10.0);
    }
}
