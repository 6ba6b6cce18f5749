// Net Worth Dashboard - Core Library
// Vesting and tax engines plus the dashboard metrics, bills and income built on them

pub mod bills;
pub mod db;
pub mod error;
pub mod income;
pub mod logging;
pub mod portfolio;
pub mod prices;
pub mod tax;
pub mod token_cache;
pub mod vesting;

// Re-export commonly used types
pub use bills::{
    BillFrequency, BillUrgency, OneOffBill, RecurringBill, UpcomingBill,
    days_until, monthly_commitment, upcoming_bills,
};
pub use db::{
    Asset, AssetType, IncomeSource, Liability, LiabilityType, NetWorthSnapshot, Transaction,
    TransactionType, VestingRecord,
    open_database, setup_database, insert_asset, get_assets, insert_liability, get_liabilities,
    insert_vesting_record, get_vesting_records, refresh_vested_snapshots,
    load_transactions_csv, insert_transactions, get_transactions_between, count_transactions,
    upsert_snapshot, get_snapshots, get_snapshot,
    insert_recurring_bill, get_recurring_bills, insert_one_off_bill, get_unpaid_bills,
    mark_bill_paid, save_income_config, get_income_config,
};
pub use error::DashboardError;
pub use income::{
    IncomeBreakdown, IncomeConfig, IncomeEvent, IncomeEventKind,
    income_by_month, next_friday, next_vest_day, upcoming_income_events,
};
pub use portfolio::{
    CashFlow, GrantValuation, NetWorthChange, NetWorthSummary, SpendingCategory,
    cash_flow_by_month, net_worth_change_30d, spending_breakdown, value_grants,
};
pub use prices::{PriceSource, StaticPrices};
pub use tax::{IncomeTaxResult, PayFrequency, TaxBracket, TaxEngine, TaxTable};
pub use token_cache::TokenCache;
pub use vesting::{
    VestingFrequency, VestingSchedule, VestingValuation,
    next_vest_date, periods_elapsed, unvested_as_of, vested_as_of,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
