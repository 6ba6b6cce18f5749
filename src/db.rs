use crate::bills::{BillFrequency, OneOffBill, RecurringBill};
use crate::error::{require_amount, DashboardError};
use crate::income::IncomeConfig;
use crate::tax::PayFrequency;
use crate::vesting::{next_vest_date, vested_as_of, VestingFrequency, VestingSchedule};
use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

// ============================================================================
// RECORDS
// Rows are coerced into these at the boundary; nothing past this module
// handles loosely typed data.
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetType {
    Cash,
    Property,
    Stock,
    Etf,
    Crypto,
    Other,
}

impl AssetType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetType::Cash => "cash",
            AssetType::Property => "property",
            AssetType::Stock => "stock",
            AssetType::Etf => "etf",
            AssetType::Crypto => "crypto",
            AssetType::Other => "other",
        }
    }
}

impl FromStr for AssetType {
    type Err = DashboardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "cash" => Ok(AssetType::Cash),
            "property" => Ok(AssetType::Property),
            "stock" => Ok(AssetType::Stock),
            "etf" => Ok(AssetType::Etf),
            "crypto" => Ok(AssetType::Crypto),
            "other" => Ok(AssetType::Other),
            other => Err(DashboardError::UnknownVariant {
                kind: "asset type",
                value: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for AssetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Something owned. For assets with a quantity, `value` is the price per
/// unit; otherwise it is the total value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Asset {
    pub id: String,
    pub name: String,
    pub asset_type: AssetType,
    pub value: f64,
    pub quantity: Option<f64>,
    pub cost_basis: Option<f64>,
    pub symbol: Option<String>,
    pub is_liquid: bool,
}

impl Asset {
    pub fn new(name: &str, asset_type: AssetType, value: f64) -> Self {
        Asset {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            asset_type,
            value,
            quantity: None,
            cost_basis: None,
            symbol: None,
            is_liquid: false,
        }
    }

    /// Price x quantity when a (non-zero) quantity is set, else the value itself.
    pub fn total_value(&self) -> f64 {
        match self.quantity {
            Some(qty) if qty != 0.0 => self.value * qty,
            _ => self.value,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LiabilityType {
    Mortgage,
    Loan,
    CreditCard,
    Other,
}

impl LiabilityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LiabilityType::Mortgage => "mortgage",
            LiabilityType::Loan => "loan",
            LiabilityType::CreditCard => "credit_card",
            LiabilityType::Other => "other",
        }
    }
}

impl FromStr for LiabilityType {
    type Err = DashboardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "mortgage" => Ok(LiabilityType::Mortgage),
            "loan" => Ok(LiabilityType::Loan),
            "credit_card" => Ok(LiabilityType::CreditCard),
            "other" => Ok(LiabilityType::Other),
            other => Err(DashboardError::UnknownVariant {
                kind: "liability type",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Liability {
    pub id: String,
    pub name: String,
    pub liability_type: LiabilityType,
    pub balance: f64,
    pub interest_rate: Option<f64>,
}

impl Liability {
    pub fn new(name: &str, liability_type: LiabilityType, balance: f64) -> Self {
        Liability {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            liability_type,
            balance,
            interest_rate: None,
        }
    }
}

/// A stored token grant. `vested_tokens_snapshot` is whatever was last
/// written to the row; use [`VestingRecord::vested_as_of`] for the real figure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VestingRecord {
    pub id: String,
    pub asset_id: Option<String>,
    pub token_symbol: String,
    pub token_name: String,
    pub schedule: VestingSchedule,
    pub vested_tokens_snapshot: f64,
}

impl VestingRecord {
    pub fn new(token_symbol: &str, token_name: &str, schedule: VestingSchedule) -> Self {
        VestingRecord {
            id: uuid::Uuid::new_v4().to_string(),
            asset_id: None,
            token_symbol: token_symbol.to_string(),
            token_name: token_name.to_string(),
            schedule,
            vested_tokens_snapshot: 0.0,
        }
    }

    pub fn vested_as_of(&self, now: DateTime<Utc>) -> f64 {
        vested_as_of(&self.schedule, now)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    Income,
    Expense,
    Transfer,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Income => "income",
            TransactionType::Expense => "expense",
            TransactionType::Transfer => "transfer",
        }
    }
}

impl FromStr for TransactionType {
    type Err = DashboardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "income" => Ok(TransactionType::Income),
            "expense" => Ok(TransactionType::Expense),
            "transfer" => Ok(TransactionType::Transfer),
            other => Err(DashboardError::UnknownVariant {
                kind: "transaction type",
                value: other.to_string(),
            }),
        }
    }
}

/// Where an income transaction came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncomeSource {
    Salary,
    Dividend,
    TokenVest,
    Other,
}

impl IncomeSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            IncomeSource::Salary => "salary",
            IncomeSource::Dividend => "dividend",
            IncomeSource::TokenVest => "token_vest",
            IncomeSource::Other => "other",
        }
    }
}

impl FromStr for IncomeSource {
    type Err = DashboardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "salary" => Ok(IncomeSource::Salary),
            "dividend" => Ok(IncomeSource::Dividend),
            "token_vest" => Ok(IncomeSource::TokenVest),
            "other" => Ok(IncomeSource::Other),
            other => Err(DashboardError::UnknownVariant {
                kind: "income source",
                value: other.to_string(),
            }),
        }
    }
}

/// Bank or manually entered transaction. `amount` is always positive;
/// direction comes from `transaction_type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    #[serde(default = "default_uuid")]
    pub id: String,
    /// YYYY-MM-DD
    pub date: String,
    pub amount: f64,
    pub transaction_type: TransactionType,
    /// Only meaningful for income
    #[serde(default)]
    pub income_source: Option<IncomeSource>,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub merchant: Option<String>,
    #[serde(default)]
    pub account_id: Option<String>,
}

fn default_uuid() -> String {
    uuid::Uuid::new_v4().to_string()
}

impl Transaction {
    pub fn new(date: &str, amount: f64, transaction_type: TransactionType, category: &str) -> Self {
        Transaction {
            id: default_uuid(),
            date: date.to_string(),
            amount,
            transaction_type,
            income_source: None,
            category: category.to_string(),
            description: String::new(),
            merchant: None,
            account_id: None,
        }
    }

    /// Hash used to skip re-imports of the same transaction.
    pub fn compute_idempotency_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(format!(
            "{}{}{}{}",
            self.date,
            self.amount,
            self.description,
            self.account_id.as_deref().unwrap_or("")
        ));
        format!("{:x}", hasher.finalize())
    }
}

/// Point-in-time net worth, one per day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetWorthSnapshot {
    pub date: NaiveDate,
    pub total_assets: f64,
    pub liquid_assets: f64,
    pub total_liabilities: f64,
    pub net_worth: f64,
    pub liquid_net_worth: f64,
}

// ============================================================================
// SCHEMA
// ============================================================================

pub fn open_database(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)
        .with_context(|| format!("Failed to open database: {:?}", path))?;
    setup_database(&conn)?;
    tracing::info!(path = ?path, "database ready");
    Ok(conn)
}

pub fn setup_database(conn: &Connection) -> Result<()> {
    // WAL is ignored for in-memory databases
    conn.pragma_update(None, "journal_mode", "WAL")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS assets (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            asset_type TEXT NOT NULL,
            value REAL NOT NULL,
            quantity REAL,
            cost_basis REAL,
            symbol TEXT,
            is_liquid INTEGER NOT NULL DEFAULT 0,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS liabilities (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            liability_type TEXT NOT NULL,
            balance REAL NOT NULL,
            interest_rate REAL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    // vested_tokens / next_vest_date are snapshots written by
    // refresh_vested_snapshots, never read back as truth
    conn.execute(
        "CREATE TABLE IF NOT EXISTS token_vesting_schedules (
            id TEXT PRIMARY KEY,
            asset_id TEXT,
            token_symbol TEXT NOT NULL,
            token_name TEXT NOT NULL,
            total_tokens REAL NOT NULL,
            vested_tokens REAL NOT NULL DEFAULT 0,
            vest_frequency TEXT NOT NULL,
            vest_amount REAL NOT NULL,
            vest_start_date TEXT NOT NULL,
            next_vest_date TEXT,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS transactions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            idempotency_hash TEXT UNIQUE NOT NULL,
            tx_uuid TEXT NOT NULL,
            date TEXT NOT NULL,
            amount REAL NOT NULL,
            transaction_type TEXT NOT NULL,
            income_source TEXT,
            category TEXT NOT NULL,
            description TEXT NOT NULL,
            merchant TEXT,
            account_id TEXT,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS net_worth_snapshots (
            date TEXT PRIMARY KEY,
            total_assets REAL NOT NULL,
            liquid_assets REAL NOT NULL,
            total_liabilities REAL NOT NULL,
            net_worth REAL NOT NULL,
            liquid_net_worth REAL NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS recurring_bills (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            amount REAL NOT NULL,
            frequency TEXT NOT NULL,
            next_due_date TEXT NOT NULL,
            category TEXT NOT NULL DEFAULT 'Bills',
            is_active INTEGER NOT NULL DEFAULT 1,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS one_off_bills (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            amount REAL NOT NULL,
            due_date TEXT NOT NULL,
            is_paid INTEGER NOT NULL DEFAULT 0,
            notes TEXT,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    // Single row
    conn.execute(
        "CREATE TABLE IF NOT EXISTS income_config (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            salary_gross_annual REAL NOT NULL,
            salary_frequency TEXT NOT NULL,
            next_salary_date TEXT NOT NULL,
            tax_rate_override REAL,
            updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_transactions_date ON transactions(date)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_vesting_asset ON token_vesting_schedules(asset_id)",
        [],
    )?;

    Ok(())
}

/// Log and drop rows that fail coercion instead of failing the whole read.
fn keep_valid<T>(table: &str, rows: Vec<(String, Result<T, DashboardError>)>) -> Vec<T> {
    rows.into_iter()
        .filter_map(|(id, row)| match row {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::warn!(table, id = %id, error = %e, "skipping invalid row");
                None
            }
        })
        .collect()
}

// ============================================================================
// ASSETS & LIABILITIES
// ============================================================================

pub fn insert_asset(conn: &Connection, asset: &Asset) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO assets
            (id, name, asset_type, value, quantity, cost_basis, symbol, is_liquid)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            asset.id,
            asset.name,
            asset.asset_type.as_str(),
            asset.value,
            asset.quantity,
            asset.cost_basis,
            asset.symbol,
            asset.is_liquid,
        ],
    )
    .with_context(|| format!("Failed to insert asset {}", asset.name))?;
    Ok(())
}

pub fn get_assets(conn: &Connection) -> Result<Vec<Asset>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, asset_type, value, quantity, cost_basis, symbol, is_liquid
         FROM assets ORDER BY value DESC",
    )?;

    let rows = stmt
        .query_map([], |row| {
            let id: String = row.get(0)?;
            let name: String = row.get(1)?;
            let asset_type: String = row.get(2)?;
            let value: f64 = row.get(3)?;
            let quantity: Option<f64> = row.get(4)?;
            let cost_basis: Option<f64> = row.get(5)?;
            let symbol: Option<String> = row.get(6)?;
            let is_liquid: bool = row.get(7)?;

            let coerced = asset_type.parse::<AssetType>().and_then(|asset_type| {
                Ok(Asset {
                    id: id.clone(),
                    name,
                    asset_type,
                    value: require_amount("value", value)?,
                    quantity,
                    cost_basis,
                    symbol,
                    is_liquid,
                })
            });
            Ok((id, coerced))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(keep_valid("assets", rows))
}

pub fn insert_liability(conn: &Connection, liability: &Liability) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO liabilities (id, name, liability_type, balance, interest_rate)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            liability.id,
            liability.name,
            liability.liability_type.as_str(),
            liability.balance,
            liability.interest_rate,
        ],
    )
    .with_context(|| format!("Failed to insert liability {}", liability.name))?;
    Ok(())
}

pub fn get_liabilities(conn: &Connection) -> Result<Vec<Liability>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, liability_type, balance, interest_rate FROM liabilities ORDER BY name",
    )?;

    let rows = stmt
        .query_map([], |row| {
            let id: String = row.get(0)?;
            let name: String = row.get(1)?;
            let liability_type: String = row.get(2)?;
            let balance: f64 = row.get(3)?;
            let interest_rate: Option<f64> = row.get(4)?;

            let coerced = liability_type.parse::<LiabilityType>().and_then(|liability_type| {
                Ok(Liability {
                    id: id.clone(),
                    name,
                    liability_type,
                    balance: require_amount("balance", balance)?,
                    interest_rate,
                })
            });
            Ok((id, coerced))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(keep_valid("liabilities", rows))
}

// ============================================================================
// VESTING SCHEDULES
// ============================================================================

pub fn insert_vesting_record(conn: &Connection, record: &VestingRecord) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO token_vesting_schedules
            (id, asset_id, token_symbol, token_name, total_tokens, vested_tokens,
             vest_frequency, vest_amount, vest_start_date)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            record.id,
            record.asset_id,
            record.token_symbol,
            record.token_name,
            record.schedule.total_tokens,
            record.vested_tokens_snapshot,
            record.schedule.frequency.as_str(),
            record.schedule.amount_per_period,
            record.schedule.start_date,
        ],
    )
    .with_context(|| format!("Failed to insert vesting schedule for {}", record.token_symbol))?;
    Ok(())
}

pub fn get_vesting_records(conn: &Connection) -> Result<Vec<VestingRecord>> {
    let mut stmt = conn.prepare(
        "SELECT id, asset_id, token_symbol, token_name, total_tokens, vested_tokens,
                vest_frequency, vest_amount, vest_start_date
         FROM token_vesting_schedules ORDER BY token_symbol",
    )?;

    let rows = stmt
        .query_map([], |row| {
            let id: String = row.get(0)?;
            let asset_id: Option<String> = row.get(1)?;
            let token_symbol: String = row.get(2)?;
            let token_name: String = row.get(3)?;
            let total_tokens: f64 = row.get(4)?;
            let vested_tokens: f64 = row.get(5)?;
            let vest_frequency: String = row.get(6)?;
            let vest_amount: f64 = row.get(7)?;
            let start_date: String = row.get(8)?;

            // Unknown frequencies and unparseable dates are kept; they simply
            // vest nothing. Bad amounts are rejected.
            let coerced = require_amount("total_tokens", total_tokens).and_then(|total| {
                let amount = require_amount("vest_amount", vest_amount)?;
                Ok(VestingRecord {
                    id: id.clone(),
                    asset_id,
                    token_symbol,
                    token_name,
                    schedule: VestingSchedule::new(
                        &start_date,
                        VestingFrequency::parse_lenient(&vest_frequency),
                        amount,
                        total,
                    ),
                    vested_tokens_snapshot: vested_tokens,
                })
            });
            Ok((id, coerced))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(keep_valid("token_vesting_schedules", rows))
}

/// Recompute and store the vested/next-vest snapshot columns as of `now`.
pub fn refresh_vested_snapshots(conn: &Connection, now: DateTime<Utc>) -> Result<usize> {
    let records = get_vesting_records(conn)?;
    let mut updated = 0;

    for record in &records {
        let vested = record.vested_as_of(now);
        let next = next_vest_date(&record.schedule, now).map(|d| d.to_rfc3339());
        updated += conn.execute(
            "UPDATE token_vesting_schedules SET vested_tokens = ?1, next_vest_date = ?2 WHERE id = ?3",
            params![vested, next, record.id],
        )?;
    }

    tracing::info!(updated, "refreshed vesting snapshots");
    Ok(updated)
}

// ============================================================================
// TRANSACTIONS
// ============================================================================

/// Load transactions from a CSV with headers matching [`Transaction`] fields.
pub fn load_transactions_csv(csv_path: &Path) -> Result<Vec<Transaction>> {
    let mut rdr = csv::Reader::from_path(csv_path)
        .with_context(|| format!("Failed to open CSV file: {:?}", csv_path))?;

    let mut transactions = Vec::new();
    for (line, result) in rdr.deserialize().enumerate() {
        let tx: Transaction =
            result.with_context(|| format!("Failed to deserialize transaction on row {}", line + 1))?;
        transactions.push(tx);
    }

    tracing::debug!(count = transactions.len(), path = ?csv_path, "loaded CSV");
    Ok(transactions)
}

/// Insert transactions, skipping ones already present. Returns rows inserted.
pub fn insert_transactions(conn: &Connection, transactions: &[Transaction]) -> Result<usize> {
    let mut inserted = 0;
    let mut duplicates = 0;

    for tx in transactions {
        let hash = tx.compute_idempotency_hash();
        let changed = conn.execute(
            "INSERT OR IGNORE INTO transactions
                (idempotency_hash, tx_uuid, date, amount, transaction_type, income_source,
                 category, description, merchant, account_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                hash,
                tx.id,
                tx.date,
                tx.amount,
                tx.transaction_type.as_str(),
                tx.income_source.map(|source| source.as_str()),
                tx.category,
                tx.description,
                tx.merchant,
                tx.account_id,
            ],
        )?;

        if changed > 0 {
            inserted += 1;
        } else {
            duplicates += 1;
        }
    }

    tracing::info!(inserted, duplicates, "imported transactions");
    Ok(inserted)
}

/// Transactions dated within `[from, to]`, oldest first.
pub fn get_transactions_between(
    conn: &Connection,
    from: NaiveDate,
    to: NaiveDate,
) -> Result<Vec<Transaction>> {
    let mut stmt = conn.prepare(
        "SELECT tx_uuid, date, amount, transaction_type, income_source, category, description,
                merchant, account_id
         FROM transactions WHERE date >= ?1 AND date <= ?2 ORDER BY date, id",
    )?;

    let rows = stmt
        .query_map(params![from.to_string(), to.to_string()], |row| {
            let id: String = row.get(0)?;
            let date: String = row.get(1)?;
            let amount: f64 = row.get(2)?;
            let transaction_type: String = row.get(3)?;
            let income_source: Option<String> = row.get(4)?;
            let category: String = row.get(5)?;
            let description: String = row.get(6)?;
            let merchant: Option<String> = row.get(7)?;
            let account_id: Option<String> = row.get(8)?;

            let coerced = transaction_type.parse::<TransactionType>().and_then(|transaction_type| {
                Ok(Transaction {
                    id: id.clone(),
                    date,
                    amount: require_amount("amount", amount)?,
                    transaction_type,
                    income_source: income_source
                        .as_deref()
                        .map(str::parse::<IncomeSource>)
                        .transpose()?,
                    category,
                    description,
                    merchant,
                    account_id,
                })
            });
            Ok((id, coerced))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(keep_valid("transactions", rows))
}

pub fn count_transactions(conn: &Connection) -> Result<i64> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM transactions", [], |row| row.get(0))?;
    Ok(count)
}

// ============================================================================
// BILLS
// ============================================================================

fn parse_date(raw: &str) -> Result<NaiveDate, DashboardError> {
    NaiveDate::parse_from_str(raw.get(..10).unwrap_or(raw), "%Y-%m-%d")
        .map_err(|_| DashboardError::InvalidDate(raw.to_string()))
}

pub fn insert_recurring_bill(conn: &Connection, bill: &RecurringBill) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO recurring_bills
            (id, name, amount, frequency, next_due_date, category, is_active)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            bill.id,
            bill.name,
            bill.amount,
            bill.frequency.as_str(),
            bill.next_due_date.to_string(),
            bill.category,
            bill.is_active,
        ],
    )
    .with_context(|| format!("Failed to insert recurring bill {}", bill.name))?;
    Ok(())
}

/// Recurring bills ordered by due date; inactive ones only when asked.
pub fn get_recurring_bills(conn: &Connection, include_inactive: bool) -> Result<Vec<RecurringBill>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, amount, frequency, next_due_date, category, is_active
         FROM recurring_bills WHERE is_active = 1 OR ?1 ORDER BY next_due_date, name",
    )?;

    let rows = stmt
        .query_map(params![include_inactive], |row| {
            let id: String = row.get(0)?;
            let name: String = row.get(1)?;
            let amount: f64 = row.get(2)?;
            let frequency: String = row.get(3)?;
            let next_due_date: String = row.get(4)?;
            let category: String = row.get(5)?;
            let is_active: bool = row.get(6)?;

            let coerced = frequency.parse::<BillFrequency>().and_then(|frequency| {
                Ok(RecurringBill {
                    id: id.clone(),
                    name,
                    amount: require_amount("amount", amount)?,
                    frequency,
                    next_due_date: parse_date(&next_due_date)?,
                    category,
                    is_active,
                })
            });
            Ok((id, coerced))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(keep_valid("recurring_bills", rows))
}

pub fn insert_one_off_bill(conn: &Connection, bill: &OneOffBill) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO one_off_bills (id, name, amount, due_date, is_paid, notes)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            bill.id,
            bill.name,
            bill.amount,
            bill.due_date.to_string(),
            bill.is_paid,
            bill.notes,
        ],
    )
    .with_context(|| format!("Failed to insert bill {}", bill.name))?;
    Ok(())
}

/// Unpaid one-off bills, soonest first (overdue ones included).
pub fn get_unpaid_bills(conn: &Connection) -> Result<Vec<OneOffBill>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, amount, due_date, is_paid, notes
         FROM one_off_bills WHERE is_paid = 0 ORDER BY due_date, name",
    )?;

    let rows = stmt
        .query_map([], |row| {
            let id: String = row.get(0)?;
            let name: String = row.get(1)?;
            let amount: f64 = row.get(2)?;
            let due_date: String = row.get(3)?;
            let is_paid: bool = row.get(4)?;
            let notes: Option<String> = row.get(5)?;

            let coerced = parse_date(&due_date).and_then(|due_date| {
                Ok(OneOffBill {
                    id: id.clone(),
                    name,
                    amount: require_amount("amount", amount)?,
                    due_date,
                    is_paid,
                    notes,
                })
            });
            Ok((id, coerced))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(keep_valid("one_off_bills", rows))
}

/// Mark a one-off bill paid. Returns false when no unpaid bill has that id.
pub fn mark_bill_paid(conn: &Connection, id: &str) -> Result<bool> {
    let changed = conn
        .execute(
            "UPDATE one_off_bills SET is_paid = 1 WHERE id = ?1 AND is_paid = 0",
            params![id],
        )
        .with_context(|| format!("Failed to mark bill {} paid", id))?;

    if changed > 0 {
        tracing::info!(id, "bill marked paid");
    }
    Ok(changed > 0)
}

// ============================================================================
// INCOME CONFIG
// ============================================================================

pub fn save_income_config(conn: &Connection, config: &IncomeConfig) -> Result<()> {
    conn.execute(
        "INSERT INTO income_config
            (id, salary_gross_annual, salary_frequency, next_salary_date, tax_rate_override)
         VALUES (1, ?1, ?2, ?3, ?4)
         ON CONFLICT(id) DO UPDATE SET
            salary_gross_annual = excluded.salary_gross_annual,
            salary_frequency = excluded.salary_frequency,
            next_salary_date = excluded.next_salary_date,
            tax_rate_override = excluded.tax_rate_override,
            updated_at = CURRENT_TIMESTAMP",
        params![
            config.salary_gross_annual,
            config.salary_frequency.to_string(),
            config.next_salary_date.to_string(),
            config.tax_rate_override,
        ],
    )
    .context("Failed to save income config")?;
    Ok(())
}

/// The saved income config; `None` when unset or unreadable.
pub fn get_income_config(conn: &Connection) -> Result<Option<IncomeConfig>> {
    let raw = conn
        .query_row(
            "SELECT salary_gross_annual, salary_frequency, next_salary_date, tax_rate_override
             FROM income_config WHERE id = 1",
            [],
            |row| {
                let gross: f64 = row.get(0)?;
                let frequency: String = row.get(1)?;
                let next_salary_date: String = row.get(2)?;
                let tax_rate_override: Option<f64> = row.get(3)?;
                Ok((gross, frequency, next_salary_date, tax_rate_override))
            },
        )
        .optional()?;

    let Some((gross, frequency, next_salary_date, tax_rate_override)) = raw else {
        return Ok(None);
    };

    let coerced = frequency.parse::<PayFrequency>().and_then(|salary_frequency| {
        Ok(IncomeConfig {
            salary_gross_annual: require_amount("salary_gross_annual", gross)?,
            salary_frequency,
            next_salary_date: parse_date(&next_salary_date)?,
            tax_rate_override,
        })
    });

    Ok(keep_valid("income_config", vec![("1".to_string(), coerced)]).pop())
}

// ============================================================================
// SNAPSHOTS
// ============================================================================

/// Insert or overwrite the snapshot for its date.
pub fn upsert_snapshot(conn: &Connection, snapshot: &NetWorthSnapshot) -> Result<()> {
    conn.execute(
        "INSERT INTO net_worth_snapshots
            (date, total_assets, liquid_assets, total_liabilities, net_worth, liquid_net_worth)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT(date) DO UPDATE SET
            total_assets = excluded.total_assets,
            liquid_assets = excluded.liquid_assets,
            total_liabilities = excluded.total_liabilities,
            net_worth = excluded.net_worth,
            liquid_net_worth = excluded.liquid_net_worth",
        params![
            snapshot.date.to_string(),
            snapshot.total_assets,
            snapshot.liquid_assets,
            snapshot.total_liabilities,
            snapshot.net_worth,
            snapshot.liquid_net_worth,
        ],
    )
    .context("Failed to write net worth snapshot")?;

    tracing::info!(date = %snapshot.date, net_worth = snapshot.net_worth, "saved snapshot");
    Ok(())
}

/// Most recent `limit` snapshots, returned oldest first.
pub fn get_snapshots(conn: &Connection, limit: usize) -> Result<Vec<NetWorthSnapshot>> {
    let mut stmt = conn.prepare(
        "SELECT date, total_assets, liquid_assets, total_liabilities, net_worth, liquid_net_worth
         FROM net_worth_snapshots ORDER BY date DESC LIMIT ?1",
    )?;

    let rows = stmt
        .query_map(params![limit as i64], |row| {
            let date: String = row.get(0)?;
            let total_assets: f64 = row.get(1)?;
            let liquid_assets: f64 = row.get(2)?;
            let total_liabilities: f64 = row.get(3)?;
            let net_worth: f64 = row.get(4)?;
            let liquid_net_worth: f64 = row.get(5)?;

            let coerced = NaiveDate::parse_from_str(&date, "%Y-%m-%d")
                .map_err(|_| DashboardError::InvalidDate(date.clone()))
                .map(|parsed| NetWorthSnapshot {
                    date: parsed,
                    total_assets,
                    liquid_assets,
                    total_liabilities,
                    net_worth,
                    liquid_net_worth,
                });
            Ok((date, coerced))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut snapshots = keep_valid("net_worth_snapshots", rows);
    snapshots.reverse();
    Ok(snapshots)
}

pub fn get_snapshot(conn: &Connection, date: NaiveDate) -> Result<Option<NetWorthSnapshot>> {
    let snapshot = conn
        .query_row(
            "SELECT total_assets, liquid_assets, total_liabilities, net_worth, liquid_net_worth
             FROM net_worth_snapshots WHERE date = ?1",
            params![date.to_string()],
            |row| {
                Ok(NetWorthSnapshot {
                    date,
                    total_assets: row.get(0)?,
                    liquid_assets: row.get(1)?,
                    total_liabilities: row.get(2)?,
                    net_worth: row.get(3)?,
                    liquid_net_worth: row.get(4)?,
                })
            },
        )
        .optional()?;
    Ok(snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::io::Write;

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        conn
    }

    #[test]
    fn test_asset_round_trip() {
        let conn = test_conn();

        let mut btc = Asset::new("Bitcoin", AssetType::Crypto, 95_000.0);
        btc.quantity = Some(0.5);
        btc.symbol = Some("BTC".to_string());
        btc.is_liquid = true;
        insert_asset(&conn, &btc).unwrap();
        insert_asset(&conn, &Asset::new("House", AssetType::Property, 850_000.0)).unwrap();

        let assets = get_assets(&conn).unwrap();
        assert_eq!(assets.len(), 2);
        // ordered by stored value, descending
        assert_eq!(assets[0].name, "House");
        assert_eq!(assets[1], btc);
        assert_eq!(assets[1].total_value(), 47_500.0);
    }

    #[test]
    fn test_invalid_rows_are_skipped() {
        let conn = test_conn();
        insert_asset(&conn, &Asset::new("Cash", AssetType::Cash, 1_000.0)).unwrap();
        conn.execute(
            "INSERT INTO assets (id, name, asset_type, value, is_liquid)
             VALUES ('bad-type', 'Mystery', 'collectible', 10.0, 0),
                    ('bad-value', 'Broken', 'cash', -5.0, 1)",
            [],
        )
        .unwrap();

        let assets = get_assets(&conn).unwrap();
        assert_eq!(assets.len(), 1);
        assert_eq!(assets[0].name, "Cash");

        println!("✅ Invalid rows skipped: 2");
    }

    #[test]
    fn test_liabilities() {
        let conn = test_conn();
        let mut mortgage = Liability::new("Home loan", LiabilityType::Mortgage, 600_000.0);
        mortgage.interest_rate = Some(6.1);
        insert_liability(&conn, &mortgage).unwrap();
        insert_liability(&conn, &Liability::new("Amex", LiabilityType::CreditCard, 1_200.0)).unwrap();

        let liabilities = get_liabilities(&conn).unwrap();
        assert_eq!(liabilities.len(), 2);
        assert_eq!(liabilities[0].liability_type, LiabilityType::CreditCard);
        assert_eq!(liabilities[1], mortgage);
    }

    #[test]
    fn test_vesting_snapshot_is_recomputed_not_trusted() {
        let conn = test_conn();

        let schedule = VestingSchedule::new("2025-01-16", VestingFrequency::Month, 100.0, 1_200.0);
        let mut record = VestingRecord::new("PRJ", "Project Token", schedule);
        // Stale cached figure from some earlier write
        record.vested_tokens_snapshot = 999.0;
        insert_vesting_record(&conn, &record).unwrap();

        let now = Utc.with_ymd_and_hms(2025, 3, 20, 0, 0, 0).unwrap();
        let loaded = get_vesting_records(&conn).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].vested_tokens_snapshot, 999.0);
        assert_eq!(loaded[0].vested_as_of(now), 300.0);

        assert_eq!(refresh_vested_snapshots(&conn, now).unwrap(), 1);
        let refreshed = get_vesting_records(&conn).unwrap();
        assert_eq!(refreshed[0].vested_tokens_snapshot, 300.0);

        let next: Option<String> = conn
            .query_row("SELECT next_vest_date FROM token_vesting_schedules", [], |row| row.get(0))
            .unwrap();
        assert_eq!(next.as_deref(), Some("2025-04-16T00:00:00+00:00"));
    }

    #[test]
    fn test_vesting_row_with_unknown_frequency_kept() {
        let conn = test_conn();
        conn.execute(
            "INSERT INTO token_vesting_schedules
                (id, token_symbol, token_name, total_tokens, vest_frequency, vest_amount, vest_start_date)
             VALUES ('a', 'ODD', 'Odd Token', 100, 'fortnight', 10, '2024-01-01 00:00:00+00'),
                    ('b', 'NEG', 'Negative', -100, 'day', 10, '2024-01-01')",
            [],
        )
        .unwrap();

        let records = get_vesting_records(&conn).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].schedule.frequency, VestingFrequency::Unknown);
        assert_eq!(records[0].vested_as_of(Utc::now()), 0.0);
    }

    #[test]
    fn test_transaction_import_is_idempotent() {
        let conn = test_conn();

        let mut salary = Transaction::new("2025-03-14", 4_100.0, TransactionType::Income, "Salary");
        salary.description = "PAYROLL".to_string();
        let rent = Transaction::new("2025-03-01", 2_300.0, TransactionType::Expense, "Rent");
        let txs = vec![salary, rent];

        assert_eq!(insert_transactions(&conn, &txs).unwrap(), 2);
        assert_eq!(insert_transactions(&conn, &txs).unwrap(), 0);
        assert_eq!(count_transactions(&conn).unwrap(), 2);

        let march = get_transactions_between(
            &conn,
            NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
            NaiveDate::from_ymd_opt(2025, 3, 31).unwrap(),
        )
        .unwrap();
        assert_eq!(march.len(), 2);
        assert_eq!(march[0].category, "Rent");
        assert_eq!(march[1].transaction_type, TransactionType::Income);

        let april = get_transactions_between(
            &conn,
            NaiveDate::from_ymd_opt(2025, 4, 1).unwrap(),
            NaiveDate::from_ymd_opt(2025, 4, 30).unwrap(),
        )
        .unwrap();
        assert!(april.is_empty());

        println!("✅ Idempotent import test passed");
    }

    #[test]
    fn test_load_transactions_csv() {
        let path = std::env::temp_dir().join(format!("transactions_{}.csv", uuid::Uuid::new_v4()));
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "date,amount,transaction_type,category,description,merchant,account_id").unwrap();
        writeln!(file, "2025-03-02,54.20,expense,Groceries,WOOLWORTHS 1234,Woolworths,acc-1").unwrap();
        writeln!(file, "2025-03-14,4100,income,Salary,PAYROLL,,acc-1").unwrap();
        drop(file);

        let txs = load_transactions_csv(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(txs.len(), 2);
        assert_eq!(txs[0].merchant.as_deref(), Some("Woolworths"));
        assert_eq!(txs[1].merchant, None);
        assert_eq!(txs[1].transaction_type, TransactionType::Income);
        assert!(!txs[0].id.is_empty());
    }

    #[test]
    fn test_snapshot_upsert_by_date() {
        let conn = test_conn();
        let date = NaiveDate::from_ymd_opt(2025, 3, 20).unwrap();

        let mut snapshot = NetWorthSnapshot {
            date,
            total_assets: 100_000.0,
            liquid_assets: 40_000.0,
            total_liabilities: 10_000.0,
            net_worth: 90_000.0,
            liquid_net_worth: 30_000.0,
        };
        upsert_snapshot(&conn, &snapshot).unwrap();

        snapshot.net_worth = 95_000.0;
        upsert_snapshot(&conn, &snapshot).unwrap();

        let earlier = NetWorthSnapshot {
            date: NaiveDate::from_ymd_opt(2025, 2, 20).unwrap(),
            ..snapshot.clone()
        };
        upsert_snapshot(&conn, &earlier).unwrap();

        let all = get_snapshots(&conn, 365).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].date, earlier.date);
        assert_eq!(all[1].net_worth, 95_000.0);

        assert_eq!(get_snapshot(&conn, date).unwrap(), Some(snapshot));
        assert_eq!(get_snapshots(&conn, 1).unwrap().len(), 1);
    }

    #[test]
    fn test_income_source_round_trip() {
        let conn = test_conn();

        let mut salary = Transaction::new("2025-03-14", 4_100.0, TransactionType::Income, "Salary");
        salary.income_source = Some(IncomeSource::Salary);
        let mut vest = Transaction::new("2025-03-16", 800.0, TransactionType::Income, "Tokens");
        vest.income_source = Some(IncomeSource::TokenVest);
        let untagged = Transaction::new("2025-03-20", 60.0, TransactionType::Income, "Refund");
        insert_transactions(&conn, &[salary, vest, untagged]).unwrap();

        conn.execute(
            "INSERT INTO transactions
                (idempotency_hash, tx_uuid, date, amount, transaction_type, income_source,
                 category, description)
             VALUES ('h-bad', 'bad-source', '2025-03-21', 10, 'income', 'lottery', 'Luck', '')",
            [],
        )
        .unwrap();

        let march = get_transactions_between(
            &conn,
            NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
            NaiveDate::from_ymd_opt(2025, 3, 31).unwrap(),
        )
        .unwrap();
        let sources: Vec<Option<IncomeSource>> = march.iter().map(|tx| tx.income_source).collect();
        assert_eq!(
            sources,
            vec![Some(IncomeSource::Salary), Some(IncomeSource::TokenVest), None]
        );
    }

    #[test]
    fn test_csv_income_source_column() {
        let path = std::env::temp_dir().join(format!("income_{}.csv", uuid::Uuid::new_v4()));
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "date,amount,transaction_type,income_source,category,description").unwrap();
        writeln!(file, "2025-03-21,120,income,dividend,Dividends,VAS DIST").unwrap();
        writeln!(file, "2025-03-22,40,expense,,Food,CAFE").unwrap();
        drop(file);

        let txs = load_transactions_csv(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(txs[0].income_source, Some(IncomeSource::Dividend));
        assert_eq!(txs[1].income_source, None);
    }

    #[test]
    fn test_bills_and_mark_paid() {
        let conn = test_conn();
        let due = NaiveDate::from_ymd_opt(2025, 4, 1).unwrap();

        let rent = RecurringBill::new("Rent", 2_000.0, BillFrequency::Monthly, due);
        let mut old_gym = RecurringBill::new("Old gym", 15.0, BillFrequency::Weekly, due);
        old_gym.is_active = false;
        insert_recurring_bill(&conn, &rent).unwrap();
        insert_recurring_bill(&conn, &old_gym).unwrap();

        assert_eq!(get_recurring_bills(&conn, false).unwrap(), vec![rent]);
        assert_eq!(get_recurring_bills(&conn, true).unwrap().len(), 2);

        let mut rego = OneOffBill::new("Rego", 800.0, due);
        rego.notes = Some("Hatchback".to_string());
        let fine = OneOffBill::new("Parking fine", 120.0, NaiveDate::from_ymd_opt(2025, 3, 10).unwrap());
        insert_one_off_bill(&conn, &rego).unwrap();
        insert_one_off_bill(&conn, &fine).unwrap();

        let unpaid = get_unpaid_bills(&conn).unwrap();
        assert_eq!(unpaid.len(), 2);
        assert_eq!(unpaid[0].name, "Parking fine");
        assert_eq!(unpaid[1], rego);

        assert!(mark_bill_paid(&conn, &fine.id).unwrap());
        assert!(!mark_bill_paid(&conn, &fine.id).unwrap());
        assert!(!mark_bill_paid(&conn, "no-such-bill").unwrap());
        assert_eq!(get_unpaid_bills(&conn).unwrap(), vec![rego]);

        println!("✅ Bills test passed");
    }

    #[test]
    fn test_income_config_is_single_row() {
        let conn = test_conn();
        assert_eq!(get_income_config(&conn).unwrap(), None);

        let mut config = IncomeConfig::new(
            120_000.0,
            PayFrequency::Fortnightly,
            NaiveDate::from_ymd_opt(2025, 3, 28).unwrap(),
        );
        save_income_config(&conn, &config).unwrap();

        config.salary_gross_annual = 130_000.0;
        config.tax_rate_override = Some(0.32);
        save_income_config(&conn, &config).unwrap();

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM income_config", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
        assert_eq!(get_income_config(&conn).unwrap(), Some(config));

        conn.execute("UPDATE income_config SET salary_frequency = 'daily'", []).unwrap();
        assert_eq!(get_income_config(&conn).unwrap(), None);
    }
}
