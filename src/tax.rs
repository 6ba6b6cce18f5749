// 🧾 Tax Engine - Australian resident personal income tax
//
// total_tax = max(0, bracket_tax - LITO) + medicare_levy
//
// Also answers the two questions the dashboard asks of it:
//   - what gross salary produces this take-home pay (net_to_gross)
//   - how much extra tax does selling this asset cost (estimate_cgt)

use crate::error::DashboardError;
use anyhow::{Context as AnyhowContext, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

/// Binary search step budget for `net_to_gross`.
const NET_TO_GROSS_ITERATIONS: usize = 50;

/// Stop searching once the computed net is this close to the target.
const NET_TO_GROSS_TOLERANCE: f64 = 0.01;

// ============================================================================
// TAX TABLE (configuration)
// ============================================================================

/// One marginal bracket. Applies to income above `floor`; `base` is the tax
/// already owed on everything up to `floor`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxBracket {
    pub floor: f64,
    /// None = no upper limit
    pub ceiling: Option<f64>,
    pub rate: f64,
    pub base: f64,
}

impl TaxBracket {
    fn tax_for(&self, gross: f64) -> f64 {
        let top = match self.ceiling {
            Some(ceiling) => gross.min(ceiling),
            None => gross,
        };
        self.base + (top - self.floor) * self.rate
    }
}

/// Everything the engine needs to know about a tax year.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxTable {
    /// Financial year label, e.g. "2024-25"
    pub year: String,

    /// Ascending by floor
    pub brackets: Vec<TaxBracket>,

    pub medicare_levy_rate: f64,
    pub medicare_levy_threshold: f64,

    pub lito_max: f64,
    pub lito_phase_out_start: f64,
    pub lito_phase_out_end: f64,

    /// Fraction of a gain that is taxed when the discount applies (0.5)
    pub cgt_discount_factor: f64,
    /// Holding period that must be exceeded for the discount
    pub cgt_discount_min_days: u32,
}

impl Default for TaxTable {
    /// ATO 2024-25 resident rates.
    fn default() -> Self {
        TaxTable {
            year: "2024-25".to_string(),
            brackets: vec![
                TaxBracket { floor: 0.0, ceiling: Some(18_200.0), rate: 0.0, base: 0.0 },
                TaxBracket { floor: 18_200.0, ceiling: Some(45_000.0), rate: 0.19, base: 0.0 },
                TaxBracket { floor: 45_000.0, ceiling: Some(120_000.0), rate: 0.325, base: 5_092.0 },
                TaxBracket { floor: 120_000.0, ceiling: Some(180_000.0), rate: 0.37, base: 29_467.0 },
                TaxBracket { floor: 180_000.0, ceiling: None, rate: 0.45, base: 51_667.0 },
            ],
            medicare_levy_rate: 0.02,
            medicare_levy_threshold: 26_000.0,
            lito_max: 700.0,
            lito_phase_out_start: 37_500.0,
            lito_phase_out_end: 66_667.0,
            cgt_discount_factor: 0.5,
            cgt_discount_min_days: 365,
        }
    }
}

// ============================================================================
// PAY FREQUENCY
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayFrequency {
    Weekly,
    Fortnightly,
    Monthly,
    Annually,
}

impl PayFrequency {
    pub fn periods_per_year(&self) -> f64 {
        match self {
            PayFrequency::Weekly => 52.0,
            PayFrequency::Fortnightly => 26.0,
            PayFrequency::Monthly => 12.0,
            PayFrequency::Annually => 1.0,
        }
    }
}

impl FromStr for PayFrequency {
    type Err = DashboardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "weekly" => Ok(PayFrequency::Weekly),
            "fortnightly" => Ok(PayFrequency::Fortnightly),
            "monthly" => Ok(PayFrequency::Monthly),
            "annually" | "yearly" => Ok(PayFrequency::Annually),
            other => Err(DashboardError::UnknownPayFrequency(other.to_string())),
        }
    }
}

impl fmt::Display for PayFrequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PayFrequency::Weekly => "weekly",
            PayFrequency::Fortnightly => "fortnightly",
            PayFrequency::Monthly => "monthly",
            PayFrequency::Annually => "annually",
        };
        f.write_str(s)
    }
}

// ============================================================================
// RESULT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncomeTaxResult {
    pub gross_annual: f64,
    /// Bracket tax before offsets and levy
    pub base_tax: f64,
    pub medicare_levy: f64,
    pub low_income_offset: f64,
    pub total_tax: f64,
    pub effective_rate: f64,
    pub net_annual: f64,
}

impl IncomeTaxResult {
    pub fn summary(&self) -> String {
        format!(
            "Gross ${:.2}: tax ${:.2} + medicare ${:.2} - LITO ${:.2} = ${:.2} ({:.1}%), net ${:.2}",
            self.gross_annual,
            self.base_tax,
            self.medicare_levy,
            self.low_income_offset,
            self.total_tax,
            self.effective_rate * 100.0,
            self.net_annual
        )
    }
}

// ============================================================================
// TAX ENGINE
// ============================================================================

pub struct TaxEngine {
    table: TaxTable,
}

impl TaxEngine {
    /// Engine with the built-in 2024-25 table
    pub fn new() -> Self {
        TaxEngine { table: TaxTable::default() }
    }

    pub fn with_table(mut table: TaxTable) -> Self {
        table.brackets.sort_by(|a, b| a.floor.total_cmp(&b.floor));
        TaxEngine { table }
    }

    /// Load a tax table from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read tax table: {:?}", path.as_ref()))?;

        let table: TaxTable =
            serde_json::from_str(&content).context("Failed to parse tax table JSON")?;

        tracing::info!(year = %table.year, brackets = table.brackets.len(), "loaded tax table");
        Ok(TaxEngine::with_table(table))
    }

    pub fn table(&self) -> &TaxTable {
        &self.table
    }

    /// Tax owed on an annual gross income.
    ///
    /// Negative or NaN income is out of contract and is treated as 0.
    pub fn calculate_income_tax(&self, gross_annual: f64) -> IncomeTaxResult {
        let gross = sanitize_income(gross_annual);
        let t = &self.table;

        // Each bracket's base already covers every bracket below it, so only
        // the highest bracket the income reaches matters.
        let base_tax = t
            .brackets
            .iter()
            .rev()
            .find(|b| gross > b.floor)
            .map(|b| b.tax_for(gross))
            .unwrap_or(0.0);

        let medicare_levy = if gross > t.medicare_levy_threshold {
            gross * t.medicare_levy_rate
        } else {
            0.0
        };

        let low_income_offset = self.low_income_offset(gross);

        let total_tax = (base_tax - low_income_offset).max(0.0) + medicare_levy;
        let effective_rate = if gross > 0.0 { total_tax / gross } else { 0.0 };

        IncomeTaxResult {
            gross_annual: gross,
            base_tax,
            medicare_levy,
            low_income_offset,
            total_tax,
            effective_rate,
            net_annual: gross - total_tax,
        }
    }

    /// Low Income Tax Offset: flat up to the phase-out start, then linear to 0.
    fn low_income_offset(&self, gross: f64) -> f64 {
        let t = &self.table;
        if gross <= t.lito_phase_out_start {
            t.lito_max
        } else if gross <= t.lito_phase_out_end {
            let taper = t.lito_max / (t.lito_phase_out_end - t.lito_phase_out_start);
            t.lito_max - (gross - t.lito_phase_out_start) * taper
        } else {
            0.0
        }
    }

    /// Take-home pay per pay period.
    pub fn gross_to_net(&self, gross_annual: f64, frequency: PayFrequency) -> f64 {
        self.calculate_income_tax(gross_annual).net_annual / frequency.periods_per_year()
    }

    /// Gross annual income that yields `net_annual` after tax.
    ///
    /// Binary search over [net, 2 * net]; bounded, so it always returns a
    /// best estimate even without exact convergence.
    pub fn net_to_gross(&self, net_annual: f64) -> f64 {
        let target = sanitize_income(net_annual);
        let mut low = target;
        let mut high = target * 2.0;

        for _ in 0..NET_TO_GROSS_ITERATIONS {
            let mid = (low + high) / 2.0;
            let calculated = self.calculate_income_tax(mid).net_annual;
            if (calculated - target).abs() < NET_TO_GROSS_TOLERANCE {
                return mid;
            }
            if calculated < target {
                low = mid;
            } else {
                high = mid;
            }
        }

        (low + high) / 2.0
    }

    /// Incremental tax caused by realising a capital gain on top of
    /// `other_income`. Losses and non-finite gains yield 0; losses are not
    /// offset or carried forward.
    pub fn estimate_cgt(
        &self,
        cost_basis: f64,
        sale_price: f64,
        holding_period_days: u32,
        other_income: f64,
    ) -> f64 {
        let gain = sale_price - cost_basis;
        if !gain.is_finite() {
            tracing::warn!(cost_basis, sale_price, "non-finite capital gain, treating as 0");
            return 0.0;
        }
        if gain <= 0.0 {
            return 0.0;
        }

        let taxable_gain = if holding_period_days > self.table.cgt_discount_min_days {
            gain * self.table.cgt_discount_factor
        } else {
            gain
        };

        let with_gain = self.calculate_income_tax(other_income + taxable_gain).total_tax;
        let without = self.calculate_income_tax(other_income).total_tax;
        (with_gain - without).max(0.0)
    }

    /// Scale after-tax income back up to a gross estimate using the
    /// effective rate at `reference_gross`.
    pub fn gross_up(&self, after_tax: f64, reference_gross: f64) -> f64 {
        let rate = self.calculate_income_tax(reference_gross).effective_rate;
        if rate < 1.0 {
            after_tax / (1.0 - rate)
        } else {
            after_tax
        }
    }
}

impl Default for TaxEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn sanitize_income(value: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        if value != 0.0 {
            tracing::warn!(value, "income outside contract, treating as 0");
        }
        0.0
    }
}

// ============================================================================
// TESTS
// ============================================================================
