use anyhow::{bail, Context, Result};
use chrono::{DateTime, Datelike, Months, NaiveDate, Utc};
use std::env;
use std::path::PathBuf;

use networth_dashboard::{
    cash_flow_by_month, get_assets, get_income_config, get_liabilities, get_recurring_bills,
    get_snapshots, get_transactions_between, get_unpaid_bills, get_vesting_records,
    income_by_month, insert_transactions, load_transactions_csv, logging, mark_bill_paid,
    monthly_commitment, net_worth_change_30d, open_database, refresh_vested_snapshots,
    save_income_config, spending_breakdown, upcoming_bills, upcoming_income_events,
    upsert_snapshot, CashFlow, IncomeConfig, NetWorthSnapshot, NetWorthSummary, PayFrequency,
    TaxEngine, VestingFrequency, VestingSchedule, VestingValuation,
};

const USAGE: &str = "\
usage: networth-dashboard <command>

  tax <gross> [weekly|fortnightly|monthly|annually]
  gross <net>
  cgt <cost_basis> <sale_price> <holding_days> <other_income>
  vest <start_date> <frequency> <amount> <total> [as_of]
  import <transactions.csv>
  snapshot
  summary
  bills
  pay-bill <bill_id>
  income-config <gross_annual> <weekly|fortnightly|monthly> <next_pay_date>
  income

env: NETWORTH_DB (default networth.db), NETWORTH_TAX_TABLE (optional JSON)";

fn main() -> Result<()> {
    logging::init_tracing();
    let args: Vec<String> = env::args().skip(1).collect();

    match args.first().map(String::as_str) {
        Some("tax") => run_tax(&args[1..]),
        Some("gross") => run_gross(&args[1..]),
        Some("cgt") => run_cgt(&args[1..]),
        Some("vest") => run_vest(&args[1..]),
        Some("import") => run_import(&args[1..]),
        Some("snapshot") => run_snapshot(),
        Some("summary") => run_summary(),
        Some("bills") => run_bills(),
        Some("pay-bill") => run_pay_bill(&args[1..]),
        Some("income-config") => run_income_config(&args[1..]),
        Some("income") => run_income(),
        _ => {
            eprintln!("{}", USAGE);
            std::process::exit(2);
        }
    }
}

// ============================================================================
// CONFIG
// ============================================================================

fn db_path() -> PathBuf {
    env::var("NETWORTH_DB")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("networth.db"))
}

fn tax_engine() -> Result<TaxEngine> {
    match env::var("NETWORTH_TAX_TABLE") {
        Ok(path) => TaxEngine::from_file(path),
        Err(_) => Ok(TaxEngine::new()),
    }
}

fn number(args: &[String], index: usize, name: &str) -> Result<f64> {
    let raw = args
        .get(index)
        .with_context(|| format!("missing <{}>\n\n{}", name, USAGE))?;
    raw.parse::<f64>()
        .with_context(|| format!("<{}> must be a number, got {:?}", name, raw))
}

// ============================================================================
// TAX
// ============================================================================

fn run_tax(args: &[String]) -> Result<()> {
    let gross = number(args, 0, "gross")?;
    let frequency = match args.get(1) {
        Some(raw) => raw.parse::<PayFrequency>()?,
        None => PayFrequency::Annually,
    };

    let engine = tax_engine()?;
    let result = engine.calculate_income_tax(gross);

    println!("🧾 Income tax ({})", engine.table().year);
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("Gross:          ${:>12.2}", result.gross_annual);
    println!("Bracket tax:    ${:>12.2}", result.base_tax);
    println!("Medicare levy:  ${:>12.2}", result.medicare_levy);
    println!("LITO:          -${:>12.2}", result.low_income_offset);
    println!("Total tax:      ${:>12.2}", result.total_tax);
    println!("Effective rate:  {:>12.2}%", result.effective_rate * 100.0);
    println!("Net annual:     ${:>12.2}", result.net_annual);
    println!(
        "Net {}: ${:.2}",
        frequency,
        engine.gross_to_net(gross, frequency)
    );
    Ok(())
}

fn run_gross(args: &[String]) -> Result<()> {
    let net = number(args, 0, "net")?;
    let engine = tax_engine()?;
    let gross = engine.net_to_gross(net);

    println!("Net ${:.2} needs gross ${:.2}", net, gross);
    println!("✓ {}", engine.calculate_income_tax(gross).summary());
    Ok(())
}

fn run_cgt(args: &[String]) -> Result<()> {
    let cost_basis = number(args, 0, "cost_basis")?;
    let sale_price = number(args, 1, "sale_price")?;
    let days = holding_days(number(args, 2, "holding_days")?)?;
    let other_income = number(args, 3, "other_income")?;

    let engine = tax_engine()?;
    let tax = engine.estimate_cgt(cost_basis, sale_price, days, other_income);
    let discounted = days > engine.table().cgt_discount_min_days;

    println!(
        "Gain ${:.2} held {} days{}: extra tax ${:.2}",
        sale_price - cost_basis,
        days,
        if discounted { " (50% discount)" } else { "" },
        tax
    );
    Ok(())
}

fn holding_days(days: f64) -> Result<u32> {
    if !days.is_finite() || days < 0.0 {
        bail!("<holding_days> must be a non-negative number of days, got {}", days);
    }
    if days > u32::MAX as f64 {
        bail!("<holding_days> is too large: {}", days);
    }
    Ok(days as u32)
}

// ============================================================================
// VESTING
// ============================================================================

fn run_vest(args: &[String]) -> Result<()> {
    let start = args.first().context("missing <start_date>")?;
    let frequency: VestingFrequency = args.get(1).context("missing <frequency>")?.parse()?;
    let amount = number(args, 2, "amount")?;
    let total = number(args, 3, "total")?;
    let now = match args.get(4) {
        Some(raw) => parse_as_of(raw)?,
        None => Utc::now(),
    };

    let schedule = VestingSchedule::new(start, frequency, amount, total);
    if schedule.start_instant().is_none() {
        bail!("<start_date> must look like YYYY-MM-DD, got {:?}", start);
    }

    let valuation = VestingValuation::compute(&schedule, 0.0, now);
    println!("⏳ Vesting as of {}", now.to_rfc3339());
    println!("Vested:    {:.4} / {:.4} ({:.1}%)", valuation.vested_tokens, total, valuation.pct_vested);
    println!("Remaining: {:.4}", valuation.remaining_tokens);
    match valuation.next_vest_date {
        Some(next) => println!("Next vest: {}", next.format("%Y-%m-%d %H:%M:%S")),
        None => println!("Next vest: none (fully vested)"),
    }
    Ok(())
}

fn parse_date_arg(raw: &str, name: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .with_context(|| format!("<{}> must be YYYY-MM-DD, got {:?}", name, raw))
}

fn parse_as_of(raw: &str) -> Result<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .with_context(|| format!("[as_of] must be RFC 3339 or YYYY-MM-DD, got {:?}", raw))?;
    date.and_hms_opt(0, 0, 0)
        .map(|d| d.and_utc())
        .context("invalid [as_of] time")
}

// ============================================================================
// DATABASE COMMANDS
// ============================================================================

fn run_import(args: &[String]) -> Result<()> {
    let csv_path = PathBuf::from(args.first().context("missing <transactions.csv>")?);

    println!("📂 Loading {:?}...", csv_path);
    let transactions = load_transactions_csv(&csv_path)?;
    println!("✓ Loaded {} transactions", transactions.len());

    let conn = open_database(&db_path())?;
    let inserted = insert_transactions(&conn, &transactions)?;
    println!("✓ Inserted {} new, {} already present", inserted, transactions.len() - inserted);
    Ok(())
}

fn run_snapshot() -> Result<()> {
    let conn = open_database(&db_path())?;
    let now = Utc::now();

    let assets = get_assets(&conn)?;
    let liabilities = get_liabilities(&conn)?;
    let snapshot = NetWorthSnapshot::capture(now.date_naive(), &assets, &liabilities);
    upsert_snapshot(&conn, &snapshot)?;
    let refreshed = refresh_vested_snapshots(&conn, now)?;

    println!("📸 Snapshot {}", snapshot.date);
    println!("Net worth:        ${:.2}", snapshot.net_worth);
    println!("Liquid net worth: ${:.2}", snapshot.liquid_net_worth);
    println!("✓ Refreshed {} vesting schedules", refreshed);
    Ok(())
}

fn run_summary() -> Result<()> {
    let conn = open_database(&db_path())?;
    let now = Utc::now();
    let today = now.date_naive();

    let assets = get_assets(&conn)?;
    let liabilities = get_liabilities(&conn)?;
    let grants = get_vesting_records(&conn)?;
    let summary = NetWorthSummary::compute(&assets, &liabilities, &grants, now);

    let month_start = today.with_day0(0).context("invalid month start")?;
    let month_end = month_start
        .checked_add_months(Months::new(1))
        .and_then(|d| d.pred_opt())
        .context("invalid month end")?;
    let this_month = get_transactions_between(&conn, month_start, month_end)?;
    let flow = CashFlow::from_transactions(&this_month);

    let snapshots = get_snapshots(&conn, 365)?;
    let change = net_worth_change_30d(&snapshots, today);

    println!("📊 Dashboard {}", today);
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("Paper net worth:  ${:>12.2} ({:+.1}% 30d)", summary.paper_net_worth, change.change_pct);
    println!("Liquid net worth: ${:>12.2}", summary.liquid_net_worth);
    println!("Liabilities:      ${:>12.2}", summary.total_liabilities);
    println!("Income (month):   ${:>12.2}", flow.income);
    println!("Expenses (month): ${:>12.2}", flow.expenses);
    println!("Savings rate:      {:>12.1}%", flow.savings_rate);
    println!("Cash runway:       {:>12.1} months", flow.cash_runway(summary.liquid_assets));

    let breakdown = spending_breakdown(&this_month);
    if !breakdown.is_empty() {
        println!("\nSpending by category:");
        for category in breakdown.iter().take(8) {
            println!(
                "  {:<20} ${:>10.2} ({:>4.1}%, {} txns)",
                category.category, category.amount, category.percentage, category.count
            );
        }
    }

    let recurring = get_recurring_bills(&conn, false)?;
    let one_off = get_unpaid_bills(&conn)?;
    println!("Bills (monthly):  ${:>12.2}", monthly_commitment(&recurring));

    let engine = tax_engine()?;
    let config = get_income_config(&conn)?;
    println!("\nUpcoming income:");
    for event in upcoming_income_events(config.as_ref(), &engine, today) {
        println!("  {}  {:<12} ${:>10.2}  {}", event.date, event.label, event.amount, event.description);
    }

    let due = upcoming_bills(&recurring, &one_off, today);
    if !due.is_empty() {
        println!("\nUpcoming bills:");
        for bill in &due {
            println!("  {}  {:<20} ${:>10.2}  in {}d", bill.due_date, bill.name, bill.amount, bill.days_until);
        }
    }

    let six_months_ago = month_start
        .checked_sub_months(Months::new(5))
        .context("invalid history start")?;
    let history = get_transactions_between(&conn, six_months_ago, month_end)?;
    println!("\nLast 6 months:");
    for (month, flow) in cash_flow_by_month(&history) {
        println!("  {}  in ${:>10.2}  out ${:>10.2}  net ${:>10.2}", month, flow.income, flow.expenses, flow.net);
    }

    Ok(())
}

// ============================================================================
// BILLS & INCOME
// ============================================================================

fn run_bills() -> Result<()> {
    let conn = open_database(&db_path())?;
    let today = Utc::now().date_naive();

    let recurring = get_recurring_bills(&conn, false)?;
    let one_off = get_unpaid_bills(&conn)?;

    println!("🧾 Bills: ~${:.2}/month recurring", monthly_commitment(&recurring));
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    for bill in &one_off {
        let days = (bill.due_date - today).num_days();
        let when = match days {
            0 => "due today".to_string(),
            d if d < 0 => format!("overdue {}d", -d),
            d => format!("in {}d", d),
        };
        println!("  [{}] {:<20} ${:>10.2}  {} ({})", bill.id, bill.name, bill.amount, bill.due_date, when);
    }
    for bill in &recurring {
        println!(
            "  {:<20} {:<12} ${:>10.2}  (${:.2}/month)  next {}",
            bill.name,
            bill.frequency.as_str(),
            bill.amount,
            bill.monthly_equivalent(),
            bill.next_due_date
        );
    }
    Ok(())
}

fn run_pay_bill(args: &[String]) -> Result<()> {
    let id = args.first().context("missing <bill_id>")?;
    let conn = open_database(&db_path())?;
    if !mark_bill_paid(&conn, id)? {
        bail!("no unpaid bill with id {}", id);
    }
    println!("✓ Bill {} marked paid", id);
    Ok(())
}

fn run_income_config(args: &[String]) -> Result<()> {
    let gross = number(args, 0, "gross_annual")?;
    let frequency: PayFrequency = args.get(1).context("missing <frequency>")?.parse()?;
    let next_pay = parse_date_arg(args.get(2).context("missing <next_pay_date>")?, "next_pay_date")?;
    if !gross.is_finite() || gross < 0.0 {
        bail!("<gross_annual> must be a non-negative number");
    }

    let conn = open_database(&db_path())?;
    let config = IncomeConfig::new(gross, frequency, next_pay);
    save_income_config(&conn, &config)?;

    let engine = tax_engine()?;
    println!("✓ Saved: ${:.2} gross, ${:.2} per {} pay", gross, config.net_per_pay(&engine), frequency);
    Ok(())
}

fn run_income() -> Result<()> {
    let conn = open_database(&db_path())?;
    let engine = tax_engine()?;
    let today = Utc::now().date_naive();

    let config = get_income_config(&conn)?;
    match &config {
        Some(config) => {
            println!("💵 Salary ${:.2} gross", config.salary_gross_annual);
            println!("Net annual:      ${:>12.2}", config.net_annual(&engine));
            println!("Net per pay:     ${:>12.2} ({})", config.net_per_pay(&engine), config.salary_frequency);
            println!("Effective rate:   {:>12.2}%", config.effective_rate(&engine) * 100.0);
        }
        None => println!("💵 No salary configured (see income-config)"),
    }

    println!("\nUpcoming:");
    for event in upcoming_income_events(config.as_ref(), &engine, today) {
        println!("  {}  {:<12} ${:>10.2}  {}", event.date, event.label, event.amount, event.description);
    }

    let month_start = today.with_day0(0).context("invalid month start")?;
    let from = month_start
        .checked_sub_months(Months::new(5))
        .context("invalid history start")?;
    let history = get_transactions_between(&conn, from, today)?;

    println!("\nBy source (last 6 months):");
    for (month, breakdown) in income_by_month(&history) {
        let gross = match &config {
            Some(config) => config.gross_up(&engine, breakdown.total),
            None => breakdown.total,
        };
        println!(
            "  {}  salary ${:>9.2}  dividend ${:>8.2}  vest ${:>9.2}  other ${:>8.2}  (~${:.2} pre-tax)",
            month, breakdown.salary, breakdown.dividend, breakdown.token_vest, breakdown.other, gross
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_holding_days_rejects_bad_input() {
        assert_eq!(holding_days(400.0).unwrap(), 400);
        assert_eq!(holding_days(0.0).unwrap(), 0);
        assert!(holding_days(-1.0).is_err());
        assert!(holding_days(f64::NAN).is_err());
        assert!(holding_days(f64::INFINITY).is_err());
        assert!(holding_days(1e12).is_err());
    }

    #[test]
    fn test_number_parses_nan_but_holding_days_refuses_it() {
        let args = vec!["0".to_string(), "100".to_string(), "nan".to_string()];
        let days = number(&args, 2, "holding_days").unwrap();
        assert!(days.is_nan());
        assert!(holding_days(days).is_err());
    }
}
