use anyhow::{bail, Context, Result};
use chrono::Utc;
use rusqlite::Connection;
use std::env;
use std::fs;
use std::io::Read;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mica_minca::{
    categories, deposit_feedback, get_events_for_session, parse_receipt, setup_database,
    Categorizer, Config, Dashboard, DepositEvent, EngineError, EngineState, ReceiptDraft,
    Session, StatRuleTable,
};

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mica_minca=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args: Vec<String> = env::args().collect();
    let config = Config::from_env()?;

    match args.get(1).map(String::as_str) {
        None | Some("status") => run_status(&config)?,
        Some("receipt") => {
            let source = args.get(2).map(String::as_str).unwrap_or("-");
            run_receipt(&config, source)?;
        }
        Some("deposit") => {
            let raw = args
                .get(2)
                .context("Usage: mica-minca deposit <amount>")?;
            let amount: f64 = raw
                .replace(',', ".")
                .parse()
                .with_context(|| format!("Not an amount: {}", raw))?;
            run_deposit(&config, amount)?;
        }
        Some("history") => run_history(&config)?,
        Some("categories") => run_categories(),
        Some(other) => {
            print_usage();
            bail!("Unknown command: {}", other);
        }
    }

    Ok(())
}

fn print_usage() {
    eprintln!("Usage: mica-minca <command>");
    eprintln!("   status              show allowance, vitality and pet");
    eprintln!("   receipt <file|->    submit a receipt (JSON, CSV or lines)");
    eprintln!("   deposit <amount>    move money into the piggy bank");
    eprintln!("   history             list accepted receipts and deposits");
    eprintln!("   categories          list known categories");
}

fn open_db(config: &Config) -> Result<Connection> {
    let conn = Connection::open(&config.db_path)
        .with_context(|| format!("Failed to open {}", config.db_path.display()))?;
    setup_database(&conn)?;
    Ok(conn)
}

fn print_dashboard(state: &EngineState) {
    let dashboard = Dashboard::from_state(state);

    println!("💰 Allowance");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("   Total:      {:>8.2} €", dashboard.total);
    println!("   Spent:      {:>8.2} €", dashboard.spent);
    println!("   Piggy bank: {:>8.2} €", dashboard.piggy_bank);
    println!("   Remaining:  {:>8.2} € ({:.0}%)", dashboard.remaining, dashboard.pet.remaining_percent);

    println!("\n❤️  Vitality");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("   Health:     {:>3}", dashboard.health);
    println!("   Happiness:  {:>3}", dashboard.happiness);
    println!("   Mood:       {} ({})", dashboard.pet.mood.as_str(), dashboard.sprite);
    if dashboard.pet.low_funds_warning {
        println!("   ⚠️  Low on money!");
    }

    println!("\n🐷 Savings");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("   {}", dashboard.savings.message);
    if dashboard.savings.super_saver {
        println!("   🏆 Super saver! {:.0}% of the allowance saved", dashboard.savings.savings_percent);
    }
}

fn run_status(config: &Config) -> Result<()> {
    let mut conn = open_db(config)?;
    let session = Session::new(&mut conn, &config.session, config.allowance_total);
    print_dashboard(&session.snapshot()?);
    Ok(())
}

fn read_source(source: &str) -> Result<String> {
    if source == "-" {
        let mut text = String::new();
        std::io::stdin()
            .read_to_string(&mut text)
            .context("Failed to read receipt from stdin")?;
        Ok(text)
    } else {
        fs::read_to_string(source).with_context(|| format!("Failed to read {}", source))
    }
}

fn run_receipt(config: &Config, source: &str) -> Result<()> {
    let text = read_source(source)?;

    println!("🧾 Parsing receipt...");
    let items = parse_receipt(&text)?;
    let rules = StatRuleTable::new();
    for item in &items {
        let delta = rules.deltas(&item.category);
        println!(
            "   {:<30} {:>7.2} €  [{}] ❤️ {:+} 😊 {:+}",
            item.product, item.price, item.category, delta.health, delta.happiness
        );
    }

    let draft = ReceiptDraft::build(&items, &text, &rules, Utc::now())?;
    println!("✓ {} items, total {:.2} €", draft.items.len(), draft.event.total());

    let mut conn = open_db(config)?;
    let mut session = Session::new(&mut conn, &config.session, config.allowance_total);

    let previous = session.previous_submissions(&draft)?;
    if !previous.is_empty() {
        println!("⚠️  Same receipt text already saved {} time(s); saving again", previous.len());
    }

    match session.submit_receipt(&draft) {
        Ok(state) => {
            println!("✅ Receipt saved\n");
            print_dashboard(&state);
            Ok(())
        }
        Err(err) => {
            if let Some(EngineError::InsufficientFunds { requested, remaining }) =
                err.downcast_ref::<EngineError>()
            {
                bail!(
                    "❌ Not enough money: receipt is {:.2} € but only {:.2} € is left",
                    requested,
                    remaining
                );
            }
            Err(err)
        }
    }
}

fn run_deposit(config: &Config, amount: f64) -> Result<()> {
    let mut conn = open_db(config)?;
    let mut session = Session::new(&mut conn, &config.session, config.allowance_total);

    let state = session.deposit(&DepositEvent::now(amount)?)?;
    println!("{}\n", deposit_feedback(amount));
    print_dashboard(&state);

    Ok(())
}

fn run_history(config: &Config) -> Result<()> {
    let mut conn = open_db(config)?;
    let session = Session::new(&mut conn, &config.session, config.allowance_total);

    let receipts = session.receipts()?;
    println!("🧾 Receipts ({})", receipts.len());
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    for receipt in &receipts {
        println!(
            "   {}  {:>7.2} €  {} (-{} vitality, {} items)",
            receipt.occurred_at.format("%Y-%m-%d %H:%M"),
            receipt.total,
            receipt.category,
            receipt.penalty,
            receipt.items.len()
        );
    }

    let deposits = session.deposits()?;
    println!("\n🐷 Deposits ({})", deposits.len());
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    for deposit in &deposits {
        println!(
            "   {}  {:>7.2} €",
            deposit.occurred_at.format("%Y-%m-%d %H:%M"),
            deposit.amount
        );
    }

    let rejected = get_events_for_session(&conn, &config.session)?
        .into_iter()
        .filter(|e| e.event_type.ends_with("_rejected"))
        .count();
    if rejected > 0 {
        println!("\n⚠️  {} rejected submissions in the audit log", rejected);
    }

    Ok(())
}

fn run_categories() {
    let rules = StatRuleTable::new();
    println!("🏷️  Categories");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    for category in categories() {
        let delta = rules.deltas(category);
        println!("   {:<40} ❤️ {:+3} 😊 {:+3}", category, delta.health, delta.happiness);
    }
}
