use chrono::{Datelike, NaiveDate};
use clap::{Parser, Subcommand, ValueEnum};
use log::{debug, info, warn};
use simple_logger::SimpleLogger;
use std::path::PathBuf;

use loanbook::{
    actions,
    calendar::{due_day, month_markers},
    config::Config,
    error::Result,
    loan::{parse_date, PaymentKind},
    status::classify_slots,
    store::{LoanStore, MemoryStore},
    summary::{list_loans, summarize, StatusFilter},
};

#[derive(Copy, Clone, Debug, ValueEnum)]
enum Filter {
    All,
    Active,
    Completed,
    Defaulted,
}

impl From<Filter> for StatusFilter {
    fn from(filter: Filter) -> Self {
        match filter {
            Filter::All => StatusFilter::All,
            Filter::Active => StatusFilter::Active,
            Filter::Completed => StatusFilter::Completed,
            Filter::Defaulted => StatusFilter::Defaulted,
        }
    }
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum Kind {
    Full,
    InterestOnly,
}

impl From<Kind> for PaymentKind {
    fn from(kind: Kind) -> Self {
        match kind {
            Kind::Full => PaymentKind::Full,
            Kind::InterestOnly => PaymentKind::InterestOnly,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "loanbook", version, about = "Track loans, due dates and receipts")]
struct Cli {
    /// YAML configuration file
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// JSON snapshot of the book (overrides the configuration)
    #[arg(short = 's', long = "snapshot")]
    snapshot: Option<PathBuf>,

    /// Date to treat as today
    #[arg(long = "as-of", value_parser = parse_date)]
    as_of: Option<NaiveDate>,

    /// More log output, repeatable
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List loans with their derived status
    List {
        #[arg(long, value_enum, default_value = "all")]
        status: Filter,
        /// Part of the client's name
        #[arg(long, default_value = "")]
        search: String,
    },
    /// Summary and schedule of one loan
    Show { loan: String },
    /// Everything due on a day (default today)
    Due {
        #[arg(value_parser = parse_date)]
        date: Option<NaiveDate>,
    },
    /// Day markers of a month (default this month)
    Month {
        #[arg(long)]
        year: Option<i32>,
        #[arg(long)]
        month: Option<u32>,
    },
    /// Mark every loan with an overdue installment as defaulted
    Sweep,
    /// Record an installment receipt
    Receipt {
        loan: String,
        amount: f64,
        #[arg(long, value_parser = parse_date)]
        date: Option<NaiveDate>,
    },
    /// Record a lump-sum payment
    Pay {
        loan: String,
        amount: f64,
        #[arg(long, value_enum, default_value = "full")]
        kind: Kind,
        #[arg(long, value_parser = parse_date)]
        date: Option<NaiveDate>,
    },
    /// Settle a loan for its outstanding balance
    Settle { loan: String },
    /// Move the next unpaid installment to a new date
    SetDueDate {
        loan: String,
        #[arg(value_parser = parse_date)]
        date: NaiveDate,
    },
    /// Delete a receipt and re-sync its loan's status
    DeleteReceipt { receipt: String },
    /// Delete a loan with its receipts and payments
    DeleteLoan { loan: String },
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut cfg = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    if let Some(snapshot) = &cli.snapshot {
        cfg.snapshot = snapshot.clone();
    }
    if cli.as_of.is_some() {
        cfg.as_of = cli.as_of;
    }
    Ok(cfg)
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let cfg = load_config(&cli)?;

    SimpleLogger::new()
        .with_level(cfg.level_filter(cli.verbose))
        .init()
        .expect("logger is initialised once");
    debug!("{:?}", cfg);

    let today = cfg.today();
    let mut store = MemoryStore::open(&cfg.snapshot)?;

    let changed = match cli.command {
        Command::List { status, search } => {
            let summaries = list_loans(
                &store.loans()?,
                &store.clients()?,
                &store.receipts()?,
                &store.payments()?,
                today,
                status.into(),
                &search,
            );
            for summary in &summaries {
                println!("{}", summary);
            }
            info!("{} loan(s)", summaries.len());
            false
        }
        Command::Show { loan } => {
            let loan = store.loan(&loan)?;
            let (receipts, payments) = (store.receipts()?, store.payments()?);
            let summary = summarize(&loan, &store.clients()?, &receipts, &payments, today);
            println!("{}", loan);
            println!("{}", summary);
            for slot in classify_slots(&loan, &receipts, &payments, today) {
                println!("  {}", slot);
            }
            for warning in &summary.warnings {
                println!("warning: {}", warning);
            }
            false
        }
        Command::Due { date } => {
            let day = due_day(
                date.unwrap_or(today),
                &store.loans()?,
                &store.clients()?,
                &store.receipts()?,
                &store.payments()?,
                today,
            );
            for entry in &day.entries {
                println!("{}", entry);
            }
            println!("{}: {} due", day.date, cfg.money(day.total()));
            false
        }
        Command::Month { year, month } => {
            let markers = month_markers(
                year.unwrap_or(today.year()),
                month.unwrap_or(today.month()),
                &store.loans()?,
                &store.receipts()?,
                &store.payments()?,
                today,
            );
            for (date, marker) in markers {
                println!("{} {:?}", date, marker);
            }
            false
        }
        Command::Sweep => {
            let report = actions::sweep_overdue(&mut store, today)?;
            println!("{}", report);
            for (loan_id, e) in &report.failures {
                warn!("loan {} left unchanged: {}", loan_id, e);
            }
            !report.defaulted.is_empty()
        }
        Command::Receipt { loan, amount, date } => {
            let receipt =
                actions::record_receipt(&mut store, &loan, amount, date.unwrap_or(today), today)?;
            println!("{}", receipt);
            true
        }
        Command::Pay {
            loan,
            amount,
            kind,
            date,
        } => {
            let payment = actions::record_payment(
                &mut store,
                &loan,
                amount,
                kind.into(),
                date.unwrap_or(today),
                today,
            )?;
            println!("{}", payment);
            true
        }
        Command::Settle { loan } => {
            let payment = actions::settle(&mut store, &loan, today, today)?;
            println!("settled {} for {}", loan, cfg.money(payment.amount));
            true
        }
        Command::SetDueDate { loan, date } => {
            let anchor = actions::change_due_date(&mut store, &loan, date, today)?;
            println!("{} now anchored on {}", loan, anchor);
            true
        }
        Command::DeleteReceipt { receipt } => {
            let status = actions::delete_receipt(&mut store, &receipt, today)?;
            println!("deleted {}, loan is {}", receipt, status);
            true
        }
        Command::DeleteLoan { loan } => {
            actions::delete_loan(&mut store, &loan)?;
            true
        }
    };

    if changed {
        store.save(&cfg.snapshot)?;
    }
    Ok(())
}

// store and error types cross thread boundaries unchanged
#[cfg(test)]
fn is_normal<T: Sized + Send + Sync + Unpin>() {}

#[test]
fn normal_types() {
    is_normal::<MemoryStore>();
    is_normal::<loanbook::error::LoanError>();
    is_normal::<Config>();
}
