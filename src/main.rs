use anyhow::{bail, Context, Result};
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use expense_ledger::money::{self, parse_amount};
use expense_ledger::{
    default_period, format_currency, Caller, Config, Ledger, NewCategory, NewExpense, UserId,
};

#[derive(Parser)]
#[command(name = "expense-ledger")]
#[command(about = "Personal expense ledger with per-user access control", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Identity token of the caller, as issued by the authentication provider
    #[arg(long, env = "LEDGER_USER", global = true)]
    user: Option<String>,

    /// Database file (overrides DATABASE_PATH)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Print rows as JSON
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Create an account and its default category
    Signup {
        #[arg(value_name = "EMAIL")]
        email: String,
    },

    /// Show the caller's own account
    Whoami,

    /// Manage categories
    Category {
        #[command(subcommand)]
        action: CategoryCommands,
    },

    /// Manage expenses
    Expense {
        #[command(subcommand)]
        action: ExpenseCommands,
    },

    /// Spending per category, last 3 months by default
    Totals {
        /// First day included (YYYY-MM-DD), defaults to 3 months before --to
        #[arg(long)]
        from: Option<NaiveDate>,

        /// Last day included (YYYY-MM-DD), defaults to today
        #[arg(long)]
        to: Option<NaiveDate>,
    },

    /// Forecast monthly spending
    Forecast {
        /// Months to project (defaults to FORECAST_MONTHS)
        #[arg(short, long)]
        months: Option<u32>,
    },
}

#[derive(Subcommand)]
enum CategoryCommands {
    /// Add a category
    Add { name: String },

    /// List categories
    List,

    /// Rename a category
    Rename { id: i64, name: String },

    /// Delete a category that no expense references
    Delete { id: i64 },
}

#[derive(Subcommand)]
enum ExpenseCommands {
    /// Record an expense
    Add {
        /// Amount, e.g. 12.50 or 12,50
        amount: String,

        /// Date (YYYY-MM-DD), defaults to today
        #[arg(short, long)]
        date: Option<NaiveDate>,

        /// Category id or name
        #[arg(short, long)]
        category: Option<String>,

        #[arg(long)]
        description: Option<String>,
    },

    /// List expenses, oldest first, last 3 months by default
    List {
        /// First day included (YYYY-MM-DD), defaults to 3 months before --to
        #[arg(long)]
        from: Option<NaiveDate>,

        /// Last day included (YYYY-MM-DD), defaults to today
        #[arg(long)]
        to: Option<NaiveDate>,
    },

    /// Change fields of an expense
    Update {
        id: i64,

        #[arg(long)]
        amount: Option<String>,

        #[arg(short, long)]
        date: Option<NaiveDate>,

        /// Category id or name
        #[arg(short, long, conflicts_with = "uncategorize")]
        category: Option<String>,

        /// Remove the category
        #[arg(long)]
        uncategorize: bool,

        #[arg(long)]
        description: Option<String>,
    },

    /// Delete an expense
    Delete { id: i64 },
}

fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "expense_ledger=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = Config::from_env().map_err(|e| anyhow::anyhow!(e))?;

    let db_path = cli
        .db
        .clone()
        .unwrap_or_else(|| PathBuf::from(&config.database_path));
    let ledger = Ledger::open(&db_path)
        .with_context(|| format!("Failed to open database {}", db_path.display()))?;

    match &cli.command {
        Commands::Signup { email } => run_signup(&ledger, &cli, email),
        Commands::Whoami => {
            let caller = caller(&cli)?;
            let user = ledger.users().get(&caller)?;
            print_rows(&cli, &[&user], |u| {
                format!("{}  {}  since {}", u.id, u.email, u.created_at.format("%Y-%m-%d"))
            })
        }
        Commands::Category { action } => run_category(&ledger, &cli, action),
        Commands::Expense { action } => run_expense(&ledger, &cli, &config, action),
        Commands::Totals { from, to } => {
            let caller = caller(&cli)?;
            let (from, to) = period(*from, *to);
            let totals = ledger.category_totals(&caller, Some(from), Some(to))?;
            print_rows(&cli, &totals, |t| {
                format!(
                    "{:<24} {:>4}  {}",
                    t.category.as_deref().unwrap_or("(sem categoria)"),
                    t.count,
                    format_currency(t.total, &config.currency)
                )
            })
        }
        Commands::Forecast { months } => run_forecast(&ledger, &cli, &config, *months),
    }
}

/// Identity supplied by the authentication collaborator
fn caller(cli: &Cli) -> Result<Caller> {
    let Some(raw) = cli.user.as_deref() else {
        bail!("No caller identity: pass --user <id> or set LEDGER_USER");
    };
    let user_id: UserId = raw.parse()?;
    Ok(Caller::new(user_id))
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

fn period(from: Option<NaiveDate>, to: Option<NaiveDate>) -> (NaiveDate, NaiveDate) {
    let (from, to) = default_period(from, to, today());
    tracing::debug!(%from, %to, "report period");
    (from, to)
}

fn print_rows<T: Serialize>(cli: &Cli, rows: &[T], line: impl Fn(&T) -> String) -> Result<()> {
    if cli.json {
        println!("{}", serde_json::to_string_pretty(rows)?);
    } else {
        for row in rows {
            println!("{}", line(row));
        }
    }
    Ok(())
}

fn run_signup(ledger: &Ledger, cli: &Cli, email: &str) -> Result<()> {
    let user = ledger.users().sign_up(email)?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&user)?);
    } else {
        println!("✓ Account created for {}", user.email);
        println!("  export LEDGER_USER={}", user.id);
    }
    Ok(())
}

fn run_category(ledger: &Ledger, cli: &Cli, action: &CategoryCommands) -> Result<()> {
    let caller = caller(cli)?;
    let categories = ledger.categories();

    match action {
        CategoryCommands::Add { name } => {
            let category = categories.create(
                &caller,
                NewCategory {
                    user_id: caller.user_id(),
                    name: name.clone(),
                },
            )?;
            println!("✓ Category {} added: {}", category.id, category.name);
        }
        CategoryCommands::List => {
            let rows = categories.list(&caller)?;
            if rows.is_empty() && !cli.json {
                println!("No categories yet. Add one with: category add <name>");
            }
            print_rows(cli, &rows, |c| format!("{:>5}  {}", c.id, c.name))?;
        }
        CategoryCommands::Rename { id, name } => {
            let category = categories.rename(&caller, *id, name)?;
            println!("✓ Category {} renamed to {}", category.id, category.name);
        }
        CategoryCommands::Delete { id } => {
            categories.delete(&caller, *id)?;
            println!("✓ Category {} deleted", id);
        }
    }
    Ok(())
}

/// Resolve a category given as id or name
fn resolve_category(ledger: &Ledger, caller: &Caller, raw: &str) -> Result<i64> {
    match ledger.categories().find_by_id_or_name(caller, raw)? {
        Some(category) => Ok(category.id),
        None => bail!("No category with id or name {:?}", raw),
    }
}

fn run_expense(ledger: &Ledger, cli: &Cli, config: &Config, action: &ExpenseCommands) -> Result<()> {
    let caller = caller(cli)?;
    let expenses = ledger.expenses();

    match action {
        ExpenseCommands::Add {
            amount,
            date,
            category,
            description,
        } => {
            let mut new = NewExpense::new(
                caller.user_id(),
                date.unwrap_or_else(today),
                parse_amount(amount)?,
            );
            new.description = description.clone();
            if let Some(raw) = category {
                new.category_id = Some(resolve_category(ledger, &caller, raw)?);
            }

            let expense = expenses.create(&caller, new)?;
            println!(
                "✓ Expense {} recorded: {} on {}",
                expense.id,
                format_currency(expense.amount, &config.currency),
                expense.date
            );
        }
        ExpenseCommands::List { from, to } => {
            let (from, to) = period(*from, *to);
            let rows = expenses.list_between(&caller, Some(from), Some(to))?;
            if rows.is_empty() && !cli.json {
                println!("No expenses between {} and {}.", from, to);
            }
            let names: HashMap<i64, String> = ledger
                .categories()
                .list(&caller)?
                .into_iter()
                .map(|c| (c.id, c.name))
                .collect();
            print_rows(cli, &rows, |e| {
                format!(
                    "{:>5}  {}  {:<20}  {:>14}  {}",
                    e.id,
                    e.date,
                    e.category_id
                        .and_then(|id| names.get(&id))
                        .map_or("(sem categoria)", String::as_str),
                    format_currency(e.amount, &config.currency),
                    e.description.as_deref().unwrap_or("")
                )
            })?;
        }
        ExpenseCommands::Update {
            id,
            amount,
            date,
            category,
            uncategorize,
            description,
        } => {
            let amount = amount.as_deref().map(parse_amount).transpose()?;
            let category_id = match category {
                Some(raw) => Some(resolve_category(ledger, &caller, raw)?),
                None => None,
            };

            let expense = expenses.update(&caller, *id, |e| {
                if let Some(amount) = amount {
                    e.amount = amount;
                }
                if let Some(date) = date {
                    e.date = *date;
                }
                if category_id.is_some() {
                    e.category_id = category_id;
                }
                if *uncategorize {
                    e.category_id = None;
                }
                if let Some(description) = description {
                    e.description = Some(description.clone());
                }
            })?;
            println!(
                "✓ Expense {} updated: {} on {}",
                expense.id,
                format_currency(expense.amount, &config.currency),
                expense.date
            );
        }
        ExpenseCommands::Delete { id } => {
            expenses.delete(&caller, *id)?;
            println!("✓ Expense {} deleted", id);
        }
    }
    Ok(())
}

fn run_forecast(ledger: &Ledger, cli: &Cli, config: &Config, months: Option<u32>) -> Result<()> {
    let caller = caller(cli)?;
    let months = months.unwrap_or(config.forecast_months);
    let points = ledger.forecast(&caller, months)?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&points)?);
        return Ok(());
    }

    if points.is_empty() {
        println!("Record a few expenses to get a forecast.");
        return Ok(());
    }

    println!("{}: forecast for the next {} months", config.app_name, months);
    for point in points.iter().filter(|p| p.is_future()) {
        println!(
            "- {}: {}",
            point.month.format("%b/%Y"),
            format_currency(money::from_f64(point.forecast), &config.currency)
        );
    }
    Ok(())
}
