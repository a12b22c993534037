// School Fees Tracker - command line
// Schema setup, account creation, bulk import and status lookups

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use rusqlite::Connection;
use school_fees::logging::init_tracing;
use school_fees::period::{is_valid_academic_year, Clock};
use school_fees::{
    create_user, ensure_bootstrap_admin, find_student, import_students, setup_database,
    FeeReconciler, Period, Role, SchoolFeesConfig, SystemClock, Term,
};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "school-fees", version, about = "School fee tracking and reconciliation")]
struct Cli {
    /// TOML configuration file (defaults to ./school-fees.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create the schema and seed the bootstrap admin
    Init,

    /// Add a login account
    CreateUser {
        #[arg(long)]
        username: String,
        #[arg(long)]
        password: String,
        #[arg(long, value_enum, default_value_t = RoleArg::Staff)]
        role: RoleArg,
    },

    /// Register students from a CSV file
    ImportStudents {
        csv: PathBuf,
    },

    /// Fee status and breakdown for one student
    Status {
        reg_number: String,
        /// Academic year such as 2024/2025 (default: current)
        #[arg(long)]
        year: Option<String>,
        /// Term label such as "First Term" (default: current)
        #[arg(long)]
        term: Option<String>,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum RoleArg {
    Admin,
    Staff,
}

impl From<RoleArg> for Role {
    fn from(arg: RoleArg) -> Self {
        match arg {
            RoleArg::Admin => Role::Admin,
            RoleArg::Staff => Role::Staff,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = SchoolFeesConfig::load_with_dotenv(cli.config.as_deref())
        .context("failed to load configuration")?;
    init_tracing(&config.log.filter)?;

    let mut conn = Connection::open(&config.database.path)
        .with_context(|| format!("failed to open database {}", config.database.path.display()))?;
    setup_database(&conn).context("failed to set up schema")?;

    match cli.command {
        Command::Init => run_init(&conn, &config),
        Command::CreateUser {
            username,
            password,
            role,
        } => {
            create_user(&conn, &username, &password, role.into())?;
            println!("✓ Created {} account '{}'", Role::from(role), username.trim());
            Ok(())
        }
        Command::ImportStudents { csv } => run_import(&mut conn, csv),
        Command::Status {
            reg_number,
            year,
            term,
        } => run_status(&conn, &reg_number, year, term),
    }
}

fn run_init(conn: &Connection, config: &SchoolFeesConfig) -> Result<()> {
    println!("✓ Database ready: {}", config.database.path.display());

    let created = ensure_bootstrap_admin(
        conn,
        &config.bootstrap.admin_username,
        &config.bootstrap.admin_password,
    )?;
    if created {
        println!(
            "✓ Bootstrap admin '{}' created. Change its password before going live.",
            config.bootstrap.admin_username
        );
    } else {
        println!("✓ Accounts already exist; bootstrap admin skipped");
    }
    Ok(())
}

fn run_import(conn: &mut Connection, csv: PathBuf) -> Result<()> {
    let report = import_students(conn, &csv, &SystemClock)
        .with_context(|| format!("failed to import {}", csv.display()))?;

    println!("📂 Imported {}", csv.display());
    println!("  inserted: {}", report.inserted);
    println!("  skipped:  {}", report.skipped.len());
    for reg_number in &report.skipped {
        println!("    - {reg_number} (already registered)");
    }
    println!("  rejected: {}", report.rejected.len());
    for (line, reason) in &report.rejected {
        println!("    - line {line}: {reason}");
    }
    Ok(())
}

fn run_status(conn: &Connection, reg_number: &str, year: Option<String>, term: Option<String>) -> Result<()> {
    let current = SystemClock.current_period();

    let academic_year = year.unwrap_or_else(|| current.academic_year.clone());
    if !is_valid_academic_year(&academic_year) {
        bail!("academic year '{academic_year}' must look like 2024/2025");
    }
    let term_label = match term {
        Some(label) => match Term::from_label(&label) {
            Some(term) => term.label().to_string(),
            None => bail!("unknown term '{label}'"),
        },
        None => current.term_label.clone(),
    };
    let period = Period::new(academic_year, term_label);

    let Some(student) = find_student(conn, reg_number)? else {
        bail!("student '{reg_number}' not found");
    };

    let reconciler = FeeReconciler::default();
    let status = reconciler.compute_status(conn, reg_number, &period.academic_year, &period.term_label)?;

    println!("{} ({}) · {}", student.name, student.reg_number, student.class_label);
    println!("Status for {period}: {}", status.label());
    println!();
    println!("{:<28} {:>14} {:>14} {:>14}  {}", "Period", "Expected", "Paid", "Outstanding", "Status");
    for summary in reconciler.breakdown(conn, reg_number, &current)? {
        println!(
            "{:<28} {:>14} {:>14} {:>14}  {}",
            summary.period.to_string(),
            summary.expected.round_dp(2).to_string(),
            summary.paid.round_dp(2).to_string(),
            summary.outstanding.round_dp(2).to_string(),
            summary.status.label()
        );
    }
    Ok(())
}
