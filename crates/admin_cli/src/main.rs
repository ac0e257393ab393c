use std::{error::Error, io::Write};

use clap::{Args, Parser, Subcommand};
use crossterm::{
    cursor,
    event::{self, Event, KeyCode, KeyEventKind, KeyModifiers},
    execute,
    style::Print,
    terminal,
    terminal::ClearType,
};
use engine::{Engine, Principal, Role};
use migration::MigratorTrait;
use sea_orm::{Database, DatabaseConnection};
use uuid::Uuid;

type CliResult<T> = Result<T, Box<dyn Error + Send + Sync>>;

#[derive(Parser, Debug)]
#[command(name = "rozliczenia_admin")]
#[command(about = "Admin utilities for Rozliczenia (bootstrap users, companies and permissions)")]
struct Cli {
    /// Database connection string (also read from `DATABASE_URL`).
    #[arg(
        long,
        env = "DATABASE_URL",
        default_value = "sqlite:./rozliczenia.db?mode=rwc"
    )]
    database_url: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    User(User),
    Company(Company),
    /// Replace the set of companies a user may file requests for.
    Grant(GrantArgs),
    /// Replay a user's balance ledger and report inconsistencies.
    VerifyLedger(VerifyLedgerArgs),
}

#[derive(Args, Debug)]
struct User {
    #[command(subcommand)]
    command: UserCommand,
}

#[derive(Subcommand, Debug)]
enum UserCommand {
    Create(UserCreateArgs),
}

#[derive(Args, Debug)]
struct UserCreateArgs {
    #[arg(long)]
    username: String,
    #[arg(long, default_value = "user", value_parser = parse_role)]
    role: Role,
}

/// Credentials of the admin performing the operation.
#[derive(Args, Debug)]
struct AdminAuth {
    #[arg(long = "admin")]
    admin_username: String,
    /// Prompted for when not set.
    #[arg(long, env = "ROZLICZENIA_ADMIN_PASSWORD", hide_env_values = true)]
    admin_password: Option<String>,
}

#[derive(Args, Debug)]
struct Company {
    #[command(subcommand)]
    command: CompanyCommand,
}

#[derive(Subcommand, Debug)]
enum CompanyCommand {
    Create(CompanyCreateArgs),
}

#[derive(Args, Debug)]
struct CompanyCreateArgs {
    #[command(flatten)]
    auth: AdminAuth,
    #[arg(long)]
    name: String,
    #[arg(long)]
    tax_id: Option<String>,
}

#[derive(Args, Debug)]
struct GrantArgs {
    #[command(flatten)]
    auth: AdminAuth,
    #[arg(long)]
    username: String,
    /// Company id; repeat for several. Passing none revokes everything.
    #[arg(long = "company")]
    companies: Vec<Uuid>,
}

#[derive(Args, Debug)]
struct VerifyLedgerArgs {
    #[command(flatten)]
    auth: AdminAuth,
    #[arg(long)]
    username: String,
}

fn parse_role(raw: &str) -> Result<Role, String> {
    Role::try_from(raw).map_err(|err| err.to_string())
}

struct RawModeGuard;

impl RawModeGuard {
    fn enter() -> CliResult<Self> {
        terminal::enable_raw_mode()?;
        Ok(Self)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = terminal::disable_raw_mode();
    }
}

/// Reads a secret from the terminal without echoing it.
///
/// Esc and Ctrl-C abort the command.
fn prompt_password(prompt: &str) -> CliResult<String> {
    let mut stderr = std::io::stderr();
    execute!(
        stderr,
        cursor::MoveToColumn(0),
        terminal::Clear(ClearType::CurrentLine),
        Print(prompt)
    )?;

    let secret = {
        let _raw = RawModeGuard::enter()?;
        read_secret()
    };
    execute!(stderr, Print("\r\n"))?;
    stderr.flush()?;
    secret
}

fn read_secret() -> CliResult<String> {
    let mut secret = String::new();
    loop {
        let Event::Key(key) = event::read()? else {
            continue;
        };
        if key.kind != KeyEventKind::Press {
            continue;
        }
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        match key.code {
            KeyCode::Enter => return Ok(secret),
            KeyCode::Esc => return Err("aborted".into()),
            KeyCode::Char('c') if ctrl => return Err("interrupted".into()),
            KeyCode::Backspace => {
                secret.pop();
            }
            KeyCode::Char(ch) if !ctrl => secret.push(ch),
            _ => {}
        }
    }
}

fn prompt_new_password() -> CliResult<String> {
    let mut out = std::io::stderr();
    for _ in 0..3 {
        let first = prompt_password("Password: ")?;
        if first.is_empty() {
            execute!(
                out,
                cursor::MoveToColumn(0),
                terminal::Clear(ClearType::CurrentLine),
                Print("Password must not be empty.\r\n")
            )?;
            continue;
        }

        let second = prompt_password("Confirm password: ")?;
        if first == second {
            return Ok(first);
        }

        execute!(
            out,
            cursor::MoveToColumn(0),
            terminal::Clear(ClearType::CurrentLine),
            Print("Passwords do not match. Try again.\r\n")
        )?;
    }

    Err("too many attempts".into())
}

async fn connect_db(database_url: &str) -> CliResult<DatabaseConnection> {
    let db = Database::connect(database_url).await?;
    migration::Migrator::up(&db, None).await?;
    Ok(db)
}

/// Log in as an admin; every mutation below runs with the engine's own
/// permission checks.
async fn login_admin(engine: &Engine, auth: AdminAuth) -> CliResult<Principal> {
    let password = match auth.admin_password {
        Some(password) => password,
        None => prompt_password(&format!("Password for {}: ", auth.admin_username))?,
    };
    let principal = engine.authenticate(&auth.admin_username, &password).await?;
    if principal.role != Role::Admin {
        return Err(format!("{} is not an admin", principal.username).into());
    }
    Ok(principal)
}

async fn find_user_id(engine: &Engine, principal: &Principal, username: &str) -> CliResult<Uuid> {
    engine
        .list_users(principal)
        .await?
        .into_iter()
        .find(|user| user.username == username)
        .map(|user| user.id)
        .ok_or_else(|| format!("user not found: {username}").into())
}

#[tokio::main]
async fn main() -> CliResult<()> {
    let cli = Cli::parse();

    let db = connect_db(&cli.database_url).await?;
    let engine = Engine::builder().database(db).build().await?;

    match cli.command {
        Command::User(User {
            command: UserCommand::Create(args),
        }) => {
            let password = prompt_new_password()?;
            let user = engine
                .create_user(&args.username, &password, args.role)
                .await?;
            println!(
                "created {} {}: {}",
                user.role.as_str(),
                user.username,
                user.id
            );
        }
        Command::Company(Company {
            command: CompanyCommand::Create(args),
        }) => {
            let admin = login_admin(&engine, args.auth).await?;
            let company = engine
                .create_company(&admin, &args.name, args.tax_id.as_deref())
                .await?;
            println!("created company: {} ({})", company.name, company.id);
        }
        Command::Grant(args) => {
            let admin = login_admin(&engine, args.auth).await?;
            let user_id = find_user_id(&engine, &admin, &args.username).await?;
            let companies = engine
                .set_user_companies(&admin, user_id, args.companies)
                .await?;
            if companies.is_empty() {
                println!("{} has no company permissions", args.username);
            }
            for company in companies {
                println!("{} -> {} ({})", args.username, company.name, company.id);
            }
        }
        Command::VerifyLedger(args) => {
            let admin = login_admin(&engine, args.auth).await?;
            let user_id = find_user_id(&engine, &admin, &args.username).await?;
            let report = engine.verify_ledger(&admin, user_id).await?;
            println!(
                "{}: stored {}, replayed {} over {} entries",
                args.username, report.stored_balance, report.replayed_balance, report.entries
            );
            for problem in &report.problems {
                println!("  {problem}");
            }
            if !report.consistent {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
