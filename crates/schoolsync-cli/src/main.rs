//! schoolsync - command line client for the school portal.
//!
//! Signs in, keeps the session between runs, and prints portal collections
//! as JSON.

use std::io::{self, Write};

use anyhow::{bail, Context, Result};
use serde_json::{json, Value};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use schoolsync_core::auth::CredentialStore;
use schoolsync_core::{
    ApiError, Collection, Config, RecordId, SchoolClient, Scope, Session, SessionPhase,
};

/// Password for non-interactive logins
const PASSWORD_ENV: &str = "SCHOOLSYNC_PASSWORD";

/// When set, logs are also written to daily files in this directory
const LOG_DIR_ENV: &str = "SCHOOLSYNC_LOG_DIR";

const LOG_FILE_PREFIX: &str = "schoolsync.log";

const USAGE: &str = "\
Usage: schoolsync <command>

Commands:
  login [email]                        Sign in and remember the session
  logout                               Sign out and forget the session
  status                               Show the current session
  list <collection> [<scope> <id>]     Print a collection as JSON
  show <collection> <id>               Print one record as JSON

Collections: teachers, religions, enrollments, attendance,
             subject-teachers, classes, exams, subjects
Scopes:      student, subject, teacher, enrollment";

#[derive(Debug, PartialEq)]
enum Command {
    Login { email: Option<String> },
    Logout,
    Status,
    List {
        collection: Collection,
        scope: Option<(Scope, RecordId)>,
    },
    Show { collection: Collection, id: RecordId },
    Help,
}

impl Command {
    fn parse(args: &[String]) -> Result<Self> {
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        let command = match args.as_slice() {
            [] | ["help"] | ["-h"] | ["--help"] => Command::Help,
            ["login"] => Command::Login { email: None },
            ["login", email] => Command::Login {
                email: Some(email.to_string()),
            },
            ["logout"] => Command::Logout,
            ["status"] => Command::Status,
            ["list", collection] => Command::List {
                collection: collection.parse()?,
                scope: None,
            },
            ["list", collection, scope, id] => Command::List {
                collection: collection.parse()?,
                scope: Some((scope.parse()?, RecordId::from(*id))),
            },
            ["show", collection, id] => Command::Show {
                collection: collection.parse()?,
                id: RecordId::from(*id),
            },
            _ => bail!("Unrecognized arguments: {}\n\n{}", args.join(" "), USAGE),
        };
        Ok(command)
    }
}

/// Initialize the tracing subscriber for logging.
///
/// The returned guard flushes the file writer and must live until exit.
fn init_tracing() -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match std::env::var(LOG_DIR_ENV) {
        Ok(dir) if !dir.trim().is_empty() => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_writer(writer).with_ansi(false);
            (Some(layer), Some(guard))
        }
        _ => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();
    let _guard = init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = Command::parse(&args)?;
    if command == Command::Help {
        println!("{}", USAGE);
        return Ok(());
    }

    let mut config = Config::load().context("Failed to load configuration")?;
    let client = SchoolClient::new(&config)?;
    info!(?command, "schoolsync starting");

    let result = run(&client, &mut config, command).await;
    client.shutdown();
    result
}

async fn run(client: &SchoolClient, config: &mut Config, command: Command) -> Result<()> {
    let session = client.start().await;

    match command {
        Command::Login { email } => login(client, config, email).await,
        Command::Logout => {
            let session = client.logout();
            if let Some(ref email) = config.last_email {
                if CredentialStore::has_credentials(email) {
                    if let Err(e) = CredentialStore::delete(email) {
                        warn!(error = %e, "Failed to forget stored password");
                    }
                }
            }
            print_json(&session_json(&session))
        }
        Command::Status => print_json(&session_json(&session)),
        Command::List { collection, scope } => {
            require_login(&session)?;
            let resources = client.resources();
            let records = match scope {
                Some((scope, id)) => resources.list_in(collection, scope, &id).await?,
                None => resources.atom(collection).get_all().await?,
            };
            print_json(&serde_json::to_value(records)?)
        }
        Command::Show { collection, id } => {
            require_login(&session)?;
            let record = client.resources().atom(collection).get_by_id(&id).await?;
            print_json(&serde_json::to_value(record)?)
        }
        Command::Help => Ok(()),
    }
}

async fn login(client: &SchoolClient, config: &mut Config, email: Option<String>) -> Result<()> {
    let email = match email.or_else(|| config.last_email.clone()) {
        Some(email) => email,
        None => prompt("Email: ")?,
    };

    let (password, from_keychain) = match std::env::var(PASSWORD_ENV) {
        Ok(password) if !password.is_empty() => (password, false),
        _ => match CredentialStore::get_password(&email) {
            Ok(password) => (password, true),
            Err(_) => (rpassword::prompt_password("Password: ")?, false),
        },
    };

    let session = match client.login(&email, &password).await {
        Ok(session) => session,
        Err(e @ ApiError::Unauthorized(_)) if from_keychain => {
            // The remembered password no longer works
            if let Err(delete_err) = CredentialStore::delete(&email) {
                warn!(error = %delete_err, "Failed to forget stored password");
            }
            return Err(e).context("Stored password was rejected, it has been forgotten");
        }
        Err(e) => return Err(e).context("Login failed"),
    };

    if let Err(e) = CredentialStore::store(&email, &password) {
        warn!(error = %e, "Could not remember password");
    }
    config.last_email = Some(email);
    if let Err(e) = config.save() {
        warn!(error = %e, "Failed to save configuration");
    }

    print_json(&session_json(&session))
}

fn require_login(session: &Session) -> Result<()> {
    if !session.is_authenticated() {
        bail!("Not logged in. Run `schoolsync login` first.");
    }
    Ok(())
}

fn prompt(label: &str) -> Result<String> {
    print!("{}", label);
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    let value = line.trim().to_string();
    if value.is_empty() {
        bail!("No input given");
    }
    Ok(value)
}

fn session_json(session: &Session) -> Value {
    let state = match session.phase() {
        SessionPhase::Authenticating => "authenticating",
        SessionPhase::Authenticated { .. } => "authenticated",
        SessionPhase::Unauthenticated => "unauthenticated",
    };
    json!({
        "state": state,
        "user": session.user(),
        "signed_in_at": session.token().map(|t| t.issued_at()),
        "error": session.error(),
    })
}

fn print_json(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
