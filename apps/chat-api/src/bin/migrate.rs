//! Schema migration runner for chat-api.
//!
//! Usage:
//!   cargo run -p chat-api --bin chat-migrate            # apply pending
//!   cargo run -p chat-api --bin chat-migrate -- status  # list pending
//!   cargo run -p chat-api --bin chat-migrate -- revert  # undo the latest
//!
//! Reads DATABASE_URL from the environment (or .env via dotenvy).

use std::path::Path;

use diesel::pg::PgConnection;
use diesel::Connection;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};

const MIGRATIONS: EmbeddedMigrations = embed_migrations!("./migrations");

enum Command {
    Run,
    Status,
    Revert,
}

impl Command {
    fn from_args() -> Result<Self, String> {
        match std::env::args().nth(1).as_deref() {
            None | Some("run") => Ok(Command::Run),
            Some("status") => Ok(Command::Status),
            Some("revert") => Ok(Command::Revert),
            Some(other) => Err(format!("unknown command {other:?}; expected run, status or revert")),
        }
    }
}

fn main() {
    if dotenvy::dotenv().is_err() {
        let env_path = Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
        let _ = dotenvy::from_path(env_path);
    }

    let command = Command::from_args().unwrap_or_else(|e| {
        eprintln!("{e}");
        std::process::exit(2);
    });

    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL env var is required");

    println!("Connecting to database...");
    let mut conn = PgConnection::establish(&database_url).expect("failed to connect to database");

    match command {
        Command::Run => {
            let applied = conn
                .run_pending_migrations(MIGRATIONS)
                .expect("failed to run migrations");
            if applied.is_empty() {
                println!("No pending migrations.");
            } else {
                for migration in &applied {
                    println!("  Applied: {migration}");
                }
                println!("{} migration(s) applied.", applied.len());
            }
        }
        Command::Status => {
            let pending = conn
                .pending_migrations(MIGRATIONS)
                .expect("failed to read migration state");
            if pending.is_empty() {
                println!("Schema is up to date.");
            }
            for migration in &pending {
                println!("  Pending: {}", migration.name());
            }
        }
        Command::Revert => {
            let reverted = conn
                .revert_last_migration(MIGRATIONS)
                .expect("failed to revert migration");
            println!("  Reverted: {reverted}");
        }
    }
}
