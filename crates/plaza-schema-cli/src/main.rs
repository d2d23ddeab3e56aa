use std::process::ExitCode;

use clap::{Parser, Subcommand};
use owo_colors::OwoColorize;
use plaza_schema::{DatabaseOutcome, DbConfig, NewUser, Reconciler, create_database};
use tracing::{error, info, warn};

/// Bootstrap and patch the Plaza Portal database schema.
///
/// Connection settings come from DB_HOST, DB_PORT, DB_USER, DB_PASSWORD,
/// DB_NAME, DB_TYPE and DB_SSLMODE, with a `.env` file loaded first if present.
#[derive(Parser, Debug)]
#[command(name = "plaza-schema", version)]
struct Cli {
    /// Command to run (defaults to `migrate`)
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available commands
#[derive(Subcommand, Debug)]
enum Commands {
    /// Create missing tables and patch existing ones
    Migrate,
    /// Show what `migrate` would change, without writing
    Plan,
    /// Create the database named by DB_NAME (default `plaza_web`) if the server lacks it
    CreateDatabase,
    /// Add a portal user
    AddUser {
        #[arg(long)]
        name: String,
        #[arg(long = "email")]
        email_id: String,
        /// Stored as given
        #[arg(long)]
        password: String,
        #[arg(long)]
        role: String,
        #[arg(long)]
        designation: Option<String>,
        #[arg(long)]
        mob_no: Option<String>,
        #[arg(long)]
        user_code: Option<String>,
        /// Defaults to true on the database side
        #[arg(long)]
        temp_login: Option<bool>,
    },
}

/// Our own crates at `info`; driver chatter stays quiet unless RUST_LOG asks for it.
const DEFAULT_LOG_FILTER: &str = "plaza_schema=info,plaza_schema_cli=info";

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .init();

    // Configuration errors are fatal before any connection is attempted.
    let config = match DbConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };
    if config.password_missing() {
        warn!("Warning: DB_PASSWORD not set in .env file");
    }
    info!(database = %config.display_target(), db_type = %config.db_type, "using database");

    let reconciler = Reconciler::new(config);
    let command = cli.command.unwrap_or(Commands::Migrate);
    if run(&reconciler, command).await {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

/// Run one command; returns whether it succeeded.
async fn run(reconciler: &Reconciler, command: Commands) -> bool {
    match command {
        Commands::Migrate => match reconciler.ensure_all().await {
            Ok(outcomes) => {
                let changed = outcomes.iter().filter(|(_, o)| o.changed()).count();
                info!("Schema up to date ({} of {} tables changed)", changed, outcomes.len());
                true
            }
            Err(e) => {
                error!("{}", e);
                false
            }
        },
        Commands::Plan => match reconciler.plan_all().await {
            Ok(plans) => {
                for plan in &plans {
                    if plan.is_empty() {
                        println!("{} {}", plan.table.bold(), "(up to date)".dimmed());
                        continue;
                    }
                    println!("{}:", plan.table.bold());
                    for change in &plan.changes {
                        println!("  {}", change.yellow());
                    }
                    println!();
                    for line in plan.to_sql().lines() {
                        println!("  {}", line.dimmed());
                    }
                    println!();
                }
                true
            }
            Err(e) => {
                error!("{}", e);
                false
            }
        },
        Commands::CreateDatabase => match create_database(reconciler.config()).await {
            Ok(DatabaseOutcome::Created | DatabaseOutcome::AlreadyExists) => true,
            Err(e) => {
                error!("Error creating PostgreSQL database: {}", e);
                false
            }
        },
        Commands::AddUser {
            name,
            email_id,
            password,
            role,
            designation,
            mob_no,
            user_code,
            temp_login,
        } => {
            let user = NewUser {
                name,
                email_id,
                password,
                role,
                designation,
                mob_no,
                user_code,
                temp_login,
            };
            match reconciler.try_add_user(&user).await {
                Ok(Some(id)) => {
                    println!("{}", id);
                    true
                }
                Ok(None) => false,
                Err(e) => {
                    error!("{}", e);
                    false
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_no_subcommand_means_migrate() {
        let cli = Cli::try_parse_from(["plaza-schema"]).unwrap();
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_parse_add_user() {
        let cli = Cli::try_parse_from([
            "plaza-schema",
            "add-user",
            "--name",
            "Alice",
            "--email",
            "a@x.com",
            "--password",
            "pw",
            "--role",
            "admin",
            "--temp-login",
            "false",
        ])
        .unwrap();
        match cli.command {
            Some(Commands::AddUser {
                name,
                email_id,
                temp_login,
                designation,
                ..
            }) => {
                assert_eq!(name, "Alice");
                assert_eq!(email_id, "a@x.com");
                assert_eq!(temp_login, Some(false));
                assert_eq!(designation, None);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_add_user_requires_role() {
        let result = Cli::try_parse_from([
            "plaza-schema",
            "add-user",
            "--name",
            "Alice",
            "--email",
            "a@x.com",
            "--password",
            "pw",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_create_database_help_names_target() {
        use clap::CommandFactory;
        let mut cmd = Cli::command();
        let help = cmd
            .find_subcommand_mut("create-database")
            .unwrap()
            .render_help()
            .to_string();
        assert!(help.contains("DB_NAME"));
        assert!(help.contains("plaza_web"));
    }

    #[test]
    fn test_default_log_filter_scopes_to_our_crates() {
        let filter = tracing_subscriber::EnvFilter::new(DEFAULT_LOG_FILTER);
        let rendered = filter.to_string();
        assert!(rendered.contains("plaza_schema=info"));
        assert!(!rendered.split(',').any(|d| d == "info"));
    }
}
