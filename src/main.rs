//! doquedb - Command-line client for DoqueDB
//!
//! Provides both a REPL and one-shot command execution.

mod commands;
mod repl;

use clap::{Parser, Subcommand};
use colored::Colorize;
use doquedb_client::config::parse_protocol_version;
use doquedb_client::{DataSource, DataSourceConfig};
use doquedb_protocol::ProtocolVersion;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

const DEFAULT_DATABASE: &str = "DefaultDB";

#[derive(Parser)]
#[command(name = "doquedb")]
#[command(about = "Command-line client for the DoqueDB database server")]
#[command(version)]
struct Cli {
    /// Server host (overrides the config file and DOQUEDB_HOST)
    #[arg(long)]
    host: Option<String>,

    /// Server port (overrides the config file and DOQUEDB_PORT)
    #[arg(short, long)]
    port: Option<u16>,

    /// YAML configuration file
    #[arg(short, long, env = "DOQUEDB_CONFIG")]
    config: Option<PathBuf>,

    /// User name for authenticated sessions
    #[arg(short, long, env = "DOQUEDB_USER")]
    user: Option<String>,

    /// Password for authenticated sessions
    #[arg(long, env = "DOQUEDB_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Highest protocol version to request (1-5)
    #[arg(long, value_parser = parse_protocol_version)]
    protocol_version: Option<ProtocolVersion>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start interactive REPL
    Repl {
        /// Database to open a session on
        #[arg(default_value = DEFAULT_DATABASE)]
        database: String,
    },

    /// Execute one SQL statement and print its results
    Query {
        /// Database name
        database: String,

        /// SQL text
        sql: String,

        /// Statement parameters, bound in order as strings
        #[arg(short = 'P', long = "param")]
        params: Vec<String>,

        /// Print one JSON object per row
        #[arg(long)]
        json: bool,
    },

    /// Check whether the server or a database is available
    Available {
        /// Database id (omit for the server itself)
        #[arg(short, long)]
        database: Option<u32>,
    },

    /// Print the server product version
    Version {
        /// Database to open a session on
        #[arg(default_value = DEFAULT_DATABASE)]
        database: String,
    },

    /// Stop the server
    Shutdown,

    /// Create a user
    CreateUser {
        /// Database to open a session on
        #[arg(short, long, default_value = DEFAULT_DATABASE)]
        database: String,

        /// New user name
        name: String,

        /// New user's password
        new_password: String,

        /// User id (assigned by the server when omitted)
        #[arg(long)]
        id: Option<i32>,
    },

    /// Drop a user
    DropUser {
        /// Database to open a session on
        #[arg(short, long, default_value = DEFAULT_DATABASE)]
        database: String,

        /// User name
        name: String,

        /// Also revoke everything granted to the user
        #[arg(long)]
        cascade: bool,
    },

    /// Change a password (your own unless --name is given)
    ChangePassword {
        /// Database to open a session on
        #[arg(short, long, default_value = DEFAULT_DATABASE)]
        database: String,

        /// User whose password to change
        #[arg(long)]
        name: Option<String>,

        /// New password
        new_password: String,
    },
}

/// Login credentials given on the command line.
#[derive(Clone)]
pub struct Credentials {
    pub user: String,
    pub password: String,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    let config = match build_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}: {}", "Configuration error".red(), e);
            std::process::exit(1);
        }
    };
    tracing::debug!("Using server {}", config.addr());

    let credentials = match (cli.user, cli.password) {
        (Some(user), Some(password)) => Some(Credentials { user, password }),
        (Some(user), None) => Some(Credentials {
            user,
            password: String::new(),
        }),
        (None, _) => None,
    };

    let ds = DataSource::new(config);

    match cli.command {
        Some(Commands::Repl { database }) => repl::run(&ds, &database, credentials)?,
        None => repl::run(&ds, DEFAULT_DATABASE, credentials)?,
        Some(Commands::Shutdown) => {
            // Shutdown opens its own channel; the pool stays closed.
            let result = match &credentials {
                Some(c) => ds.shutdown_with_credentials(&c.user, &c.password),
                None => ds.shutdown(),
            };
            match result {
                Ok(()) => println!("{}", "Server shut down".green()),
                Err(e) => {
                    eprintln!("{}: {}", "Error".red(), e);
                    std::process::exit(1);
                }
            }
        }
        Some(cmd) => {
            // Connect for one-shot command
            ds.open().map_err(|e| {
                eprintln!("{}: {}", "Connection failed".red(), e);
                e
            })?;

            let result = commands::execute(&ds, credentials.as_ref(), cmd);
            ds.close();

            match result {
                Ok(output) => {
                    if !output.is_empty() {
                        println!("{}", output);
                    }
                }
                Err(e) => {
                    eprintln!("{}: {}", "Error".red(), e);
                    std::process::exit(1);
                }
            }
        }
    }

    Ok(())
}

/// Defaults, then the config file (or DOQUEDB_CONFIG) and environment, then
/// command-line flags.
fn build_config(cli: &Cli) -> Result<DataSourceConfig, Box<dyn std::error::Error>> {
    let mut config = match &cli.config {
        Some(path) => {
            let mut config = DataSourceConfig::from_file(path)?;
            config.apply_env_overrides();
            config
        }
        None => DataSourceConfig::load()?,
    };
    if let Some(host) = &cli.host {
        config = config.with_host(host.clone());
    }
    if let Some(port) = cli.port {
        config = config.with_port(port);
    }
    if let Some(version) = cli.protocol_version {
        config = config.with_protocol_version(version);
    }
    config.validate()?;
    Ok(config)
}
